//! Generators that synthesize a full replacement cut-point set.

use crate::cut_points::{CutPoint, Disposition};
use crate::error::{EngineError, Result};
use crate::time::ticks_to_seconds;

/// Cut points that isolate the first `length_tl` ticks.
///
/// Produces a cut point at `0` tagged `leading` and a `Keep` cut point at
/// `length_tl`, so the first segment is `[0, length_tl)`.
///
/// # Example
/// ```
/// use splitter_engine::{Disposition, derive_segments, quick_cut};
///
/// let cuts = quick_cut::first_seconds(10_000_000, 60_000_000, Disposition::Discard)
///     .expect("valid length");
/// let segments = derive_segments(&cuts, 60_000_000);
/// assert_eq!(segments[0].end_tl, 10_000_000);
/// assert_eq!(segments[0].disposition, Disposition::Discard);
/// ```
pub fn first_seconds(
    length_tl: i64,
    duration_tl: i64,
    leading: Disposition,
) -> Result<Vec<CutPoint>> {
    check_length("first seconds", length_tl, duration_tl)?;
    Ok(vec![
        CutPoint::new(0, leading),
        CutPoint::keep(length_tl),
    ])
}

/// Cut points that isolate the last `length_tl` ticks as a `Discard` tail.
pub fn last_seconds(length_tl: i64, duration_tl: i64) -> Result<Vec<CutPoint>> {
    check_length("last seconds", length_tl, duration_tl)?;
    Ok(vec![CutPoint::discard(duration_tl - length_tl)])
}

/// Most cut points a single split-every request may produce.
pub const MAX_SPLIT_CUT_POINTS: i64 = 10_000;

/// Cut points every `interval_tl` ticks strictly before `duration_tl`.
///
/// An interval at least as long as the video yields no cut points. The
/// interval must be longer than `epsilon_tl`, the store's duplicate window,
/// and may not produce more than [`MAX_SPLIT_CUT_POINTS`] cut points. Both
/// bounds are checked before anything is generated.
pub fn split_every(interval_tl: i64, duration_tl: i64, epsilon_tl: i64) -> Result<Vec<CutPoint>> {
    let invalid = |reason| EngineError::InvalidParameter {
        name: "split interval",
        value: ticks_to_seconds(interval_tl),
        reason,
    };
    if interval_tl <= 0 {
        return Err(invalid("interval must be positive"));
    }
    if interval_tl <= epsilon_tl {
        return Err(invalid("interval must be longer than the duplicate window"));
    }
    let count = (duration_tl.max(0) - 1).max(0) / interval_tl;
    if count > MAX_SPLIT_CUT_POINTS {
        return Err(invalid("interval would produce too many segments"));
    }

    let mut cuts = Vec::with_capacity(count as usize);
    let mut at_tl = interval_tl;
    while at_tl < duration_tl {
        cuts.push(CutPoint::keep(at_tl));
        at_tl += interval_tl;
    }
    Ok(cuts)
}

fn check_length(name: &'static str, length_tl: i64, duration_tl: i64) -> Result<()> {
    if length_tl <= 0 {
        return Err(EngineError::InvalidParameter {
            name,
            value: ticks_to_seconds(length_tl),
            reason: "length must be positive",
        });
    }
    if length_tl >= duration_tl {
        return Err(EngineError::InvalidParameter {
            name,
            value: ticks_to_seconds(length_tl),
            reason: "length must be shorter than the video",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MAX_SPLIT_CUT_POINTS, first_seconds, last_seconds, split_every};
    use crate::cut_points::{CutPoint, Disposition};
    use crate::error::EngineError;
    use crate::segments::derive_segments;

    const EPSILON_TL: i64 = 1_000;

    #[test]
    fn first_ten_seconds_of_sixty_yields_two_segments() {
        let cuts = first_seconds(10_000_000, 60_000_000, Disposition::Keep).expect("valid");
        let times: Vec<i64> = cuts.iter().map(|cut| cut.at_tl).collect();
        assert_eq!(times, vec![0, 10_000_000]);

        let segments = derive_segments(&cuts, 60_000_000);
        let ranges: Vec<(i64, i64)> = segments
            .iter()
            .map(|segment| (segment.start_tl, segment.end_tl))
            .collect();
        assert_eq!(ranges, vec![(0, 10_000_000), (10_000_000, 60_000_000)]);
    }

    #[test]
    fn split_by_fifteen_on_fifty_yields_four_segments() {
        let cuts = split_every(15_000_000, 50_000_000, EPSILON_TL).expect("valid");
        let times: Vec<i64> = cuts.iter().map(|cut| cut.at_tl).collect();
        assert_eq!(times, vec![15_000_000, 30_000_000, 45_000_000]);

        let lengths: Vec<i64> = derive_segments(&cuts, 50_000_000)
            .iter()
            .map(|segment| segment.duration_tl())
            .collect();
        assert_eq!(lengths, vec![15_000_000, 15_000_000, 15_000_000, 5_000_000]);
    }

    #[test]
    fn split_every_exact_multiple_does_not_emit_cut_at_the_end() {
        let cuts = split_every(10_000_000, 30_000_000, EPSILON_TL).expect("valid");
        assert_eq!(cuts, vec![CutPoint::keep(10_000_000), CutPoint::keep(20_000_000)]);
    }

    #[test]
    fn last_seconds_marks_tail_as_discard() {
        let cuts = last_seconds(5_000_000, 60_000_000).expect("valid");
        let segments = derive_segments(&cuts, 60_000_000);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start_tl, 55_000_000);
        assert_eq!(segments[1].disposition, Disposition::Discard);
    }

    #[test]
    fn invalid_lengths_are_rejected() {
        for length in [0, -1, 60_000_000, 61_000_000] {
            assert!(matches!(
                first_seconds(length, 60_000_000, Disposition::Discard),
                Err(EngineError::InvalidParameter { .. })
            ));
            assert!(matches!(
                last_seconds(length, 60_000_000),
                Err(EngineError::InvalidParameter { .. })
            ));
        }
        assert!(matches!(
            split_every(0, 60_000_000, EPSILON_TL),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn split_every_rejects_intervals_inside_the_duplicate_window() {
        for interval in [1, 500, EPSILON_TL] {
            assert!(matches!(
                split_every(interval, 10_000_000, EPSILON_TL),
                Err(EngineError::InvalidParameter { .. })
            ));
        }
        assert!(split_every(EPSILON_TL + 1, 10_000, EPSILON_TL).is_ok());
    }

    #[test]
    fn split_every_caps_the_number_of_cut_points() {
        let hour_tl = 3_600_000_000;
        assert!(matches!(
            split_every(10_000, hour_tl, EPSILON_TL),
            Err(EngineError::InvalidParameter { .. })
        ));

        let interval = 1_000_000;
        let duration = interval * (MAX_SPLIT_CUT_POINTS + 1);
        let cuts = split_every(interval, duration, EPSILON_TL).expect("at the cap");
        assert_eq!(cuts.len() as i64, MAX_SPLIT_CUT_POINTS);
    }
}
