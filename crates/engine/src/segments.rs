use crate::cut_points::{CutPoint, Disposition};
use crate::time::ticks_to_seconds;

/// A derived time range between two adjacent boundaries.
///
/// Segments have no identity beyond `index` within one derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position in the derived list.
    pub index: usize,
    pub start_tl: i64,
    pub end_tl: i64,
    pub disposition: Disposition,
}

impl Segment {
    pub fn duration_tl(&self) -> i64 {
        self.end_tl - self.start_tl
    }

    pub fn start_seconds(&self) -> f64 {
        ticks_to_seconds(self.start_tl)
    }

    pub fn end_seconds(&self) -> f64 {
        ticks_to_seconds(self.end_tl)
    }

    pub fn duration_seconds(&self) -> f64 {
        ticks_to_seconds(self.duration_tl())
    }
}

/// Derives the ordered segment list from cut points and the video duration.
///
/// Boundaries are `0`, every cut point, and `duration_tl`. Each segment takes
/// the disposition of the cut point sitting on its start boundary; a first
/// segment without a cut point at `0` is `Keep`. Zero-length ranges are
/// dropped and cut points outside `[0, duration_tl]` are ignored, so this
/// never fails. The result only depends on the inputs.
///
/// # Example
/// ```
/// use splitter_engine::{CutPoint, Disposition, derive_segments};
///
/// let cuts = [CutPoint::discard(10_000_000), CutPoint::keep(20_000_000)];
/// let segments = derive_segments(&cuts, 30_000_000);
///
/// assert_eq!(segments.len(), 3);
/// assert_eq!(segments[0].disposition, Disposition::Keep);
/// assert_eq!(segments[1].disposition, Disposition::Discard);
/// assert_eq!(segments[2].end_tl, 30_000_000);
/// ```
pub fn derive_segments(cut_points: &[CutPoint], duration_tl: i64) -> Vec<Segment> {
    if duration_tl <= 0 {
        return Vec::new();
    }

    let mut boundaries: Vec<(i64, Disposition)> = Vec::with_capacity(cut_points.len() + 2);
    boundaries.push((0, Disposition::Keep));
    let mut inner: Vec<&CutPoint> = cut_points
        .iter()
        .filter(|point| (0..=duration_tl).contains(&point.at_tl))
        .collect();
    inner.sort_by_key(|point| point.at_tl);
    for point in inner {
        match boundaries.last_mut() {
            // A cut point on an existing boundary overrides its disposition.
            Some(last) if last.0 == point.at_tl => last.1 = point.disposition,
            _ => boundaries.push((point.at_tl, point.disposition)),
        }
    }
    if boundaries.last().map(|last| last.0) != Some(duration_tl) {
        boundaries.push((duration_tl, Disposition::Keep));
    }

    boundaries
        .windows(2)
        .filter(|pair| pair[1].0 > pair[0].0)
        .enumerate()
        .map(|(position, pair)| Segment {
            index: position + 1,
            start_tl: pair[0].0,
            end_tl: pair[1].0,
            disposition: pair[0].1,
        })
        .collect()
}
