use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::time::format_clock;

/// Default duplicate-suppression window: one millisecond.
pub const DEFAULT_DUPLICATE_EPSILON_TL: i64 = 1_000;

/// Whether a segment is written out or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Keep,
    Discard,
}

impl Disposition {
    /// Returns the opposite disposition.
    pub fn toggled(self) -> Self {
        match self {
            Self::Keep => Self::Discard,
            Self::Discard => Self::Keep,
        }
    }

    pub fn is_keep(self) -> bool {
        self == Self::Keep
    }
}

/// Which cut point `toggle_last` flips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleTarget {
    /// The cut point with the greatest timestamp.
    #[default]
    LatestTimestamp,
    /// The cut point added most recently, wherever it sits on the timeline.
    MostRecentlyInserted,
}

/// A user-placed boundary on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPoint {
    pub at_tl: i64,
    pub disposition: Disposition,
}

impl CutPoint {
    pub fn new(at_tl: i64, disposition: Disposition) -> Self {
        Self { at_tl, disposition }
    }

    pub fn keep(at_tl: i64) -> Self {
        Self::new(at_tl, Disposition::Keep)
    }

    pub fn discard(at_tl: i64) -> Self {
        Self::new(at_tl, Disposition::Discard)
    }
}

impl std::fmt::Display for CutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.disposition {
            Disposition::Keep => "KEEP",
            Disposition::Discard => "DISCARD",
        };
        write!(f, "{} [{label}]", format_clock(self.at_tl))
    }
}

/// Ordered set of cut points for one loaded video.
///
/// Cut points stay strictly increasing by timestamp and no two are closer
/// than the duplicate epsilon. Rejected operations leave the store untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutPointStore {
    duration_tl: i64,
    epsilon_tl: i64,
    toggle_target: ToggleTarget,
    points: Vec<CutPoint>,
    // Timestamps in insertion order, oldest first.
    history: Vec<i64>,
}

impl CutPointStore {
    /// Creates an empty store for a video of `duration_tl` ticks.
    ///
    /// # Example
    /// ```
    /// use splitter_engine::{CutPointStore, Disposition};
    ///
    /// let mut store = CutPointStore::new(60_000_000);
    /// store.add(10_000_000, Disposition::Keep).expect("inside the video");
    /// assert_eq!(store.len(), 1);
    /// ```
    pub fn new(duration_tl: i64) -> Self {
        Self {
            duration_tl: duration_tl.max(0),
            epsilon_tl: DEFAULT_DUPLICATE_EPSILON_TL,
            toggle_target: ToggleTarget::default(),
            points: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_epsilon_tl(mut self, epsilon_tl: i64) -> Self {
        self.epsilon_tl = epsilon_tl.max(0);
        self
    }

    pub fn with_toggle_target(mut self, toggle_target: ToggleTarget) -> Self {
        self.toggle_target = toggle_target;
        self
    }

    pub fn duration_tl(&self) -> i64 {
        self.duration_tl
    }

    /// Minimum distance in ticks between two cut points, exclusive.
    pub fn epsilon_tl(&self) -> i64 {
        self.epsilon_tl
    }

    pub fn toggle_target(&self) -> ToggleTarget {
        self.toggle_target
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Read-only view of all cut points in timestamp order.
    pub fn list_all(&self) -> &[CutPoint] {
        &self.points
    }

    /// Inserts a cut point and returns its index in timestamp order.
    ///
    /// Fails with `InvalidTimestamp` outside `[0, duration]` or within the
    /// duplicate epsilon of an existing cut point.
    pub fn add(&mut self, at_tl: i64, disposition: Disposition) -> Result<usize> {
        self.check_in_range(at_tl)?;
        let index = self.points.partition_point(|point| point.at_tl < at_tl);
        if self.is_near_neighbor(index, at_tl) {
            warn!(at_tl, "cut point rejected: duplicate");
            return Err(EngineError::InvalidTimestamp {
                at_tl,
                reason: "a cut point already exists at this position",
            });
        }

        self.points.insert(index, CutPoint::new(at_tl, disposition));
        self.history.push(at_tl);
        debug!(at_tl, index, ?disposition, count = self.points.len(), "cut point added");
        Ok(index)
    }

    /// Flips the disposition of the configured "last" cut point.
    ///
    /// Returns the index of the flipped cut point and its new disposition.
    pub fn toggle_last(&mut self) -> Result<(usize, Disposition)> {
        let index = match self.toggle_target {
            ToggleTarget::LatestTimestamp => self.points.len().checked_sub(1),
            ToggleTarget::MostRecentlyInserted => self
                .history
                .last()
                .and_then(|at_tl| self.position_of(*at_tl)),
        }
        .ok_or(EngineError::NotFound)?;

        let disposition = self.toggle_at(index)?;
        Ok((index, disposition))
    }

    /// Flips the disposition of the cut point at `index`.
    pub fn toggle_at(&mut self, index: usize) -> Result<Disposition> {
        let len = self.points.len();
        let point = self
            .points
            .get_mut(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;
        point.disposition = point.disposition.toggled();
        debug!(index, at_tl = point.at_tl, disposition = ?point.disposition, "cut point toggled");
        Ok(point.disposition)
    }

    /// Sets the disposition of the cut point at `index`.
    pub fn set_disposition(&mut self, index: usize, disposition: Disposition) -> Result<()> {
        let len = self.points.len();
        let point = self
            .points
            .get_mut(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;
        point.disposition = disposition;
        Ok(())
    }

    /// Removes and returns the cut point at `index`.
    pub fn remove(&mut self, index: usize) -> Result<CutPoint> {
        if index >= self.points.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: self.points.len(),
            });
        }
        let removed = self.points.remove(index);
        self.history.retain(|at_tl| *at_tl != removed.at_tl);
        debug!(index, at_tl = removed.at_tl, count = self.points.len(), "cut point removed");
        Ok(removed)
    }

    /// Replaces every cut point at once.
    ///
    /// The input may be unsorted. All points are validated before anything
    /// changes, so a rejected set leaves the previous cut points in place.
    pub fn replace_all(&mut self, points: impl IntoIterator<Item = CutPoint>) -> Result<()> {
        let mut sorted: Vec<CutPoint> = points.into_iter().collect();
        sorted.sort_by_key(|point| point.at_tl);

        for point in &sorted {
            self.check_in_range(point.at_tl)?;
        }
        for pair in sorted.windows(2) {
            if pair[1].at_tl - pair[0].at_tl <= self.epsilon_tl {
                return Err(EngineError::InvalidTimestamp {
                    at_tl: pair[1].at_tl,
                    reason: "a cut point already exists at this position",
                });
            }
        }

        self.history = sorted.iter().map(|point| point.at_tl).collect();
        self.points = sorted;
        debug!(count = self.points.len(), "cut points replaced");
        Ok(())
    }

    /// Returns the index of the cut point exactly at `at_tl`.
    pub fn position_of(&self, at_tl: i64) -> Option<usize> {
        self.points
            .binary_search_by_key(&at_tl, |point| point.at_tl)
            .ok()
    }

    fn check_in_range(&self, at_tl: i64) -> Result<()> {
        if at_tl < 0 {
            warn!(at_tl, "cut point rejected: negative timestamp");
            return Err(EngineError::InvalidTimestamp {
                at_tl,
                reason: "timestamp is negative",
            });
        }
        if at_tl > self.duration_tl {
            warn!(at_tl, duration_tl = self.duration_tl, "cut point rejected: past the end");
            return Err(EngineError::InvalidTimestamp {
                at_tl,
                reason: "timestamp is past the end of the video",
            });
        }
        Ok(())
    }

    fn is_near_neighbor(&self, index: usize, at_tl: i64) -> bool {
        let before = index
            .checked_sub(1)
            .and_then(|previous| self.points.get(previous));
        let after = self.points.get(index);
        [before, after]
            .into_iter()
            .flatten()
            .any(|point| (point.at_tl - at_tl).abs() <= self.epsilon_tl)
    }
}
