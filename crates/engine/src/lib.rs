//! UI-agnostic core of the lossless MP4 splitter.

pub mod api;
pub mod batch;
pub mod bridge;
pub mod config;
pub mod cut_points;
pub mod error;
pub mod executor;
pub mod media;
pub mod naming;
pub mod project;
pub mod quick_cut;
pub mod segments;
pub mod time;

#[cfg(test)]
mod test_support;

pub use api::{Command, Engine, EngineErrorEvent, EngineErrorKind, Event, ProjectSnapshot};
pub use batch::{
    BatchCoordinator, BatchEvent, BatchFailure, BatchHandle, BatchProgress, BatchReport,
    BatchRequest, BatchState, SplitScope, SplitTask, TaskState,
};
pub use config::EngineConfig;
pub use cut_points::{CutPoint, CutPointStore, Disposition, ToggleTarget};
pub use error::{EngineError, Result};
pub use executor::{CancelToken, SplitFailure, SplitOutcome, execute_split};
pub use media::{CopyExit, FfmpegMediaBackend, MediaBackend, ProbedVideo};
pub use naming::{ConflictPolicy, PathConflict, resolve_file_name};
pub use project::Project;
pub use segments::{Segment, derive_segments};
pub use time::{TICKS_PER_SECOND, format_clock, seconds_to_ticks, ticks_to_seconds};
