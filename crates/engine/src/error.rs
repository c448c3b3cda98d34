use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands, cut-point operations and batch splits.
#[derive(Debug)]
pub enum EngineError {
    InvalidTimestamp {
        at_tl: i64,
        reason: &'static str,
    },
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    NotFound,
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    PathConflict {
        path: PathBuf,
    },
    Probe {
        path: PathBuf,
        reason: String,
    },
    ExternalTool {
        exit_code: Option<i32>,
        stderr_tail: String,
    },
    Cancelled,
    ProjectNotLoaded,
    BatchAlreadyRunning,
    NoActiveBatch,
    MissingSourceVideo(PathBuf),
    ProjectIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    ProjectSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidProjectFile {
        reason: String,
    },
    ConfigIo {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigSerialization {
        path: PathBuf,
        source: serde_json::Error,
    },
    Media(media_ffmpeg::MediaFfmpegError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimestamp { at_tl, reason } => {
                write!(f, "invalid cut point timestamp {at_tl}: {reason}")
            }
            Self::InvalidParameter {
                name,
                value,
                reason,
            } => write!(f, "invalid {name} {value}: {reason}"),
            Self::NotFound => write!(f, "no cut point to update"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} is out of range for {len} items")
            }
            Self::PathConflict { path } => {
                write!(f, "output file already exists: {}", path.display())
            }
            Self::Probe { path, reason } => {
                write!(f, "cannot probe {}: {reason}", path.display())
            }
            Self::ExternalTool {
                exit_code,
                stderr_tail,
            } => match exit_code {
                Some(code) => write!(f, "ffmpeg exited with code {code}: {}", stderr_tail.trim()),
                None => write!(f, "ffmpeg did not exit normally: {}", stderr_tail.trim()),
            },
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::ProjectNotLoaded => write!(f, "project is not loaded"),
            Self::BatchAlreadyRunning => write!(f, "a split batch is already running"),
            Self::NoActiveBatch => write!(f, "no split batch is running"),
            Self::MissingSourceVideo(path) => {
                write!(f, "source video not found: {}", path.display())
            }
            Self::ProjectIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::ProjectSerialization { path, source } => {
                write!(
                    f,
                    "project serialization/deserialization failed at {} ({source})",
                    path.display()
                )
            }
            Self::InvalidProjectFile { reason } => write!(f, "invalid project file: {reason}"),
            Self::ConfigIo {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::ConfigSerialization { path, source } => {
                write!(
                    f,
                    "engine config serialization/deserialization failed at {} ({source})",
                    path.display()
                )
            }
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProjectIo { source, .. } => Some(source),
            Self::ProjectSerialization { source, .. } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigSerialization { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}
