use std::path::{Path, PathBuf};
use std::time::Duration;

use media_ffmpeg::{MediaTools, StreamCopyExit, StreamCopyRequest, run_stream_copy};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::executor::CancelToken;
use crate::time::seconds_to_ticks;

/// How often a running stream copy checks its cancel token by default.
pub const DEFAULT_COPY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Result of probing the source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedVideo {
    pub path: PathBuf,
    pub duration_tl: i64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// How one stream copy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyExit {
    /// The tool exited by itself. `exit_code` is `None` when a signal ended it.
    Finished {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The tool was stopped because the cancel token fired.
    Cancelled { stderr: String },
}

/// Media operations required by the engine.
///
/// Implementations are shared by the batch worker threads.
pub trait MediaBackend: Send + Sync {
    /// Reads the duration of an MP4-family file.
    fn probe(&self, path: &Path) -> Result<ProbedVideo>;

    /// Extracts one sub-range without re-encoding, blocking until the tool exits.
    ///
    /// Must stop the tool and return [`CopyExit::Cancelled`] once `cancel` fires.
    fn stream_copy(&self, request: &StreamCopyRequest, cancel: &CancelToken) -> Result<CopyExit>;
}

/// FFmpeg CLI-backed backend used by production wiring.
#[derive(Debug, Clone)]
pub struct FfmpegMediaBackend {
    tools: MediaTools,
    poll_interval: Duration,
}

impl Default for FfmpegMediaBackend {
    fn default() -> Self {
        Self::new(MediaTools::default())
    }
}

impl FfmpegMediaBackend {
    pub fn new(tools: MediaTools) -> Self {
        Self {
            tools,
            poll_interval: DEFAULT_COPY_POLL_INTERVAL,
        }
    }
}

impl MediaBackend for FfmpegMediaBackend {
    fn probe(&self, path: &Path) -> Result<ProbedVideo> {
        let probe_error = |reason: String| EngineError::Probe {
            path: path.to_path_buf(),
            reason,
        };

        let info = media_ffmpeg::probe_media(&self.tools, path)
            .map_err(|error| probe_error(error.to_string()))?;
        if !info.is_mp4_family() {
            return Err(probe_error(format!(
                "unsupported container {}",
                info.format_name.as_deref().unwrap_or("unknown")
            )));
        }
        let seconds = info
            .require_duration()
            .map_err(|error| probe_error(error.to_string()))?;
        let duration_tl = seconds_to_ticks(seconds)
            .filter(|ticks| *ticks > 0)
            .ok_or_else(|| probe_error(format!("invalid duration {seconds}")))?;

        debug!(
            path = ?path,
            duration_tl,
            format = ?info.format_name,
            stream_count = info.streams.len(),
            "source video probed"
        );
        Ok(ProbedVideo {
            path: info.path.clone(),
            duration_tl,
            has_video: info.first_video().is_some(),
            has_audio: info.first_audio().is_some(),
        })
    }

    fn stream_copy(&self, request: &StreamCopyRequest, cancel: &CancelToken) -> Result<CopyExit> {
        let exit = run_stream_copy(&self.tools, request, self.poll_interval, || {
            cancel.is_cancelled()
        })?;
        Ok(match exit {
            StreamCopyExit::Exited { status, stderr } => CopyExit::Finished {
                exit_code: status.code(),
                stderr,
            },
            StreamCopyExit::Terminated { stderr } => CopyExit::Cancelled { stderr },
        })
    }
}
