use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use media_ffmpeg::StreamCopyRequest;
use tracing::{debug, info, warn};

use crate::media::{CopyExit, MediaBackend};
use crate::segments::Segment;

/// Number of trailing stderr lines kept on a failed split.
pub const STDERR_TAIL_LINES: usize = 8;

/// Shared cooperative cancellation flag.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Why one segment could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitFailure {
    /// The tool exited unsuccessfully.
    ExternalTool {
        exit_code: Option<i32>,
        stderr_tail: String,
    },
    /// The tool reported success but the output is missing or empty.
    EmptyOutput { path: PathBuf },
    /// The output path names the source video.
    OutputIsSource { path: PathBuf },
    /// The tool could not be run.
    NotStarted { reason: String },
}

impl Display for SplitFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternalTool {
                exit_code: Some(code),
                stderr_tail,
            } => write!(f, "ffmpeg exited with code {code}: {stderr_tail}"),
            Self::ExternalTool {
                exit_code: None,
                stderr_tail,
            } => write!(f, "ffmpeg terminated by signal: {stderr_tail}"),
            Self::EmptyOutput { path } => {
                write!(f, "ffmpeg produced no output at {}", path.display())
            }
            Self::OutputIsSource { path } => {
                write!(f, "output would replace the source video: {}", path.display())
            }
            Self::NotStarted { reason } => write!(f, "split not started: {reason}"),
        }
    }
}

/// Terminal result of one segment extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    Succeeded { output_path: PathBuf, bytes: u64 },
    Failed(SplitFailure),
    Cancelled,
}

/// Extracts `segment` of `source` into `output_path` by stream copy.
///
/// Blocks until the tool exits. Success requires a zero exit code and a
/// non-empty output file. On cancellation or failure the partial output is
/// removed unless it predates this call and `overwrite` is off. The source file is
/// never written: an output path naming the source is rejected up front.
pub fn execute_split<M>(
    media: &M,
    source: &Path,
    segment: &Segment,
    output_path: &Path,
    overwrite: bool,
    cancel: &CancelToken,
) -> SplitOutcome
where
    M: MediaBackend + ?Sized,
{
    if cancel.is_cancelled() {
        debug!(segment_index = segment.index, "split skipped: cancelled before start");
        return SplitOutcome::Cancelled;
    }
    if is_same_file(source, output_path) {
        warn!(segment_index = segment.index, path = ?output_path, "split rejected: output is the source");
        return SplitOutcome::Failed(SplitFailure::OutputIsSource {
            path: output_path.to_path_buf(),
        });
    }

    let request = StreamCopyRequest {
        input: source.to_path_buf(),
        start_seconds: segment.start_seconds(),
        duration_seconds: segment.duration_seconds(),
        output_path: output_path.to_path_buf(),
        overwrite,
    };
    let owns_output = overwrite || !output_path.exists();

    info!(
        segment_index = segment.index,
        start_tl = segment.start_tl,
        end_tl = segment.end_tl,
        output = ?output_path,
        "split started"
    );
    let exit = match media.stream_copy(&request, cancel) {
        Ok(exit) => exit,
        Err(error) => {
            warn!(segment_index = segment.index, %error, "split could not run");
            return SplitOutcome::Failed(SplitFailure::NotStarted {
                reason: error.to_string(),
            });
        }
    };

    match exit {
        CopyExit::Cancelled { .. } => {
            if owns_output {
                remove_partial_output(output_path);
            }
            info!(segment_index = segment.index, "split cancelled");
            SplitOutcome::Cancelled
        }
        CopyExit::Finished {
            exit_code: Some(0), ..
        } => match fs::metadata(output_path) {
            Ok(metadata) if metadata.len() > 0 => {
                info!(segment_index = segment.index, bytes = metadata.len(), "split finished");
                SplitOutcome::Succeeded {
                    output_path: output_path.to_path_buf(),
                    bytes: metadata.len(),
                }
            }
            _ => {
                if owns_output {
                    remove_partial_output(output_path);
                }
                warn!(segment_index = segment.index, "split produced empty output");
                SplitOutcome::Failed(SplitFailure::EmptyOutput {
                    path: output_path.to_path_buf(),
                })
            }
        },
        CopyExit::Finished { exit_code, stderr } => {
            // ffmpeg may have written a header before failing.
            if owns_output {
                remove_partial_output(output_path);
            }
            warn!(segment_index = segment.index, ?exit_code, "split failed");
            SplitOutcome::Failed(SplitFailure::ExternalTool {
                exit_code,
                stderr_tail: stderr_tail(&stderr, STDERR_TAIL_LINES),
            })
        }
    }
}

/// Returns the last `max_lines` non-blank lines of `stderr`.
pub fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

fn is_same_file(source: &Path, output: &Path) -> bool {
    if source == output {
        return true;
    }
    match (fs::canonicalize(source), fs::canonicalize(output)) {
        (Ok(source), Ok(output)) => source == output,
        _ => false,
    }
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = ?path, "partial output removed"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(path = ?path, %error, "could not remove partial output"),
    }
}
