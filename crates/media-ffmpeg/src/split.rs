use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{ChildStderr, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{MediaFfmpegError, Result};
use crate::tools::MediaTools;

/// Request payload for one lossless sub-range extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCopyRequest {
    pub input: PathBuf,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub output_path: PathBuf,
    /// Replace an existing file at `output_path` instead of failing.
    pub overwrite: bool,
}

/// How a stream-copy process ended.
#[derive(Debug)]
pub enum StreamCopyExit {
    /// The process exited on its own with `status`.
    Exited { status: ExitStatus, stderr: String },
    /// The process was killed because the caller asked it to stop.
    Terminated { stderr: String },
}

/// Runs `ffmpeg` in stream-copy mode for one sub-range and blocks until it exits.
///
/// `should_stop` is polled every `poll_interval` while the process runs. When
/// it returns `true` the child is killed and [`StreamCopyExit::Terminated`]
/// is returned. A non-zero exit is reported as [`StreamCopyExit::Exited`], not
/// as an error, so callers can keep the exit code and stderr.
///
/// # Example
/// ```no_run
/// use std::path::PathBuf;
/// use std::time::Duration;
/// use media_ffmpeg::{MediaTools, StreamCopyExit, StreamCopyRequest, run_stream_copy};
///
/// let request = StreamCopyRequest {
///     input: PathBuf::from("movie.mp4"),
///     start_seconds: 5.0,
///     duration_seconds: 7.5,
///     output_path: PathBuf::from("movie_segment_2.mp4"),
///     overwrite: false,
/// };
/// let exit = run_stream_copy(&MediaTools::default(), &request, Duration::from_millis(20), || false)
///     .expect("ffmpeg should start");
/// assert!(matches!(exit, StreamCopyExit::Exited { .. }));
/// ```
pub fn run_stream_copy<F>(
    tools: &MediaTools,
    request: &StreamCopyRequest,
    poll_interval: Duration,
    mut should_stop: F,
) -> Result<StreamCopyExit>
where
    F: FnMut() -> bool,
{
    validate_request(request)?;

    let mut child = tools
        .ffmpeg_command()
        .args(stream_copy_args(request))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| MediaFfmpegError::Io {
            context: "spawn ffmpeg stream copy",
            source,
        })?;
    let mut stderr_reader = child.stderr.take().map(spawn_stderr_reader);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(StreamCopyExit::Exited {
                    status,
                    stderr: collect_stderr(&mut stderr_reader),
                });
            }
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaFfmpegError::Io {
                    context: "wait for ffmpeg stream copy",
                    source,
                });
            }
        }

        if should_stop() {
            // The child may have exited between the poll and the kill.
            let _ = child.kill();
            child.wait().map_err(|source| MediaFfmpegError::Io {
                context: "reap terminated ffmpeg stream copy",
                source,
            })?;
            return Ok(StreamCopyExit::Terminated {
                stderr: collect_stderr(&mut stderr_reader),
            });
        }

        thread::sleep(poll_interval);
    }
}

/// Builds the `ffmpeg` argument list for one stream-copy extraction.
///
/// All streams are mapped and copied; timestamps are shifted so the output
/// starts at zero.
pub fn stream_copy_args(request: &StreamCopyRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-v".into(),
        "error".into(),
        "-nostdin".into(),
        OsString::from(if request.overwrite { "-y" } else { "-n" }),
        "-i".into(),
        request.input.clone().into_os_string(),
        "-ss".into(),
        format_seconds(request.start_seconds).into(),
        "-t".into(),
        format_seconds(request.duration_seconds).into(),
    ];
    args.extend(
        [
            "-map",
            "0",
            "-c",
            "copy",
            "-avoid_negative_ts",
            "make_zero",
        ]
        .map(OsString::from),
    );
    args.push(request.output_path.clone().into_os_string());
    args
}

fn validate_request(request: &StreamCopyRequest) -> Result<()> {
    if !request.start_seconds.is_finite() || request.start_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidStreamCopyRequest {
            reason: "start offset must be a non-negative number of seconds",
        });
    }
    if !request.duration_seconds.is_finite() || request.duration_seconds <= 0.0 {
        return Err(MediaFfmpegError::InvalidStreamCopyRequest {
            reason: "duration must be a positive number of seconds",
        });
    }
    if request.input == request.output_path {
        return Err(MediaFfmpegError::InvalidStreamCopyRequest {
            reason: "output path must differ from the input path",
        });
    }
    Ok(())
}

fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.6}")
}

fn spawn_stderr_reader(mut stderr: ChildStderr) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stderr.read_to_end(&mut buffer);
        buffer
    })
}

fn collect_stderr(reader: &mut Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .take()
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
