use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use media_ffmpeg::StreamCopyRequest;

use crate::error::{EngineError, Result};
use crate::executor::CancelToken;
use crate::media::{CopyExit, MediaBackend, ProbedVideo};
use crate::time::seconds_to_ticks;

/// Scripted response of [`MockBackend`] for a segment starting at a given tick.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    SucceedEmpty,
    Fail { exit_code: i32, stderr: String },
    /// Leaves `written` at the output path, then exits with `exit_code`.
    FailAfterWriting { exit_code: i32, written: Vec<u8> },
    RunUntilCancelled,
    /// Writes the output, reports on `reached`, then waits for `release`.
    Gated {
        reached: Sender<()>,
        release: Arc<Mutex<Receiver<()>>>,
    },
}

/// In-memory backend that writes small files instead of running ffmpeg.
#[derive(Debug, Clone)]
pub struct MockBackend {
    duration_tl: i64,
    probe_failure: Option<String>,
    behaviors: HashMap<i64, MockBehavior>,
    probe_calls: Arc<Mutex<Vec<PathBuf>>>,
    copy_calls: Arc<Mutex<Vec<StreamCopyRequest>>>,
}

impl MockBackend {
    pub fn new(duration_tl: i64) -> Self {
        Self {
            duration_tl,
            probe_failure: None,
            behaviors: HashMap::new(),
            probe_calls: Arc::new(Mutex::new(Vec::new())),
            copy_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_behavior(mut self, start_tl: i64, behavior: MockBehavior) -> Self {
        self.behaviors.insert(start_tl, behavior);
        self
    }

    pub fn with_probe_failure(mut self, reason: &str) -> Self {
        self.probe_failure = Some(reason.to_string());
        self
    }

    pub fn probe_calls(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.probe_calls)
    }

    pub fn copy_calls(&self) -> Arc<Mutex<Vec<StreamCopyRequest>>> {
        Arc::clone(&self.copy_calls)
    }
}

impl MediaBackend for MockBackend {
    fn probe(&self, path: &Path) -> Result<ProbedVideo> {
        self.probe_calls
            .lock()
            .expect("lock probe calls")
            .push(path.to_path_buf());
        if let Some(reason) = &self.probe_failure {
            return Err(EngineError::Probe {
                path: path.to_path_buf(),
                reason: reason.clone(),
            });
        }
        Ok(ProbedVideo {
            path: path.to_path_buf(),
            duration_tl: self.duration_tl,
            has_video: true,
            has_audio: true,
        })
    }

    fn stream_copy(&self, request: &StreamCopyRequest, cancel: &CancelToken) -> Result<CopyExit> {
        self.copy_calls
            .lock()
            .expect("lock copy calls")
            .push(request.clone());

        if !request.overwrite && request.output_path.exists() {
            return Ok(CopyExit::Finished {
                exit_code: Some(1),
                stderr: "File already exists. Exiting.".to_string(),
            });
        }

        let start_tl = seconds_to_ticks(request.start_seconds).expect("finite start");
        let behavior = self
            .behaviors
            .get(&start_tl)
            .cloned()
            .unwrap_or(MockBehavior::Succeed);
        match behavior {
            MockBehavior::Succeed => {
                fs::write(&request.output_path, b"mock segment").expect("write mock output");
                Ok(success())
            }
            MockBehavior::SucceedEmpty => {
                fs::write(&request.output_path, b"").expect("write empty output");
                Ok(success())
            }
            MockBehavior::Fail { exit_code, stderr } => Ok(CopyExit::Finished {
                exit_code: Some(exit_code),
                stderr,
            }),
            MockBehavior::FailAfterWriting { exit_code, written } => {
                fs::write(&request.output_path, written).expect("write truncated output");
                Ok(CopyExit::Finished {
                    exit_code: Some(exit_code),
                    stderr: "moov atom not found".to_string(),
                })
            }
            MockBehavior::RunUntilCancelled => {
                fs::write(&request.output_path, b"partial").expect("write partial output");
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(CopyExit::Cancelled {
                    stderr: String::new(),
                })
            }
            MockBehavior::Gated { reached, release } => {
                fs::write(&request.output_path, b"mock segment").expect("write mock output");
                reached.send(()).expect("signal gate reached");
                release
                    .lock()
                    .expect("lock gate")
                    .recv_timeout(Duration::from_secs(5))
                    .expect("gate released");
                Ok(success())
            }
        }
    }
}

fn success() -> CopyExit {
    CopyExit::Finished {
        exit_code: Some(0),
        stderr: String::new(),
    }
}
