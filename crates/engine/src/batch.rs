use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cut_points::Disposition;
use crate::error::{EngineError, Result};
use crate::executor::{CancelToken, SplitFailure, SplitOutcome, execute_split};
use crate::media::MediaBackend;
use crate::naming::{ConflictPolicy, PathConflict, plan_output_paths};
use crate::segments::Segment;

/// Upper bound for the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// Which segments a batch writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitScope {
    #[default]
    KeepOnly,
    KeepAndDiscard,
}

impl SplitScope {
    pub fn includes(self, disposition: Disposition) -> bool {
        match self {
            Self::KeepOnly => disposition.is_keep(),
            Self::KeepAndDiscard => true,
        }
    }
}

/// Input of [`BatchCoordinator::start_batch`].
///
/// `segments` is a snapshot; later cut-point edits do not reach a running batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub segments: Vec<Segment>,
    pub scope: SplitScope,
    pub conflict_policy: ConflictPolicy,
}

/// Lifecycle of one segment inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed(SplitFailure),
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }
}

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitTask {
    pub segment: Segment,
    pub output_path: PathBuf,
    pub overwrite: bool,
    pub state: TaskState,
}

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    CompletedWithFailures,
    Cancelled,
}

/// Aggregate counters, sent after every terminal task transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchProgress {
    /// Completion in percent; an empty batch counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.done * 100) / self.total) as u8
    }
}

/// A segment that did not produce its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub segment_index: usize,
    pub output_path: PathBuf,
    pub failure: SplitFailure,
}

impl From<&BatchFailure> for EngineError {
    fn from(value: &BatchFailure) -> Self {
        match &value.failure {
            SplitFailure::ExternalTool {
                exit_code,
                stderr_tail,
            } => EngineError::ExternalTool {
                exit_code: *exit_code,
                stderr_tail: stderr_tail.clone(),
            },
            SplitFailure::EmptyOutput { .. } => EngineError::ExternalTool {
                exit_code: Some(0),
                stderr_tail: value.failure.to_string(),
            },
            SplitFailure::NotStarted { reason } => EngineError::ExternalTool {
                exit_code: None,
                stderr_tail: reason.clone(),
            },
            SplitFailure::OutputIsSource { path } => EngineError::PathConflict { path: path.clone() },
        }
    }
}

/// Final result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub state: BatchState,
    pub progress: BatchProgress,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
    pub conflicts: Vec<PathConflict>,
}

/// Events emitted by a running batch.
///
/// For one segment the order is `Pending`, `Running`, then one terminal
/// state. A cancelled segment that never started goes from `Pending` to
/// `Cancelled`. `Finished` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Task {
        segment_index: usize,
        state: TaskState,
    },
    Progress(BatchProgress),
    Finished(BatchReport),
}

/// Fans segment splits out to a bounded worker pool.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    worker_count: usize,
    state: Arc<Mutex<BatchState>>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(default_worker_count())
    }
}

impl BatchCoordinator {
    /// Creates a coordinator running at most `worker_count` splits at once.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            state: Arc::new(Mutex::new(BatchState::Idle)),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> BatchState {
        *lock(&self.state)
    }

    /// Starts splitting the selected segments in the background.
    ///
    /// Fails with `BatchAlreadyRunning` while a previous batch is running.
    /// Output collisions are settled by `request.conflict_policy` and reported
    /// on the handle, never as an error.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use std::sync::Arc;
    /// use splitter_engine::{
    ///     BatchCoordinator, BatchRequest, ConflictPolicy, FfmpegMediaBackend, SplitScope,
    ///     derive_segments,
    /// };
    ///
    /// let coordinator = BatchCoordinator::new(2);
    /// let handle = coordinator
    ///     .start_batch(
    ///         Arc::new(FfmpegMediaBackend::default()),
    ///         BatchRequest {
    ///             source: PathBuf::from("movie.mp4"),
    ///             output_dir: PathBuf::from("out"),
    ///             segments: derive_segments(&[], 60_000_000),
    ///             scope: SplitScope::KeepOnly,
    ///             conflict_policy: ConflictPolicy::Skip,
    ///         },
    ///     )
    ///     .expect("no batch is running");
    /// let report = handle.wait().expect("batch report");
    /// println!("{:?}", report.state);
    /// ```
    pub fn start_batch<M>(&self, media: Arc<M>, request: BatchRequest) -> Result<BatchHandle>
    where
        M: MediaBackend + 'static,
    {
        {
            let mut state = lock(&self.state);
            if *state == BatchState::Running {
                warn!("batch rejected: another batch is running");
                return Err(EngineError::BatchAlreadyRunning);
            }
            *state = BatchState::Running;
        }

        let selected: Vec<Segment> = request
            .segments
            .iter()
            .copied()
            .filter(|segment| request.scope.includes(segment.disposition))
            .collect();
        let plan = plan_output_paths(
            &request.output_dir,
            &request.source,
            &selected,
            request.conflict_policy,
            Path::exists,
        );
        let tasks: Vec<SplitTask> = plan
            .outputs
            .into_iter()
            .map(|output| SplitTask {
                segment: output.segment,
                output_path: output.path,
                overwrite: output.overwrite,
                state: TaskState::Pending,
            })
            .collect();

        info!(
            source = ?request.source,
            output_dir = ?request.output_dir,
            scope = ?request.scope,
            selected = selected.len(),
            tasks = tasks.len(),
            conflicts = plan.conflicts.len(),
            workers = self.worker_count,
            "batch started"
        );

        let (event_tx, event_rx) = mpsc::channel::<BatchEvent>();
        for task in &tasks {
            let _ = event_tx.send(BatchEvent::Task {
                segment_index: task.segment.index,
                state: TaskState::Pending,
            });
        }
        let _ = event_tx.send(BatchEvent::Progress(BatchProgress {
            total: tasks.len(),
            ..BatchProgress::default()
        }));

        let cancel = CancelToken::new();
        let supervisor = Supervisor {
            tasks: tasks.clone(),
            conflicts: plan.conflicts.clone(),
            state: Arc::clone(&self.state),
            events: event_tx,
        };

        let supervisor = if tasks.is_empty() {
            supervisor.finish(BatchProgress::default());
            None
        } else {
            let worker_count = self.worker_count.min(tasks.len());
            let (update_tx, update_rx) = mpsc::channel::<TaskUpdate>();
            let queue: Arc<Mutex<VecDeque<(usize, SplitTask)>>> =
                Arc::new(Mutex::new(tasks.iter().cloned().enumerate().collect()));
            let workers: Vec<JoinHandle<()>> = (0..worker_count)
                .map(|worker_id| {
                    let worker = Worker {
                        id: worker_id,
                        media: Arc::clone(&media),
                        source: request.source.clone(),
                        queue: Arc::clone(&queue),
                        cancel: cancel.clone(),
                        updates: update_tx.clone(),
                    };
                    thread::spawn(move || worker.run())
                })
                .collect();
            drop(update_tx);

            Some(thread::spawn(move || supervisor.run(update_rx, workers)))
        };

        Ok(BatchHandle {
            events: event_rx,
            cancel,
            state: Arc::clone(&self.state),
            tasks,
            conflicts: plan.conflicts,
            supervisor,
        })
    }
}

/// Caller's view of a running batch.
#[derive(Debug)]
pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    cancel: CancelToken,
    state: Arc<Mutex<BatchState>>,
    tasks: Vec<SplitTask>,
    conflicts: Vec<PathConflict>,
    supervisor: Option<JoinHandle<()>>,
}

impl BatchHandle {
    /// Requests cooperative cancellation.
    ///
    /// Unstarted tasks finish as `Cancelled` without running and running
    /// tools are stopped. Outputs that already succeeded are kept.
    pub fn cancel(&self) {
        info!("batch cancel requested");
        self.cancel.cancel();
    }

    pub fn state(&self) -> BatchState {
        *lock(&self.state)
    }

    /// Tasks as created at start, all `Pending`.
    pub fn tasks(&self) -> &[SplitTask] {
        &self.tasks
    }

    pub fn conflicts(&self) -> &[PathConflict] {
        &self.conflicts
    }

    /// Returns the next event without blocking.
    pub fn try_next_event(&self) -> Option<BatchEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks for the next event; `None` once the batch has sent everything.
    pub fn next_event(&self) -> Option<BatchEvent> {
        self.events.recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<BatchEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocks until the batch finishes and returns its report.
    ///
    /// Events not yet consumed are dropped. Returns `Cancelled` if the batch
    /// stopped without producing a report.
    pub fn wait(mut self) -> Result<BatchReport> {
        let mut report = None;
        while let Ok(event) = self.events.recv() {
            if let BatchEvent::Finished(finished) = event {
                report = Some(finished);
                break;
            }
        }
        self.join();
        report.ok_or(EngineError::Cancelled)
    }

    /// Joins the supervisor thread once the `Finished` event was observed.
    pub(crate) fn join(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            if supervisor.join().is_err() {
                warn!("batch supervisor panicked");
            }
        }
    }
}

impl Drop for BatchHandle {
    /// A handle dropped while its batch still runs cancels the batch.
    fn drop(&mut self) {
        if self.supervisor.is_some() && self.state() == BatchState::Running {
            warn!("batch handle dropped while running, cancelling");
            self.cancel.cancel();
        }
    }
}

/// Available parallelism clamped to `1..=MAX_DEFAULT_WORKERS`.
pub(crate) fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_WORKERS)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct TaskUpdate {
    position: usize,
    state: TaskState,
}

struct Worker<M> {
    id: usize,
    media: Arc<M>,
    source: PathBuf,
    queue: Arc<Mutex<VecDeque<(usize, SplitTask)>>>,
    cancel: CancelToken,
    updates: Sender<TaskUpdate>,
}

impl<M> Worker<M>
where
    M: MediaBackend,
{
    fn run(self) {
        loop {
            let Some((position, task)) = lock(&self.queue).pop_front() else {
                debug!(worker = self.id, "worker idle, queue drained");
                return;
            };

            if self.cancel.is_cancelled() {
                if !self.send(position, TaskState::Cancelled) {
                    return;
                }
                continue;
            }

            if !self.send(position, TaskState::Running) {
                return;
            }
            let outcome = execute_split(
                self.media.as_ref(),
                &self.source,
                &task.segment,
                &task.output_path,
                task.overwrite,
                &self.cancel,
            );
            let state = match outcome {
                SplitOutcome::Succeeded { .. } => TaskState::Succeeded,
                SplitOutcome::Failed(failure) => TaskState::Failed(failure),
                SplitOutcome::Cancelled => TaskState::Cancelled,
            };
            if !self.send(position, state) {
                return;
            }
        }
    }

    fn send(&self, position: usize, state: TaskState) -> bool {
        self.updates.send(TaskUpdate { position, state }).is_ok()
    }
}

struct Supervisor {
    tasks: Vec<SplitTask>,
    conflicts: Vec<PathConflict>,
    state: Arc<Mutex<BatchState>>,
    events: Sender<BatchEvent>,
}

impl Supervisor {
    fn run(mut self, updates: Receiver<TaskUpdate>, workers: Vec<JoinHandle<()>>) {
        let mut progress = BatchProgress {
            total: self.tasks.len(),
            ..BatchProgress::default()
        };

        while progress.done < progress.total {
            let Ok(update) = updates.recv() else {
                break;
            };
            self.apply(update, &mut progress);
        }

        for worker in workers {
            if worker.join().is_err() {
                warn!("batch worker panicked");
            }
        }

        // Tasks left behind by a worker that died never reached a terminal state.
        let stranded: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| !task.state.is_terminal())
            .map(|(position, _)| position)
            .collect();
        for position in stranded {
            let failure = SplitFailure::NotStarted {
                reason: "worker stopped before finishing".to_string(),
            };
            self.apply(
                TaskUpdate {
                    position,
                    state: TaskState::Failed(failure),
                },
                &mut progress,
            );
        }

        self.finish(progress);
    }

    fn apply(&mut self, update: TaskUpdate, progress: &mut BatchProgress) {
        let Some(task) = self.tasks.get_mut(update.position) else {
            return;
        };
        task.state = update.state.clone();
        debug!(
            segment_index = task.segment.index,
            state = ?update.state,
            "batch task transition"
        );
        let _ = self.events.send(BatchEvent::Task {
            segment_index: task.segment.index,
            state: update.state.clone(),
        });

        match &update.state {
            TaskState::Pending | TaskState::Running => return,
            TaskState::Succeeded => progress.succeeded += 1,
            TaskState::Failed(_) => progress.failed += 1,
            TaskState::Cancelled => progress.cancelled += 1,
        }
        progress.done += 1;
        let _ = self.events.send(BatchEvent::Progress(*progress));
    }

    fn finish(self, progress: BatchProgress) {
        let state = if progress.cancelled > 0 {
            BatchState::Cancelled
        } else if progress.failed > 0 {
            BatchState::CompletedWithFailures
        } else {
            BatchState::Completed
        };

        let outputs = self
            .tasks
            .iter()
            .filter(|task| task.state == TaskState::Succeeded)
            .map(|task| task.output_path.clone())
            .collect();
        let failures = self
            .tasks
            .iter()
            .filter_map(|task| match &task.state {
                TaskState::Failed(failure) => Some(BatchFailure {
                    segment_index: task.segment.index,
                    output_path: task.output_path.clone(),
                    failure: failure.clone(),
                }),
                _ => None,
            })
            .collect();

        *lock(&self.state) = state;
        info!(
            ?state,
            total = progress.total,
            succeeded = progress.succeeded,
            failed = progress.failed,
            cancelled = progress.cancelled,
            "batch finished"
        );
        let _ = self.events.send(BatchEvent::Finished(BatchReport {
            state,
            progress,
            outputs,
            failures,
            conflicts: self.conflicts,
        }));
    }
}
