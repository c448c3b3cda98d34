use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::batch::{
    BatchCoordinator, BatchEvent, BatchHandle, BatchProgress, BatchReport, BatchRequest,
    SplitScope, TaskState,
};
use crate::config::EngineConfig;
use crate::cut_points::{CutPoint, CutPointStore, Disposition};
use crate::error::{EngineError, Result};
use crate::media::{FfmpegMediaBackend, MediaBackend};
use crate::naming::PathConflict;
use crate::project::Project;
use crate::quick_cut;
use crate::segments::{Segment, derive_segments};
use crate::time::seconds_to_ticks;

/// Commands accepted by the engine.
///
/// Times are in seconds; the engine converts them to timeline ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Probes a video and starts an empty project for it.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use splitter_engine::{Command, Engine};
    ///
    /// let mut engine = Engine::with_ffmpeg();
    /// let _ = engine.handle_command(Command::OpenVideo {
    ///     path: PathBuf::from("movie.mp4"),
    /// });
    /// ```
    OpenVideo {
        path: PathBuf,
    },
    LoadProject {
        path: PathBuf,
    },
    SaveProject {
        path: PathBuf,
    },
    /// Adds a cut point at the playback position.
    ///
    /// # Example
    /// ```no_run
    /// use std::path::PathBuf;
    /// use splitter_engine::{Command, Disposition, Engine};
    ///
    /// let mut engine = Engine::with_ffmpeg();
    /// let _ = engine.handle_command(Command::OpenVideo {
    ///     path: PathBuf::from("movie.mp4"),
    /// });
    /// let _ = engine.handle_command(Command::AddCutPoint {
    ///     at_seconds: 12.5,
    ///     disposition: Disposition::Keep,
    /// });
    /// ```
    AddCutPoint {
        at_seconds: f64,
        disposition: Disposition,
    },
    /// Flips the "last" cut point, as chosen by the configured toggle target.
    ToggleLastCutPoint,
    ToggleCutPoint {
        index: usize,
    },
    RemoveCutPoint {
        index: usize,
    },
    /// Sets the disposition of the 1-based `segment_index`.
    ///
    /// Tags the cut point on the segment's start boundary. For the first
    /// segment a cut point at `0` is created when missing. That fails with
    /// `InvalidTimestamp` when the first segment is no longer than the
    /// duplicate window, since no cut point can then be placed at `0`.
    SetSegmentDisposition {
        segment_index: usize,
        disposition: Disposition,
    },
    /// Replaces all cut points so the first `seconds` become a `Discard` segment.
    CutFirstSeconds {
        seconds: f64,
    },
    /// Replaces all cut points so the last `seconds` become a `Discard` segment.
    CutLastSeconds {
        seconds: f64,
    },
    /// Replaces all cut points with `Keep` cuts every `seconds`.
    SplitEvery {
        seconds: f64,
    },
    RequestSegments,
    /// Starts writing segments into `output_dir`.
    ///
    /// `scope` falls back to the configured default scope.
    StartBatchSplit {
        output_dir: PathBuf,
        scope: Option<SplitScope>,
    },
    CancelBatch,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProjectChanged(ProjectSnapshot),
    ProjectSaved { path: PathBuf },
    CutPointsChanged(Vec<CutPoint>),
    SegmentListChanged(Vec<Segment>),
    PathConflict(PathConflict),
    Progress {
        segment_index: usize,
        state: TaskState,
    },
    BatchProgress(BatchProgress),
    BatchResult(BatchReport),
    Error(EngineErrorEvent),
}

/// Category of an [`EngineErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    InvalidTimestamp,
    InvalidParameter,
    NotFound,
    IndexOutOfRange,
    PathConflict,
    Probe,
    ExternalTool,
    ProjectNotLoaded,
    MissingSourceVideo,
    InvalidProjectFile,
    BatchAlreadyRunning,
    NoActiveBatch,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::InvalidTimestamp { .. } => Self::InvalidTimestamp,
            EngineError::InvalidParameter { .. } => Self::InvalidParameter,
            EngineError::NotFound => Self::NotFound,
            EngineError::IndexOutOfRange { .. } => Self::IndexOutOfRange,
            EngineError::PathConflict { .. } => Self::PathConflict,
            EngineError::Probe { .. } => Self::Probe,
            EngineError::ExternalTool { .. } => Self::ExternalTool,
            EngineError::ProjectNotLoaded => Self::ProjectNotLoaded,
            EngineError::MissingSourceVideo(_) => Self::MissingSourceVideo,
            EngineError::InvalidProjectFile { .. } | EngineError::ProjectSerialization { .. } => {
                Self::InvalidProjectFile
            }
            EngineError::BatchAlreadyRunning => Self::BatchAlreadyRunning,
            EngineError::NoActiveBatch => Self::NoActiveBatch,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable project snapshot consumed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub source_video_path: PathBuf,
    pub duration_tl: i64,
    pub cut_points: Vec<CutPoint>,
    pub segments: Vec<Segment>,
}

/// The video currently being edited.
#[derive(Debug)]
struct OpenVideo {
    path: PathBuf,
    cut_points: CutPointStore,
}

impl OpenVideo {
    fn segments(&self) -> Vec<Segment> {
        derive_segments(self.cut_points.list_all(), self.cut_points.duration_tl())
    }

    fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            source_video_path: self.path.clone(),
            duration_tl: self.cut_points.duration_tl(),
            cut_points: self.cut_points.list_all().to_vec(),
            segments: self.segments(),
        }
    }
}

/// Splitter engine: owns the cut points of one video and drives batch splits.
#[derive(Debug)]
pub struct Engine<M> {
    media: Arc<M>,
    config: EngineConfig,
    coordinator: BatchCoordinator,
    video: Option<OpenVideo>,
    batch: Option<BatchHandle>,
}

impl Engine<FfmpegMediaBackend> {
    /// Creates an engine backed by the `ffmpeg` and `ffprobe` found on `PATH`.
    pub fn with_ffmpeg() -> Self {
        Self::from_config(EngineConfig::default())
    }

    /// Creates an FFmpeg-backed engine using the tool paths from `config`.
    pub fn from_config(config: EngineConfig) -> Self {
        let media = FfmpegMediaBackend::new(config.media_tools());
        Self::with_config(media, config)
    }
}

impl<M> Engine<M>
where
    M: MediaBackend + 'static,
{
    /// Creates a new engine with default settings.
    ///
    /// # Example
    /// ```no_run
    /// use splitter_engine::{Engine, FfmpegMediaBackend};
    ///
    /// let _engine = Engine::new(FfmpegMediaBackend::default());
    /// ```
    pub fn new(media: M) -> Self {
        Self::with_config(media, EngineConfig::default())
    }

    pub fn with_config(media: M, config: EngineConfig) -> Self {
        Self {
            media: Arc::new(media),
            coordinator: BatchCoordinator::new(config.worker_count),
            config,
            video: None,
            batch: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns `true` while a batch handle is held.
    pub fn has_active_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::OpenVideo { path } => self.open_video(path),
            Command::LoadProject { path } => self.load_project(&path),
            Command::SaveProject { path } => self.save_project(path),
            Command::AddCutPoint {
                at_seconds,
                disposition,
            } => self.add_cut_point(at_seconds, disposition),
            Command::ToggleLastCutPoint => self.toggle_last_cut_point(),
            Command::ToggleCutPoint { index } => self.toggle_cut_point(index),
            Command::RemoveCutPoint { index } => self.remove_cut_point(index),
            Command::SetSegmentDisposition {
                segment_index,
                disposition,
            } => self.set_segment_disposition(segment_index, disposition),
            Command::CutFirstSeconds { seconds } => self.cut_first_seconds(seconds),
            Command::CutLastSeconds { seconds } => self.cut_last_seconds(seconds),
            Command::SplitEvery { seconds } => self.split_every(seconds),
            Command::RequestSegments => {
                let video = self.video()?;
                Ok(vec![Event::SegmentListChanged(video.segments())])
            }
            Command::StartBatchSplit { output_dir, scope } => {
                self.start_batch_split(output_dir, scope)
            }
            Command::CancelBatch => self.cancel_batch(),
        }
    }

    /// Drains batch events received so far without blocking.
    pub fn poll_batch(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let Some(handle) = self.batch.as_ref() else {
            return events;
        };

        let mut finished = false;
        while let Some(event) = handle.try_next_event() {
            finished = matches!(event, BatchEvent::Finished(_));
            events.push(batch_event(event));
            if finished {
                break;
            }
        }
        if finished {
            self.release_batch();
        }
        events
    }

    /// Blocks until the active batch finishes and returns its remaining events.
    ///
    /// The last event is always `BatchResult`. Fails with `NoActiveBatch`
    /// when nothing is running.
    pub fn wait_batch(&mut self) -> Result<Vec<Event>> {
        let handle = self.batch.as_ref().ok_or(EngineError::NoActiveBatch)?;
        let mut events = Vec::new();
        while let Some(event) = handle.next_event() {
            let finished = matches!(event, BatchEvent::Finished(_));
            events.push(batch_event(event));
            if finished {
                self.release_batch();
                return Ok(events);
            }
        }

        warn!("batch stopped without a result");
        self.release_batch();
        Err(EngineError::Cancelled)
    }

    fn open_video(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        let probed = self.media.probe(&path)?;
        let store = self.new_store(probed.duration_tl);
        let video = OpenVideo {
            path: probed.path,
            cut_points: store,
        };
        info!(
            path = ?video.path,
            duration_tl = video.cut_points.duration_tl(),
            "video opened"
        );
        let events = vec![
            Event::ProjectChanged(video.snapshot()),
            Event::SegmentListChanged(video.segments()),
        ];
        self.video = Some(video);
        Ok(events)
    }

    fn load_project(&mut self, path: &Path) -> Result<Vec<Event>> {
        let project = Project::load(path)?;
        project.ensure_source_exists()?;
        let probed = self.media.probe(&project.source_video_path)?;

        let mut store = self.new_store(probed.duration_tl);
        let (inside, outside): (Vec<CutPoint>, Vec<CutPoint>) = project
            .cut_points
            .into_iter()
            .partition(|point| point.at_tl <= probed.duration_tl);
        if !outside.is_empty() {
            warn!(
                dropped = outside.len(),
                duration_tl = probed.duration_tl,
                "cut points past the end of the video were dropped"
            );
        }
        store.replace_all(inside)?;

        let video = OpenVideo {
            path: project.source_video_path,
            cut_points: store,
        };
        info!(
            project = ?path,
            source = ?video.path,
            cut_points = video.cut_points.len(),
            "project opened"
        );
        let events = vec![
            Event::ProjectChanged(video.snapshot()),
            Event::CutPointsChanged(video.cut_points.list_all().to_vec()),
            Event::SegmentListChanged(video.segments()),
        ];
        self.video = Some(video);
        Ok(events)
    }

    fn save_project(&mut self, path: PathBuf) -> Result<Vec<Event>> {
        let video = self.video()?;
        Project::new(video.path.clone(), video.cut_points.list_all().to_vec()).save(&path)?;
        Ok(vec![Event::ProjectSaved { path }])
    }

    fn add_cut_point(&mut self, at_seconds: f64, disposition: Disposition) -> Result<Vec<Event>> {
        let at_tl = seconds_to_ticks(at_seconds).ok_or(EngineError::InvalidParameter {
            name: "cut point timestamp",
            value: at_seconds,
            reason: "timestamp must be a finite number of seconds",
        })?;
        let video = self.video_mut()?;
        video.cut_points.add(at_tl, disposition)?;
        Ok(cut_points_changed(video))
    }

    fn toggle_last_cut_point(&mut self) -> Result<Vec<Event>> {
        let video = self.video_mut()?;
        let (index, disposition) = video.cut_points.toggle_last()?;
        debug!(index, ?disposition, "last cut point toggled");
        Ok(cut_points_changed(video))
    }

    fn toggle_cut_point(&mut self, index: usize) -> Result<Vec<Event>> {
        let video = self.video_mut()?;
        video.cut_points.toggle_at(index)?;
        Ok(cut_points_changed(video))
    }

    fn remove_cut_point(&mut self, index: usize) -> Result<Vec<Event>> {
        let video = self.video_mut()?;
        video.cut_points.remove(index)?;
        Ok(cut_points_changed(video))
    }

    fn set_segment_disposition(
        &mut self,
        segment_index: usize,
        disposition: Disposition,
    ) -> Result<Vec<Event>> {
        let video = self.video_mut()?;
        let segments = video.segments();
        let segment = segment_index
            .checked_sub(1)
            .and_then(|position| segments.get(position))
            .ok_or(EngineError::IndexOutOfRange {
                index: segment_index,
                len: segments.len(),
            })?;

        match video.cut_points.position_of(segment.start_tl) {
            Some(index) => video.cut_points.set_disposition(index, disposition)?,
            None => {
                let epsilon_tl = video.cut_points.epsilon_tl();
                let crowded = video
                    .cut_points
                    .list_all()
                    .first()
                    .is_some_and(|first| first.at_tl - segment.start_tl <= epsilon_tl);
                if crowded {
                    warn!(segment_index, end_tl = segment.end_tl, "segment too short to tag");
                    return Err(EngineError::InvalidTimestamp {
                        at_tl: segment.start_tl,
                        reason: "segment is shorter than the duplicate window and cannot be tagged",
                    });
                }
                video.cut_points.add(segment.start_tl, disposition)?;
            }
        }
        debug!(segment_index, ?disposition, "segment disposition set");
        Ok(cut_points_changed(video))
    }

    fn cut_first_seconds(&mut self, seconds: f64) -> Result<Vec<Event>> {
        let length_tl = parameter_ticks("first seconds", seconds)?;
        let video = self.video_mut()?;
        let cuts = quick_cut::first_seconds(
            length_tl,
            video.cut_points.duration_tl(),
            Disposition::Discard,
        )?;
        video.cut_points.replace_all(cuts)?;
        info!(length_tl, "first seconds cut");
        Ok(cut_points_changed(video))
    }

    fn cut_last_seconds(&mut self, seconds: f64) -> Result<Vec<Event>> {
        let length_tl = parameter_ticks("last seconds", seconds)?;
        let video = self.video_mut()?;
        let cuts = quick_cut::last_seconds(length_tl, video.cut_points.duration_tl())?;
        video.cut_points.replace_all(cuts)?;
        info!(length_tl, "last seconds cut");
        Ok(cut_points_changed(video))
    }

    fn split_every(&mut self, seconds: f64) -> Result<Vec<Event>> {
        let interval_tl = parameter_ticks("split interval", seconds)?;
        let video = self.video_mut()?;
        let cuts = quick_cut::split_every(
            interval_tl,
            video.cut_points.duration_tl(),
            video.cut_points.epsilon_tl(),
        )?;
        video.cut_points.replace_all(cuts)?;
        info!(
            interval_tl,
            cut_points = video.cut_points.len(),
            "split by duration applied"
        );
        Ok(cut_points_changed(video))
    }

    fn start_batch_split(
        &mut self,
        output_dir: PathBuf,
        scope: Option<SplitScope>,
    ) -> Result<Vec<Event>> {
        if self.batch.is_some() {
            // A finished batch whose events were not drained yet must be released first.
            let pending = self.poll_batch();
            if self.batch.is_some() {
                return Err(EngineError::BatchAlreadyRunning);
            }
            debug!(dropped = pending.len(), "stale batch events discarded");
        }

        let video = self.video()?;
        let request = BatchRequest {
            source: video.path.clone(),
            output_dir,
            segments: video.segments(),
            scope: scope.unwrap_or(self.config.default_scope),
            conflict_policy: self.config.conflict_policy,
        };
        let handle = self
            .coordinator
            .start_batch(Arc::clone(&self.media), request)?;

        let mut events: Vec<Event> = handle
            .conflicts()
            .iter()
            .cloned()
            .map(Event::PathConflict)
            .collect();
        self.batch = Some(handle);
        events.extend(self.poll_batch());
        Ok(events)
    }

    fn cancel_batch(&mut self) -> Result<Vec<Event>> {
        let handle = self.batch.as_ref().ok_or(EngineError::NoActiveBatch)?;
        handle.cancel();
        Ok(self.poll_batch())
    }

    fn release_batch(&mut self) {
        if let Some(mut handle) = self.batch.take() {
            handle.join();
        }
    }

    fn new_store(&self, duration_tl: i64) -> CutPointStore {
        CutPointStore::new(duration_tl)
            .with_epsilon_tl(self.config.duplicate_epsilon_tl())
            .with_toggle_target(self.config.toggle_target)
    }

    fn video(&self) -> Result<&OpenVideo> {
        self.video.as_ref().ok_or(EngineError::ProjectNotLoaded)
    }

    fn video_mut(&mut self) -> Result<&mut OpenVideo> {
        self.video.as_mut().ok_or(EngineError::ProjectNotLoaded)
    }
}

fn cut_points_changed(video: &OpenVideo) -> Vec<Event> {
    vec![
        Event::CutPointsChanged(video.cut_points.list_all().to_vec()),
        Event::SegmentListChanged(video.segments()),
    ]
}

fn batch_event(event: BatchEvent) -> Event {
    match event {
        BatchEvent::Task {
            segment_index,
            state,
        } => Event::Progress {
            segment_index,
            state,
        },
        BatchEvent::Progress(progress) => Event::BatchProgress(progress),
        BatchEvent::Finished(report) => Event::BatchResult(report),
    }
}

fn parameter_ticks(name: &'static str, seconds: f64) -> Result<i64> {
    seconds_to_ticks(seconds).ok_or(EngineError::InvalidParameter {
        name,
        value: seconds,
        reason: "value must be a finite number of seconds",
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{Command, Engine, EngineErrorKind, Event, EngineErrorEvent};
    use crate::batch::{BatchState, SplitScope, TaskState};
    use crate::config::EngineConfig;
    use crate::cut_points::{CutPoint, Disposition, ToggleTarget};
    use crate::error::EngineError;
    use crate::segments::Segment;
    use crate::test_support::{MockBackend, MockBehavior};

    const DURATION_TL: i64 = 60_000_000;

    fn opened_engine() -> Engine<MockBackend> {
        let mut engine = Engine::new(MockBackend::new(DURATION_TL));
        engine
            .handle_command(Command::OpenVideo {
                path: PathBuf::from("movie.mp4"),
            })
            .expect("open video");
        engine
    }

    fn last_segments(events: &[Event]) -> Vec<Segment> {
        events
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::SegmentListChanged(segments) => Some(segments.clone()),
                _ => None,
            })
            .expect("segment list event")
    }

    fn finish_batch(engine: &mut Engine<MockBackend>, mut events: Vec<Event>) -> Vec<Event> {
        if !events
            .iter()
            .any(|event| matches!(event, Event::BatchResult(_)))
        {
            events.extend(engine.wait_batch().expect("wait for batch"));
        }
        events
    }

    fn add(engine: &mut Engine<MockBackend>, at_seconds: f64) -> Vec<Event> {
        engine
            .handle_command(Command::AddCutPoint {
                at_seconds,
                disposition: Disposition::Keep,
            })
            .expect("add cut point")
    }

    #[test]
    fn open_video_emits_snapshot_with_single_full_segment() {
        let backend = MockBackend::new(DURATION_TL);
        let probes = backend.probe_calls();
        let mut engine = Engine::new(backend);

        let events = engine
            .handle_command(Command::OpenVideo {
                path: PathBuf::from("movie.mp4"),
            })
            .expect("open video");

        assert_eq!(events.len(), 2);
        let Event::ProjectChanged(snapshot) = &events[0] else {
            panic!("first event must be ProjectChanged");
        };
        assert_eq!(snapshot.duration_tl, DURATION_TL);
        assert!(snapshot.cut_points.is_empty());
        assert_eq!(snapshot.segments.len(), 1);
        assert_eq!(
            probes.lock().expect("lock probe calls").as_slice(),
            &[PathBuf::from("movie.mp4")]
        );
    }

    #[test]
    fn probe_failure_leaves_no_project_loaded() {
        let mut engine = Engine::new(MockBackend::new(DURATION_TL).with_probe_failure("not mp4"));

        let error = engine
            .handle_command(Command::OpenVideo {
                path: PathBuf::from("movie.mkv"),
            })
            .expect_err("probe fails");
        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::Probe);

        let error = engine
            .handle_command(Command::RequestSegments)
            .expect_err("nothing loaded");
        assert!(matches!(error, EngineError::ProjectNotLoaded));
    }

    #[test]
    fn adding_cut_points_rederives_segments() {
        let mut engine = opened_engine();
        add(&mut engine, 20.0);
        let events = add(&mut engine, 10.0);

        let Event::CutPointsChanged(cut_points) = &events[0] else {
            panic!("first event must be CutPointsChanged");
        };
        assert_eq!(
            cut_points,
            &vec![CutPoint::keep(10_000_000), CutPoint::keep(20_000_000)]
        );
        let ranges: Vec<(i64, i64)> = last_segments(&events)
            .iter()
            .map(|segment| (segment.start_tl, segment.end_tl))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (0, 10_000_000),
                (10_000_000, 20_000_000),
                (20_000_000, DURATION_TL)
            ]
        );
    }

    #[test]
    fn invalid_cut_point_is_rejected_without_changing_state() {
        let mut engine = opened_engine();
        add(&mut engine, 10.0);

        for at_seconds in [-1.0, 61.0, 10.0005, f64::NAN] {
            let error = engine
                .handle_command(Command::AddCutPoint {
                    at_seconds,
                    disposition: Disposition::Keep,
                })
                .expect_err("invalid cut point");
            let event = EngineErrorEvent::from_error(&error);
            assert!(matches!(
                event.kind,
                EngineErrorKind::InvalidTimestamp | EngineErrorKind::InvalidParameter
            ));
        }

        let events = engine
            .handle_command(Command::RequestSegments)
            .expect("segments");
        assert_eq!(last_segments(&events).len(), 2);
    }

    #[test]
    fn toggle_last_flips_latest_timestamp_by_default() {
        let mut engine = opened_engine();
        add(&mut engine, 30.0);
        add(&mut engine, 10.0);

        let events = engine
            .handle_command(Command::ToggleLastCutPoint)
            .expect("toggle");

        let segments = last_segments(&events);
        assert_eq!(segments[2].start_tl, 30_000_000);
        assert_eq!(segments[2].disposition, Disposition::Discard);
        assert_eq!(segments[1].disposition, Disposition::Keep);
    }

    #[test]
    fn toggle_last_can_follow_insertion_order() {
        let config = EngineConfig {
            toggle_target: ToggleTarget::MostRecentlyInserted,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_config(MockBackend::new(DURATION_TL), config);
        engine
            .handle_command(Command::OpenVideo {
                path: PathBuf::from("movie.mp4"),
            })
            .expect("open video");
        add(&mut engine, 30.0);
        add(&mut engine, 10.0);

        let events = engine
            .handle_command(Command::ToggleLastCutPoint)
            .expect("toggle");

        let segments = last_segments(&events);
        assert_eq!(segments[1].start_tl, 10_000_000);
        assert_eq!(segments[1].disposition, Disposition::Discard);
    }

    #[test]
    fn toggle_last_on_empty_store_is_not_found() {
        let mut engine = opened_engine();
        let error = engine
            .handle_command(Command::ToggleLastCutPoint)
            .expect_err("empty");
        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::NotFound);
    }

    #[test]
    fn set_disposition_of_first_segment_creates_cut_at_zero() {
        let mut engine = opened_engine();
        add(&mut engine, 10.0);

        let events = engine
            .handle_command(Command::SetSegmentDisposition {
                segment_index: 1,
                disposition: Disposition::Discard,
            })
            .expect("set disposition");

        let Event::CutPointsChanged(cut_points) = &events[0] else {
            panic!("first event must be CutPointsChanged");
        };
        assert_eq!(cut_points[0], CutPoint::discard(0));
        let segments = last_segments(&events);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].disposition, Disposition::Discard);

        let error = engine
            .handle_command(Command::SetSegmentDisposition {
                segment_index: 3,
                disposition: Disposition::Keep,
            })
            .expect_err("no third segment");
        assert!(matches!(error, EngineError::IndexOutOfRange { index: 3, len: 2 }));
    }

    #[test]
    fn quick_cuts_replace_existing_cut_points() {
        let mut engine = opened_engine();
        add(&mut engine, 33.0);

        let events = engine
            .handle_command(Command::CutFirstSeconds { seconds: 10.0 })
            .expect("cut first");
        let segments = last_segments(&events);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].disposition, Disposition::Discard);
        assert_eq!(segments[0].end_tl, 10_000_000);

        let events = engine
            .handle_command(Command::SplitEvery { seconds: 25.0 })
            .expect("split every");
        let lengths: Vec<i64> = last_segments(&events)
            .iter()
            .map(Segment::duration_tl)
            .collect();
        assert_eq!(lengths, vec![25_000_000, 25_000_000, 10_000_000]);

        let error = engine
            .handle_command(Command::CutLastSeconds { seconds: 60.0 })
            .expect_err("too long");
        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::InvalidParameter);
    }

    #[test]
    fn split_every_inside_duplicate_window_is_an_invalid_parameter() {
        let mut engine = opened_engine();
        add(&mut engine, 20.0);

        let error = engine
            .handle_command(Command::SplitEvery { seconds: 0.0005 })
            .expect_err("interval too short");
        assert!(matches!(
            error,
            EngineError::InvalidParameter {
                name: "split interval",
                ..
            }
        ));

        let events = engine
            .handle_command(Command::RequestSegments)
            .expect("segments");
        assert_eq!(last_segments(&events).len(), 2);
    }

    #[test]
    fn first_segment_inside_duplicate_window_cannot_be_tagged() {
        let mut engine = opened_engine();
        add(&mut engine, 0.0005);

        let error = engine
            .handle_command(Command::SetSegmentDisposition {
                segment_index: 1,
                disposition: Disposition::Discard,
            })
            .expect_err("segment 1 too short");
        assert!(matches!(
            error,
            EngineError::InvalidTimestamp {
                at_tl: 0,
                reason: "segment is shorter than the duplicate window and cannot be tagged",
            }
        ));

        let events = engine
            .handle_command(Command::RequestSegments)
            .expect("segments");
        let segments = last_segments(&events);
        assert_eq!(segments[0].disposition, Disposition::Keep);
        assert_eq!(segments[1].start_tl, 500);
        assert_eq!(segments[1].disposition, Disposition::Keep);
    }

    #[test]
    fn save_and_load_project_restore_cut_points() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("movie.mp4");
        fs::write(&source, b"video").expect("write source");
        let project_path = dir.path().join("movie.mp4proj");

        let mut engine = Engine::new(MockBackend::new(DURATION_TL));
        engine
            .handle_command(Command::OpenVideo {
                path: source.clone(),
            })
            .expect("open video");
        add(&mut engine, 5.0);
        engine
            .handle_command(Command::AddCutPoint {
                at_seconds: 12.5,
                disposition: Disposition::Discard,
            })
            .expect("add discard");
        let events = engine
            .handle_command(Command::SaveProject {
                path: project_path.clone(),
            })
            .expect("save");
        assert_eq!(
            events,
            vec![Event::ProjectSaved {
                path: project_path.clone()
            }]
        );

        let mut restored = Engine::new(MockBackend::new(DURATION_TL));
        let events = restored
            .handle_command(Command::LoadProject { path: project_path })
            .expect("load");

        let Event::CutPointsChanged(cut_points) = &events[1] else {
            panic!("second event must be CutPointsChanged");
        };
        assert_eq!(
            cut_points,
            &vec![CutPoint::keep(5_000_000), CutPoint::discard(12_500_000)]
        );
    }

    #[test]
    fn loading_project_with_missing_video_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let project_path = dir.path().join("orphan.mp4proj");
        fs::write(
            &project_path,
            format!(
                r#"{{ "sourceVideoPath": {:?}, "cutPoints": [] }}"#,
                dir.path().join("gone.mp4").display().to_string()
            ),
        )
        .expect("write project");

        let mut engine = Engine::new(MockBackend::new(DURATION_TL));
        let error = engine
            .handle_command(Command::LoadProject { path: project_path })
            .expect_err("missing video");

        assert_eq!(
            EngineErrorKind::from(&error),
            EngineErrorKind::MissingSourceVideo
        );
    }

    #[test]
    fn batch_split_writes_keep_segments_and_reports_result() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut engine = opened_engine();
        add(&mut engine, 20.0);
        engine
            .handle_command(Command::AddCutPoint {
                at_seconds: 40.0,
                disposition: Disposition::Discard,
            })
            .expect("add discard");

        let events = engine
            .handle_command(Command::StartBatchSplit {
                output_dir: dir.path().to_path_buf(),
                scope: None,
            })
            .expect("start batch");
        assert!(events.contains(&Event::Progress {
            segment_index: 1,
            state: TaskState::Pending,
        }));
        let events = finish_batch(&mut engine, events);

        let Some(Event::BatchResult(report)) = events.last() else {
            panic!("last event must be BatchResult");
        };
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(report.progress.total, 2);
        assert!(dir.path().join("movie_segment_1.mp4").exists());
        assert!(dir.path().join("movie_segment_2.mp4").exists());
        assert!(!dir.path().join("movie_segment_3_discard.mp4").exists());
        assert!(!engine.has_active_batch());
    }

    #[test]
    fn batch_conflicts_are_reported_as_events() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("movie_segment_1.mp4"), b"old").expect("write existing");
        let mut engine = opened_engine();

        let events = engine
            .handle_command(Command::StartBatchSplit {
                output_dir: dir.path().to_path_buf(),
                scope: Some(SplitScope::KeepAndDiscard),
            })
            .expect("start batch");
        let events = finish_batch(&mut engine, events);

        assert!(matches!(
            events.first(),
            Some(Event::PathConflict(conflict)) if conflict.segment_index == 1
        ));
        let Some(Event::BatchResult(report)) = events.last() else {
            panic!("last event must be BatchResult");
        };
        assert_eq!(report.progress.total, 0);
        assert_eq!(fs::read(dir.path().join("movie_segment_1.mp4")).expect("read"), b"old");
    }

    #[test]
    fn dropping_the_engine_cancels_its_running_batch() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut engine = Engine::new(
            MockBackend::new(DURATION_TL).with_behavior(0, MockBehavior::RunUntilCancelled),
        );
        engine
            .handle_command(Command::OpenVideo {
                path: PathBuf::from("movie.mp4"),
            })
            .expect("open video");
        engine
            .handle_command(Command::StartBatchSplit {
                output_dir: dir.path().to_path_buf(),
                scope: None,
            })
            .expect("start batch");

        let partial = dir.path().join("movie_segment_1.mp4");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !partial.exists() {
            assert!(Instant::now() < deadline, "split never started");
            thread::sleep(Duration::from_millis(5));
        }
        drop(engine);

        let deadline = Instant::now() + Duration::from_secs(5);
        while partial.exists() {
            assert!(Instant::now() < deadline, "split kept running");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn cancel_without_batch_is_an_error() {
        let mut engine = opened_engine();
        let error = engine
            .handle_command(Command::CancelBatch)
            .expect_err("no batch");
        assert_eq!(EngineErrorKind::from(&error), EngineErrorKind::NoActiveBatch);
        assert!(matches!(engine.wait_batch(), Err(EngineError::NoActiveBatch)));
    }
}
