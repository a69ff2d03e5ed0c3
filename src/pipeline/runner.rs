use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, bounded, select, tick, unbounded};

use super::{
    camera::FrameSource,
    detector::{LandmarkDetector, ModelFiles, OrtHolistic},
    export::export_snapshots,
    recording::{Recorder, RecorderStatus},
    skeleton,
};
use crate::{
    config::DetectorConfig,
    error::{CaptureError, ExportError},
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    types::{Frame, RegionFilter},
};

/// Requests from the UI, applied between ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Save,
    SelectRegion(String),
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message for the status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineStatus {
    pub recorder: RecorderStatus,
    pub region: RegionFilter,
}

#[derive(Clone, Debug)]
pub enum PipelineEvent {
    ModelDownload(ModelDownloadEvent),
    ModelUnavailable { model: ModelKind, reason: String },
    Ready(PipelineStatus),
    Status(PipelineStatus),
    Notice(Notice),
    /// The pipeline could not start; nothing will ever be captured.
    Unavailable(String),
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub tick_interval: Duration,
    pub region: String,
    pub output_path: PathBuf,
}

/// Handed to the detector factory. Model provisioning can block for a long
/// time on first run, so it reports progress here and polls for shutdown.
#[derive(Clone, Debug)]
pub struct Provisioning {
    events: Sender<PipelineEvent>,
    cancel: Arc<AtomicBool>,
}

impl Provisioning {
    pub fn send(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }
}

/// Capture, detection, overlay and recording for one camera. Everything runs
/// on the caller's thread; the region filter is read once per tick.
pub struct Pipeline<S, D> {
    source: S,
    detector: D,
    recorder: Recorder,
    filter: RegionFilter,
    output_path: PathBuf,
}

impl<S: FrameSource, D: LandmarkDetector> Pipeline<S, D> {
    pub fn new(source: S, detector: D, filter: RegionFilter, output_path: PathBuf) -> Self {
        Self {
            source,
            detector,
            recorder: Recorder::new(),
            filter,
            output_path,
        }
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            recorder: self.recorder.status(),
            region: self.filter,
        }
    }

    /// Runs one capture/detect/render/record cycle. Returns the annotated
    /// frame, or `None` when the tick was skipped.
    pub fn tick(&mut self) -> Option<Frame> {
        let filter = self.filter;

        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("skipping tick: {err}");
                return None;
            }
        };

        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(err) => {
                log::warn!("landmark detection failed, skipping tick: {err:?}");
                return None;
            }
        };

        let annotated = skeleton::render(&frame, &detection, filter);
        self.recorder.record(&detection, filter);

        log::trace!("frame processed in {:?}", frame.timestamp.elapsed());
        Some(annotated)
    }

    /// Applies a UI command. `Shutdown` is handled by the thread loop and is
    /// ignored here.
    pub fn handle(&mut self, command: Command) -> Option<Notice> {
        match command {
            Command::Start => {
                if !self.recorder.start() {
                    log::debug!("start ignored, already recording");
                    return None;
                }
                log::info!("recording started ({})", self.filter);
                Some(Notice::info("Recording started"))
            }
            Command::Stop => {
                let count = self.recorder.stop()?;
                log::info!("recording stopped, {count} snapshots buffered");
                Some(Notice::info(format!(
                    "Recording stopped, {count} frames recorded"
                )))
            }
            Command::Save => Some(self.save()),
            Command::SelectRegion(label) => match label.parse::<RegionFilter>() {
                Ok(filter) => {
                    if filter != self.filter {
                        log::info!("region changed to {filter}");
                        self.filter = filter;
                    }
                    None
                }
                Err(err) => {
                    log::warn!("{err}");
                    Some(Notice::warning(err.to_string()))
                }
            },
            Command::Shutdown => None,
        }
    }

    fn save(&self) -> Notice {
        if self.recorder.is_recording() {
            log::warn!("save requested while recording");
            return Notice::warning("Stop recording before saving");
        }

        match export_snapshots(self.recorder.snapshots(), &self.output_path) {
            Ok(count) => {
                log::info!(
                    "saved {count} snapshots to {}",
                    self.output_path.display()
                );
                Notice::info(format!(
                    "Saved {count} frames to {}",
                    self.output_path.display()
                ))
            }
            Err(ExportError::EmptyBuffer) => {
                log::warn!("save requested with an empty buffer");
                Notice::warning("No key points recorded, nothing saved")
            }
            Err(err) => {
                log::error!("{err}");
                Notice::error(err.to_string())
            }
        }
    }
}

/// Owns the pipeline thread. Dropping it stops the thread and waits for the
/// camera and detector to be released.
#[derive(Debug)]
pub struct PipelineHandle {
    commands: Sender<Command>,
    cancel: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("pipeline thread has exited, command dropped");
        }
    }

    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            // Commands are not read while models are provisioned.
            self.cancel.store(true, Ordering::Relaxed);
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                log::error!("pipeline thread panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Spawns the pipeline thread. The frame source and detector are built on
/// that thread, since camera handles cannot move between threads.
pub fn start_pipeline<S, D, FS, FD>(
    settings: PipelineSettings,
    open_source: FS,
    open_detector: FD,
) -> Result<(PipelineHandle, Receiver<Frame>, Receiver<PipelineEvent>)>
where
    S: FrameSource,
    D: LandmarkDetector,
    FS: FnOnce() -> Result<S, CaptureError> + Send + 'static,
    FD: FnOnce(&Provisioning) -> Result<D> + Send + 'static,
{
    let (command_tx, command_rx) = unbounded();
    let (frame_tx, frame_rx) = bounded(1);
    let (event_tx, event_rx) = unbounded();
    let cancel = Arc::new(AtomicBool::new(false));
    let provisioning = Provisioning {
        events: event_tx.clone(),
        cancel: cancel.clone(),
    };

    let handle = thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || {
            run_pipeline(
                settings,
                open_source,
                open_detector,
                provisioning,
                command_rx,
                frame_tx,
                event_tx,
            )
        })?;

    Ok((
        PipelineHandle {
            commands: command_tx,
            cancel,
            handle: Some(handle),
        },
        frame_rx,
        event_rx,
    ))
}

fn run_pipeline<S, D, FS, FD>(
    settings: PipelineSettings,
    open_source: FS,
    open_detector: FD,
    provisioning: Provisioning,
    command_rx: Receiver<Command>,
    frame_tx: Sender<Frame>,
    event_tx: Sender<PipelineEvent>,
) where
    S: FrameSource,
    D: LandmarkDetector,
    FS: FnOnce() -> Result<S, CaptureError>,
    FD: FnOnce(&Provisioning) -> Result<D>,
{
    let source = match open_source() {
        Ok(source) => source,
        Err(err) => {
            log::error!("{err}");
            let _ = event_tx.send(PipelineEvent::Unavailable(err.to_string()));
            return;
        }
    };

    let detector = match open_detector(&provisioning) {
        Ok(detector) => detector,
        Err(_) if provisioning.is_cancelled() => {
            log::info!("pipeline stopped while loading models");
            return;
        }
        Err(err) => {
            log::error!("failed to load landmark detector: {err:?}");
            let _ = event_tx.send(PipelineEvent::Unavailable(format!(
                "Landmark detector could not be loaded: {err:#}"
            )));
            return;
        }
    };

    let filter = settings.region.parse::<RegionFilter>().unwrap_or_else(|err| {
        log::warn!("{err}; starting with {}", RegionFilter::default());
        let _ = event_tx.send(PipelineEvent::Notice(Notice::warning(err.to_string())));
        RegionFilter::default()
    });

    let mut pipeline = Pipeline::new(source, detector, filter, settings.output_path);
    let _ = event_tx.send(PipelineEvent::Ready(pipeline.status()));
    log::info!(
        "pipeline running every {:?} with region {filter}",
        settings.tick_interval
    );

    let ticker = tick(settings.tick_interval);
    loop {
        select! {
            recv(command_rx) -> command => {
                let command = match command {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => command,
                };
                if let Some(notice) = pipeline.handle(command) {
                    let _ = event_tx.send(PipelineEvent::Notice(notice));
                }
                let _ = event_tx.send(PipelineEvent::Status(pipeline.status()));
            }
            recv(ticker) -> _ => {
                if let Some(frame) = pipeline.tick() {
                    let _ = frame_tx.try_send(frame);
                }
                if pipeline.recorder().is_recording() {
                    let _ = event_tx.send(PipelineEvent::Status(pipeline.status()));
                }
            }
        }
    }

    log::info!("pipeline stopped");
}

/// Ensures each configured model is on disk and loads the holistic detector.
/// A model that cannot be provided disables its regions.
pub fn open_holistic(config: &DetectorConfig, provisioning: &Provisioning) -> Result<OrtHolistic> {
    let mut files = ModelFiles::default();

    for kind in ModelKind::ALL {
        if provisioning.is_cancelled() {
            bail!("model provisioning cancelled");
        }

        let model = config.model(kind);
        let ready = ensure_model_ready(
            kind,
            &model.path,
            model.url.as_deref(),
            provisioning.cancel_flag(),
            |event| provisioning.send(PipelineEvent::ModelDownload(event)),
        );

        match ready {
            Err(err) if provisioning.is_cancelled() => return Err(err),
            Ok(()) => {
                let slot = match kind {
                    ModelKind::Pose => &mut files.pose,
                    ModelKind::FaceMesh => &mut files.face,
                    ModelKind::Hand => &mut files.hand,
                };
                *slot = Some(model.path.clone());
            }
            Err(err) => {
                log::warn!("{} model unavailable: {err:#}", kind.label());
                provisioning.send(PipelineEvent::ModelUnavailable {
                    model: kind,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    if provisioning.is_cancelled() {
        bail!("model provisioning cancelled");
    }
    OrtHolistic::new(&files, config.thresholds())
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, fs, time::Instant};

    use super::*;
    use crate::{
        pipeline::recording::RecorderState,
        types::{DetectionResult, FACE_LANDMARK_COUNT, HAND_LANDMARK_COUNT, Landmark},
    };

    fn blank_frame() -> Frame {
        Frame::new(vec![0; 8 * 8 * 4], 8, 8)
    }

    /// Plays back scripted reads, then keeps returning blank frames.
    struct ScriptedSource {
        script: VecDeque<Result<Frame, CaptureError>>,
    }

    impl ScriptedSource {
        fn healthy() -> Self {
            Self {
                script: VecDeque::new(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            self.script.pop_front().unwrap_or_else(|| Ok(blank_frame()))
        }
    }

    struct FixedDetector {
        result: DetectionResult,
        fail: bool,
    }

    impl LandmarkDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
            if self.fail {
                anyhow::bail!("scripted failure");
            }
            Ok(self.result.clone())
        }
    }

    fn face_only() -> DetectionResult {
        DetectionResult {
            face: Some(vec![Landmark::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT]),
            ..Default::default()
        }
    }

    fn pipeline_with(
        source: ScriptedSource,
        result: DetectionResult,
        output_path: PathBuf,
    ) -> Pipeline<ScriptedSource, FixedDetector> {
        Pipeline::new(
            source,
            FixedDetector {
                result,
                fail: false,
            },
            RegionFilter::WholeBody,
            output_path,
        )
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "holistic-recorder-runner-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn n_ticks_while_recording_buffer_n_snapshots() {
        let mut pipeline =
            pipeline_with(ScriptedSource::healthy(), face_only(), PathBuf::from("unused.json"));

        pipeline.tick();
        assert!(pipeline.recorder().snapshots().is_empty());

        pipeline.handle(Command::Start);
        for _ in 0..5 {
            assert!(pipeline.tick().is_some());
        }
        let notice = pipeline.handle(Command::Stop).unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(notice.message.contains('5'));

        pipeline.tick();
        assert_eq!(pipeline.recorder().len(), 5);
        assert_eq!(pipeline.recorder().status().state, RecorderState::Idle);
    }

    #[test]
    fn failed_read_skips_the_tick() {
        let source = ScriptedSource {
            script: VecDeque::from([
                Err(CaptureError::Read("unplugged".to_string())),
                Ok(blank_frame()),
            ]),
        };
        let mut pipeline = pipeline_with(source, face_only(), PathBuf::from("unused.json"));
        pipeline.handle(Command::Start);

        assert!(pipeline.tick().is_none());
        assert!(pipeline.tick().is_some());
        assert_eq!(pipeline.recorder().len(), 1);
    }

    #[test]
    fn detector_error_skips_the_tick() {
        let mut pipeline = Pipeline::new(
            ScriptedSource::healthy(),
            FixedDetector {
                result: face_only(),
                fail: true,
            },
            RegionFilter::Face,
            PathBuf::from("unused.json"),
        );
        pipeline.handle(Command::Start);
        assert!(pipeline.tick().is_none());
        assert!(pipeline.recorder().snapshots().is_empty());
    }

    #[test]
    fn unknown_region_warns_and_keeps_state() {
        let mut pipeline =
            pipeline_with(ScriptedSource::healthy(), face_only(), PathBuf::from("unused.json"));
        pipeline.handle(Command::Start);
        pipeline.tick();

        let notice = pipeline
            .handle(Command::SelectRegion("Feet".to_string()))
            .unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.message.contains("Feet"));
        assert_eq!(pipeline.status().region, RegionFilter::WholeBody);
        assert_eq!(pipeline.recorder().len(), 1);
    }

    #[test]
    fn selected_region_drives_recording() {
        let mut pipeline =
            pipeline_with(ScriptedSource::healthy(), face_only(), PathBuf::from("unused.json"));
        assert!(pipeline.handle(Command::SelectRegion("Face".to_string())).is_none());
        pipeline.handle(Command::Start);
        pipeline.tick();
        pipeline.handle(Command::SelectRegion("Hands".to_string()));
        pipeline.tick();

        let snapshots = pipeline.recorder().snapshots();
        assert_eq!(snapshots[0].keys(), vec!["face_landmarks"]);
        assert!(snapshots[1].is_empty());
    }

    #[test]
    fn saving_empty_buffer_warns_without_writing() {
        let dir = scratch_dir("empty");
        let path = dir.join("key_points.json");
        let mut pipeline = pipeline_with(ScriptedSource::healthy(), face_only(), path.clone());
        pipeline.handle(Command::Start);
        pipeline.handle(Command::Stop);

        let notice = pipeline.handle(Command::Save).unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_writes_buffer_and_keeps_it() {
        let dir = scratch_dir("save");
        let path = dir.join("key_points.json");
        let hands = DetectionResult {
            left_hand: Some(vec![Landmark::new(0.1, 0.2, 0.3); HAND_LANDMARK_COUNT]),
            ..Default::default()
        };
        let mut pipeline = pipeline_with(ScriptedSource::healthy(), hands, path.clone());
        pipeline.handle(Command::Start);
        pipeline.tick();
        pipeline.tick();
        pipeline.handle(Command::Stop);

        let notice = pipeline.handle(Command::Save).unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(path.exists());
        assert_eq!(pipeline.recorder().len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_write_reports_error_and_keeps_buffer() {
        let path = std::env::temp_dir()
            .join("holistic-recorder-runner-missing-dir")
            .join("nested")
            .join("key_points.json");
        let mut pipeline = pipeline_with(ScriptedSource::healthy(), face_only(), path);
        pipeline.handle(Command::Start);
        pipeline.tick();
        pipeline.handle(Command::Stop);

        let notice = pipeline.handle(Command::Save).unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(pipeline.recorder().len(), 1);
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            tick_interval: Duration::from_millis(1),
            region: "Whole Body".to_string(),
            output_path: PathBuf::from("unused.json"),
        }
    }

    #[test]
    fn camera_failure_never_ticks() {
        let (handle, frame_rx, event_rx) = start_pipeline(
            settings(),
            || -> Result<ScriptedSource, CaptureError> {
                Err(CaptureError::DeviceUnavailable {
                    index: 0,
                    reason: "busy".to_string(),
                })
            },
            |_: &Provisioning| -> Result<FixedDetector> {
                panic!("detector must not load without a camera")
            },
        )
        .unwrap();

        let event = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, PipelineEvent::Unavailable(reason) if reason.contains("busy")));
        handle.send(Command::Start);
        drop(handle);
        assert!(frame_rx.recv().is_err());
    }

    #[test]
    fn running_pipeline_delivers_frames_and_stops_on_drop() {
        let (handle, frame_rx, event_rx) = start_pipeline(
            settings(),
            || Ok(ScriptedSource::healthy()),
            |_: &Provisioning| {
                Ok(FixedDetector {
                    result: face_only(),
                    fail: false,
                })
            },
        )
        .unwrap();

        let ready = event_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(ready, PipelineEvent::Ready(status) if status.recorder.can_start));
        let frame = frame_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));

        drop(handle);
        while frame_rx.recv_timeout(Duration::from_secs(5)).is_ok() {}
        assert!(frame_rx.try_recv().is_err());
    }

    #[test]
    fn drop_during_slow_model_load_returns_promptly() {
        let (handle, frame_rx, event_rx) = start_pipeline(
            settings(),
            || Ok(ScriptedSource::healthy()),
            |provisioning: &Provisioning| -> Result<FixedDetector> {
                let deadline = Instant::now() + Duration::from_secs(60);
                while Instant::now() < deadline {
                    if provisioning.is_cancelled() {
                        bail!("model provisioning cancelled");
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(FixedDetector {
                    result: face_only(),
                    fail: false,
                })
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(5));

        assert!(frame_rx.try_recv().is_err());
        let events: Vec<_> = event_rx.try_iter().collect();
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, PipelineEvent::Unavailable(_) | PipelineEvent::Ready(_)))
        );
    }

    #[test]
    fn cancelled_provisioning_touches_no_model() {
        let (events, event_rx) = unbounded();
        let provisioning = Provisioning {
            events,
            cancel: Arc::new(AtomicBool::new(true)),
        };

        let err = open_holistic(&DetectorConfig::default(), &provisioning).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(event_rx.try_recv().is_err());
    }
}
