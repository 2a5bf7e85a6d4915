//! Fixed-rate episode sampling on a background thread.

use crate::actions::{normalize_action, ActionRanges, RawAction, ACTION_DIM};
use crate::frame_buffer::{CameraSlot, FrameBuffer};
use crate::{RecordError, Result};
use parking_lot::Mutex;
use robot_driver::{CommandSink, RobotCommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use vision::Frame;

pub const DEFAULT_TASK: &str = "do something with Robomaster";

#[derive(Clone, Debug)]
pub struct EpisodeConfig {
    pub fps: u32,
    /// Seconds of frames kept per camera.
    pub buffer_duration: f64,
    pub robot_offset: f64,
    pub webcam_offset: f64,
    pub robot_size: (u32, u32),
    pub webcam_size: (u32, u32),
    pub task: String,
    pub ranges: ActionRanges,
    pub dry_run: bool,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            buffer_duration: 2.0,
            robot_offset: 0.0,
            webcam_offset: 0.0,
            robot_size: (640, 360),
            webcam_size: (1280, 720),
            task: DEFAULT_TASK.to_string(),
            ranges: ActionRanges::default(),
            dry_run: false,
        }
    }
}

/// One row of an episode.
#[derive(Clone, Debug)]
pub struct Sample {
    /// 0-based position in the episode.
    pub index: usize,
    /// Seconds since the episode started.
    pub timestamp: f64,
    pub robot: Arc<Frame>,
    pub webcam: Arc<Frame>,
    pub robot_missing: bool,
    pub webcam_missing: bool,
    pub raw: RawAction,
    pub action: [f32; ACTION_DIM],
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub episode_index: Option<usize>,
    pub frames: usize,
    pub task: String,
    pub location: Option<PathBuf>,
}

/// Destination for sampled episodes.
pub trait EpisodeSink: Send {
    fn begin(&mut self, task: &str) -> Result<()>;
    fn write(&mut self, sample: &Sample) -> Result<()>;
    fn finish(&mut self) -> Result<EpisodeSummary>;
    fn discard(&mut self) -> Result<()>;
}

/// Counts samples and keeps nothing.
#[derive(Debug, Default)]
pub struct NullSink {
    task: String,
    frames: usize,
}

impl EpisodeSink for NullSink {
    fn begin(&mut self, task: &str) -> Result<()> {
        self.task = task.to_string();
        self.frames = 0;
        Ok(())
    }

    fn write(&mut self, _sample: &Sample) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<EpisodeSummary> {
        Ok(EpisodeSummary {
            episode_index: None,
            frames: self.frames,
            task: self.task.clone(),
            location: None,
        })
    }

    fn discard(&mut self) -> Result<()> {
        self.frames = 0;
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    buffer: FrameBuffer,
    recording: AtomicBool,
    frames: AtomicUsize,
    origin: Mutex<Instant>,
}

impl Shared {
    fn now(&self) -> f64 {
        self.origin.lock().elapsed().as_secs_f64()
    }
}

/// Feeds issued commands into the episode buffer. Register it on a
/// `RecordingDriver`.
#[derive(Debug, Clone)]
pub struct CommandTap {
    shared: Arc<Shared>,
}

impl CommandSink for CommandTap {
    fn record(&self, command: &RobotCommand) {
        if self.shared.recording.load(Ordering::Acquire) {
            self.shared
                .buffer
                .add_command(self.shared.now(), RawAction::from_command(command));
        }
    }
}

struct Worker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Held by the recorder while idle and by the sampler while it runs.
type SinkSlot = Arc<Mutex<Option<Box<dyn EpisodeSink>>>>;

pub struct EpisodeRecorder {
    config: EpisodeConfig,
    shared: Arc<Shared>,
    sink: SinkSlot,
    worker: Option<Worker>,
}

impl EpisodeRecorder {
    pub fn new(config: EpisodeConfig, sink: Box<dyn EpisodeSink>) -> Self {
        let shared = Arc::new(Shared {
            buffer: FrameBuffer::new(config.buffer_duration, config.fps),
            recording: AtomicBool::new(false),
            frames: AtomicUsize::new(0),
            origin: Mutex::new(Instant::now()),
        });
        Self {
            config,
            shared,
            sink: Arc::new(Mutex::new(Some(sink))),
            worker: None,
        }
    }

    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.worker.is_some()
    }

    /// Samples taken so far in the current (or last) episode.
    pub fn frame_count(&self) -> usize {
        self.shared.frames.load(Ordering::Acquire)
    }

    pub fn command_tap(&self) -> Arc<dyn CommandSink> {
        Arc::new(CommandTap {
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.start_with(|builder, job| builder.spawn(job))
    }

    fn start_with<S>(&mut self, spawn: S) -> Result<()>
    where
        S: FnOnce(thread::Builder, Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>>,
    {
        if self.worker.is_some() {
            return Err(RecordError::AlreadyRecording);
        }
        if !self.config.dry_run {
            let task = self.config.task.clone();
            self.with_sink(|sink| sink.begin(&task))?;
        }

        self.shared.buffer.clear();
        self.shared.frames.store(0, Ordering::Release);
        *self.shared.origin.lock() = Instant::now();
        self.shared.recording.store(true, Ordering::Release);

        let (stop, stop_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let slot = Arc::clone(&self.sink);
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let Some(mut sink) = slot.lock().take() else {
                tracing::warn!("episode sink missing, sampler not started");
                return;
            };
            sample_loop(&shared, &config, sink.as_mut(), &stop_rx);
            *slot.lock() = Some(sink);
        });
        match spawn(thread::Builder::new().name("episode-sampler".into()), job) {
            Ok(handle) => {
                tracing::info!(
                    fps = self.config.fps,
                    task = %self.config.task,
                    dry_run = self.config.dry_run,
                    "episode recording started"
                );
                self.worker = Some(Worker { stop, handle });
                Ok(())
            }
            Err(e) => {
                // The job never ran, so the sink is still in its slot
                self.shared.recording.store(false, Ordering::Release);
                if !self.config.dry_run {
                    if let Err(de) = self.with_sink(|sink| sink.discard()) {
                        tracing::warn!(error = %de, "failed to discard unstarted episode");
                    }
                }
                Err(RecordError::Worker(e.to_string()))
            }
        }
    }

    fn with_sink<T>(&self, f: impl FnOnce(&mut dyn EpisodeSink) -> Result<T>) -> Result<T> {
        let mut slot = self.sink.lock();
        let sink = slot
            .as_mut()
            .ok_or_else(|| RecordError::Worker("episode sink lost with the sampler".into()))?;
        f(sink.as_mut())
    }

    /// Stop the sampler. False when nothing was recording.
    fn join(&mut self) -> Result<bool> {
        self.shared.recording.store(false, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return Ok(false);
        };
        let _ = worker.stop.send(());
        worker
            .handle
            .join()
            .map(|()| true)
            .map_err(|_| RecordError::Worker("sampling thread panicked".into()))
    }

    /// Stop sampling and save the episode. Dry runs and idle recorders
    /// return `None`.
    pub fn stop(&mut self) -> Result<Option<EpisodeSummary>> {
        if !self.join()? {
            return Ok(None);
        }
        let frames = self.frame_count();
        if self.config.dry_run {
            tracing::info!(frames, "dry run finished, nothing saved");
            return Ok(None);
        }
        let summary = self.with_sink(|sink| sink.finish())?;
        tracing::info!(
            frames = summary.frames,
            task = %summary.task,
            episode = ?summary.episode_index,
            "episode saved"
        );
        Ok(Some(summary))
    }

    /// Stop sampling and drop the episode.
    pub fn abort(&mut self) -> Result<()> {
        if !self.join()? {
            return Ok(());
        }
        let result = if self.config.dry_run {
            Ok(())
        } else {
            self.with_sink(|sink| sink.discard())
        };
        tracing::info!(frames = self.frame_count(), "episode aborted");
        result
    }

    pub fn add_robot_frame(&self, frame: Frame) {
        self.add_frame(CameraSlot::Robot, frame);
    }

    pub fn add_webcam_frame(&self, frame: Frame) {
        self.add_frame(CameraSlot::Webcam, frame);
    }

    fn add_frame(&self, slot: CameraSlot, frame: Frame) {
        if self.shared.recording.load(Ordering::Acquire) {
            self.shared
                .buffer
                .add_frame(slot, self.shared.now(), Arc::new(frame));
        }
    }

    pub fn add_command(&self, command: &RobotCommand) {
        CommandTap {
            shared: Arc::clone(&self.shared),
        }
        .record(command);
    }
}

impl Drop for EpisodeRecorder {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.abort() {
                tracing::warn!(error = %e, "failed to discard episode on drop");
            }
        }
    }
}

fn sample_loop(
    shared: &Shared,
    config: &EpisodeConfig,
    sink: &mut dyn EpisodeSink,
    stop: &mpsc::Receiver<()>,
) {
    let interval = 1.0 / f64::from(config.fps.max(1));
    let robot_black = Arc::new(Frame::black(config.robot_size.0, config.robot_size.1));
    let webcam_black = Arc::new(Frame::black(config.webcam_size.0, config.webcam_size.1));
    let mut last = 0.0;

    loop {
        let wait = (interval - (shared.now() - last)).max(0.0);
        match stop.recv_timeout(Duration::from_secs_f64(wait)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let now = shared.now();
        if now - last < interval {
            continue;
        }

        let index = shared.frames.fetch_add(1, Ordering::AcqRel);
        let robot = shared
            .buffer
            .frame_at(now, CameraSlot::Robot, config.robot_offset);
        let webcam = shared
            .buffer
            .frame_at(now, CameraSlot::Webcam, config.webcam_offset);
        let raw = shared.buffer.aggregate(last, now, &config.ranges);
        last = now;

        let sample = Sample {
            index,
            timestamp: now,
            robot_missing: robot.is_none(),
            webcam_missing: webcam.is_none(),
            robot: robot.unwrap_or_else(|| Arc::clone(&robot_black)),
            webcam: webcam.unwrap_or_else(|| Arc::clone(&webcam_black)),
            action: normalize_action(&raw, &config.ranges),
            raw,
        };

        if config.dry_run {
            if (index + 1) % 10 == 0 {
                tracing::info!(
                    frame = index + 1,
                    t = format_args!("{now:.3}"),
                    robot = !sample.robot_missing,
                    webcam = !sample.webcam_missing,
                    move_x = raw.move_x,
                    move_y = raw.move_y,
                    rotate_z = raw.rotate_z,
                    gripper_open = raw.gripper_open,
                    gripper_close = raw.gripper_close,
                    arm_recenter = raw.arm_recenter > 0.0,
                    "dry run sample"
                );
            }
        } else if let Err(e) = sink.write(&sample) {
            tracing::warn!(frame = index, error = %e, "failed to write sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Collect {
        samples: Arc<Mutex<Vec<Sample>>>,
        begun: Arc<AtomicBool>,
        discarded: Arc<AtomicBool>,
    }

    impl EpisodeSink for Collect {
        fn begin(&mut self, _task: &str) -> Result<()> {
            self.begun.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn write(&mut self, sample: &Sample) -> Result<()> {
            self.samples.lock().push(sample.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<EpisodeSummary> {
            Ok(EpisodeSummary {
                episode_index: Some(0),
                frames: self.samples.lock().len(),
                task: "t".into(),
                location: None,
            })
        }

        fn discard(&mut self) -> Result<()> {
            self.discarded.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Polls the sample counter; the deadline only bounds a hung sampler.
    fn wait_for_frames(rec: &EpisodeRecorder, n: usize) {
        let start = Instant::now();
        while rec.frame_count() < n && start.elapsed() < Duration::from_secs(10) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(rec.frame_count() >= n, "only {} samples", rec.frame_count());
    }

    fn config(dry_run: bool) -> EpisodeConfig {
        EpisodeConfig {
            fps: 50,
            robot_size: (4, 2),
            webcam_size: (2, 2),
            dry_run,
            ..EpisodeConfig::default()
        }
    }

    #[test]
    fn test_samples_frames_and_actions() {
        let sink = Collect::default();
        let mut rec = EpisodeRecorder::new(config(false), Box::new(sink.clone()));
        let tap = rec.command_tap();
        rec.start().unwrap();
        assert!(rec.start().is_err());
        rec.add_robot_frame(Frame::black(4, 2));
        tap.record(&RobotCommand::ChassisSpeed {
            vx: 0.6,
            vy: 0.0,
            vz: 0.0,
        });
        wait_for_frames(&rec, 3);
        let summary = rec.stop().unwrap().unwrap();
        assert!(sink.begun.load(Ordering::SeqCst));

        let samples = sink.samples.lock();
        assert!(summary.frames >= 3);
        assert_eq!(summary.frames, samples.len());
        assert!(samples.iter().all(|s| !s.robot_missing && s.webcam_missing));
        assert_eq!(samples[0].webcam.width, 2);
        let total: f64 = samples.iter().map(|s| s.raw.move_x).sum();
        assert!((total - 0.6).abs() < 1e-9);
        assert!(samples.iter().any(|s| s.action[0] == 0.5));
        assert!(samples.windows(2).all(|w| w[1].index == w[0].index + 1));
    }

    #[test]
    fn test_ignores_input_while_idle() {
        let rec = EpisodeRecorder::new(config(false), Box::new(NullSink::default()));
        rec.add_command(&RobotCommand::ArmRecenter);
        rec.add_robot_frame(Frame::black(4, 2));
        assert_eq!(rec.shared.buffer.command_count(), 0);
        assert_eq!(rec.shared.buffer.len(CameraSlot::Robot), 0);
    }

    #[test]
    fn test_abort_discards() {
        let sink = Collect::default();
        let mut rec = EpisodeRecorder::new(config(false), Box::new(sink.clone()));
        rec.start().unwrap();
        wait_for_frames(&rec, 1);
        rec.abort().unwrap();
        assert!(sink.discarded.load(Ordering::SeqCst));
        assert!(!rec.is_recording());
        assert!(rec.stop().unwrap().is_none());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let sink = Collect::default();
        let mut rec = EpisodeRecorder::new(config(true), Box::new(sink.clone()));
        rec.start().unwrap();
        wait_for_frames(&rec, 1);
        assert!(rec.stop().unwrap().is_none());
        assert!(rec.frame_count() > 0);
        assert!(sink.samples.lock().is_empty());
        assert!(!sink.begun.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_spawn_leaves_recorder_idle() {
        let sink = Collect::default();
        let mut rec = EpisodeRecorder::new(config(false), Box::new(sink.clone()));
        let err = rec
            .start_with(|_, _| Err(std::io::Error::other("no threads")))
            .unwrap_err();
        assert!(matches!(err, RecordError::Worker(_)));
        assert!(sink.begun.load(Ordering::SeqCst));
        assert!(sink.discarded.load(Ordering::SeqCst));
        assert!(!rec.is_recording());
        rec.add_robot_frame(Frame::black(4, 2));
        assert_eq!(rec.shared.buffer.len(CameraSlot::Robot), 0);

        // The sink came back, so a later start works
        rec.start().unwrap();
        wait_for_frames(&rec, 1);
        let summary = rec.stop().unwrap().unwrap();
        assert!(summary.frames >= 1);
    }
}
