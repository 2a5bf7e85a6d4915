//! `robomaster drive`: live driving, command-log recording and replay, and
//! dataset capture.

use crate::{Cli, DriveArgs};
use anyhow::{anyhow, Context, Result};
use gamepad::{Gamepad, GilrsGamepad};
use robot_driver::{RecordingDriver, RobotDriver, SimDriver, StreamResolution, TextSdkDriver};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use teleop::{
    run_drive, run_replay, DriveMode, DriveSession, FrameView, ReplayMode, ReplaySession,
    StopReason, TeleopConfig, TeleopMetrics,
};
use teleop_record::{
    CommandPlayer, CommandRecorder, DatasetWriter, EpisodeRecorder, EpisodeSink, NullSink,
};
use vision::CameraSource;

/// Pose pushes are needed at least this often while logging commands.
const RECORD_TELEMETRY_HZ: u32 = 10;

pub fn run(cli: &Cli, cfg: &TeleopConfig, args: &DriveArgs, quit: &AtomicBool) -> Result<()> {
    let mode = DriveMode::from(args.mode);
    let resolution = args
        .resolution
        .map_or(cfg.robot_video.default_resolution, StreamResolution::from);

    let mut pad = GilrsGamepad::open(args.gamepad).context("opening controller")?;
    println!("Controller: {}", pad.name());

    let metrics = if args.metrics {
        Some(TeleopMetrics::new().map_err(|e| anyhow!(e))?)
    } else {
        None
    };

    let mut base: Box<dyn RobotDriver> = if args.simu {
        println!("Simulation mode, no robot connection");
        Box::new(SimDriver::new())
    } else {
        Box::new(TextSdkDriver::new(crate::sdk_config(cli, cfg)?))
    };
    base.connect().context("connecting to robot")?;
    if let Some(b) = base.status().battery {
        println!("Battery: {b}%");
    }

    let show_video = !args.no_video;
    if show_video {
        if let Err(e) = base.start_video(resolution) {
            tracing::warn!(error = %e, "robot video unavailable");
        }
    }
    let mut viewer = open_viewer(show_video)?;

    let (mut base, outcome) = if let Some(path) = &args.replay {
        let out = replay(
            cfg,
            args,
            &mut base,
            &mut pad,
            viewer.as_mut(),
            metrics.as_ref(),
            path,
            quit,
        );
        (base, out)
    } else {
        let mut driver = RecordingDriver::new(base);
        let out = drive(
            cfg,
            args,
            mode,
            resolution,
            &mut driver,
            &mut pad,
            viewer,
            metrics.as_ref(),
            quit,
        );
        (driver.into_inner(), out)
    };
    let shutdown = shutdown(&mut base);

    if let Some(m) = &metrics {
        print!("{}", m.encode_text());
    }
    outcome?;
    shutdown
}

#[cfg(feature = "opencv")]
type Viewer = vision::Viewer;

#[cfg(feature = "opencv")]
fn open_viewer(show: bool) -> Result<Option<Viewer>> {
    if !show {
        return Ok(None);
    }
    let viewer = Viewer::new("RoboMaster Drive")?;
    viewer.move_to(50, 100)?;
    Ok(Some(viewer))
}

/// Stand-in when no window backend is compiled in; never constructed.
#[cfg(not(feature = "opencv"))]
enum Viewer {}

#[cfg(not(feature = "opencv"))]
impl FrameView for Viewer {
    fn show(&mut self, _frame: &vision::Frame, _lines: &[String]) -> teleop::Result<()> {
        match *self {}
    }

    fn quit_requested(&mut self) -> teleop::Result<bool> {
        match *self {}
    }
}

#[cfg(not(feature = "opencv"))]
fn open_viewer(show: bool) -> Result<Option<Viewer>> {
    if show {
        tracing::info!("built without `opencv`, no video window");
    }
    Ok(None)
}

#[cfg(feature = "opencv")]
fn open_webcam(cfg: &TeleopConfig) -> Option<Box<dyn CameraSource>> {
    use vision::{CaptureHints, OpenCvCamera};

    let hints = CaptureHints {
        width: Some(cfg.webcam.width),
        height: Some(cfg.webcam.height),
        fps: Some(cfg.webcam.fps),
    };
    let index = cfg.webcam.device_index;
    match OpenCvCamera::open_with(&index.to_string(), hints) {
        Ok(cam) => {
            println!("Webcam {index} opened");
            Some(Box::new(cam))
        }
        Err(e) => {
            tracing::warn!(index, error = %e, "webcam unavailable, episodes get black frames");
            None
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn open_webcam(_cfg: &TeleopConfig) -> Option<Box<dyn CameraSource>> {
    tracing::warn!("built without `opencv`, episodes get black webcam frames");
    None
}

#[allow(clippy::too_many_arguments)]
fn replay(
    cfg: &TeleopConfig,
    args: &DriveArgs,
    driver: &mut Box<dyn RobotDriver>,
    pad: &mut GilrsGamepad,
    viewer: Option<&mut Viewer>,
    metrics: Option<&TeleopMetrics>,
    path: &std::path::Path,
    quit: &AtomicBool,
) -> Result<()> {
    let mut player = CommandPlayer::load(path)
        .with_context(|| format!("loading recording {}", path.display()))?;
    let rec = player.recording();
    println!(
        "Loaded {}: {} commands over {:.1}s (recorded {})",
        path.display(),
        rec.command_count,
        rec.duration,
        if rec.recorded_at.is_empty() {
            "unknown"
        } else {
            rec.recorded_at.as_str()
        }
    );
    driver
        .subscribe_telemetry(cfg.telemetry.frequency.max(RECORD_TELEMETRY_HZ))
        .context("subscribing to position pushes")?;
    if args.telemetry {
        tracing::info!("telemetry overlay is not shown during replay");
    }
    println!("Replaying. Press B for emergency stop");

    let mode = if args.time_based {
        ReplayMode::TimeBased
    } else {
        ReplayMode::PositionVerified
    };
    println!("Replay mode: {mode:?}");
    let mut session = ReplaySession::new(cfg, mode, quit);
    session.metrics = metrics;
    session.view = viewer.map(|v| v as &mut dyn FrameView);
    let outcome = run_replay(driver, pad, &mut player, session)?;
    if outcome.completed {
        println!("Replay completed ({} commands)", outcome.executed);
    } else {
        println!(
            "Replay stopped after {}/{} commands",
            outcome.executed, outcome.total
        );
    }
    Ok(())
}

/// Live loop with the optional command log and dataset episode attached.
#[allow(clippy::too_many_arguments)]
fn drive(
    cfg: &TeleopConfig,
    args: &DriveArgs,
    mode: DriveMode,
    resolution: StreamResolution,
    driver: &mut RecordingDriver<Box<dyn RobotDriver>>,
    pad: &mut GilrsGamepad,
    mut viewer: Option<Viewer>,
    metrics: Option<&TeleopMetrics>,
    quit: &AtomicBool,
) -> Result<()> {
    let recorder = args
        .record
        .as_ref()
        .map(|path| Arc::new(CommandRecorder::new(path.clone())));
    if let Some(rec) = &recorder {
        driver.add_sink(rec.clone());
    }

    let mut episode = if args.dataset {
        Some(open_episode(cfg, args, resolution)?)
    } else {
        None
    };
    if let Some(ep) = &episode {
        driver.add_sink(ep.command_tap());
    }
    let mut webcam = if episode.is_some() {
        open_webcam(cfg)
    } else {
        None
    };

    let telemetry_hz = if recorder.is_some() {
        cfg.telemetry.frequency.max(RECORD_TELEMETRY_HZ)
    } else {
        cfg.telemetry.frequency
    };
    if args.telemetry || recorder.is_some() {
        if let Err(e) = driver.subscribe_telemetry(telemetry_hz) {
            tracing::warn!(error = %e, "telemetry unavailable");
        }
    }

    print_controls(mode, recorder.is_some() || episode.is_some());
    // Episode first: if it cannot start, no command log is open yet
    if let Some(ep) = episode.as_mut() {
        ep.start().context("starting episode")?;
        println!("Recording episode: {}", ep.config().task);
    }
    if let Some(rec) = &recorder {
        rec.start();
        println!("Recording commands to {}", rec.output_path().display());
    }

    let mut session = DriveSession::new(cfg, mode, quit);
    session.view = viewer.as_mut().map(|v| v as &mut dyn FrameView);
    session.webcam = webcam.as_deref_mut().map(|c| c as &mut dyn CameraSource);
    session.episode = episode.as_ref();
    session.recorder = recorder.as_deref();
    session.stop_on_b = recorder.is_some() || episode.is_some();
    session.show_telemetry = args.telemetry;
    session.metrics = metrics;
    let reason = run_drive(driver, pad, session);

    let gamepad_lost = matches!(reason, Ok(StopReason::GamepadLost));
    let closed = finish_recordings(episode.as_mut(), recorder.as_deref(), gamepad_lost);
    if let (Err(_), Err(e)) = (&reason, &closed) {
        tracing::error!(error = ?e, "closing recordings failed");
    }
    let reason = reason?;
    closed?;
    tracing::info!(?reason, "drive finished");
    Ok(())
}

/// Close the episode and the command log. Both are always attempted; the
/// first failure is returned.
fn finish_recordings(
    episode: Option<&mut EpisodeRecorder>,
    recorder: Option<&CommandRecorder>,
    gamepad_lost: bool,
) -> Result<()> {
    let episode_done = episode.map_or(Ok(()), |ep| finish_episode(ep, gamepad_lost));
    let log_done = recorder.map_or(Ok(()), |rec| -> Result<()> {
        rec.stop();
        let path = rec.save().context("saving command log")?;
        println!("Saved {} commands to {}", rec.commands().len(), path.display());
        Ok(())
    });
    if let (Err(_), Err(e)) = (&episode_done, &log_done) {
        tracing::error!(error = ?e, "command log not saved");
    }
    episode_done.and(log_done)
}

fn finish_episode(ep: &mut EpisodeRecorder, gamepad_lost: bool) -> Result<()> {
    if gamepad_lost {
        ep.abort().context("discarding episode")?;
        println!("Controller lost, episode discarded");
    } else if let Some(summary) = ep.stop().context("finishing episode")? {
        match (&summary.location, summary.episode_index) {
            (Some(dir), Some(index)) => println!(
                "Saved episode {index} ({} frames) to {}",
                summary.frames,
                dir.display()
            ),
            _ => println!("Dry run: {} frames sampled", summary.frames),
        }
    }
    Ok(())
}

fn open_episode(
    cfg: &TeleopConfig,
    args: &DriveArgs,
    resolution: StreamResolution,
) -> Result<EpisodeRecorder> {
    let ep_cfg = cfg.episode_config(resolution, args.fps, args.task.as_deref(), args.dry_run);
    let sink: Box<dyn EpisodeSink> = if args.dry_run {
        Box::new(NullSink::default())
    } else {
        let writer = DatasetWriter::open(
            &cfg.dataset.root,
            &cfg.dataset.name,
            ep_cfg.fps,
            ep_cfg.robot_size,
            ep_cfg.webcam_size,
        )
        .context("opening dataset")?;
        println!("Dataset: {}", writer.path().display());
        Box::new(writer)
    };
    Ok(EpisodeRecorder::new(ep_cfg, sink))
}

fn print_controls(mode: DriveMode, recording: bool) {
    println!("\nControls ({mode} mode):");
    println!("  Left stick   forward / strafe");
    println!("  Right stick  rotate");
    println!("  A            boost");
    println!("  X            toggle LED feedback");
    println!("  D-pad        move arm");
    println!("  Y            recenter arm");
    println!("  LB / RB      close / open gripper");
    if recording {
        println!("  B            stop recording");
    }
    println!("  Ctrl-C       quit\n");
}

/// Best-effort cleanup; the first failure is reported after every step ran.
fn shutdown(driver: &mut Box<dyn RobotDriver>) -> Result<()> {
    if let Err(e) = driver.stop_video() {
        tracing::debug!(error = %e, "stop video");
    }
    if let Err(e) = driver.unsubscribe_telemetry() {
        tracing::debug!(error = %e, "unsubscribe telemetry");
    }
    driver.disconnect().context("disconnecting")?;
    println!("Disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_driver::{CommandSink, RobotCommand};
    use teleop_record::{EpisodeConfig, EpisodeSummary, RecordError, Sample};

    /// Accepts samples but cannot save them.
    struct DiskFull;

    impl EpisodeSink for DiskFull {
        fn begin(&mut self, _task: &str) -> teleop_record::Result<()> {
            Ok(())
        }

        fn write(&mut self, _sample: &Sample) -> teleop_record::Result<()> {
            Ok(())
        }

        fn finish(&mut self) -> teleop_record::Result<EpisodeSummary> {
            Err(RecordError::Io(std::io::Error::other("disk full")))
        }

        fn discard(&mut self) -> teleop_record::Result<()> {
            Ok(())
        }
    }

    fn small_episode(sink: Box<dyn EpisodeSink>) -> EpisodeRecorder {
        EpisodeRecorder::new(
            EpisodeConfig {
                fps: 50,
                robot_size: (4, 2),
                webcam_size: (2, 2),
                ..EpisodeConfig::default()
            },
            sink,
        )
    }

    #[test]
    fn test_command_log_saved_when_episode_fails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");
        let rec = CommandRecorder::new(Some(path.clone()));
        let mut ep = small_episode(Box::new(DiskFull));
        ep.start()?;
        rec.start();
        rec.record(&RobotCommand::ArmRecenter);

        let err = finish_recordings(Some(&mut ep), Some(&rec), false).unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));
        assert!(!ep.is_recording());
        assert!(!rec.is_recording());
        let saved = CommandPlayer::load(&path)?;
        assert_eq!(saved.recording().command_count, 1);
        Ok(())
    }

    #[test]
    fn test_lost_gamepad_discards_episode_and_keeps_log() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");
        let rec = CommandRecorder::new(Some(path.clone()));
        let mut ep = small_episode(Box::new(DiskFull));
        ep.start()?;
        rec.start();

        finish_recordings(Some(&mut ep), Some(&rec), true)?;
        assert!(!ep.is_recording());
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_log_save_failure_reported() {
        let rec = CommandRecorder::new(Some("/nonexistent-dir/session.json".into()));
        rec.start();
        let err = finish_recordings(None, Some(&rec), false).unwrap_err();
        assert!(format!("{err:#}").contains("saving command log"));
        assert!(finish_recordings(None, None, false).is_ok());
    }
}
