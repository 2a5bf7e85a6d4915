//! Joystick drive loop.

use crate::config::TeleopConfig;
use crate::control::{Controller, DriveMode, GripperAction};
use crate::metrics::TeleopMetrics;
use crate::telemetry_report::report_lines;
use crate::Result;
use gamepad::{Gamepad, GamepadError, JoystickState};
use robot_driver::RobotDriver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use teleop_record::{CommandRecorder, EpisodeRecorder};
use vision::{CameraSource, Frame};

const TELEMETRY_LOG_PERIOD: Duration = Duration::from_secs(1);

/// Window the loops draw video into.
pub trait FrameView {
    fn show(&mut self, frame: &Frame, lines: &[String]) -> Result<()>;

    /// Poll the window's keyboard; true when a quit key was pressed.
    fn quit_requested(&mut self) -> Result<bool>;
}

#[cfg(feature = "opencv")]
impl FrameView for vision::Viewer {
    fn show(&mut self, frame: &Frame, lines: &[String]) -> Result<()> {
        vision::Viewer::show(self, frame, lines)?;
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool> {
        Ok(vision::Viewer::poll_key(1)? == vision::Key::Quit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C or another external request.
    Interrupted,
    /// B pressed while recording.
    StopButton,
    QuitKey,
    GamepadLost,
    TickLimit,
}

/// Everything the drive loop reads besides the driver and the gamepad.
pub struct DriveSession<'a> {
    pub config: &'a TeleopConfig,
    pub mode: DriveMode,
    pub quit: &'a AtomicBool,
    pub view: Option<&'a mut dyn FrameView>,
    pub webcam: Option<&'a mut dyn CameraSource>,
    pub episode: Option<&'a EpisodeRecorder>,
    /// Receives the chassis pose every tick so logged commands carry it.
    pub recorder: Option<&'a CommandRecorder>,
    /// B ends the session (set while recording).
    pub stop_on_b: bool,
    pub show_telemetry: bool,
    pub metrics: Option<&'a TeleopMetrics>,
    pub max_ticks: Option<u64>,
}

impl<'a> DriveSession<'a> {
    pub fn new(config: &'a TeleopConfig, mode: DriveMode, quit: &'a AtomicBool) -> Self {
        Self {
            config,
            mode,
            quit,
            view: None,
            webcam: None,
            episode: None,
            recorder: None,
            stop_on_b: false,
            show_telemetry: false,
            metrics: None,
            max_ticks: None,
        }
    }
}

fn overlay(
    state: &JoystickState,
    mode: DriveMode,
    arm_status: &str,
    recording: Option<usize>,
) -> Vec<String> {
    let mut lines = vec![
        format!("L: ({:.1}, {:.1})", state.left_x, state.left_y),
        format!("R: ({:.1}, {:.1})", state.right_x, state.right_y),
        format!("Mode: {mode}{}", if state.a { " [BOOST]" } else { "" }),
        format!("Arm: {arm_status}"),
        format!(
            "Triggers: L={:.1} R={:.1}",
            state.left_trigger, state.right_trigger
        ),
        format!("Gripper: {}", GripperAction::from_state(state).label()),
    ];
    if let Some(frames) = recording {
        lines.push(format!("REC {frames} frames"));
    }
    lines
}

/// Stop the chassis, release the gripper and switch the LEDs off.
pub(crate) fn safe_stop<D: RobotDriver + ?Sized>(driver: &mut D) {
    if let Err(e) = driver.stop() {
        tracing::warn!(error = %e, "failed to stop chassis");
    }
    if let Err(e) = driver.gripper_stop() {
        tracing::warn!(error = %e, "failed to stop gripper");
    }
    if let Err(e) = driver.led_off() {
        tracing::warn!(error = %e, "failed to switch LEDs off");
    }
}

pub(crate) fn pace(started: Instant, period: Duration, metrics: Option<&TeleopMetrics>) {
    let spent = started.elapsed();
    if spent < period {
        thread::sleep(period - spent);
    } else if let Some(m) = metrics {
        m.loop_overruns.inc();
    }
}

/// Run until a stop condition; the robot is always brought to rest on return.
pub fn run_drive<D, G>(driver: &mut D, pad: &mut G, mut session: DriveSession<'_>) -> Result<StopReason>
where
    D: RobotDriver + ?Sized,
    G: Gamepad + ?Sized,
{
    let cfg = session.config;
    let map = cfg.controller.map();
    let period = Duration::from_secs_f64(1.0 / f64::from(cfg.movement.loop_hz.max(1)));
    let mut controller = Controller::new(session.mode, cfg.movement.clone(), cfg.arm.clone());
    let mut ticks = 0u64;
    let mut last_report = Instant::now();
    let metrics = session.metrics;

    tracing::info!(mode = %session.mode, hz = cfg.movement.loop_hz, "drive loop started");
    let reason = loop {
        let started = Instant::now();
        if session.quit.load(Ordering::Relaxed) {
            break StopReason::Interrupted;
        }
        if let Some(limit) = session.max_ticks {
            if ticks >= limit {
                break StopReason::TickLimit;
            }
        }
        ticks += 1;
        if let Some(m) = metrics {
            m.loop_ticks.inc();
        }

        if let Err(e) = driver.poll() {
            tracing::warn!(error = %e, "driver poll failed");
        }
        if let Some(rec) = session.recorder {
            rec.update_position(driver.position());
        }

        let state = match pad.state(&map, cfg.controller.deadzone) {
            Ok(s) => s,
            Err(GamepadError::Disconnected) => {
                tracing::error!("gamepad disconnected");
                break StopReason::GamepadLost;
            }
            Err(e) => {
                tracing::warn!(error = %e, "gamepad read failed");
                JoystickState::default()
            }
        };

        controller.tick(&state, driver, metrics);

        let telemetry = if session.show_telemetry {
            report_lines(&driver.telemetry(), cfg.telemetry.frequency)
        } else {
            Vec::new()
        };
        if session.show_telemetry && last_report.elapsed() >= TELEMETRY_LOG_PERIOD {
            last_report = Instant::now();
            for line in &telemetry {
                tracing::info!(target: "telemetry", "{line}");
            }
        }

        if session.view.is_some() || session.episode.is_some() {
            if let Some(frame) = driver.video_frame() {
                if let Some(m) = metrics {
                    m.video_frames.inc();
                }
                if let Some(view) = session.view.as_deref_mut() {
                    let mut lines = overlay(
                        &state,
                        session.mode,
                        &driver.status().arm_status,
                        session.episode.map(EpisodeRecorder::frame_count),
                    );
                    lines.extend(telemetry.iter().cloned());
                    if let Err(e) = view.show(&frame, &lines) {
                        tracing::warn!(error = %e, "failed to show frame");
                    }
                }
                if let Some(ep) = session.episode {
                    ep.add_robot_frame(frame);
                }
            }
        }

        if let Some(ep) = session.episode {
            if let Some(cam) = session.webcam.as_deref_mut() {
                match cam.read() {
                    Ok(frame) => ep.add_webcam_frame(frame),
                    Err(e) => tracing::debug!(error = %e, "webcam read failed"),
                }
            }
            if let Some(m) = metrics {
                m.episode_frames.set(ep.frame_count() as i64);
            }
        }

        if session.stop_on_b && state.b {
            tracing::info!("stop button pressed");
            break StopReason::StopButton;
        }
        if let Some(view) = session.view.as_deref_mut() {
            match view.quit_requested() {
                Ok(true) => break StopReason::QuitKey,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "key poll failed"),
            }
        }

        pace(started, period, metrics);
    };

    tracing::info!(?reason, ticks, "stopping robot");
    safe_stop(driver);
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamepad::{RawInput, ScriptedGamepad};
    use robot_driver::{LedColor, RecordingDriver, SimDriver};
    use teleop_record::{EpisodeConfig, NullSink};
    use vision::MockCamera;

    fn fast_config() -> TeleopConfig {
        let mut cfg = TeleopConfig::default();
        cfg.movement.loop_hz = 200;
        cfg
    }

    fn raw(axes: [f32; 6], buttons: &[usize]) -> RawInput {
        let mut b = vec![false; 11];
        for i in buttons {
            b[*i] = true;
        }
        RawInput {
            axes: axes.to_vec(),
            buttons: b,
            hat: (0, 0),
        }
    }

    const REST: [f32; 6] = [0.0, 0.0, -1.0, 0.0, 0.0, -1.0];
    const FORWARD: [f32; 6] = [0.0, -1.0, -1.0, 0.0, 0.0, -1.0];

    #[derive(Default)]
    struct CountingView {
        shown: usize,
        quit_after: Option<usize>,
    }

    impl FrameView for CountingView {
        fn show(&mut self, _frame: &Frame, lines: &[String]) -> Result<()> {
            assert!(lines[0].starts_with("L: "));
            self.shown += 1;
            Ok(())
        }

        fn quit_requested(&mut self) -> Result<bool> {
            Ok(self.quit_after.is_some_and(|n| self.shown >= n))
        }
    }

    #[test]
    fn test_moves_and_cleans_up() {
        let cfg = fast_config();
        let quit = AtomicBool::new(false);
        let mut sim = SimDriver::new();
        sim.connect().unwrap();
        let mut pad = ScriptedGamepad::new(vec![raw(FORWARD, &[0]); 20]);
        let mut session = DriveSession::new(&cfg, DriveMode::Continuous, &quit);
        session.max_ticks = Some(20);
        let reason = run_drive(&mut sim, &mut pad, session).unwrap();
        assert_eq!(reason, StopReason::TickLimit);
        assert!(sim.pose().x > 0.0);
        assert_eq!(sim.led(), LedColor::OFF);
        let x = sim.pose().x;
        sim.step(1.0);
        assert_eq!(sim.pose().x, x);
    }

    #[test]
    fn test_quit_flag_and_stop_button() {
        let cfg = fast_config();
        let quit = AtomicBool::new(true);
        let mut sim = SimDriver::new();
        sim.connect().unwrap();
        let mut pad = ScriptedGamepad::new(vec![raw(REST, &[])]);
        let reason = run_drive(&mut sim, &mut pad, DriveSession::new(&cfg, DriveMode::Step, &quit));
        assert_eq!(reason.unwrap(), StopReason::Interrupted);
        assert_eq!(pad.polls(), 0);

        let quit = AtomicBool::new(false);
        let mut pad = ScriptedGamepad::new(vec![raw(REST, &[]), raw(REST, &[1])]);
        let mut session = DriveSession::new(&cfg, DriveMode::Step, &quit);
        session.stop_on_b = true;
        session.max_ticks = Some(50);
        let reason = run_drive(&mut sim, &mut pad, session).unwrap();
        assert_eq!(reason, StopReason::StopButton);
        assert_eq!(pad.polls(), 2);
    }

    #[test]
    fn test_video_and_episode_feed() {
        let cfg = fast_config();
        let quit = AtomicBool::new(false);
        let mut sim = SimDriver::new();
        sim.connect().unwrap();
        sim.start_video(robot_driver::StreamResolution::P360).unwrap();
        let mut drv = RecordingDriver::new(sim);

        let ep_cfg = EpisodeConfig {
            fps: 100,
            dry_run: true,
            ..EpisodeConfig::default()
        };
        let mut episode = EpisodeRecorder::new(ep_cfg, Box::new(NullSink::default()));
        drv.add_sink(episode.command_tap());
        episode.start().unwrap();

        let mut view = CountingView {
            quit_after: Some(5),
            ..CountingView::default()
        };
        let mut webcam = MockCamera::with_size(8, 8);
        let mut pad = ScriptedGamepad::new(vec![raw(FORWARD, &[])]);
        let mut session = DriveSession::new(&cfg, DriveMode::Continuous, &quit);
        session.view = Some(&mut view);
        session.webcam = Some(&mut webcam);
        session.episode = Some(&episode);
        session.show_telemetry = true;
        session.max_ticks = Some(100);
        let reason = run_drive(&mut drv, &mut pad, session).unwrap();
        episode.stop().unwrap();

        assert_eq!(reason, StopReason::QuitKey);
        assert_eq!(view.shown, 5);
        assert_eq!(webcam.frames_read(), 5);
    }

    #[test]
    fn test_recorder_tracks_pose() {
        let cfg = fast_config();
        let quit = AtomicBool::new(false);
        let mut sim = SimDriver::new();
        sim.connect().unwrap();
        let mut drv = RecordingDriver::new(sim);
        let recorder = std::sync::Arc::new(CommandRecorder::new(Some("unused.json".into())));
        drv.add_sink(recorder.clone());
        recorder.start();

        let mut pad = ScriptedGamepad::new(vec![raw(FORWARD, &[]); 30]);
        let mut session = DriveSession::new(&cfg, DriveMode::Continuous, &quit);
        session.recorder = Some(&recorder);
        session.max_ticks = Some(30);
        run_drive(&mut drv, &mut pad, session).unwrap();
        recorder.stop();

        let last_speed = recorder
            .commands()
            .into_iter()
            .filter(|c| matches!(c.command, robot_driver::RobotCommand::ChassisSpeed { .. }))
            .last()
            .unwrap();
        assert!(last_speed.expected_pos.unwrap().x > 0.0);
    }
}
