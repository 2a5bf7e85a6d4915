//! Replay of a recorded command log with a joystick emergency stop.

use crate::config::TeleopConfig;
use crate::drive::{pace, safe_stop, FrameView};
use crate::metrics::TeleopMetrics;
use crate::Result;
use gamepad::{Gamepad, GamepadError};
use robot_driver::RobotDriver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use teleop_record::{CommandPlayer, RecordedCommand};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayMode {
    /// Each command waits until the robot is back where it was recorded.
    #[default]
    PositionVerified,
    /// Commands fire at their recorded times.
    TimeBased,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub completed: bool,
    pub executed: usize,
    pub total: usize,
}

pub struct ReplaySession<'a> {
    pub config: &'a TeleopConfig,
    pub mode: ReplayMode,
    pub quit: &'a AtomicBool,
    pub view: Option<&'a mut dyn FrameView>,
    pub metrics: Option<&'a TeleopMetrics>,
    /// Give up after this long; `None` waits for the recording to finish.
    pub timeout: Option<Duration>,
}

impl<'a> ReplaySession<'a> {
    pub fn new(config: &'a TeleopConfig, mode: ReplayMode, quit: &'a AtomicBool) -> Self {
        Self {
            config,
            mode,
            quit,
            view: None,
            metrics: None,
            timeout: None,
        }
    }
}

fn execute<D: RobotDriver + ?Sized>(
    rc: &RecordedCommand,
    driver: &mut D,
    metrics: Option<&TeleopMetrics>,
) {
    match rc.command.apply(driver) {
        Ok(true) => {
            tracing::debug!(t = rc.time, command = rc.command.kind(), "replayed");
            if let Some(m) = metrics {
                m.commands_sent.inc();
            }
        }
        Ok(false) => {
            tracing::warn!(t = rc.time, command = rc.command.kind(), "robot busy, command skipped")
        }
        Err(e) => {
            tracing::warn!(t = rc.time, command = rc.command.kind(), error = %e, "replay command failed");
            if let Some(m) = metrics {
                m.driver_errors.inc();
            }
        }
    }
}

fn overlay(player: &CommandPlayer) -> Vec<String> {
    let pos = player.position();
    let mut lines = vec![
        "REPLAY MODE".to_string(),
        format!(
            "Progress: {:.0}% ({:.1}s / {:.1}s)",
            player.progress(),
            player.elapsed(),
            player.recording().duration
        ),
        format!("Commands: {}/{}", player.cursor(), player.len()),
        format!("Pos: x={:.2}m y={:.2}m z={:.1}deg", pos.x, pos.y, pos.yaw),
    ];
    if player.is_waiting_for_position() {
        lines.push("Waiting for position...".to_string());
    }
    lines.push("Press B for EMERGENCY STOP".to_string());
    lines
}

/// Play `player` on `driver`. B, Ctrl-C, a quit key or the timeout end the
/// replay early; the robot is always brought to rest.
pub fn run_replay<D, G>(
    driver: &mut D,
    pad: &mut G,
    player: &mut CommandPlayer,
    mut session: ReplaySession<'_>,
) -> Result<ReplayOutcome>
where
    D: RobotDriver + ?Sized,
    G: Gamepad + ?Sized,
{
    let cfg = session.config;
    let map = cfg.controller.map();
    let period = Duration::from_secs_f64(1.0 / f64::from(cfg.movement.loop_hz.max(1)));
    let metrics = session.metrics;
    let begin = Instant::now();
    let mut executed = 0usize;
    let mut stopped_early = false;

    tracing::info!(
        commands = player.len(),
        duration = player.recording().duration,
        mode = ?session.mode,
        "replay started"
    );
    player.start();

    while player.is_playing() {
        let started = Instant::now();
        if session.quit.load(Ordering::Relaxed) {
            stopped_early = true;
            break;
        }
        if session.timeout.is_some_and(|t| begin.elapsed() >= t) {
            tracing::warn!("replay timed out");
            stopped_early = true;
            break;
        }
        if let Some(m) = metrics {
            m.loop_ticks.inc();
        }
        if let Err(e) = driver.poll() {
            tracing::warn!(error = %e, "driver poll failed");
        }
        player.update_position(driver.position());

        match pad.state(&map, cfg.controller.deadzone) {
            Ok(state) if state.b => {
                tracing::warn!("emergency stop");
                stopped_early = true;
                break;
            }
            Ok(_) => {}
            Err(GamepadError::Disconnected) => {
                tracing::error!("gamepad disconnected, stopping replay");
                stopped_early = true;
                break;
            }
            Err(e) => tracing::warn!(error = %e, "gamepad read failed"),
        }

        match session.mode {
            ReplayMode::PositionVerified => {
                if let Some(rc) = player.next_verified() {
                    execute(&rc, driver, metrics);
                    executed += 1;
                }
            }
            ReplayMode::TimeBased => {
                for rc in player.pending() {
                    execute(&rc, driver, metrics);
                    executed += 1;
                }
            }
        }

        if let Some(view) = session.view.as_deref_mut() {
            if let Some(frame) = driver.video_frame() {
                if let Err(e) = view.show(&frame, &overlay(player)) {
                    tracing::warn!(error = %e, "failed to show frame");
                }
            }
            match view.quit_requested() {
                Ok(true) => {
                    stopped_early = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "key poll failed"),
            }
        }

        pace(started, period, metrics);
    }

    player.stop();
    safe_stop(driver);
    let outcome = ReplayOutcome {
        completed: !stopped_early,
        executed,
        total: player.len(),
    };
    if outcome.completed {
        tracing::info!(executed, "replay completed");
    } else {
        tracing::info!(executed, total = outcome.total, "replay stopped early");
    }
    Ok(outcome)
}
