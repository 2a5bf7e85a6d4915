//! Timestamped JSON command log with time-based and position-verified replay.

use crate::Result;
use parking_lot::Mutex;
use robot_driver::{ChassisPose, CommandSink, RobotCommand};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const FORMAT_VERSION: &str = "1.0";
/// Position tolerance for verified replay: metres in x/y, degrees in yaw.
pub const XY_TOLERANCE: f64 = 0.01;
pub const YAW_TOLERANCE: f64 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedCommand {
    /// Seconds since the recording started.
    pub time: f64,
    #[serde(flatten)]
    pub command: RobotCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_pos: Option<ChassisPose>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub version: String,
    pub recorded_at: String,
    pub duration: f64,
    pub command_count: usize,
    pub commands: Vec<RecordedCommand>,
}

impl Recording {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let rec = serde_json::from_reader(BufReader::new(file))?;
        Ok(rec)
    }
}

/// `recording_YYYYMMDD_HHMMSS.json` for the given instant.
pub fn default_recording_name(at: OffsetDateTime) -> String {
    format!(
        "recording_{:04}{:02}{:02}_{:02}{:02}{:02}.json",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Drop speed commands repeating the previous kept speed, and gripper commands
/// repeating the previous kept gripper action.
pub fn optimize(commands: &[RecordedCommand]) -> Vec<RecordedCommand> {
    let mut out: Vec<RecordedCommand> = Vec::with_capacity(commands.len());
    let mut last_speed: Option<(f64, f64, f64)> = None;
    let mut last_gripper: Option<&'static str> = None;
    for rc in commands {
        match &rc.command {
            RobotCommand::ChassisSpeed { vx, vy, vz } => {
                let key = (*vx, *vy, *vz);
                if last_speed == Some(key) {
                    continue;
                }
                last_speed = Some(key);
            }
            c if c.is_gripper() => {
                if last_gripper == Some(c.kind()) {
                    continue;
                }
                last_gripper = Some(c.kind());
            }
            _ => {}
        }
        out.push(rc.clone());
    }
    out
}

#[derive(Debug, Default)]
struct RecorderState {
    commands: Vec<RecordedCommand>,
    started: Option<Instant>,
    recording: bool,
    position: ChassisPose,
}

/// Collects commands while recording. Shared with a `RecordingDriver` as a sink.
#[derive(Debug)]
pub struct CommandRecorder {
    output: PathBuf,
    state: Mutex<RecorderState>,
}

impl CommandRecorder {
    pub fn new(output: Option<PathBuf>) -> Self {
        let output = output
            .unwrap_or_else(|| PathBuf::from(default_recording_name(OffsetDateTime::now_utc())));
        Self {
            output,
            state: Mutex::new(RecorderState::default()),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn start(&self) {
        let mut st = self.state.lock();
        st.commands.clear();
        st.started = Some(Instant::now());
        st.recording = true;
    }

    pub fn stop(&self) {
        self.state.lock().recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn update_position(&self, pose: ChassisPose) {
        self.state.lock().position = pose;
    }

    pub fn elapsed(&self) -> f64 {
        self.state
            .lock()
            .started
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.lock().commands.clone()
    }

    /// Build the file contents without writing them.
    pub fn to_recording(&self) -> Recording {
        let st = self.state.lock();
        let commands = optimize(&st.commands);
        Recording {
            version: FORMAT_VERSION.to_string(),
            recorded_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            duration: st.started.map_or(0.0, |t| t.elapsed().as_secs_f64()),
            command_count: commands.len(),
            commands,
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let rec = self.to_recording();
        let mut w = BufWriter::new(File::create(&self.output)?);
        serde_json::to_writer_pretty(&mut w, &rec)?;
        w.flush()?;
        tracing::info!(
            path = %self.output.display(),
            commands = rec.command_count,
            duration = rec.duration,
            "recording saved"
        );
        Ok(self.output.clone())
    }
}

impl CommandSink for CommandRecorder {
    fn record(&self, command: &RobotCommand) {
        let mut st = self.state.lock();
        if !st.recording {
            return;
        }
        let time = st.started.map_or(0.0, |t| t.elapsed().as_secs_f64());
        let expected_pos = match command {
            RobotCommand::ChassisSpeed { .. } | RobotCommand::ChassisMove { .. } => {
                Some(st.position)
            }
            _ => None,
        };
        st.commands.push(RecordedCommand {
            time,
            command: command.clone(),
            expected_pos,
        });
    }
}

/// Replays a [`Recording`].
#[derive(Debug)]
pub struct CommandPlayer {
    recording: Recording,
    index: usize,
    started: Option<Instant>,
    stopped: bool,
    position: ChassisPose,
}

impl CommandPlayer {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            index: 0,
            started: None,
            stopped: false,
            position: ChassisPose::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Recording::load(path)?))
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn len(&self) -> usize {
        self.recording.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.commands.is_empty()
    }

    /// Index of the next command to play.
    pub fn cursor(&self) -> usize {
        self.index
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.index = 0;
        self.stopped = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_playing(&self) -> bool {
        self.started.is_some() && !self.stopped && self.index < self.len()
    }

    pub fn elapsed(&self) -> f64 {
        self.started.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    pub fn progress(&self) -> f64 {
        self.progress_at(self.elapsed())
    }

    /// Percent of the recorded duration covered at `elapsed` seconds.
    pub fn progress_at(&self, elapsed: f64) -> f64 {
        if self.recording.duration <= 0.0 {
            return 100.0;
        }
        (elapsed / self.recording.duration * 100.0).min(100.0)
    }

    pub fn update_position(&mut self, pose: ChassisPose) {
        self.position = pose;
    }

    pub fn position(&self) -> ChassisPose {
        self.position
    }

    /// Commands due by now.
    pub fn pending(&mut self) -> Vec<RecordedCommand> {
        let now = self.elapsed();
        self.pending_at(now)
    }

    /// Commands whose time is at or before `elapsed`.
    pub fn pending_at(&mut self, elapsed: f64) -> Vec<RecordedCommand> {
        if !self.is_playing() {
            return Vec::new();
        }
        let mut out = Vec::new();
        while let Some(rc) = self.recording.commands.get(self.index) {
            if rc.time > elapsed {
                break;
            }
            out.push(rc.clone());
            self.index += 1;
        }
        out
    }

    pub fn position_reached(&self, expected: Option<&ChassisPose>) -> bool {
        let Some(exp) = expected else {
            return true;
        };
        let dx = (self.position.x - exp.x).abs();
        let dy = (self.position.y - exp.y).abs();
        let mut dz = (self.position.yaw - exp.yaw).abs();
        while dz > 180.0 {
            dz -= 360.0;
        }
        dx <= XY_TOLERANCE && dy <= XY_TOLERANCE && dz.abs() <= YAW_TOLERANCE
    }

    /// Next command once the robot is where it was when the command was recorded.
    pub fn next_verified(&mut self) -> Option<RecordedCommand> {
        if !self.is_playing() {
            return None;
        }
        let rc = self.recording.commands.get(self.index)?;
        if !self.position_reached(rc.expected_pos.as_ref()) {
            return None;
        }
        let rc = rc.clone();
        self.index += 1;
        Some(rc)
    }

    pub fn is_waiting_for_position(&self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.recording
            .commands
            .get(self.index)
            .is_some_and(|rc| !self.position_reached(rc.expected_pos.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(t: f64, vx: f64) -> RecordedCommand {
        RecordedCommand {
            time: t,
            command: RobotCommand::ChassisSpeed {
                vx,
                vy: 0.0,
                vz: 0.0,
            },
            expected_pos: Some(ChassisPose::default()),
        }
    }

    fn cmd(t: f64, command: RobotCommand) -> RecordedCommand {
        RecordedCommand {
            time: t,
            command,
            expected_pos: None,
        }
    }

    #[test]
    fn test_optimize_drops_repeats() {
        let cmds = vec![
            speed(0.0, 0.5),
            speed(0.1, 0.5),
            speed(0.2, 0.0),
            cmd(0.3, RobotCommand::GripperClose { power: 50 }),
            cmd(0.4, RobotCommand::GripperClose { power: 50 }),
            cmd(0.5, RobotCommand::GripperStop),
            speed(0.6, 0.0),
            cmd(0.7, RobotCommand::Stop),
            cmd(0.8, RobotCommand::Stop),
        ];
        let out = optimize(&cmds);
        let times: Vec<f64> = out.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![0.0, 0.2, 0.3, 0.5, 0.7, 0.8]);
    }

    #[test]
    fn test_recorder_only_while_recording() {
        let rec = CommandRecorder::new(Some(PathBuf::from("unused.json")));
        rec.record(&RobotCommand::Stop);
        assert!(rec.commands().is_empty());
        rec.start();
        rec.update_position(ChassisPose::new(1.0, 2.0, 30.0));
        rec.record(&RobotCommand::ChassisSpeed {
            vx: 0.1,
            vy: 0.0,
            vz: 0.0,
        });
        rec.record(&RobotCommand::ArmRecenter);
        rec.stop();
        rec.record(&RobotCommand::Stop);
        let cmds = rec.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].expected_pos, Some(ChassisPose::new(1.0, 2.0, 30.0)));
        assert!(cmds[1].expected_pos.is_none());
    }

    #[test]
    fn test_save_and_load_file_shape() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");
        let rec = CommandRecorder::new(Some(path.clone()));
        rec.start();
        rec.record(&RobotCommand::GripperOpen { power: 50 });
        rec.record(&RobotCommand::ChassisMove {
            x: 0.2,
            y: 0.0,
            z: 0.0,
            xy_speed: 0.5,
            z_speed: 60.0,
        });
        rec.save()?;

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["version"], "1.0");
        assert_eq!(raw["command_count"], 2);
        assert_eq!(raw["commands"][0]["type"], "gripper_open");
        assert_eq!(raw["commands"][1]["expected_pos"]["z"], 0.0);
        assert!(raw["commands"][0].get("expected_pos").is_none());

        let player = CommandPlayer::load(&path)?;
        assert_eq!(player.len(), 2);
        Ok(())
    }

    #[test]
    fn test_default_name() -> anyhow::Result<()> {
        let at = time::Date::from_calendar_date(2024, time::Month::March, 5)?
            .with_hms(7, 8, 9)?
            .assume_utc();
        assert_eq!(default_recording_name(at), "recording_20240305_070809.json");
        Ok(())
    }

    fn recording(commands: Vec<RecordedCommand>, duration: f64) -> Recording {
        Recording {
            version: FORMAT_VERSION.into(),
            recorded_at: String::new(),
            duration,
            command_count: commands.len(),
            commands,
        }
    }

    #[test]
    fn test_time_based_playback() {
        let mut p = CommandPlayer::new(recording(
            vec![speed(0.0, 0.1), speed(0.5, 0.2), speed(1.0, 0.0)],
            2.0,
        ));
        assert!(p.pending_at(10.0).is_empty());
        p.start();
        assert_eq!(p.pending_at(0.5).len(), 2);
        assert!(p.pending_at(0.7).is_empty());
        assert_eq!(p.pending_at(1.0).len(), 1);
        assert!(!p.is_playing());
        assert_eq!(p.progress_at(1.0), 50.0);
        assert_eq!(p.progress_at(5.0), 100.0);
    }

    #[test]
    fn test_position_verified_playback() {
        let mut first = speed(0.0, 0.3);
        first.expected_pos = Some(ChassisPose::new(0.5, 0.0, 179.5));
        let mut p = CommandPlayer::new(recording(
            vec![first, cmd(0.1, RobotCommand::ArmRecenter)],
            0.0,
        ));
        p.start();
        assert!(p.is_waiting_for_position());
        assert!(p.next_verified().is_none());
        p.update_position(ChassisPose::new(0.505, -0.004, -179.8));
        assert!(!p.is_waiting_for_position());
        assert!(p.next_verified().is_some());
        assert_eq!(
            p.next_verified().map(|c| c.command),
            Some(RobotCommand::ArmRecenter)
        );
        assert!(!p.is_playing());
        assert_eq!(p.progress(), 100.0);
    }
}
