use crate::{
    Capabilities, ChassisPose, CommandSink, LedColor, Result, RobotDriver, RobotStatus,
    StreamResolution, TelemetrySnapshot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vision::Frame;

fn default_xy_speed() -> f64 {
    0.5
}

fn default_z_speed() -> f64 {
    60.0
}

fn default_power() -> u8 {
    50
}

/// A motion command as it is recorded and replayed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    ChassisSpeed {
        vx: f64,
        vy: f64,
        vz: f64,
    },
    ChassisMove {
        x: f64,
        y: f64,
        z: f64,
        #[serde(default = "default_xy_speed")]
        xy_speed: f64,
        #[serde(default = "default_z_speed")]
        z_speed: f64,
    },
    Stop,
    ArmMove {
        x: f64,
        y: f64,
    },
    ArmRecenter,
    GripperOpen {
        #[serde(default = "default_power")]
        power: u8,
    },
    GripperClose {
        #[serde(default = "default_power")]
        power: u8,
    },
    GripperStop,
}

impl RobotCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            RobotCommand::ChassisSpeed { .. } => "chassis_speed",
            RobotCommand::ChassisMove { .. } => "chassis_move",
            RobotCommand::Stop => "stop",
            RobotCommand::ArmMove { .. } => "arm_move",
            RobotCommand::ArmRecenter => "arm_recenter",
            RobotCommand::GripperOpen { .. } => "gripper_open",
            RobotCommand::GripperClose { .. } => "gripper_close",
            RobotCommand::GripperStop => "gripper_stop",
        }
    }

    pub fn is_gripper(&self) -> bool {
        matches!(
            self,
            RobotCommand::GripperOpen { .. }
                | RobotCommand::GripperClose { .. }
                | RobotCommand::GripperStop
        )
    }

    /// Re-issue the command. Returns false when a step move was refused because
    /// the previous one is still running.
    pub fn apply<D: RobotDriver + ?Sized>(&self, driver: &mut D) -> Result<bool> {
        match *self {
            RobotCommand::ChassisSpeed { vx, vy, vz } => driver.drive_speed(vx, vy, vz)?,
            RobotCommand::ChassisMove {
                x,
                y,
                z,
                xy_speed,
                z_speed,
            } => return driver.drive_move(x, y, z, xy_speed, z_speed),
            RobotCommand::Stop => driver.stop()?,
            RobotCommand::ArmMove { x, y } => return driver.arm_move(x, y),
            RobotCommand::ArmRecenter => return driver.arm_recenter(),
            RobotCommand::GripperOpen { power } => driver.gripper_open(power)?,
            RobotCommand::GripperClose { power } => driver.gripper_close(power)?,
            RobotCommand::GripperStop => driver.gripper_stop()?,
        }
        Ok(true)
    }
}

/// Driver wrapper that reports motion commands to its sinks before delegating.
/// LED and video calls pass through unrecorded.
pub struct RecordingDriver<D> {
    inner: D,
    sinks: Vec<Arc<dyn CommandSink>>,
}

impl<D: RobotDriver> RecordingDriver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn CommandSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn emit(&self, command: RobotCommand) {
        for sink in &self.sinks {
            sink.record(&command);
        }
    }
}

impl<D: RobotDriver> RobotDriver for RecordingDriver<D> {
    fn connect(&mut self) -> Result<()> {
        self.inner.connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect()
    }

    fn status(&self) -> RobotStatus {
        self.inner.status()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn version(&mut self) -> Result<String> {
        self.inner.version()
    }

    fn battery(&mut self) -> Result<u8> {
        self.inner.battery()
    }

    fn drive_speed(&mut self, vx: f64, vy: f64, vz: f64) -> Result<()> {
        self.emit(RobotCommand::ChassisSpeed { vx, vy, vz });
        self.inner.drive_speed(vx, vy, vz)
    }

    fn drive_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        xy_speed: f64,
        z_speed: f64,
    ) -> Result<bool> {
        self.emit(RobotCommand::ChassisMove {
            x,
            y,
            z,
            xy_speed,
            z_speed,
        });
        self.inner.drive_move(x, y, z, xy_speed, z_speed)
    }

    fn stop(&mut self) -> Result<()> {
        self.emit(RobotCommand::Stop);
        self.inner.stop()
    }

    fn is_chassis_ready(&self) -> bool {
        self.inner.is_chassis_ready()
    }

    fn arm_move(&mut self, x: f64, y: f64) -> Result<bool> {
        self.emit(RobotCommand::ArmMove { x, y });
        self.inner.arm_move(x, y)
    }

    fn arm_recenter(&mut self) -> Result<bool> {
        self.emit(RobotCommand::ArmRecenter);
        self.inner.arm_recenter()
    }

    fn is_arm_ready(&self) -> bool {
        self.inner.is_arm_ready()
    }

    fn gripper_open(&mut self, power: u8) -> Result<()> {
        self.emit(RobotCommand::GripperOpen { power });
        self.inner.gripper_open(power)
    }

    fn gripper_close(&mut self, power: u8) -> Result<()> {
        self.emit(RobotCommand::GripperClose { power });
        self.inner.gripper_close(power)
    }

    fn gripper_stop(&mut self) -> Result<()> {
        self.emit(RobotCommand::GripperStop);
        self.inner.gripper_stop()
    }

    fn led_on(&mut self, color: LedColor) -> Result<()> {
        self.inner.led_on(color)
    }

    fn led_off(&mut self) -> Result<()> {
        self.inner.led_off()
    }

    fn start_video(&mut self, resolution: StreamResolution) -> Result<()> {
        self.inner.start_video(resolution)
    }

    fn stop_video(&mut self) -> Result<()> {
        self.inner.stop_video()
    }

    fn video_frame(&mut self) -> Option<Frame> {
        self.inner.video_frame()
    }

    fn subscribe_telemetry(&mut self, freq_hz: u32) -> Result<()> {
        self.inner.subscribe_telemetry(freq_hz)
    }

    fn unsubscribe_telemetry(&mut self) -> Result<()> {
        self.inner.unsubscribe_telemetry()
    }

    fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.telemetry()
    }

    fn position(&self) -> ChassisPose {
        self.inner.position()
    }

    fn poll(&mut self) -> Result<()> {
        self.inner.poll()
    }
}
