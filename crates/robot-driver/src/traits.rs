use crate::{
    Capabilities, ChassisPose, LedColor, Result, RobotCommand, RobotStatus, StreamResolution,
    TelemetrySnapshot,
};
use vision::Frame;

/// Blocking control surface of a RoboMaster robot.
///
/// Step moves (`drive_move`, `arm_move`, `arm_recenter`) return `Ok(false)` when the
/// previous action of the same part is still running; completion is tracked in the
/// background and reported through `is_chassis_ready` / `is_arm_ready`.
pub trait RobotDriver: Send {
    fn connect(&mut self) -> Result<()>;

    /// Stop motion, release resources and close the session.
    fn disconnect(&mut self) -> Result<()>;

    fn status(&self) -> RobotStatus;

    fn capabilities(&self) -> Capabilities;

    fn version(&mut self) -> Result<String>;

    /// Battery percentage.
    fn battery(&mut self) -> Result<u8>;

    /// Continuous chassis speed: m/s forward, m/s right, deg/s rotation.
    fn drive_speed(&mut self, vx: f64, vy: f64, vz: f64) -> Result<()>;

    /// Relative chassis move in metres and degrees.
    fn drive_move(&mut self, x: f64, y: f64, z: f64, xy_speed: f64, z_speed: f64)
        -> Result<bool>;

    fn stop(&mut self) -> Result<()>;

    fn is_chassis_ready(&self) -> bool;

    /// Relative arm move in millimetres.
    fn arm_move(&mut self, x: f64, y: f64) -> Result<bool>;

    fn arm_recenter(&mut self) -> Result<bool>;

    fn is_arm_ready(&self) -> bool;

    /// Power is 1-100.
    fn gripper_open(&mut self, power: u8) -> Result<()>;

    fn gripper_close(&mut self, power: u8) -> Result<()>;

    fn gripper_stop(&mut self) -> Result<()>;

    fn led_on(&mut self, color: LedColor) -> Result<()>;

    fn led_off(&mut self) -> Result<()>;

    fn start_video(&mut self, resolution: StreamResolution) -> Result<()>;

    fn stop_video(&mut self) -> Result<()>;

    /// Latest frame from the robot camera, if the stream is running.
    fn video_frame(&mut self) -> Option<Frame>;

    fn subscribe_telemetry(&mut self, freq_hz: u32) -> Result<()>;

    fn unsubscribe_telemetry(&mut self) -> Result<()>;

    fn telemetry(&self) -> TelemetrySnapshot;

    fn position(&self) -> ChassisPose {
        self.telemetry().position
    }

    /// Per-iteration housekeeping, called once per control loop tick.
    fn poll(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Receives every motion command passing through a [`crate::RecordingDriver`].
pub trait CommandSink: Send + Sync {
    fn record(&self, command: &RobotCommand);
}

impl<D: RobotDriver + ?Sized> RobotDriver for Box<D> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }
    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
    fn status(&self) -> RobotStatus {
        (**self).status()
    }
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }
    fn version(&mut self) -> Result<String> {
        (**self).version()
    }
    fn battery(&mut self) -> Result<u8> {
        (**self).battery()
    }
    fn drive_speed(&mut self, vx: f64, vy: f64, vz: f64) -> Result<()> {
        (**self).drive_speed(vx, vy, vz)
    }
    fn drive_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        xy_speed: f64,
        z_speed: f64,
    ) -> Result<bool> {
        (**self).drive_move(x, y, z, xy_speed, z_speed)
    }
    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
    fn is_chassis_ready(&self) -> bool {
        (**self).is_chassis_ready()
    }
    fn arm_move(&mut self, x: f64, y: f64) -> Result<bool> {
        (**self).arm_move(x, y)
    }
    fn arm_recenter(&mut self) -> Result<bool> {
        (**self).arm_recenter()
    }
    fn is_arm_ready(&self) -> bool {
        (**self).is_arm_ready()
    }
    fn gripper_open(&mut self, power: u8) -> Result<()> {
        (**self).gripper_open(power)
    }
    fn gripper_close(&mut self, power: u8) -> Result<()> {
        (**self).gripper_close(power)
    }
    fn gripper_stop(&mut self) -> Result<()> {
        (**self).gripper_stop()
    }
    fn led_on(&mut self, color: LedColor) -> Result<()> {
        (**self).led_on(color)
    }
    fn led_off(&mut self) -> Result<()> {
        (**self).led_off()
    }
    fn start_video(&mut self, resolution: StreamResolution) -> Result<()> {
        (**self).start_video(resolution)
    }
    fn stop_video(&mut self) -> Result<()> {
        (**self).stop_video()
    }
    fn video_frame(&mut self) -> Option<Frame> {
        (**self).video_frame()
    }
    fn subscribe_telemetry(&mut self, freq_hz: u32) -> Result<()> {
        (**self).subscribe_telemetry(freq_hz)
    }
    fn unsubscribe_telemetry(&mut self) -> Result<()> {
        (**self).unsubscribe_telemetry()
    }
    fn telemetry(&self) -> TelemetrySnapshot {
        (**self).telemetry()
    }
    fn position(&self) -> ChassisPose {
        (**self).position()
    }
    fn poll(&mut self) -> Result<()> {
        (**self).poll()
    }
}
