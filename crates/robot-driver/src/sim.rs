use crate::{
    ArmPosition, Attitude, Capabilities, ChassisFlags, ChassisPose, ChassisVelocity,
    DriverError, LedColor, Result, RobotDriver, RobotStatus, StreamResolution, TelemetrySnapshot,
    TelemetryStore,
};
use std::time::Instant;
use vision::{CameraSource, Frame, MockCamera};

/// Continuous speed commands expire after this many seconds.
pub const SPEED_TIMEOUT_S: f64 = 0.5;

const ARM_HOME: ArmPosition = ArmPosition { x: 50.0, y: 50.0 };
const ARM_X_RANGE: (f64, f64) = (0.0, 200.0);
const ARM_Y_RANGE: (f64, f64) = (0.0, 100.0);

#[derive(Clone, Copy, Debug)]
struct StepMove {
    remaining: [f64; 3],
    xy_speed: f64,
    z_speed: f64,
}

/// Kinematic stand-in for a robot. Time only advances through [`SimDriver::step`]
/// (deterministic) or [`RobotDriver::poll`] (wall clock).
pub struct SimDriver {
    connected: bool,
    clock: f64,
    pose: ChassisPose,
    speed: [f64; 3],
    speed_until: f64,
    step_move: Option<StepMove>,
    arm: ArmPosition,
    gripper_open: bool,
    led: LedColor,
    camera: Option<MockCamera>,
    telemetry: TelemetryStore,
    last_poll: Option<Instant>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            connected: false,
            clock: 0.0,
            pose: ChassisPose::default(),
            speed: [0.0; 3],
            speed_until: 0.0,
            step_move: None,
            arm: ARM_HOME,
            gripper_open: true,
            led: LedColor::OFF,
            camera: None,
            telemetry: TelemetryStore::new(),
            last_poll: None,
        }
    }

    pub fn pose(&self) -> ChassisPose {
        self.pose
    }

    pub fn led(&self) -> LedColor {
        self.led
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let mut body = [0.0f64; 3];
        if let Some(mut m) = self.step_move {
            let limits = [m.xy_speed * dt, m.xy_speed * dt, m.z_speed * dt];
            for i in 0..3 {
                let rem = m.remaining[i];
                let d = rem.signum() * rem.abs().min(limits[i].abs());
                body[i] = d;
                m.remaining[i] = rem - d;
            }
            if m.remaining.iter().all(|r| r.abs() < 1e-9) {
                self.step_move = None;
            } else {
                self.step_move = Some(m);
            }
        } else if self.clock < self.speed_until {
            let active = dt.min(self.speed_until - self.clock);
            for (b, v) in body.iter_mut().zip(self.speed) {
                *b = v * active;
            }
        }
        self.clock += dt;

        let yaw = self.pose.yaw.to_radians();
        let (s, c) = yaw.sin_cos();
        self.pose.x += body[0] * c - body[1] * s;
        self.pose.y += body[0] * s + body[1] * c;
        self.pose.yaw = wrap_degrees(self.pose.yaw + body[2]);

        let moving = body.iter().any(|v| v.abs() > 0.0);
        self.telemetry.update_position(self.pose);
        self.telemetry.update_attitude(Attitude {
            yaw: self.pose.yaw,
            pitch: 0.0,
            roll: 0.0,
        });
        self.telemetry.update_velocity(ChassisVelocity {
            vgx: (body[0] * c - body[1] * s) / dt,
            vgy: (body[0] * s + body[1] * c) / dt,
            vgz: 0.0,
            vbx: body[0] / dt,
            vby: body[1] / dt,
            vbz: 0.0,
        });
        let mut flags = [0i64; 9];
        flags[0] = i64::from(!moving);
        self.telemetry
            .update_status(ChassisFlags::from_values(&flags));
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }

    fn set_arm(&mut self, x: f64, y: f64) {
        self.arm = ArmPosition {
            x: x.clamp(ARM_X_RANGE.0, ARM_X_RANGE.1),
            y: y.clamp(ARM_Y_RANGE.0, ARM_Y_RANGE.1),
        };
        self.telemetry.update_arm(self.arm);
    }
}

fn wrap_degrees(a: f64) -> f64 {
    let mut a = a % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

impl RobotDriver for SimDriver {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.telemetry.reset();
        self.telemetry.update_position(self.pose);
        self.telemetry.update_arm(self.arm);
        self.telemetry.update_gripper(2);
        tracing::info!("simulated robot connected");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.speed = [0.0; 3];
        self.step_move = None;
        self.camera = None;
        self.led = LedColor::OFF;
        self.connected = false;
        Ok(())
    }

    fn status(&self) -> RobotStatus {
        RobotStatus {
            connected: self.connected,
            arm_ready: true,
            arm_status: "Ready".to_string(),
            gripper_open: self.gripper_open,
            battery: Some(100),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            arm: true,
            gripper: true,
        }
    }

    fn version(&mut self) -> Result<String> {
        Ok(format!("sim-{}", env!("CARGO_PKG_VERSION")))
    }

    fn battery(&mut self) -> Result<u8> {
        Ok(100)
    }

    fn drive_speed(&mut self, vx: f64, vy: f64, vz: f64) -> Result<()> {
        self.ensure_connected()?;
        self.speed = [vx, vy, vz];
        self.speed_until = self.clock + SPEED_TIMEOUT_S;
        Ok(())
    }

    fn drive_move(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        xy_speed: f64,
        z_speed: f64,
    ) -> Result<bool> {
        self.ensure_connected()?;
        if self.step_move.is_some() {
            return Ok(false);
        }
        if xy_speed <= 0.0 || z_speed <= 0.0 {
            return Err(DriverError::InvalidArgument(
                "move speeds must be positive".into(),
            ));
        }
        self.speed_until = self.clock;
        self.step_move = Some(StepMove {
            remaining: [x, y, z],
            xy_speed,
            z_speed,
        });
        Ok(true)
    }

    fn stop(&mut self) -> Result<()> {
        self.speed = [0.0; 3];
        self.speed_until = self.clock;
        self.step_move = None;
        Ok(())
    }

    fn is_chassis_ready(&self) -> bool {
        self.step_move.is_none()
    }

    fn arm_move(&mut self, x: f64, y: f64) -> Result<bool> {
        self.ensure_connected()?;
        self.set_arm(self.arm.x + x, self.arm.y + y);
        Ok(true)
    }

    fn arm_recenter(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        self.set_arm(ARM_HOME.x, ARM_HOME.y);
        Ok(true)
    }

    fn is_arm_ready(&self) -> bool {
        true
    }

    fn gripper_open(&mut self, _power: u8) -> Result<()> {
        self.ensure_connected()?;
        self.gripper_open = true;
        self.telemetry.update_gripper(2);
        Ok(())
    }

    fn gripper_close(&mut self, _power: u8) -> Result<()> {
        self.ensure_connected()?;
        self.gripper_open = false;
        self.telemetry.update_gripper(1);
        Ok(())
    }

    fn gripper_stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn led_on(&mut self, color: LedColor) -> Result<()> {
        self.ensure_connected()?;
        self.led = color;
        Ok(())
    }

    fn led_off(&mut self) -> Result<()> {
        self.led = LedColor::OFF;
        Ok(())
    }

    fn start_video(&mut self, resolution: StreamResolution) -> Result<()> {
        self.ensure_connected()?;
        let (w, h) = resolution.dimensions();
        self.camera = Some(MockCamera::with_size(w, h));
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        self.camera = None;
        Ok(())
    }

    fn video_frame(&mut self) -> Option<Frame> {
        self.camera.as_mut().and_then(|c| c.read().ok())
    }

    fn subscribe_telemetry(&mut self, _freq_hz: u32) -> Result<()> {
        Ok(())
    }

    fn unsubscribe_telemetry(&mut self) -> Result<()> {
        Ok(())
    }

    fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    fn position(&self) -> ChassisPose {
        self.pose
    }

    fn poll(&mut self) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.last_poll {
            self.step(now.duration_since(last).as_secs_f64());
        }
        self.last_poll = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> SimDriver {
        let mut sim = SimDriver::new();
        sim.connect().unwrap();
        sim
    }

    #[test]
    fn test_speed_expires() {
        let mut sim = connected();
        sim.drive_speed(1.0, 0.0, 0.0).unwrap();
        sim.step(0.25);
        sim.step(0.25);
        sim.step(1.0);
        assert!((sim.pose().x - 0.5).abs() < 1e-9);
        assert!(sim.pose().y.abs() < 1e-9);
    }

    #[test]
    fn test_step_move_runs_at_speed() {
        let mut sim = connected();
        assert!(sim.drive_move(0.2, 0.0, 0.0, 0.5, 60.0).unwrap());
        assert!(!sim.is_chassis_ready());
        assert!(!sim.drive_move(0.2, 0.0, 0.0, 0.5, 60.0).unwrap());
        sim.step(0.2);
        assert!((sim.pose().x - 0.1).abs() < 1e-9);
        sim.step(0.3);
        assert!(sim.is_chassis_ready());
        assert!((sim.pose().x - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_changes_heading() {
        let mut sim = connected();
        sim.drive_move(0.0, 0.0, 90.0, 0.5, 90.0).unwrap();
        sim.step(1.0);
        assert!((sim.pose().yaw - 90.0).abs() < 1e-9);
        sim.drive_speed(1.0, 0.0, 0.0).unwrap();
        sim.step(0.5);
        assert!(sim.pose().x.abs() < 1e-9);
        assert!((sim.pose().y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_arm_clamped() {
        let mut sim = connected();
        sim.arm_move(500.0, -80.0).unwrap();
        let arm = sim.telemetry().arm;
        assert_eq!((arm.x, arm.y), (200.0, 0.0));
        sim.arm_recenter().unwrap();
        assert_eq!(sim.telemetry().arm, ARM_HOME);
    }

    #[test]
    fn test_gripper_and_video() {
        let mut sim = connected();
        sim.gripper_close(50).unwrap();
        assert!(!sim.status().gripper_open);
        assert!(sim.video_frame().is_none());
        sim.start_video(StreamResolution::P360).unwrap();
        let f = sim.video_frame().unwrap();
        assert_eq!((f.width, f.height), (640, 360));
    }

    #[test]
    fn test_requires_connection() {
        let mut sim = SimDriver::new();
        assert!(matches!(
            sim.drive_speed(0.1, 0.0, 0.0),
            Err(DriverError::NotConnected)
        ));
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(45.0), 45.0);
    }
}
