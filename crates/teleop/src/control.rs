//! Joystick to robot command mapping.

use crate::config::{ArmConfig, MovementConfig};
use crate::metrics::TeleopMetrics;
use gamepad::JoystickState;
use robot_driver::{DriverError, LedColor, RobotDriver};
use std::fmt;
use std::str::FromStr;

/// Sticks beyond this count as "moving" for LED feedback.
const LED_MOVE_THRESHOLD: f32 = 0.2;
/// Step mode only fires past this deflection.
const STEP_THRESHOLD: f32 = 0.5;
const SPEED_EPS: f64 = 0.01;
pub const GRIPPER_POWER: u8 = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DriveMode {
    /// Stick deflection maps to chassis speed.
    #[default]
    Continuous,
    /// Stick deflection triggers fixed-size relative moves.
    Step,
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriveMode::Continuous => "continuous",
            DriveMode::Step => "step",
        })
    }
}

impl FromStr for DriveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(DriveMode::Continuous),
            "step" => Ok(DriveMode::Step),
            other => Err(format!("unknown drive mode `{other}`")),
        }
    }
}

fn boost(state: &JoystickState, movement: &MovementConfig) -> f64 {
    if state.a {
        movement.boost_multiplier
    } else {
        1.0
    }
}

/// Chassis speed `(vx, vy, vz)` for continuous mode. Deflection scales both the
/// direction and the magnitude, so speed grows quadratically with the stick.
pub fn continuous_speed(state: &JoystickState, movement: &MovementConfig) -> (f64, f64, f64) {
    let mult = boost(state, movement);
    let lx = f64::from(state.left_x);
    let ly = f64::from(state.left_y);
    let rx = f64::from(state.right_x);
    let left = lx.abs().max(ly.abs());
    let right = rx.abs();

    let vx = ly * movement.continuous_speed_xy * left * mult;
    let vy = lx * movement.continuous_speed_xy * left * mult;
    let sign = if rx > 0.0 {
        1.0
    } else if rx < 0.0 {
        -1.0
    } else {
        0.0
    };
    let vz = sign * movement.continuous_speed_z * right * mult;
    (vx, vy, vz)
}

/// Relative move `(x, y, z)` for step mode, or `None` when every stick is
/// inside the step threshold. Stick right rotates with negative z.
pub fn step_move(state: &JoystickState, movement: &MovementConfig) -> Option<(f64, f64, f64)> {
    let pick = |v: f32, amount: f64| {
        if v > STEP_THRESHOLD {
            amount
        } else if v < -STEP_THRESHOLD {
            -amount
        } else {
            0.0
        }
    };
    let x = pick(state.left_y, movement.step_forward);
    let y = pick(state.left_x, movement.step_strafe);
    let z = -pick(state.right_x, movement.step_rotate);
    if x == 0.0 && y == 0.0 && z == 0.0 {
        None
    } else {
        Some((x, y, z))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArmIntent {
    Recenter,
    Move { x: f64, y: f64 },
}

/// Y recenters; otherwise the d-pad nudges the arm (up/down on y, right/left on x).
pub fn arm_intent(state: &JoystickState, arm: &ArmConfig) -> Option<ArmIntent> {
    if state.y {
        return Some(ArmIntent::Recenter);
    }
    let y = if state.dpad_up {
        arm.step_y
    } else if state.dpad_down {
        -arm.step_y
    } else {
        0.0
    };
    let x = if state.dpad_right {
        arm.step_x
    } else if state.dpad_left {
        -arm.step_x
    } else {
        0.0
    };
    if x == 0.0 && y == 0.0 {
        None
    } else {
        Some(ArmIntent::Move { x, y })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GripperAction {
    Close,
    Open,
    Stop,
}

impl GripperAction {
    /// LB closes and takes priority over RB.
    pub fn from_state(state: &JoystickState) -> Self {
        if state.lb {
            GripperAction::Close
        } else if state.rb {
            GripperAction::Open
        } else {
            GripperAction::Stop
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GripperAction::Close => "CLOSE",
            GripperAction::Open => "OPEN",
            GripperAction::Stop => "-",
        }
    }
}

pub fn is_moving(state: &JoystickState) -> bool {
    state.left_x.abs() > LED_MOVE_THRESHOLD
        || state.left_y.abs() > LED_MOVE_THRESHOLD
        || state.right_x.abs() > LED_MOVE_THRESHOLD
}

/// LED feedback: red while boosting, cyan while moving, off at rest.
/// X toggles the feature on its rising edge.
#[derive(Clone, Debug)]
pub struct LedFeedback {
    enabled: bool,
    prev_x: bool,
    current: LedColor,
}

impl Default for LedFeedback {
    fn default() -> Self {
        Self {
            enabled: true,
            prev_x: false,
            current: LedColor::OFF,
        }
    }
}

impl LedFeedback {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Colour to write this tick, if it changed. `LedColor::OFF` means switch off.
    pub fn update(&mut self, state: &JoystickState) -> Option<LedColor> {
        let mut out = None;
        if state.x && !self.prev_x {
            self.enabled = !self.enabled;
            tracing::info!(enabled = self.enabled, "LED feedback toggled");
            if !self.enabled {
                self.current = LedColor::OFF;
                out = Some(LedColor::OFF);
            }
        }
        self.prev_x = state.x;

        if self.enabled {
            let moving = is_moving(state);
            let target = if moving && state.a {
                LedColor::RED
            } else if moving {
                LedColor::CYAN
            } else {
                LedColor::OFF
            };
            if target != self.current {
                self.current = target;
                out = Some(target);
            }
        }
        out
    }
}

/// Per-loop control state: remembers what was last sent so that idle and
/// gripper commands go out once per change.
#[derive(Debug)]
pub struct Controller {
    mode: DriveMode,
    movement: MovementConfig,
    arm: ArmConfig,
    moving: bool,
    gripper: Option<GripperAction>,
    led: LedFeedback,
}

impl Controller {
    pub fn new(mode: DriveMode, movement: MovementConfig, arm: ArmConfig) -> Self {
        Self {
            mode,
            movement,
            arm,
            moving: false,
            gripper: None,
            led: LedFeedback::default(),
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn led(&self) -> &LedFeedback {
        &self.led
    }

    /// Issue this tick's commands. Failures are logged and counted, never fatal.
    pub fn tick<D: RobotDriver + ?Sized>(
        &mut self,
        state: &JoystickState,
        driver: &mut D,
        metrics: Option<&TeleopMetrics>,
    ) {
        let report = |what: &'static str, r: Result<(), DriverError>| match r {
            Ok(()) => {
                if let Some(m) = metrics {
                    m.commands_sent.inc();
                }
            }
            Err(e) => {
                tracing::warn!(command = what, error = %e, "command failed");
                if let Some(m) = metrics {
                    m.driver_errors.inc();
                }
            }
        };

        match self.mode {
            DriveMode::Continuous => {
                let (vx, vy, vz) = continuous_speed(state, &self.movement);
                if vx.abs() > SPEED_EPS || vy.abs() > SPEED_EPS || vz.abs() > SPEED_EPS {
                    report("chassis_speed", driver.drive_speed(vx, vy, vz));
                    self.moving = true;
                } else if self.moving {
                    report("chassis_speed", driver.drive_speed(0.0, 0.0, 0.0));
                    self.moving = false;
                }
            }
            DriveMode::Step => {
                if driver.is_chassis_ready() {
                    if let Some((x, y, z)) = step_move(state, &self.movement) {
                        let r = driver.drive_move(x, y, z, self.movement.speed_xy, self.movement.speed_z);
                        report("chassis_move", r.map(|_| ()));
                    }
                }
            }
        }

        if driver.is_arm_ready() {
            match arm_intent(state, &self.arm) {
                Some(ArmIntent::Recenter) => report("arm_recenter", driver.arm_recenter().map(|_| ())),
                Some(ArmIntent::Move { x, y }) => report("arm_move", driver.arm_move(x, y).map(|_| ())),
                None => {}
            }
        }

        let gripper = GripperAction::from_state(state);
        if self.gripper != Some(gripper) {
            let r = match gripper {
                GripperAction::Close => driver.gripper_close(GRIPPER_POWER),
                GripperAction::Open => driver.gripper_open(GRIPPER_POWER),
                GripperAction::Stop => driver.gripper_stop(),
            };
            report("gripper", r);
            self.gripper = Some(gripper);
        }

        if let Some(color) = self.led.update(state) {
            let r = if color.is_off() {
                driver.led_off()
            } else {
                driver.led_on(color)
            };
            report("led", r);
        }
    }
}
