use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::GamepadError;

pub const DEFAULT_DEADZONE: f32 = 0.15;

/// Snapshot of a controller after mapping and deadzone.
///
/// Stick Y axes are inverted relative to the raw device so that up/forward is
/// positive. Triggers run 0 (released) to 1 (fully pressed).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JoystickState {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub lb: bool,
    pub rb: bool,
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
}

/// Unmapped device input. Axes are in [-1, 1] with SDL conventions (stick
/// down is positive, released trigger is -1); the hat reports up as +1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawInput {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
    pub hat: (i8, i8),
}

impl RawInput {
    pub fn axis(&self, index: usize) -> f32 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    pub fn to_state(&self, map: &ControllerMap, deadzone: f32) -> JoystickState {
        let ax = &map.axes;
        let bt = &map.buttons;
        let stick = |i: usize| apply_deadzone(self.axis(i), deadzone);
        let trigger = |i: usize| ((self.axis(i) + 1.0) / 2.0).clamp(0.0, 1.0);
        JoystickState {
            left_x: stick(ax.left_x),
            left_y: -stick(ax.left_y),
            right_x: stick(ax.right_x),
            right_y: -stick(ax.right_y),
            left_trigger: trigger(ax.left_trigger),
            right_trigger: trigger(ax.right_trigger),
            lb: self.button(bt.lb),
            rb: self.button(bt.rb),
            a: self.button(bt.a),
            b: self.button(bt.b),
            x: self.button(bt.x),
            y: self.button(bt.y),
            dpad_up: self.hat.1 > 0,
            dpad_down: self.hat.1 < 0,
            dpad_left: self.hat.0 < 0,
            dpad_right: self.hat.0 > 0,
        }
    }
}

/// Zero inside the deadzone, rescaled so the output still spans [-1, 1].
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        return 0.0;
    }
    let sign = if value > 0.0 { 1.0 } else { -1.0 };
    sign * (value.abs() - deadzone) / (1.0 - deadzone)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisMap {
    pub left_x: usize,
    pub left_y: usize,
    pub right_x: usize,
    pub right_y: usize,
    pub left_trigger: usize,
    pub right_trigger: usize,
}

impl Default for AxisMap {
    fn default() -> Self {
        ControllerMap::xbox().axes
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonMap {
    pub a: usize,
    pub b: usize,
    pub x: usize,
    pub y: usize,
    pub lb: usize,
    pub rb: usize,
    pub back: usize,
    pub start: usize,
    pub guide: usize,
    pub left_stick: usize,
    pub right_stick: usize,
}

impl Default for ButtonMap {
    fn default() -> Self {
        ControllerMap::xbox().buttons
    }
}

/// Axis and button indices of a controller layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerMap {
    pub axes: AxisMap,
    pub buttons: ButtonMap,
}

impl ControllerMap {
    /// Xbox Series / SDL game controller layout.
    pub const fn xbox() -> Self {
        Self {
            axes: AxisMap {
                left_x: 0,
                left_y: 1,
                right_x: 3,
                right_y: 4,
                left_trigger: 2,
                right_trigger: 5,
            },
            buttons: ButtonMap {
                a: 0,
                b: 1,
                x: 2,
                y: 3,
                lb: 4,
                rb: 5,
                back: 6,
                start: 7,
                guide: 8,
                left_stick: 9,
                right_stick: 10,
            },
        }
    }

    /// DualSense as reported by the Linux joystick driver. Face buttons are
    /// matched by position: cross=a, circle=b, square=x, triangle=y.
    pub const fn ps5() -> Self {
        Self {
            axes: AxisMap {
                left_x: 0,
                left_y: 1,
                right_x: 2,
                right_y: 3,
                left_trigger: 4,
                right_trigger: 5,
            },
            buttons: ButtonMap {
                a: 0,
                b: 1,
                x: 2,
                y: 3,
                lb: 4,
                rb: 5,
                back: 8,
                start: 9,
                guide: 10,
                left_stick: 11,
                right_stick: 12,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerPreset {
    #[default]
    Xbox,
    Ps5,
}

impl ControllerPreset {
    pub fn map(self) -> ControllerMap {
        match self {
            ControllerPreset::Xbox => ControllerMap::xbox(),
            ControllerPreset::Ps5 => ControllerMap::ps5(),
        }
    }
}

impl FromStr for ControllerPreset {
    type Err = GamepadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xbox" => Ok(ControllerPreset::Xbox),
            "ps5" | "dualsense" => Ok(ControllerPreset::Ps5),
            other => Err(GamepadError::Backend(format!("unknown preset `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadzone() {
        assert_eq!(apply_deadzone(0.1, 0.15), 0.0);
        assert_eq!(apply_deadzone(-0.149, 0.15), 0.0);
        assert!((apply_deadzone(1.0, 0.15) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-1.0, 0.15) + 1.0).abs() < 1e-6);
        let mid = apply_deadzone(0.575, 0.15);
        assert!((mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_raw_mapping_xbox() {
        let raw = RawInput {
            axes: vec![0.0, -1.0, -1.0, 0.5, 0.0, 1.0],
            buttons: vec![true, false, false, false, true, false],
            hat: (1, -1),
        };
        let s = raw.to_state(&ControllerMap::xbox(), 0.0);
        assert_eq!(s.left_y, 1.0);
        assert_eq!(s.right_x, 0.5);
        assert_eq!(s.left_trigger, 0.0);
        assert_eq!(s.right_trigger, 1.0);
        assert!(s.a && s.lb && !s.rb && !s.y);
        assert!(s.dpad_right && s.dpad_down && !s.dpad_up && !s.dpad_left);
    }

    #[test]
    fn test_missing_indices_read_neutral() {
        let raw = RawInput::default();
        let s = raw.to_state(&ControllerMap::ps5(), DEFAULT_DEADZONE);
        assert_eq!(s.left_trigger, 0.5);
        assert!(!s.a);
        assert_eq!(s.left_x, 0.0);
    }

    #[test]
    fn test_partial_map_from_yaml() {
        let m: ControllerMap = serde_yaml::from_str("axes:\n  right_x: 2\n").unwrap();
        assert_eq!(m.axes.right_x, 2);
        assert_eq!(m.axes.right_y, 4);
        assert_eq!(m.buttons, ControllerMap::xbox().buttons);
        assert_eq!("PS5".parse::<ControllerPreset>().unwrap().map(), ControllerMap::ps5());
    }
}
