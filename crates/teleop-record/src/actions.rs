//! Fixed nine-component action vector and its normalization.

use robot_driver::RobotCommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ACTION_DIM: usize = 9;

pub const ACTION_NAMES: [&str; ACTION_DIM] = [
    "move_x",
    "move_y",
    "rotate_z",
    "gripper_open",
    "gripper_close",
    "arm_recenter",
    "arm_x",
    "arm_y",
    "unused",
];

/// Command magnitudes accumulated over one sampling interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub move_x: f64,
    pub move_y: f64,
    pub rotate_z: f64,
    pub gripper_open: f64,
    pub gripper_close: f64,
    pub arm_recenter: f64,
    pub arm_x: f64,
    pub arm_y: f64,
}

impl RawAction {
    pub fn from_command(cmd: &RobotCommand) -> Self {
        let mut a = RawAction::default();
        match *cmd {
            RobotCommand::ChassisSpeed { vx, vy, vz } => {
                a.move_x = vx;
                a.move_y = vy;
                a.rotate_z = vz;
            }
            RobotCommand::ChassisMove { x, y, z, .. } => {
                a.move_x = x;
                a.move_y = y;
                a.rotate_z = z;
            }
            RobotCommand::Stop | RobotCommand::GripperStop => {}
            RobotCommand::ArmMove { x, y } => {
                a.arm_x = x;
                a.arm_y = y;
            }
            RobotCommand::ArmRecenter => a.arm_recenter = 1.0,
            RobotCommand::GripperOpen { power } => a.gripper_open = f64::from(power),
            RobotCommand::GripperClose { power } => a.gripper_close = f64::from(power),
        }
        a
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        Some(match name {
            "move_x" => self.move_x,
            "move_y" => self.move_y,
            "rotate_z" => self.rotate_z,
            "gripper_open" => self.gripper_open,
            "gripper_close" => self.gripper_close,
            "arm_recenter" => self.arm_recenter,
            "arm_x" => self.arm_x,
            "arm_y" => self.arm_y,
            "unused" => 0.0,
            _ => return None,
        })
    }

    pub fn set(&mut self, name: &str, value: f64) -> bool {
        let slot = match name {
            "move_x" => &mut self.move_x,
            "move_y" => &mut self.move_y,
            "rotate_z" => &mut self.rotate_z,
            "gripper_open" => &mut self.gripper_open,
            "gripper_close" => &mut self.gripper_close,
            "arm_recenter" => &mut self.arm_recenter,
            "arm_x" => &mut self.arm_x,
            "arm_y" => &mut self.arm_y,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn to_array(&self) -> [f64; ACTION_DIM] {
        [
            self.move_x,
            self.move_y,
            self.rotate_z,
            self.gripper_open,
            self.gripper_close,
            self.arm_recenter,
            self.arm_x,
            self.arm_y,
            0.0,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }
}

/// Per-action `[min, max]` used to map raw magnitudes onto [-1, 1].
///
/// Deserialized entries are laid over [`ActionRanges::default`], so a
/// config that only tunes `move_x` keeps every other range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, [f64; 2]>", into = "BTreeMap<String, [f64; 2]>")]
pub struct ActionRanges(pub BTreeMap<String, [f64; 2]>);

impl From<BTreeMap<String, [f64; 2]>> for ActionRanges {
    fn from(overrides: BTreeMap<String, [f64; 2]>) -> Self {
        let mut ranges = Self::default();
        ranges.0.extend(overrides);
        ranges
    }
}

impl From<ActionRanges> for BTreeMap<String, [f64; 2]> {
    fn from(ranges: ActionRanges) -> Self {
        ranges.0
    }
}

impl Default for ActionRanges {
    fn default() -> Self {
        let ranges = [
            ("move_x", [-1.2, 1.2]),
            ("move_y", [-1.2, 1.2]),
            ("rotate_z", [-180.0, 180.0]),
            ("gripper_open", [0.0, 100.0]),
            ("gripper_close", [0.0, 100.0]),
            ("arm_recenter", [0.0, 1.0]),
            ("arm_x", [-20.0, 20.0]),
            ("arm_y", [-20.0, 20.0]),
        ];
        Self(
            ranges
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl ActionRanges {
    pub fn get(&self, name: &str) -> Option<(f64, f64)> {
        self.0.get(name).map(|r| (r[0], r[1]))
    }

    /// Range for `name`, or (0, 1) when none is configured.
    pub fn range(&self, name: &str) -> (f64, f64) {
        self.get(name).unwrap_or((0.0, 1.0))
    }
}

/// Clip each component to its range, then map it onto [-1, 1].
/// Unless `max > min` the component is 0, and `unused` is always 0.
pub fn normalize_action(raw: &RawAction, ranges: &ActionRanges) -> [f32; ACTION_DIM] {
    let values = raw.to_array();
    let mut out = [0.0f32; ACTION_DIM];
    for (i, name) in ACTION_NAMES.iter().enumerate().take(ACTION_DIM - 1) {
        let (lo, hi) = ranges.range(name);
        let width = hi - lo;
        if width.is_nan() || width <= 0.0 {
            continue;
        }
        let v = values[i].clamp(lo, hi);
        out[i] = (2.0 * (v - lo) / width - 1.0) as f32;
    }
    out
}

/// Inverse of [`normalize_action`], without clipping. Missing components read as 0.
pub fn denormalize_action(normalized: &[f32], ranges: &ActionRanges) -> RawAction {
    let mut raw = RawAction::default();
    for (i, name) in ACTION_NAMES.iter().enumerate().take(ACTION_DIM - 1) {
        let (lo, hi) = ranges.range(name);
        let n = normalized.get(i).copied().map_or(0.0, f64::from);
        raw.set(name, (n + 1.0) / 2.0 * (hi - lo) + lo);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_mapping() {
        let a = RawAction::from_command(&RobotCommand::ChassisMove {
            x: 0.3,
            y: -0.1,
            z: 45.0,
            xy_speed: 0.5,
            z_speed: 60.0,
        });
        assert_eq!((a.move_x, a.move_y, a.rotate_z), (0.3, -0.1, 45.0));
        let g = RawAction::from_command(&RobotCommand::GripperClose { power: 70 });
        assert_eq!(g.gripper_close, 70.0);
        assert!(RawAction::from_command(&RobotCommand::GripperStop).is_zero());
        assert!(RawAction::from_command(&RobotCommand::Stop).is_zero());
        assert_eq!(g.get("unused"), Some(0.0));
    }

    #[test]
    fn test_normalize_endpoints_and_clip() {
        let ranges = ActionRanges::default();
        let mut raw = RawAction {
            move_x: 1.2,
            move_y: -5.0,
            gripper_open: 50.0,
            ..RawAction::default()
        };
        raw.set("rotate_z", 0.0);
        let n = normalize_action(&raw, &ranges);
        assert_eq!(n[0], 1.0);
        assert_eq!(n[1], -1.0);
        assert_eq!(n[2], 0.0);
        assert_eq!(n[3], 0.0);
        assert_eq!(n[5], -1.0);
        assert_eq!(n[8], 0.0);
    }

    #[test]
    fn test_degenerate_range_is_zero() {
        let mut ranges = ActionRanges::default();
        ranges.0.insert("arm_x".into(), [3.0, 3.0]);
        let raw = RawAction {
            arm_x: 10.0,
            ..RawAction::default()
        };
        assert_eq!(normalize_action(&raw, &ranges)[6], 0.0);
    }

    #[test]
    fn test_inverted_range_is_zero() {
        let mut ranges = ActionRanges::default();
        ranges.0.insert("move_x".into(), [1.2, -1.2]);
        let raw = RawAction {
            move_x: 0.6,
            ..RawAction::default()
        };
        let n = normalize_action(&raw, &ranges);
        assert_eq!(n[0], 0.0);
        assert_eq!(n[1], 0.0);
    }

    #[test]
    fn test_denormalize_inverts() {
        let ranges = ActionRanges::default();
        let raw = RawAction {
            move_x: 0.6,
            rotate_z: -90.0,
            arm_y: 5.0,
            ..RawAction::default()
        };
        let back = denormalize_action(&normalize_action(&raw, &ranges), &ranges);
        assert!((back.move_x - 0.6).abs() < 1e-5);
        assert!((back.rotate_z + 90.0).abs() < 1e-3);
        assert!((back.arm_y - 5.0).abs() < 1e-5);

        // missing entries read as the range midpoint
        let short = denormalize_action(&[1.0], &ranges);
        assert_eq!(short.move_x, 1.2);
        assert_eq!(short.gripper_open, 50.0);
    }

    #[test]
    fn test_ranges_override_from_json() {
        let r: ActionRanges = serde_json::from_str(r#"{"move_x": [-2.0, 2.0]}"#).unwrap();
        assert_eq!(r.get("move_x"), Some((-2.0, 2.0)));
        assert_eq!(r.get("move_y"), Some((-1.2, 1.2)));
        assert_eq!(r.get("gripper_open"), Some((0.0, 100.0)));

        let extra: ActionRanges = serde_json::from_str(r#"{"wrist": [0.0, 2.0]}"#).unwrap();
        assert_eq!(extra.get("wrist"), Some((0.0, 2.0)));
        assert_eq!(extra.0.len(), ActionRanges::default().0.len() + 1);
        assert_eq!(ActionRanges::default().range("wrist"), (0.0, 1.0));
    }

    #[test]
    fn test_ranges_serialize_as_plain_map() {
        let json = serde_json::to_value(ActionRanges::default()).unwrap();
        assert_eq!(json["gripper_open"], serde_json::json!([0.0, 100.0]));
    }
}
