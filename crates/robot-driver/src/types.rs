use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::DriverError;

/// Chassis position in the power-on frame: metres and degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisPose {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "z")]
    pub yaw: f64,
}

impl ChassisPose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attitude {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// World-frame (`g`) and body-frame (`b`) linear velocity in m/s.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChassisVelocity {
    pub vgx: f64,
    pub vgy: f64,
    pub vgz: f64,
    pub vbx: f64,
    pub vby: f64,
    pub vbz: f64,
}

/// Arm end-effector position in millimetres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ArmPosition {
    pub x: f64,
    pub y: f64,
}

/// Chassis state flags as pushed by the robot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChassisFlags(pub [bool; 9]);

impl ChassisFlags {
    pub const LABELS: [&'static str; 9] = [
        "static",
        "uphill",
        "downhill",
        "on_slope",
        "pick_up",
        "slip",
        "impact",
        "hill_static",
        "hill_err",
    ];

    /// Build from raw push values; extra values are ignored, missing ones are false.
    pub fn from_values(values: &[i64]) -> Self {
        let mut flags = [false; 9];
        for (slot, v) in flags.iter_mut().zip(values) {
            *slot = *v != 0;
        }
        Self(flags)
    }

    pub fn active(&self) -> Vec<&'static str> {
        Self::LABELS
            .iter()
            .zip(self.0.iter())
            .filter(|(_, on)| **on)
            .map(|(label, _)| *label)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RobotStatus {
    pub connected: bool,
    pub arm_ready: bool,
    pub arm_status: String,
    pub gripper_open: bool,
    pub battery: Option<u8>,
}

impl Default for RobotStatus {
    fn default() -> Self {
        Self {
            connected: false,
            arm_ready: true,
            arm_status: "Unknown".to_string(),
            gripper_open: true,
            battery: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    pub arm: bool,
    pub gripper: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StreamResolution {
    #[default]
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "540p")]
    P540,
    #[serde(rename = "720p")]
    P720,
}

impl StreamResolution {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            StreamResolution::P360 => (640, 360),
            StreamResolution::P540 => (960, 540),
            StreamResolution::P720 => (1280, 720),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamResolution::P360 => "360p",
            StreamResolution::P540 => "540p",
            StreamResolution::P720 => "720p",
        }
    }
}

impl fmt::Display for StreamResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamResolution {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "360p" => Ok(StreamResolution::P360),
            "540p" => Ok(StreamResolution::P540),
            "720p" => Ok(StreamResolution::P720),
            other => Err(DriverError::InvalidArgument(format!(
                "unknown resolution `{other}` (expected 360p, 540p or 720p)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct LedColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl LedColor {
    pub const OFF: LedColor = LedColor::rgb(0, 0, 0);
    pub const WHITE: LedColor = LedColor::rgb(255, 255, 255);
    pub const RED: LedColor = LedColor::rgb(255, 0, 0);
    pub const CYAN: LedColor = LedColor::rgb(0, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }

    fn named(name: &str) -> Option<Self> {
        let c = match name {
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 255, 0),
            "blue" => Self::rgb(0, 0, 255),
            "white" => Self::rgb(255, 255, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "cyan" => Self::rgb(0, 255, 255),
            "magenta" => Self::rgb(255, 0, 255),
            "orange" => Self::rgb(255, 128, 0),
            "purple" => Self::rgb(128, 0, 255),
            "pink" => Self::rgb(255, 128, 128),
            "off" => Self::OFF,
            _ => return None,
        };
        Some(c)
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({}, {}, {})", self.r, self.g, self.b)
    }
}

impl FromStr for LedColor {
    type Err = DriverError;

    /// Accepts a colour name, `#RRGGBB`/`RRGGBB`, or `r,g,b` / `r g b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_ascii_lowercase();
        let invalid = || DriverError::InvalidArgument(format!("unrecognised colour `{s}`"));

        if let Some(c) = Self::named(&input) {
            return Ok(c);
        }

        let hex = input.strip_prefix('#').unwrap_or(&input);
        if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
            return Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?));
        }

        let parts: Vec<&str> = if input.contains(',') {
            input.split(',').map(str::trim).collect()
        } else {
            input.split_whitespace().collect()
        };
        if parts.len() == 3 {
            let mut vals = [0u8; 3];
            for (slot, p) in vals.iter_mut().zip(&parts) {
                *slot = p.parse::<u8>().map_err(|_| invalid())?;
            }
            return Ok(Self::rgb(vals[0], vals[1], vals[2]));
        }

        Err(invalid())
    }
}
