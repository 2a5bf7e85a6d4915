//! RoboMaster plaintext SDK: command encoding and reply/push parsing.

use crate::{ArmPosition, Attitude, ChassisFlags, ChassisPose, LedColor};

pub const CONTROL_PORT: u16 = 40923;
pub const PUSH_PORT: u16 = 40924;
pub const VIDEO_PORT: u16 = 40921;

/// Push frequencies accepted by the robot.
const PUSH_FREQS: [u32; 6] = [1, 5, 10, 20, 30, 50];

#[derive(Clone, Debug, PartialEq)]
pub enum SdkCommand {
    Enter,
    Quit,
    Version,
    Battery,
    ChassisSpeed {
        x: f64,
        y: f64,
        z: f64,
    },
    ChassisMove {
        x: f64,
        y: f64,
        z: f64,
        xy_speed: f64,
        z_speed: f64,
    },
    ChassisPosition,
    /// `Some(freq)` switches a push on, `None` switches it off.
    ChassisPush {
        position: Option<u32>,
        attitude: Option<u32>,
        status: Option<u32>,
    },
    ArmMove {
        x: f64,
        y: f64,
    },
    ArmRecenter,
    ArmPosition,
    ArmPush(Option<u32>),
    GripperOpen(u8),
    GripperClose(u8),
    GripperStop,
    GripperStatus,
    Led(LedColor),
    LedOff,
    StreamOn,
    StreamOff,
}

impl SdkCommand {
    pub fn encode(&self) -> String {
        match self {
            SdkCommand::Enter => "command;".to_string(),
            SdkCommand::Quit => "quit;".to_string(),
            SdkCommand::Version => "version ?;".to_string(),
            SdkCommand::Battery => "robot battery ?;".to_string(),
            SdkCommand::ChassisSpeed { x, y, z } => {
                format!("chassis speed x {} y {} z {};", num(*x), num(*y), num(*z))
            }
            SdkCommand::ChassisMove {
                x,
                y,
                z,
                xy_speed,
                z_speed,
            } => format!(
                "chassis move x {} y {} z {} vxy {} vz {};",
                num(*x),
                num(*y),
                num(*z),
                num(*xy_speed),
                num(*z_speed)
            ),
            SdkCommand::ChassisPosition => "chassis position ?;".to_string(),
            SdkCommand::ChassisPush {
                position,
                attitude,
                status,
            } => {
                let mut out = String::from("chassis push");
                push_attr(&mut out, "position", "pfreq", *position);
                push_attr(&mut out, "attitude", "afreq", *attitude);
                push_attr(&mut out, "status", "sfreq", *status);
                out.push(';');
                out
            }
            SdkCommand::ArmMove { x, y } => {
                format!("robotic_arm move x {} y {};", num(*x), num(*y))
            }
            SdkCommand::ArmRecenter => "robotic_arm recenter;".to_string(),
            SdkCommand::ArmPosition => "robotic_arm position ?;".to_string(),
            SdkCommand::ArmPush(freq) => {
                let mut out = String::from("robotic_arm push");
                push_attr(&mut out, "position", "pfreq", *freq);
                out.push(';');
                out
            }
            SdkCommand::GripperOpen(level) => format!("robotic_gripper open {level};"),
            SdkCommand::GripperClose(level) => format!("robotic_gripper close {level};"),
            SdkCommand::GripperStop => "robotic_gripper stop;".to_string(),
            SdkCommand::GripperStatus => "robotic_gripper status ?;".to_string(),
            SdkCommand::Led(c) => format!(
                "led control comp all r {} g {} b {} effect solid;",
                c.r, c.g, c.b
            ),
            SdkCommand::LedOff => "led control comp all r 0 g 0 b 0 effect off;".to_string(),
            SdkCommand::StreamOn => "stream on;".to_string(),
            SdkCommand::StreamOff => "stream off;".to_string(),
        }
    }
}

fn push_attr(out: &mut String, attr: &str, freq_key: &str, freq: Option<u32>) {
    match freq {
        Some(f) => out.push_str(&format!(" {attr} on {freq_key} {}", push_freq(f))),
        None => out.push_str(&format!(" {attr} off")),
    }
}

/// Snap a requested rate to the nearest frequency the robot accepts.
pub fn push_freq(hz: u32) -> u32 {
    PUSH_FREQS
        .iter()
        .copied()
        .min_by_key(|f| f.abs_diff(hz))
        .unwrap_or(5)
}

/// Gripper power (1-100) to protocol level (1-4).
pub fn gripper_level(power: u8) -> u8 {
    let level = (u32::from(power) + 24) / 25;
    level.clamp(1, 4) as u8
}

/// Compact decimal: at most three fractional digits, no trailing zeros.
fn num(v: f64) -> String {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Rejected(String),
    Data(String),
}

pub fn parse_reply(raw: &str) -> Reply {
    let text = raw.trim().trim_end_matches(';').trim();
    let lower = text.to_ascii_lowercase();
    if lower == "ok" {
        Reply::Ok
    } else if lower.starts_with("fail") || lower.starts_with("error") {
        Reply::Rejected(text.to_string())
    } else {
        Reply::Data(text.to_string())
    }
}

/// Whitespace-separated floats of a data reply.
pub fn parse_floats(text: &str) -> Vec<f64> {
    text.split_whitespace()
        .filter_map(|t| t.parse::<f64>().ok())
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Push {
    ChassisPosition(ChassisPose),
    ChassisAttitude(Attitude),
    ChassisStatus(ChassisFlags),
    ArmPosition(ArmPosition),
    Unknown(String),
}

/// Parse one push datagram. Segments after the first may omit the
/// `<module> push` prefix, which then carries over from the previous segment.
pub fn parse_push(datagram: &str) -> Vec<Push> {
    let mut out = Vec::new();
    let mut module = String::new();
    for segment in datagram.split(';') {
        let seg = segment.trim();
        if seg.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = seg.split_whitespace().collect();
        let rest = if tokens.len() >= 2 && tokens[1] == "push" {
            module = tokens[0].to_string();
            &tokens[2..]
        } else {
            &tokens[..]
        };
        out.push(parse_segment(&module, rest).unwrap_or_else(|| Push::Unknown(seg.to_string())));
    }
    out
}

fn parse_segment(module: &str, tokens: &[&str]) -> Option<Push> {
    let (attr, values) = tokens.split_first()?;
    let nums: Vec<f64> = values
        .iter()
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match (module, *attr) {
        ("chassis", "position") if nums.len() >= 2 => Some(Push::ChassisPosition(ChassisPose {
            x: nums[0],
            y: nums[1],
            yaw: nums.get(2).copied().unwrap_or(0.0),
        })),
        ("chassis", "attitude") if nums.len() >= 3 => Some(Push::ChassisAttitude(Attitude {
            pitch: nums[0],
            roll: nums[1],
            yaw: nums[2],
        })),
        ("chassis", "status") if nums.len() >= 9 => {
            let raw: Vec<i64> = nums.iter().map(|v| *v as i64).collect();
            Some(Push::ChassisStatus(ChassisFlags::from_values(&raw)))
        }
        ("robotic_arm", "position") if nums.len() >= 2 => Some(Push::ArmPosition(ArmPosition {
            x: nums[0],
            y: nums[1],
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_speed_and_move() {
        let s = SdkCommand::ChassisSpeed {
            x: 0.5,
            y: -0.0,
            z: -30.0,
        };
        assert_eq!(s.encode(), "chassis speed x 0.5 y 0 z -30;");
        let m = SdkCommand::ChassisMove {
            x: 0.2,
            y: 0.0,
            z: 10.0,
            xy_speed: 0.5,
            z_speed: 60.0,
        };
        assert_eq!(m.encode(), "chassis move x 0.2 y 0 z 10 vxy 0.5 vz 60;");
    }

    #[test]
    fn test_encode_push_and_led() {
        let p = SdkCommand::ChassisPush {
            position: Some(5),
            attitude: Some(7),
            status: None,
        };
        assert_eq!(
            p.encode(),
            "chassis push position on pfreq 5 attitude on afreq 5 status off;"
        );
        assert_eq!(
            SdkCommand::Led(LedColor::rgb(255, 128, 0)).encode(),
            "led control comp all r 255 g 128 b 0 effect solid;"
        );
        assert_eq!(SdkCommand::ArmPush(None).encode(), "robotic_arm push position off;");
    }

    #[test]
    fn test_gripper_level() {
        assert_eq!(gripper_level(0), 1);
        assert_eq!(gripper_level(1), 1);
        assert_eq!(gripper_level(25), 1);
        assert_eq!(gripper_level(26), 2);
        assert_eq!(gripper_level(50), 2);
        assert_eq!(gripper_level(100), 4);
        assert_eq!(gripper_level(255), 4);
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply("ok;"), Reply::Ok);
        assert_eq!(parse_reply(" OK \n"), Reply::Ok);
        assert!(matches!(parse_reply("fail;"), Reply::Rejected(_)));
        assert!(matches!(parse_reply("error 2;"), Reply::Rejected(_)));
        assert_eq!(parse_reply("87;"), Reply::Data("87".into()));
        assert_eq!(parse_floats("0.1 -0.2 30"), vec![0.1, -0.2, 30.0]);
    }

    #[test]
    fn test_parse_push_datagram() {
        let pushes = parse_push(
            "chassis push position 0.5 -0.25 ; attitude 1 2 90 ; status 1 0 0 0 0 0 0 0 0 0 0 ;",
        );
        assert_eq!(pushes.len(), 3);
        assert_eq!(
            pushes[0],
            Push::ChassisPosition(ChassisPose::new(0.5, -0.25, 0.0))
        );
        assert!(matches!(&pushes[1], Push::ChassisAttitude(a) if a.yaw == 90.0));
        assert!(matches!(&pushes[2], Push::ChassisStatus(f) if f.active() == vec!["static"]));
    }

    #[test]
    fn test_parse_push_arm_and_unknown() {
        let pushes = parse_push("robotic_arm push position 120 40;gimbal push attitude 1 2;");
        assert_eq!(
            pushes[0],
            Push::ArmPosition(ArmPosition { x: 120.0, y: 40.0 })
        );
        assert!(matches!(pushes[1], Push::Unknown(_)));
    }
}
