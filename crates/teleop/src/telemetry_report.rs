//! Text rendering of a telemetry snapshot for the console and video overlay.

use robot_driver::TelemetrySnapshot;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataAge {
    Fresh,
    Stale,
    Dead,
}

impl DataAge {
    /// Fresh under 1 s, stale under 5 s. No data at all counts as dead.
    pub fn classify(age: Option<Duration>) -> Self {
        match age {
            Some(a) if a < Duration::from_secs(1) => DataAge::Fresh,
            Some(a) if a < Duration::from_secs(5) => DataAge::Stale,
            _ => DataAge::Dead,
        }
    }
}

impl fmt::Display for DataAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataAge::Fresh => "fresh",
            DataAge::Stale => "stale",
            DataAge::Dead => "dead",
        })
    }
}

pub fn report_lines(snap: &TelemetrySnapshot, target_hz: u32) -> Vec<String> {
    let p = &snap.position;
    let a = &snap.attitude;
    let v = &snap.velocity;
    let status = match &snap.status {
        Some(flags) => {
            let active = flags.active();
            if active.is_empty() {
                "normal".to_string()
            } else {
                active.join(", ")
            }
        }
        None => "n/a".to_string(),
    };
    let gripper = snap
        .gripper
        .map_or_else(|| "n/a".to_string(), |g| g.to_string());
    let age = snap.age();
    let age_text = age.map_or_else(|| "-".to_string(), |d| format!("{:.1}s", d.as_secs_f64()));
    vec![
        format!("Position: x={:+.2} m  y={:+.2} m  yaw={:+.2} deg", p.x, p.y, p.yaw),
        format!(
            "Attitude: yaw={:+.2}  pitch={:+.2}  roll={:+.2} deg",
            a.yaw, a.pitch, a.roll
        ),
        format!("Velocity: vx={:+.2} m/s  vy={:+.2} m/s", v.vgx, v.vgy),
        format!("Arm: x={:+.2} mm  y={:+.2} mm", snap.arm.x, snap.arm.y),
        format!("Gripper: {gripper}"),
        format!("Status: {status}"),
        format!(
            "Updates: {}  Age: {} ({})  Target: {} Hz",
            snap.update_count,
            age_text,
            DataAge::classify(age),
            target_hz
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_driver::{ChassisFlags, ChassisPose};
    use std::time::Instant;

    #[test]
    fn test_age_classes() {
        assert_eq!(DataAge::classify(None), DataAge::Dead);
        assert_eq!(DataAge::classify(Some(Duration::from_millis(999))), DataAge::Fresh);
        assert_eq!(DataAge::classify(Some(Duration::from_secs(1))), DataAge::Stale);
        assert_eq!(DataAge::classify(Some(Duration::from_secs(5))), DataAge::Dead);
    }

    #[test]
    fn test_lines() {
        let mut snap = TelemetrySnapshot {
            position: ChassisPose::new(1.5, -0.25, 90.0),
            update_count: 7,
            last_update: Some(Instant::now()),
            ..TelemetrySnapshot::default()
        };
        let lines = report_lines(&snap, 5);
        assert_eq!(lines[0], "Position: x=+1.50 m  y=-0.25 m  yaw=+90.00 deg");
        assert_eq!(lines[5], "Status: n/a");
        assert!(lines[6].starts_with("Updates: 7  Age: 0.0s (fresh)"));
        assert!(lines[6].ends_with("Target: 5 Hz"));

        snap.status = Some(ChassisFlags::from_values(&[0; 9]));
        assert_eq!(report_lines(&snap, 5)[5], "Status: normal");
        snap.status = Some(ChassisFlags::from_values(&[1, 0, 0, 0, 0, 1]));
        assert_eq!(report_lines(&snap, 5)[5], "Status: static, slip");
    }
}
