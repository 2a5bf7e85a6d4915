//! YAML configuration. Every section and field is optional; a missing file
//! yields the defaults below.

use anyhow::{bail, Context};
use gamepad::{ControllerMap, ControllerPreset, DEFAULT_DEADZONE};
use robot_driver::StreamResolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use teleop_record::{ActionRanges, EpisodeConfig, DEFAULT_TASK};

pub const DEFAULT_CONFIG_FILE: &str = "robomaster.yaml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub local_ip: String,
    pub robot_ip: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            local_ip: "192.168.2.20".into(),
            robot_ip: "192.168.2.1".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub preset: ControllerPreset,
    /// Explicit indices; overrides `preset` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<ControllerMap>,
    pub deadzone: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            preset: ControllerPreset::Xbox,
            map: None,
            deadzone: DEFAULT_DEADZONE,
        }
    }
}

impl ControllerConfig {
    pub fn map(&self) -> ControllerMap {
        self.map.unwrap_or_else(|| self.preset.map())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Step mode distances: metres, metres, degrees.
    pub step_forward: f64,
    pub step_strafe: f64,
    pub step_rotate: f64,
    /// Step mode speeds: m/s and deg/s.
    pub speed_xy: f64,
    pub speed_z: f64,
    pub continuous_speed_xy: f64,
    pub continuous_speed_z: f64,
    pub boost_multiplier: f64,
    /// Control loop rate.
    pub loop_hz: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            step_forward: 0.2,
            step_strafe: 0.2,
            step_rotate: 10.0,
            speed_xy: 0.5,
            speed_z: 60.0,
            continuous_speed_xy: 0.6,
            continuous_speed_z: 90.0,
            boost_multiplier: 2.0,
            loop_hz: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    /// Millimetres per d-pad press.
    pub step_x: f64,
    pub step_y: f64,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            step_x: 10.0,
            step_y: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub frequency: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { frequency: 5 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotVideoConfig {
    pub default_resolution: StreamResolution,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub name: String,
    pub fps: u32,
    /// Seconds of frames buffered per camera.
    pub buffer_duration: f64,
    /// Seconds added to the sample time when picking a frame.
    pub robot_camera_offset: f64,
    pub static_camera_offset: f64,
    pub default_task: String,
    pub action_ranges: ActionRanges,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./records"),
            name: "robomaster_teleop".into(),
            fps: 30,
            buffer_duration: 2.0,
            robot_camera_offset: 0.0,
            static_camera_offset: 0.0,
            default_task: DEFAULT_TASK.into(),
            action_ranges: ActionRanges::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    pub connection: ConnectionConfig,
    pub controller: ControllerConfig,
    pub movement: MovementConfig,
    pub arm: ArmConfig,
    pub telemetry: TelemetryConfig,
    pub robot_video: RobotVideoConfig,
    pub webcam: WebcamConfig,
    pub dataset: DatasetConfig,
}

impl TeleopConfig {
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let cfg: TeleopConfig = serde_yaml::from_str(raw).context("parsing yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `path`, or return the defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg = Self::from_yaml(&raw)
            .with_context(|| format!("loading config: {}", path.display()))?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("serializing config")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let dz = self.controller.deadzone;
        if !(0.0..1.0).contains(&dz) {
            bail!("controller.deadzone must be in [0, 1), got {dz}");
        }
        if self.movement.loop_hz == 0 {
            bail!("movement.loop_hz must be positive");
        }
        if self.dataset.fps == 0 {
            bail!("dataset.fps must be positive");
        }
        if self.dataset.buffer_duration <= 0.0 {
            bail!("dataset.buffer_duration must be positive");
        }
        if self.movement.speed_xy <= 0.0 || self.movement.speed_z <= 0.0 {
            bail!("movement speeds must be positive");
        }
        Ok(())
    }

    /// Episode settings for dataset capture. `fps` and `task` override the
    /// dataset section when given.
    pub fn episode_config(
        &self,
        robot_resolution: StreamResolution,
        fps: Option<u32>,
        task: Option<&str>,
        dry_run: bool,
    ) -> EpisodeConfig {
        let ds = &self.dataset;
        EpisodeConfig {
            fps: fps.unwrap_or(ds.fps),
            buffer_duration: ds.buffer_duration,
            robot_offset: ds.robot_camera_offset,
            webcam_offset: ds.static_camera_offset,
            robot_size: robot_resolution.dimensions(),
            webcam_size: (self.webcam.width, self.webcam.height),
            task: task.unwrap_or(&ds.default_task).to_string(),
            ranges: ds.action_ranges.clone(),
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = TeleopConfig::load("/definitely/not/here.yaml").unwrap();
        assert_eq!(cfg, TeleopConfig::default());
        assert_eq!(cfg.connection.robot_ip, "192.168.2.1");
        assert_eq!(cfg.movement.continuous_speed_z, 90.0);
        assert_eq!(cfg.webcam.width, 1280);
        assert_eq!(cfg.dataset.name, "robomaster_teleop");
    }

    #[test]
    fn test_partial_sections() {
        let cfg = TeleopConfig::from_yaml(
            "movement:\n  boost_multiplier: 3.0\nrobot_video:\n  default_resolution: 540p\ncontroller:\n  preset: ps5\n  deadzone: 0.1\n",
        )
        .unwrap();
        assert_eq!(cfg.movement.boost_multiplier, 3.0);
        assert_eq!(cfg.movement.step_forward, 0.2);
        assert_eq!(cfg.robot_video.default_resolution, StreamResolution::P540);
        assert_eq!(cfg.controller.map(), ControllerMap::ps5());
        assert_eq!(cfg.arm, ArmConfig::default());
    }

    #[test]
    fn test_explicit_map_wins() {
        let cfg =
            TeleopConfig::from_yaml("controller:\n  map:\n    buttons:\n      a: 7\n").unwrap();
        assert_eq!(cfg.controller.map().buttons.a, 7);
        assert_eq!(cfg.controller.map().axes, ControllerMap::xbox().axes);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(TeleopConfig::from_yaml("controller:\n  deadzone: 1.5\n").is_err());
        assert!(TeleopConfig::from_yaml("dataset:\n  fps: 0\n").is_err());
        assert!(TeleopConfig::from_yaml("movement: [1, 2]\n").is_err());
    }

    #[test]
    fn test_file_round_trip_and_episode() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("robomaster.yaml");
        let mut cfg = TeleopConfig::default();
        cfg.dataset.action_ranges.0.insert("move_x".into(), [-2.0, 2.0]);
        fs::write(&path, cfg.to_yaml()?)?;
        let loaded = TeleopConfig::load(&path)?;
        assert_eq!(loaded, cfg);

        let ep = loaded.episode_config(StreamResolution::P360, Some(10), None, true);
        assert_eq!(ep.fps, 10);
        assert_eq!(ep.robot_size, (640, 360));
        assert_eq!(ep.task, DEFAULT_TASK);
        assert_eq!(ep.ranges.get("move_x"), Some((-2.0, 2.0)));
        Ok(())
    }

    #[test]
    fn test_partial_range_override_keeps_defaults() -> anyhow::Result<()> {
        let cfg =
            TeleopConfig::from_yaml("dataset:\n  action_ranges:\n    move_x: [-2.0, 2.0]\n")?;
        let ranges = &cfg.dataset.action_ranges;
        assert_eq!(ranges.get("move_x"), Some((-2.0, 2.0)));
        assert_eq!(ranges.get("gripper_open"), Some((0.0, 100.0)));
        assert_eq!(ranges.get("rotate_z"), Some((-180.0, 180.0)));

        let raw = teleop_record::RawAction {
            gripper_open: 50.0,
            ..Default::default()
        };
        let n = teleop_record::normalize_action(&raw, ranges);
        assert_eq!(n[0], 0.0);
        assert_eq!(n[3], 0.0);
        assert_eq!(n[6], 0.0);
        Ok(())
    }
}
