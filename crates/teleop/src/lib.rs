//! teleop: joystick teleoperation of a RoboMaster EP
//!
//! [`config`] holds the YAML settings, [`control`] turns joystick state into
//! driver calls, and [`run_drive`] / [`run_replay`] are the blocking loops the
//! CLI runs. Both loops always stop the chassis, stop the gripper and switch
//! the LEDs off on exit.

mod error;
pub use error::{Result, TeleopError};

pub mod config;
pub use config::TeleopConfig;

pub mod control;
pub use control::{Controller, DriveMode, LedFeedback};

mod metrics;
pub use metrics::TeleopMetrics;

mod telemetry_report;
pub use telemetry_report::{report_lines, DataAge};

mod drive;
pub use drive::{run_drive, DriveSession, FrameView, StopReason};

mod replay;
pub use replay::{run_replay, ReplayMode, ReplayOutcome, ReplaySession};
