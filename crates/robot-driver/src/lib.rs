//! robot-driver: control surface for a DJI RoboMaster EP
//!
//! The [`RobotDriver`] trait is implemented by the plaintext SDK backend
//! ([`TextSdkDriver`]) and by a kinematic simulator ([`SimDriver`]). Any driver
//! can be wrapped in a [`RecordingDriver`] to tap motion commands for logging
//! and dataset capture.

mod types;
pub use types::{
    ArmPosition, Attitude, Capabilities, ChassisFlags, ChassisPose, ChassisVelocity, LedColor,
    RobotStatus, StreamResolution,
};

mod error;
pub use error::{DriverError, Result};

mod traits;
pub use traits::{CommandSink, RobotDriver};

mod action;
pub use action::{wait_until_settled, ActionTracker};

pub mod protocol;

mod telemetry;
pub use telemetry::{TelemetrySnapshot, TelemetryStore};

mod recording;
pub use recording::{RecordingDriver, RobotCommand};

mod sim;
pub use sim::SimDriver;

mod text_sdk;
pub use text_sdk::{SdkConfig, TextSdkDriver, ACTION_TIMEOUT};
