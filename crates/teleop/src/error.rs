use thiserror::Error;

pub type Result<T, E = TeleopError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TeleopError {
    #[error("driver error: {0}")]
    Driver(#[from] robot_driver::DriverError),
    #[error("gamepad error: {0}")]
    Gamepad(#[from] gamepad::GamepadError),
    #[error("recording error: {0}")]
    Record(#[from] teleop_record::RecordError),
    #[error("video error: {0}")]
    Video(#[from] vision::Error),
}
