use thiserror::Error;

pub type Result<T, E = GamepadError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GamepadError {
    #[error("no game controller detected, connect one and retry")]
    NoController,
    #[error("controller index {index} not found, only {available} connected")]
    IndexOutOfRange { index: usize, available: usize },
    #[error("controller disconnected")]
    Disconnected,
    #[error("gamepad backend error: {0}")]
    Backend(String),
}
