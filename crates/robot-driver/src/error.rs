use thiserror::Error;

pub type Result<T, E = DriverError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("robot not connected")]
    NotConnected,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout waiting for robot reply")]
    Timeout,
    #[error("robot rejected `{command}`: {reply}")]
    Rejected { command: String, reply: String },
    #[error("malformed reply: {0}")]
    Protocol(String),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("video: {0}")]
    Video(#[from] vision::Error),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => DriverError::Timeout,
            _ => DriverError::Io(e.to_string()),
        }
    }
}
