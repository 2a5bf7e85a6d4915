use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Capture device, stream and viewer failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("video source not found or not opened: {0}")]
    NotFound(String),
    #[error("not available in this build: {0}")]
    Unsupported(&'static str),
    #[error("capture I/O error: {0}")]
    Io(String),
    #[error("capture backend error: {0}")]
    Backend(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
