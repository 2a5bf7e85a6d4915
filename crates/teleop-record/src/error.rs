use thiserror::Error;

pub type Result<T, E = RecordError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] vision::Error),
    #[error("a recording is already running")]
    AlreadyRecording,
    #[error("no episode in progress")]
    NoEpisode,
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
    #[error("sampling thread failed: {0}")]
    Worker(String),
}
