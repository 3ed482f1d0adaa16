use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed Pattern: {0}")]
    MalformedPattern(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
