use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("audio source not found: {0}")]
    SourceNotFound(String),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("duration unavailable for {path}: {reason}")]
    DurationUnavailable { path: PathBuf, reason: String },

    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("waveform store error: {0}")]
    Store(String),
}

impl WaveformError {
    pub(crate) fn decode(path: &std::path::Path, reason: impl ToString) -> Self {
        WaveformError::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn duration(path: &std::path::Path, reason: impl ToString) -> Self {
        WaveformError::DurationUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = WaveformError> = std::result::Result<T, E>;
