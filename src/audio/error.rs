use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything the playback controller can report back to its caller.
///
/// `ProbeFailed` is never returned from `load`: it is logged and the duration
/// degrades to unknown. It exists so engines have something to hand back.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to fetch {url}: {cause}")]
    FetchFailed { url: String, cause: String },

    #[error("fetch did not finish within {0:?}")]
    FetchTimeout(Duration),

    #[error("could not probe duration: {0}")]
    ProbeFailed(String),

    #[error("seek failed: {0}")]
    SeekFailed(String),

    #[error("volume rejected: {0:?} is not a number")]
    VolumeRejected(String),

    #[error("audio could not be decoded: {0}")]
    Decode(String),

    #[error("audio output error: {0}")]
    Output(String),

    #[error("staging file error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("load was superseded by a newer load")]
    Superseded,

    #[error("no track loaded")]
    NothingLoaded,

    #[error("player has been torn down")]
    TornDown,
}

impl PlayerError {
    pub fn fetch_failed(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        PlayerError::FetchFailed {
            url: url.into(),
            cause: cause.to_string(),
        }
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
