//! Error types for the telvox pipeline and worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Job input that cannot be synthesized (e.g. missing text).
    #[error("{0}")]
    InvalidInput(String),

    /// The synthesis engine failed while producing audio.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A component was used outside its contract (finished pipeline,
    /// converter state from a different configuration).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio encoding error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Engine(format!("invalid base64 audio: {}", e))
    }
}
