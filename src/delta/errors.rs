//! Error variants for the delta instruction codec and applier. The encoder itself cannot fail.

use thiserror::Error;

/// Delta decoding error kinds exposed to callers.
#[derive(Error, Debug)]
pub enum GitDeltaError {
    /// Failure while parsing an encoded instruction stream.
    #[error("Delta format error: {0}")]
    DeltaFormatError(String),

    /// Failure while applying delta instructions.
    #[error("Delta decoder error: {0}")]
    DeltaDecoderError(String),
}

impl From<std::io::Error> for GitDeltaError {
    fn from(err: std::io::Error) -> Self {
        GitDeltaError::DeltaFormatError(err.to_string())
    }
}
