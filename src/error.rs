//! Error types surfaced by the transmitter

use thiserror::Error;

use crate::config::ConfigError;
use crate::convert::ConvertError;
use crate::encoder::EncoderError;
use crate::notifier::NotifierError;
use crate::output::OutputError;

/// Failure inside one pipeline stage
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Notifier(#[from] NotifierError),

    /// The session failed on an earlier frame
    #[error("session failed earlier and accepts no more frames")]
    SessionFailed,

    #[error("transmitter is shut down")]
    Closed,
}

#[derive(Error, Debug)]
pub enum TransmitterError {
    /// Endpoint binding or handle allocation failed at construction
    #[error("initialization failed: {0}")]
    Initialization(#[source] StageError),

    /// First-frame setup failed; the session is unusable
    #[error("configuration failed: {0}")]
    Configuration(#[source] StageError),

    /// A frame could not be converted, encoded or written
    #[error("encoding failed: {0}")]
    Encoding(#[source] StageError),
}

impl TransmitterError {
    pub fn initialization(err: impl Into<StageError>) -> Self {
        Self::Initialization(err.into())
    }

    pub fn configuration(err: impl Into<StageError>) -> Self {
        Self::Configuration(err.into())
    }

    pub fn encoding(err: impl Into<StageError>) -> Self {
        Self::Encoding(err.into())
    }

    pub fn stage(&self) -> &StageError {
        match self {
            Self::Initialization(e) | Self::Configuration(e) | Self::Encoding(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wraps_stage() {
        let err = TransmitterError::configuration(OutputError::NotOpen);
        assert!(matches!(err, TransmitterError::Configuration(StageError::Output(_))));
        assert_eq!(err.to_string(), "configuration failed: sink is not open");
    }

    #[test]
    fn test_stage_accessor() {
        let err = TransmitterError::encoding(StageError::SessionFailed);
        assert!(matches!(err.stage(), StageError::SessionFailed));
    }
}
