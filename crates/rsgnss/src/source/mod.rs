pub mod ntrip;

use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong between us and an upstream caster
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection closed by peer")]
    Closed,

    #[error("invalid mountpoint: {0}")]
    Url(String),
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::Url(e.to_string())
    }
}
