use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Remote { status: StatusCode, message: String },
    #[error("invalid backend url")]
    Url(#[from] url::ParseError),
    #[error("invalid response payload")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

impl TransportError {
    /// Metric label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Http(_) => "http",
            TransportError::Remote { .. } => "remote",
            TransportError::Url(_) => "url",
            TransportError::Decode(_) => "decode",
            TransportError::Rejected(_) => "rejected",
        }
    }
}
