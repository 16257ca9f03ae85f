use reqwest::header::HeaderMap;

use crate::cancel::CancelReason;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum SnipeItError {
    /// The call's cancellation signal fired while waiting for admission,
    /// during an attempt, or between retries.
    #[error("request cancelled: {0}")]
    Cancelled(CancelReason),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code returned by the Snipe-IT API.
    #[error("{method} {url}: {status} {message}")]
    Api {
        status: u16,
        method: String,
        url: String,
        /// Best-effort message parsed from the error body; empty if unparsable.
        message: String,
        /// Raw `Retry-After` header value, if the server sent one.
        retry_after: Option<String>,
        /// Response headers, for rate-limit or request-id inspection.
        headers: HeaderMap,
    },
    /// Successful response body could not be decoded into the requested shape.
    #[error("decode error: {message}")]
    Decode {
        message: String,
        status: u16,
        headers: HeaderMap,
    },
    /// Raw response sink rejected a write.
    #[error("response sink error: {0}")]
    Io(#[from] std::io::Error),
    /// Request could not be built (body encoding, path resolution).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Invalid client construction input.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SnipeItError {
    /// HTTP status of the response behind an API or decode error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Headers of the response behind an API or decode error.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Api { headers, .. } | Self::Decode { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Whether the call's cancellation signal ended it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
