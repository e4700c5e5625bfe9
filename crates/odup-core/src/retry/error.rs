//! Upload error type shared by the session primitive and the retry layer.

/// Error from one upload attempt (session creation, status query or chunk PUT).
/// Kept typed so the retry layer can classify it before it is logged.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The service answered with a structured error code (invalid request,
    /// name conflict, access denied, ...).
    #[error("{code}: {message} (HTTP {status})")]
    Provider {
        status: u32,
        code: String,
        message: String,
    },
    /// Non-2xx status without a parseable error body.
    #[error("HTTP {0}")]
    Http(u32),
    /// Curl reported an error (timeout, connection reset, DNS, ...).
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    /// The upload session is gone on the server side; a new one is needed.
    #[error("upload session expired or not found")]
    SessionExpired,
    /// Response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Protocol(String),
    /// Reading the local file failed.
    #[error("local file: {0}")]
    Io(#[from] std::io::Error),
    /// Every byte reached the server but the resulting drive item could not
    /// be looked up, so the session cannot be finished or safely restarted.
    #[error("upload finished but the drive item is unconfirmed: {0}")]
    Unconfirmed(String),
    /// The blocking upload task died (panic) before reporting a result.
    #[error("upload worker aborted: {0}")]
    Aborted(String),
}

impl UploadError {
    /// Provider-specific error code, when the service sent one.
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            UploadError::Provider { code, .. } => Some(code),
            _ => None,
        }
    }
}
