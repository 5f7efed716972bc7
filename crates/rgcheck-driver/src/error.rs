use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("ARM request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("internal fetcher error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Map a non-success HTTP status to the matching error kind.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => FetchError::NotFound(message),
            401 | 403 => FetchError::Auth(message),
            408 | 429 | 500..=599 => FetchError::Transient(format!("status {}: {}", status, message)),
            _ => FetchError::Api { status, message },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}
