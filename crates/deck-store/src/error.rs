//! Error types for deck-store

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to an entity store
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store answered with a non-2xx status
    #[error("API error {status_code}: {message}")]
    Api { status_code: u16, message: String },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store does not implement this operation
    #[error("{store} does not support {operation}")]
    Unsupported { store: String, operation: String },

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The adapter was configured with unusable settings
    #[error("Invalid store configuration: {0}")]
    Config(String),

    /// Unknown entity kind label
    #[error("Unknown entity type: {0}")]
    UnknownKind(String),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an API error with the given status and message
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Status code carried by an API error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Only the HTTP adapter consults this; the reconciliation layers never retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_status_and_message() {
        let error = Error::api(409, "UNIQUE violation detected on '{name=\"api\"}'");
        let display = error.to_string();
        assert!(display.contains("409"));
        assert!(display.contains("UNIQUE violation"));
    }

    #[test]
    fn transient_classification() {
        assert!(Error::api(503, "unavailable").is_transient());
        assert!(Error::api(429, "slow down").is_transient());
        assert!(!Error::api(400, "schema violation").is_transient());
        assert!(!Error::InvalidResponse("no data".into()).is_transient());
    }
}
