use std::io;
use thiserror::Error;

/// Unified error type for the Shuper workspace client
#[derive(Error, Debug)]
pub enum ShuperError {
    /// No key configured for the selected provider
    #[error("{0} API key missing. Please add it to your config.")]
    MissingCredential(String),

    /// Registry miss for a model id
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// 4xx (or other non-success) response carrying a provider message
    #[error("API Error: {status} - {message}")]
    ProviderRejected { status: u16, message: String },

    /// 429 after any key fallback was spent
    #[error("API Error: 429 - {0}")]
    QuotaExceeded(String),

    /// Network-level failure reaching a provider
    #[error("Network error: {0}")]
    TransportBlocked(String),

    /// A single undecodable stream chunk
    #[error("Malformed stream chunk: {0}")]
    StreamMalformed(String),

    /// Search requested without a key for the search provider
    #[error("{0} search key missing")]
    MissingKey(String),

    /// Search query shorter than two characters
    #[error("Search query too short: {0:?}")]
    QueryTooShort(String),

    /// Every search attempt failed
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ShuperError {
    /// Whether a failed search attempt goes back through the retry loop.
    /// Only an explicit 400/401 rejection and the local guards are final.
    pub fn is_search_retryable(&self) -> bool {
        !matches!(
            self,
            ShuperError::ProviderRejected {
                status: 400 | 401,
                ..
            } | ShuperError::MissingKey(_)
                | ShuperError::QueryTooShort(_)
        )
    }
}

impl From<reqwest::Error> for ShuperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ShuperError::TransportBlocked(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ShuperError::TransportBlocked(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ShuperError::ProviderRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ShuperError::Serialization(format!("Response decode failed: {}", err))
        } else {
            ShuperError::TransportBlocked(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for ShuperError {
    fn from(err: serde_json::Error) -> Self {
        ShuperError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for ShuperError {
    fn from(err: serde_yml::Error) -> Self {
        ShuperError::Serialization(format!("YAML error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ShuperError>;
