//! Error types for the DevOps API server

use std::io;

use thiserror::Error;

/// Result type alias for the API server
pub type Result<T> = std::result::Result<T, Error>;

/// API server errors
///
/// Credential failures are deliberately coarse: an unknown user, a wrong
/// password and a bad token all surface as [`Error::IncorrectCredential`].
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown resource type, or a resource requested in the wrong scope
    #[error("resource is not supported: {0}")]
    NotSupported(String),

    /// Object absent from the cache
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Resource kind or plural
        kind: String,
        /// Object name
        name: String,
    },

    /// Bad username, password or token
    #[error("incorrect password")]
    IncorrectCredential,

    /// Login attempts for this principal are locked out
    #[error("auth rate limit exceeded")]
    RateLimitExceeded,

    /// Account exists but is disabled or not yet active
    #[error("account is not active")]
    AccountNotActive,

    /// Authorization denied
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Credential store or object cache failure
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// List parameters rejected at the parsing boundary
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] query_core::QueryError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// HTTP status code the handler layer answers with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidQuery(_) => 400,
            Self::IncorrectCredential | Self::AccountNotActive => 401,
            Self::Forbidden(_) => 403,
            Self::NotSupported(_) | Self::NotFound { .. } => 404,
            Self::RateLimitExceeded => 429,
            Self::Upstream(_) => 503,
            _ => 500,
        }
    }

    /// Whether the caller may retry the same request later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::RateLimitExceeded)
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Upstream(err.to_string())
    }
}
