//! Remote store error types.

use thiserror::Error;

/// Result type for remote store operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the remote object store.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("network error: {0}")]
    Network(String),

    #[error("operation timed out")]
    Timeout,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("credentials expired or invalid")]
    CredentialExpired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("S3 operation failed: {0}")]
    S3(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CloudError {
    /// Maps an HTTP status and provider error code to an error.
    pub fn from_status(status: u16, code: &str, message: &str) -> Self {
        match (status, code) {
            (_, "ExpiredToken" | "TokenRefreshRequired") => CloudError::CredentialExpired,
            (401 | 403, _)
            | (_, "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "AccessDenied") => {
                CloudError::AuthFailed(format!("{code}: {message}"))
            }
            (429, _) | (_, "SlowDown") => CloudError::RateLimited { retry_after_secs: 1 },
            (500..=599, _) => CloudError::Server {
                status,
                message: format!("{code}: {message}"),
            },
            _ => CloudError::S3(format!("{status} {code}: {message}")),
        }
    }

    /// Returns true if retrying the same call may succeed: timeouts,
    /// connection failures, 5xx responses and rate limiting.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Network(_)
            | CloudError::Timeout
            | CloudError::Server { .. }
            | CloudError::RateLimited { .. } => true,
            CloudError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Returns true for credential problems. These are never retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, CloudError::CredentialExpired | CloudError::AuthFailed(_))
    }

    /// Returns the retry-after duration if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            CloudError::RateLimited { retry_after_secs } => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}
