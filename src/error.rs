use thiserror::Error;

/// Failure taxonomy for a try-on run.
///
/// Submission errors carry the raw remote status and message so operators can
/// diagnose rejected jobs from the logs alone.
#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("invalid image reference: {0}")]
    Validation(String),

    #[error("generation backend rejected the credential (status {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("generation backend rate limited the request: {message}")]
    RateLimit { message: String },

    #[error("generation backend error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("network failure talking to generation backend: {0}")]
    Network(String),

    #[error("generation job did not reach a terminal state within {waited_ms} ms")]
    ProcessingTimeout { waited_ms: u64 },

    #[error("generation job failed: {0}")]
    JobFailed(String),

    #[error("try-on run cancelled")]
    Cancelled,
}

impl TryOnError {
    /// Whether a submission retry can possibly succeed. Authentication
    /// failures are terminal: the credential will not become valid between
    /// attempts, so retrying them only burns the caller's time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TryOnError::Network(_) | TryOnError::RateLimit { .. } | TryOnError::Server { .. }
        )
    }
}
