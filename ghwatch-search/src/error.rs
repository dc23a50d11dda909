//! Error types for the ghwatch-search crate.
//!
//! Only fatal conditions are errors. Recoverable API statuses (quota
//! exhaustion, unparseable queries, transient 5xx) are absorbed by the
//! paginator as notes on the findings instead.

/// Errors that abort a watch run.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The run was cancelled by the caller.
    #[error("search cancelled: {0}")]
    Cancelled(String),

    /// The run deadline expired before pagination finished.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// An HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A successful response body did not match the expected JSON shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid run configuration or query specification.
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Whether this error came from cancellation or the run deadline.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::Timeout(_))
    }
}

/// Convenience type alias for ghwatch-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
