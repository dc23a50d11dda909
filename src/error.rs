//! Error types for the ghwatch host.

use ghwatch_search::SearchError;

/// Top-level error type for loading inputs and running a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Settings or query file could not be parsed or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The search run failed.
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl WatchError {
    /// Whether the run stopped because it was cancelled or ran out of time.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Search(e) if e.is_interrupted())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WatchError>;
