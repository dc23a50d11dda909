//! Run-scoped cancellation: an explicit token plus an optional deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// Governs how long a run may keep issuing requests.
#[derive(Debug, Clone)]
pub struct RunGuard {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    /// Guard that is only cancelled explicitly.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Guard that also expires `budget` from now.
    pub fn with_budget(token: CancellationToken, budget: Duration) -> Self {
        Self {
            token,
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fails with [`SearchError::Cancelled`] or [`SearchError::Timeout`] once
    /// the run must stop.
    pub fn check(&self) -> Result<(), SearchError> {
        if self.token.is_cancelled() {
            return Err(SearchError::Cancelled("run cancelled".into()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SearchError::Timeout("run deadline exceeded".into()));
        }
        Ok(())
    }

    /// Like [`RunGuard::check`], but ignores the deadline.
    pub fn check_cancelled(&self) -> Result<(), SearchError> {
        if self.token.is_cancelled() {
            return Err(SearchError::Cancelled("run cancelled".into()));
        }
        Ok(())
    }

    /// Drive `fut` unless the run is cancelled or its deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, SearchError>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            out = fut => Ok(out),
            _ = self.token.cancelled() => Err(SearchError::Cancelled("run cancelled".into())),
            _ = deadline => Err(SearchError::Timeout("run deadline exceeded".into())),
        }
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
