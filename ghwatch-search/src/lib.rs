//! # ghwatch-search
//!
//! Rate-limit-aware GitHub code and repository search orchestration.
//!
//! Given a [`QuerySpec`] of named query groups, this crate pages through the
//! search API, paces itself from the server's rate-limit headers, confirms
//! code hit recency with a bounded second round of commit lookups, and
//! returns a deduplicated, deterministically ordered [`Findings`].
//!
//! ## Design
//!
//! - Primary searches run serially: they share one per-resource quota
//! - Every response feeds the [`RateGovernor`], which sleeps before the next call
//! - Queries the API rejects with 422 are retried once with strict encoding
//! - Enrichment is the only parallel phase, on a small fixed worker pool
//! - A single [`RunGuard`] (cancellation token plus deadline) bounds the run;
//!   a cancelled run fails outright and returns no partial results
//! - Every component records structured [`RunEvent`]s through a [`Recorder`]
//!
//! ## Security
//!
//! - The bearer credential is only attached as a request header, never logged
//! - Query text is logged only at trace level
//! - No network listeners; this is a library, not a server

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod enrich;
pub mod error;
pub mod events;
pub mod governor;
pub mod http;
pub mod orchestrator;
pub mod paginator;
pub mod sanitize;
pub mod types;

pub use cancel::RunGuard;
pub use config::{run_budget, WatchConfig};
pub use error::{Result, SearchError};
pub use events::{EventSink, MemorySink, NullSink, Recorder, RunEvent};
pub use governor::{RateGovernor, Sleeper};
pub use orchestrator::Watcher;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    CodeHit, Findings, QueryGroup, QuerySpec, RepoHit, SearchDefinition, SearchKind, Window,
};

/// Run every enabled search in `spec` and return the findings.
///
/// Builds a [`Watcher`] for `config`, authenticates with `token` when it is
/// non-blank, and records events into `sink`.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for invalid settings or an empty query set,
/// [`SearchError::Http`] on transport failure, [`SearchError::Parse`] for a
/// malformed success body, and [`SearchError::Cancelled`] or
/// [`SearchError::Timeout`] once `guard` trips.
///
/// # Examples
///
/// ```no_run
/// # async fn example(spec: ghwatch_search::QuerySpec) -> ghwatch_search::Result<()> {
/// use std::sync::Arc;
/// use ghwatch_search::{CancellationToken, MemorySink, RunGuard, WatchConfig};
///
/// let config = WatchConfig::default();
/// let budget = ghwatch_search::run_budget(&spec, &config);
/// let guard = RunGuard::with_budget(CancellationToken::new(), budget);
/// let findings = ghwatch_search::run_watch(
///     &spec,
///     config,
///     std::env::var("GITHUB_TOKEN").ok().as_deref(),
///     &guard,
///     Arc::new(MemorySink::default()),
/// )
/// .await?;
/// for hit in &findings.code_hits {
///     println!("{}: {}", hit.repository, hit.file_url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_watch(
    spec: &QuerySpec,
    config: WatchConfig,
    token: Option<&str>,
    guard: &RunGuard,
    sink: std::sync::Arc<dyn EventSink>,
) -> Result<Findings> {
    Watcher::new(config, token)?
        .with_sink(sink)
        .run(spec, guard)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_watch_validates_config_zero_days() {
        let config = WatchConfig {
            days_back: 0,
            ..Default::default()
        };
        let result = run_watch(
            &QuerySpec::default(),
            config,
            None,
            &RunGuard::default(),
            std::sync::Arc::new(NullSink),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("days_back"));
    }

    #[tokio::test]
    async fn run_watch_rejects_empty_query_set() {
        let result = run_watch(
            &QuerySpec::default(),
            WatchConfig::default(),
            None,
            &RunGuard::default(),
            std::sync::Arc::new(NullSink),
        )
        .await;
        assert!(matches!(result, Err(SearchError::Config(_))));
    }

    #[tokio::test]
    async fn run_watch_honours_cancelled_guard() {
        let spec = QuerySpec {
            groups: vec![QueryGroup {
                name: "G".into(),
                enabled: true,
                searches: vec![SearchDefinition {
                    name: "s".into(),
                    kind: SearchKind::Code,
                    query: "x".into(),
                    enabled: true,
                }],
            }],
        };
        let token = CancellationToken::new();
        token.cancel();
        let result = run_watch(
            &spec,
            WatchConfig::default(),
            None,
            &RunGuard::new(token),
            std::sync::Arc::new(NullSink),
        )
        .await;
        assert!(matches!(result, Err(SearchError::Cancelled(_))));
    }
}
