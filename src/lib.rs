//! ghwatch: watch GitHub for fresh code and repositories that match a set of
//! named searches.
//!
//! This crate is the host around [`ghwatch_search`]:
//! settings file → query file → watch run → Markdown or JSON digest
//!
//! # Architecture
//!
//! - **Settings**: [`config::AppConfig`], TOML with defaults and range clamping
//! - **Queries**: [`queries`], TOML groups of code and repository searches
//! - **Run**: [`run_watch`] sizes the run deadline and drives the engine
//! - **Report**: [`report::render_markdown`] for humans, JSON for tools
//! - **Diagnostics**: [`diagnostics`] exposes the per-run event log

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod queries;
pub mod report;

use std::sync::Arc;

use ghwatch_search::{
    CancellationToken, EventSink, Findings, QuerySpec, RunGuard, Watcher, run_budget,
};

pub use config::AppConfig;
pub use error::{Result, WatchError};

/// Run `spec` with `config`, bounded by `cancel` and the computed run budget.
///
/// # Errors
///
/// Returns [`WatchError::Search`] when the engine fails, including
/// cancellation and deadline expiry.
pub async fn run_watch(
    config: &AppConfig,
    spec: &QuerySpec,
    cancel: CancellationToken,
    sink: Arc<dyn EventSink>,
) -> Result<Findings> {
    let watch = config.normalized().watch_config();
    let budget = run_budget(spec, &watch);
    let token = config.token();
    if token.is_none() {
        tracing::warn!(
            env = %config.token_env,
            "no API token set; search requests will be unauthenticated"
        );
    }
    tracing::info!(budget_secs = budget.as_secs(), "starting watch run");

    let guard = RunGuard::with_budget(cancel, budget);
    let findings = Watcher::new(watch, token.as_deref())?
        .with_sink(sink)
        .run(spec, &guard)
        .await?;
    Ok(findings)
}
