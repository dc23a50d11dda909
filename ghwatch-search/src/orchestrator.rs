//! Drives one run: every enabled search, serially, then enrichment and
//! aggregation.
//!
//! Primary searches share one rate quota, so they never run concurrently.
//! Enrichment is the only parallel phase.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::{assemble_findings, retain_recent_code};
use crate::cancel::RunGuard;
use crate::config::{run_budget, WatchConfig};
use crate::enrich::enrich_commit_dates;
use crate::error::SearchError;
use crate::events::{EventSink, NullSink, Recorder, RunEvent, new_run_id};
use crate::governor::RateGovernor;
use crate::http::GitHubClient;
use crate::paginator::SearchPaginator;
use crate::types::{Findings, QuerySpec, SearchKind, Window};

/// Reusable run driver holding the client, governor and event sink.
pub struct Watcher {
    config: WatchConfig,
    client: GitHubClient,
    governor: Arc<RateGovernor>,
    sink: Arc<dyn EventSink>,
}

impl Watcher {
    /// Validate `config` and build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for out-of-range settings, or
    /// [`SearchError::Http`] if the client cannot be built.
    pub fn new(config: WatchConfig, token: Option<&str>) -> Result<Self, SearchError> {
        config.validate()?;
        let client = GitHubClient::new(&config, token)?;
        Ok(Self {
            config,
            client,
            governor: Arc::new(RateGovernor::default()),
            sink: Arc::new(NullSink),
        })
    }

    /// Replace the rate governor, e.g. with one whose sleeper never waits.
    pub fn with_governor(mut self, governor: RateGovernor) -> Self {
        self.governor = Arc::new(governor);
        self
    }

    /// Send run events to `sink` instead of discarding them.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Execute `spec` under `guard` with a fresh run id.
    ///
    /// # Errors
    ///
    /// Fails on an empty query set, a transport failure, a malformed success
    /// body, or cancellation at any point. The deadline fails the run only
    /// while searches are still paging; once enrichment starts, it only marks
    /// unfinished lookups unknown. No partial findings are returned on error;
    /// an `error` event is recorded before returning.
    pub async fn run(&self, spec: &QuerySpec, guard: &RunGuard) -> Result<Findings, SearchError> {
        let recorder = Recorder::new(new_run_id(), Arc::clone(&self.sink));
        self.run_recorded(spec, guard, &recorder).await
    }

    /// Like [`Watcher::run`], with a caller-supplied recorder.
    pub async fn run_recorded(
        &self,
        spec: &QuerySpec,
        guard: &RunGuard,
        recorder: &Recorder,
    ) -> Result<Findings, SearchError> {
        match self.execute(spec, guard, recorder).await {
            Ok(findings) => Ok(findings),
            Err(err) => {
                tracing::warn!(run_id = recorder.run_id(), error = %err, "watch run failed");
                recorder.emit(RunEvent::new("error").note(err.to_string()));
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        spec: &QuerySpec,
        guard: &RunGuard,
        recorder: &Recorder,
    ) -> Result<Findings, SearchError> {
        if spec.groups.is_empty() {
            return Err(SearchError::Config(
                "no groups in query specification".into(),
            ));
        }

        let window = Window::ending_now(self.config.days_back);
        let budget = run_budget(spec, &self.config);
        recorder.emit(RunEvent::new("start").note(format!(
            "since={} days={} max_pages={} per_page={} enrich={} repo={} budget={}s auth={}",
            window.since_iso(),
            window.days_back,
            self.config.max_pages,
            self.config.per_page,
            self.config.enrich,
            self.config.include_repo_search,
            budget.as_secs(),
            self.client.has_token(),
        )));
        tracing::info!(
            run_id = recorder.run_id(),
            since = %window.since_iso(),
            searches = spec.enabled_searches().count(),
            "watch run started"
        );

        let paginator = SearchPaginator {
            client: &self.client,
            config: &self.config,
            governor: &self.governor,
            guard,
            recorder,
            window,
        };

        let mut code_hits = Vec::new();
        let mut repo_hits = Vec::new();
        let mut notes = Vec::new();
        for (group, search) in spec.enabled_searches() {
            if search.kind == SearchKind::Repo && !self.config.include_repo_search {
                continue;
            }
            let outcome = paginator.run(group, search).await?;
            tracing::debug!(
                group = %group.name,
                search = %search.name,
                pages = outcome.pages_fetched,
                code = outcome.code_hits.len(),
                repo = outcome.repo_hits.len(),
                "search finished"
            );
            code_hits.extend(outcome.code_hits);
            repo_hits.extend(outcome.repo_hits);
            notes.extend(outcome.notes);
        }
        guard.check()?;

        if self.config.enrich && !code_hits.is_empty() {
            let dates = enrich_commit_dates(
                &self.client,
                &code_hits,
                &window,
                self.config.enrich_workers,
                Duration::from_secs(self.config.detail_timeout_seconds),
                Arc::clone(&self.governor),
                guard,
                recorder,
            )
            .await;
            // Past the deadline, unfinished lookups are just unknown.
            guard.check_cancelled()?;
            for (hit, date) in code_hits.iter_mut().zip(dates) {
                hit.commit_date = date;
            }
            code_hits = retain_recent_code(code_hits, &window);
        }

        let findings = assemble_findings(recorder.run_id(), &window, code_hits, repo_hits, notes);
        recorder.emit(RunEvent::new("search-summary").note(format!(
            "code={} repo={} notes={}",
            findings.code_hits.len(),
            findings.repo_hits.len(),
            findings.notes.len()
        )));
        tracing::info!(
            run_id = recorder.run_id(),
            code = findings.code_hits.len(),
            repo = findings.repo_hits.len(),
            "watch run finished"
        );
        Ok(findings)
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
