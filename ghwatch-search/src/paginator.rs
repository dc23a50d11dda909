//! Page-by-page execution of one search definition.
//!
//! ```text
//! ┌────────────┐ 2xx  ┌─────────┐ items ┌──────────┐
//! │ Requesting ├─────►│ Parsing ├──────►│ governor ├──► Requesting (page+1)
//! └──┬───┬─────┘      └────┬────┘       └──────────┘
//!    │   │ 422 (lenient)   │ 0 items / page cap
//!    │   ▼                 ▼
//!    │ ┌──────────┐ 2xx  ┌──────────┐
//!    │ │ Retrying ├─────►│ Draining ├──► Done
//!    │ └────┬─────┘      └──────────┘
//!    │      │ non-2xx: note + governor ──► Done
//!    │ transport error / cancellation
//!    ▼
//!  Failed (run aborts)
//! ```
//!
//! Pagination is serial: the governor runs inline after each response so
//! consecutive pages share the search quota. Exactly one pause follows each
//! page, driven by the last response seen for it. When a strict retry also
//! fails, that is the retry's response, not the original 422. Governor
//! pauses are raced against the run guard.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cancel::RunGuard;
use crate::config::WatchConfig;
use crate::error::SearchError;
use crate::events::{Recorder, RunEvent};
use crate::governor::{RateGovernor, RateSignal};
use crate::http::{truncate, ApiResponse, GitHubClient};
use crate::sanitize::{sanitize_query, QueryEncoding};
use crate::types::{CodeHit, QueryGroup, RepoHit, SearchDefinition, SearchKind, Window};

/// Body excerpt length in run events.
const EVENT_BODY_CHARS: usize = 200;
/// Body excerpt length in findings notes.
const NOTE_BODY_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    total_count: u64,
    items: Vec<CodeItem>,
}

#[derive(Debug, Deserialize)]
struct CodeItem {
    path: String,
    html_url: String,
    repository: CodeRepository,
}

#[derive(Debug, Deserialize)]
struct CodeRepository {
    full_name: String,
    html_url: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoSearchResponse {
    #[serde(default)]
    total_count: u64,
    items: Vec<RepoItem>,
}

#[derive(Debug, Deserialize)]
struct RepoItem {
    full_name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    pushed_at: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Everything one search definition contributed to the run.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub code_hits: Vec<CodeHit>,
    pub repo_hits: Vec<RepoHit>,
    pub notes: Vec<String>,
    /// Pages that returned 2xx.
    pub pages_fetched: u32,
}

impl SearchOutcome {
    fn hit_count(&self) -> usize {
        self.code_hits.len() + self.repo_hits.len()
    }
}

/// Where pagination goes after a page.
enum PageStep {
    /// Items were found; request the next page.
    Next,
    /// Nothing more to fetch for this search.
    Drain,
}

/// Shared collaborators for paginating every search of a run.
pub struct SearchPaginator<'a> {
    pub client: &'a GitHubClient,
    pub config: &'a WatchConfig,
    pub governor: &'a RateGovernor,
    pub guard: &'a RunGuard,
    pub recorder: &'a Recorder,
    pub window: Window,
}

/// Identifies the search being paginated in events and notes.
struct Target<'s> {
    group: &'s str,
    name: &'s str,
    kind: SearchKind,
}

impl Target<'_> {
    fn label(&self) -> String {
        format!("{} — {}", self.group, self.name)
    }

    fn event(&self, suffix: &str) -> RunEvent {
        let phase = if suffix.is_empty() {
            format!("search-{}", self.kind)
        } else {
            format!("search-{}-{suffix}", self.kind)
        };
        RunEvent::new(phase).group(self.group).query(self.name)
    }
}

impl SearchPaginator<'_> {
    /// The query text actually sent for `search`, before encoding.
    ///
    /// Repository searches get a `pushed:>=<window start>` qualifier so the
    /// API narrows results at the source.
    pub fn effective_query(&self, search: &SearchDefinition) -> String {
        let raw = match search.kind {
            SearchKind::Code => search.query.clone(),
            SearchKind::Repo => format!("{} pushed:>={}", search.query, self.window.since_date()),
        };
        sanitize_query(&raw, search.kind)
    }

    /// URL of one result page.
    pub fn page_url(&self, kind: SearchKind, query: &str, encoding: QueryEncoding, page: u32) -> String {
        format!(
            "{}{}?q={}&sort={}&order=desc&per_page={}&page={}",
            self.client.base_url(),
            kind.endpoint(),
            encoding.encode(query),
            kind.sort_key(),
            self.config.per_page,
            page
        )
    }

    /// Walk result pages for `search` up to the configured page cap.
    ///
    /// # Errors
    ///
    /// Transport failures, malformed 2xx bodies and cancellation abort the
    /// whole run. Non-success statuses are recorded as notes and end only
    /// this search.
    pub async fn run(
        &self,
        group: &QueryGroup,
        search: &SearchDefinition,
    ) -> Result<SearchOutcome, SearchError> {
        let target = Target {
            group: &group.name,
            name: &search.name,
            kind: search.kind,
        };
        let query = self.effective_query(search);
        tracing::trace!(query = %query, kind = %search.kind, "paginating search");

        let mut outcome = SearchOutcome::default();
        let mut encoding = QueryEncoding::Lenient;
        let mut page = 1;

        while page <= self.config.max_pages {
            self.guard.check()?;
            let url = self.page_url(search.kind, &query, encoding, page);
            self.recorder.emit(target.event("").url(&url).page(page));

            let response = self.fetch(&target, &url, page).await?;

            let (step, last_response) = if response.status.is_success() {
                (self.parse_page(&target, &url, page, &response, &mut outcome)?, response)
            } else {
                self.record_failure(&target, &url, page, &response, &mut outcome);
                if response.status.as_u16() != 422 || encoding == QueryEncoding::Strict {
                    self.govern(&response).await?;
                    break;
                }

                let strict_url = self.page_url(search.kind, &query, QueryEncoding::Strict, page);
                self.recorder.emit(
                    target
                        .event("retry")
                        .url(&strict_url)
                        .page(page)
                        .note("retry with strict encoding after 422"),
                );
                let retry = self.fetch(&target, &strict_url, page).await?;
                if !retry.status.is_success() {
                    outcome.notes.push(format!(
                        "({}) retry strict status={} remaining={} reset={} url={} body={}",
                        target.label(),
                        retry.status.as_u16(),
                        retry.rate_remaining(),
                        retry.rate_reset(),
                        strict_url,
                        truncate(&retry.body, NOTE_BODY_CHARS)
                    ));
                    self.recorder.emit(
                        target
                            .event("retry-failed")
                            .url(&strict_url)
                            .page(page)
                            .status(retry.status.as_u16())
                            .rate(retry.rate_remaining(), retry.rate_reset())
                            .note(truncate(&retry.body, EVENT_BODY_CHARS)),
                    );
                    self.govern(&retry).await?;
                    break;
                }
                encoding = QueryEncoding::Strict;
                (
                    self.parse_page(&target, &strict_url, page, &retry, &mut outcome)?,
                    retry,
                )
            };

            self.govern(&last_response).await?;
            match step {
                PageStep::Next => page += 1,
                PageStep::Drain => break,
            }
        }

        if outcome.hit_count() == 0 {
            let note = match search.kind {
                SearchKind::Code => format!("No code hits returned for {}", target.label()),
                SearchKind::Repo => format!("No repo hits for {}", target.label()),
            };
            outcome.notes.push(note);
            self.recorder.emit(
                target
                    .event("empty")
                    .note(format!("no {} hits", search.kind)),
            );
        }
        Ok(outcome)
    }

    async fn fetch(&self, target: &Target<'_>, url: &str, page: u32) -> Result<ApiResponse, SearchError> {
        let result = self.guard.run(self.client.get(url)).await?;
        result.inspect_err(|err| {
            tracing::warn!(search = %target.label(), error = %err, "search request failed");
            self.recorder.emit(
                target
                    .event("error")
                    .url(url)
                    .page(page)
                    .note(err.to_string()),
            );
        })
    }

    /// Wait out the governor's pause, giving up as soon as the run must stop.
    async fn govern(&self, response: &ApiResponse) -> Result<(), SearchError> {
        let signal = RateSignal::from_headers(response.status.as_u16(), &response.headers);
        self.guard.run(self.governor.throttle(&signal)).await?;
        Ok(())
    }

    fn record_failure(
        &self,
        target: &Target<'_>,
        url: &str,
        page: u32,
        response: &ApiResponse,
        outcome: &mut SearchOutcome,
    ) {
        let status = response.status.as_u16();
        let remaining = response.rate_remaining();
        let reset = response.rate_reset();

        let mut note = truncate(&response.body, EVENT_BODY_CHARS);
        if status == 403 || remaining == "0" {
            let wait = reset
                .parse::<i64>()
                .ok()
                .map(|epoch| epoch.saturating_sub(Utc::now().timestamp()))
                .filter(|secs| *secs > 0);
            if let Some(secs) = wait {
                note = format!("rate-limited; sleeping {secs}s; body={note}");
            }
        }
        tracing::warn!(search = %target.label(), status, remaining, "search returned non-success status");
        self.recorder.emit(
            target
                .event("non200")
                .url(url)
                .page(page)
                .status(status)
                .rate(remaining, reset)
                .note(note),
        );
        outcome.notes.push(format!(
            "({}) status={} remaining={} reset={} url={} body={}",
            target.label(),
            status,
            remaining,
            reset,
            url,
            truncate(&response.body, NOTE_BODY_CHARS)
        ));
    }

    fn parse_page(
        &self,
        target: &Target<'_>,
        url: &str,
        page: u32,
        response: &ApiResponse,
        outcome: &mut SearchOutcome,
    ) -> Result<PageStep, SearchError> {
        outcome.pages_fetched += 1;
        let items = match target.kind {
            SearchKind::Code => {
                let parsed: CodeSearchResponse = serde_json::from_str(&response.body)
                    .map_err(|e| SearchError::Parse(format!("code search response: {e}")))?;
                tracing::debug!(search = %target.label(), page, total = parsed.total_count, "code search page");
                let count = parsed.items.len();
                outcome
                    .code_hits
                    .extend(parsed.items.into_iter().map(|item| code_hit(target, item)));
                count
            }
            SearchKind::Repo => {
                let parsed: RepoSearchResponse = serde_json::from_str(&response.body)
                    .map_err(|e| SearchError::Parse(format!("repository search response: {e}")))?;
                tracing::debug!(search = %target.label(), page, total = parsed.total_count, "repository search page");
                let count = parsed.items.len();
                outcome.repo_hits.extend(
                    parsed
                        .items
                        .into_iter()
                        .filter_map(|item| repo_hit(target, item, &self.window)),
                );
                count
            }
        };

        let status = response.status.as_u16();
        if items == 0 {
            self.recorder
                .emit(target.event("ok").url(url).page(page).status(status).note("0 items"));
            return Ok(PageStep::Drain);
        }
        self.recorder.emit(
            target
                .event("ok")
                .url(url)
                .page(page)
                .status(status)
                .rate(response.rate_remaining(), response.rate_reset())
                .note(format!("items={items}")),
        );
        Ok(PageStep::Next)
    }
}

fn code_hit(target: &Target<'_>, item: CodeItem) -> CodeHit {
    CodeHit {
        group: target.group.to_owned(),
        query_name: target.name.to_owned(),
        repository: item.repository.full_name,
        repo_url: item.repository.html_url,
        file_path: item.path,
        file_url: item.html_url,
        language: item.repository.language.unwrap_or_default(),
        commit_date: None,
    }
}

/// Map a repository item, discarding it when its push time is missing or
/// predates the window. The API's `pushed:` filter is advisory.
fn repo_hit(target: &Target<'_>, item: RepoItem, window: &Window) -> Option<RepoHit> {
    let pushed_at = item.pushed_at.as_deref().and_then(parse_timestamp)?;
    if !window.contains(pushed_at) {
        tracing::trace!(repo = %item.full_name, %pushed_at, "dropping repository pushed before window");
        return None;
    }
    Some(RepoHit {
        group: target.group.to_owned(),
        query_name: target.name.to_owned(),
        full_name: item.full_name,
        html_url: item.html_url,
        description: item.description.unwrap_or_default(),
        pushed_at,
        created_at: item.created_at.as_deref().and_then(parse_timestamp),
    })
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
