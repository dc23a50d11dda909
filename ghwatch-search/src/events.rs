//! Structured per-run diagnostics.
//!
//! Every component reports request/response transitions as [`RunEvent`]s
//! through a [`Recorder`], which stamps the run id and timestamp and forwards
//! to an injected [`EventSink`]. [`MemorySink`] keeps a bounded ring of
//! events per run so long runs cannot grow memory without limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Default number of events retained per run.
pub const DEFAULT_EVENTS_PER_RUN: usize = 1000;

/// One diagnostic entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub ts: String,
    pub run_id: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_remaining: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_reset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RunEvent {
    /// Start an event for `phase`. Timestamp and run id are filled by the
    /// [`Recorder`].
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Default::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn query(mut self, query_name: impl Into<String>) -> Self {
        self.query_name = Some(query_name.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach raw quota header values. Empty strings are dropped.
    pub fn rate(mut self, remaining: &str, reset: &str) -> Self {
        self.rate_remaining = (!remaining.is_empty()).then(|| remaining.to_owned());
        self.rate_reset = (!reset.is_empty()).then(|| reset.to_owned());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Destination for run events.
///
/// Implementations must be cheap and non-blocking from the caller's point of
/// view; they are invoked inline on every request.
pub trait EventSink: Send + Sync {
    fn record(&self, event: RunEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: RunEvent) {}
}

/// In-memory run registry: run id → most recent events (bounded).
#[derive(Debug)]
pub struct MemorySink {
    capacity: usize,
    inner: Mutex<MemorySinkState>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    runs: HashMap<String, VecDeque<RunEvent>>,
    last_run: Option<String>,
}

impl MemorySink {
    /// Create a sink retaining at most `capacity` events per run (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(MemorySinkState::default()),
        }
    }

    /// Events recorded for `run_id`, oldest first.
    pub fn events(&self, run_id: &str) -> Vec<RunEvent> {
        match self.inner.lock() {
            Ok(state) => state
                .runs
                .get(run_id)
                .map(|events| events.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// All known run ids, sorted.
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.inner.lock() {
            Ok(state) => state.runs.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }

    /// The run id that most recently recorded an event.
    pub fn last_run_id(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|s| s.last_run.clone())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENTS_PER_RUN)
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: RunEvent) {
        tracing::debug!(
            run_id = %event.run_id,
            phase = %event.phase,
            query = event.query_name.as_deref().unwrap_or(""),
            page = event.page.unwrap_or(0),
            status = event.status.unwrap_or(0),
            remaining = event.rate_remaining.as_deref().unwrap_or(""),
            note = event.note.as_deref().unwrap_or(""),
            "run event"
        );
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        state.last_run = Some(event.run_id.clone());
        let ring = state.runs.entry(event.run_id.clone()).or_default();
        ring.push_back(event);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }
}

/// Per-run handle shared by every component of a run.
#[derive(Clone)]
pub struct Recorder {
    run_id: String,
    sink: Arc<dyn EventSink>,
}

impl Recorder {
    pub fn new(run_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            sink,
        }
    }

    /// Recorder with a fresh run id and a [`NullSink`].
    pub fn detached() -> Self {
        Self::new(new_run_id(), Arc::new(NullSink))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stamp and forward an event.
    pub fn emit(&self, mut event: RunEvent) {
        event.ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        event.run_id.clone_from(&self.run_id);
        self.sink.record(event);
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// Run identifier of the form `20240131T235959Z` (UTC, second precision).
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}
