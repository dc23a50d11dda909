//! Run diagnostics: the structured event log behind a run.
//!
//! Events live in a [`MemorySink`] keyed by run id. This module turns them
//! into JSON for `--dump-events` and into a per-phase tally for the log.

use std::collections::BTreeMap;

use ghwatch_search::{MemorySink, RunEvent};

use crate::error::{Result, WatchError};

/// Events of the most recent run, with its id.
pub fn last_run_events(sink: &MemorySink) -> Option<(String, Vec<RunEvent>)> {
    let run_id = sink.last_run_id()?;
    let events = sink.events(&run_id);
    Some((run_id, events))
}

/// Pretty JSON array of the events recorded for `run_id`.
///
/// # Errors
///
/// Returns [`WatchError::Config`] if serialization fails.
pub fn events_json(sink: &MemorySink, run_id: &str) -> Result<String> {
    serde_json::to_string_pretty(&sink.events(run_id))
        .map_err(|e| WatchError::Config(format!("event serialization: {e}")))
}

/// Count of events per phase, ordered by phase name.
pub fn phase_counts(events: &[RunEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.phase.clone()).or_insert(0) += 1;
    }
    counts
}

/// Log a one-line summary of the last run's event log at debug level.
pub fn log_summary(sink: &MemorySink) {
    let Some((run_id, events)) = last_run_events(sink) else {
        return;
    };
    let tally = phase_counts(&events)
        .into_iter()
        .map(|(phase, n)| format!("{phase}={n}"))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(run_id = %run_id, events = events.len(), phases = %tally, "run event log");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use ghwatch_search::{EventSink, Recorder};
    use std::sync::Arc;

    #[test]
    fn empty_sink_has_no_last_run() {
        assert!(last_run_events(&MemorySink::default()).is_none());
    }

    #[test]
    fn events_json_and_counts_for_last_run() {
        let sink = Arc::new(MemorySink::default());
        let recorder = Recorder::new("20240101T000000Z", sink.clone() as Arc<dyn EventSink>);
        recorder.emit(RunEvent::new("start"));
        recorder.emit(RunEvent::new("search-code").page(1));
        recorder.emit(RunEvent::new("search-code").page(2));

        let (run_id, events) = last_run_events(&sink).unwrap();
        assert_eq!(run_id, "20240101T000000Z");
        assert_eq!(events.len(), 3);

        let counts = phase_counts(&events);
        assert_eq!(counts.get("search-code"), Some(&2));
        assert_eq!(counts.get("start"), Some(&1));

        let json = events_json(&sink, &run_id).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(3));
        assert_eq!(parsed[0]["runId"], "20240101T000000Z");
    }
}
