//! Second-round enrichment: confirm each code hit's recency through the
//! commits API.
//!
//! Lookups run on a small fixed pool of workers pulling indexed jobs from a
//! shared queue. Results are written back by index, so the output order
//! always matches the input order no matter which worker finishes first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::cancel::RunGuard;
use crate::events::{Recorder, RunEvent};
use crate::governor::{RateGovernor, RateSignal};
use crate::http::GitHubClient;
use crate::paginator::parse_timestamp;
use crate::types::{CodeHit, Window};

#[derive(Debug, Deserialize)]
struct CommitRecord {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    date: Option<String>,
}

/// Run `work` over `jobs` on at most `workers` concurrent tasks.
///
/// Returns one slot per job, in input order. A slot is `None` only if the
/// worker handling that job panicked.
pub async fn fan_out<J, R, F, Fut>(jobs: Vec<J>, workers: usize, work: F) -> Vec<Option<R>>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
{
    let total = jobs.len();
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    if total == 0 {
        return slots;
    }
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = mpsc::channel::<(usize, J)>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<(usize, R)>(workers);
    let work = Arc::new(work);

    // Producer: enqueue everything, then close the queue by dropping the sender.
    let producer = tokio::spawn(async move {
        for (index, job) in jobs.into_iter().enumerate() {
            if job_tx.send((index, job)).await.is_err() {
                break;
            }
        }
    });

    let mut pool = JoinSet::new();
    for worker in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let work = Arc::clone(&work);
        pool.spawn(async move {
            loop {
                let next = job_rx.lock().await.recv().await;
                let Some((index, job)) = next else {
                    break;
                };
                let out = work(job).await;
                if result_tx.send((index, out)).await.is_err() {
                    break;
                }
            }
            tracing::trace!(worker, "fan-out worker drained");
        });
    }
    // The result channel closes once every worker has dropped its sender.
    drop(result_tx);

    while let Some((index, out)) = result_rx.recv().await {
        slots[index] = Some(out);
    }
    while let Some(joined) = pool.join_next().await {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "fan-out worker failed");
        }
    }
    if let Err(err) = producer.await {
        tracing::warn!(error = %err, "fan-out producer failed");
    }
    slots
}

/// Look up the newest in-window commit date for every hit, `workers` at a
/// time. The result is aligned with `hits`.
#[allow(clippy::too_many_arguments)]
pub async fn enrich_commit_dates(
    client: &GitHubClient,
    hits: &[CodeHit],
    window: &Window,
    workers: usize,
    timeout: Duration,
    governor: Arc<RateGovernor>,
    guard: &RunGuard,
    recorder: &Recorder,
) -> Vec<Option<DateTime<Utc>>> {
    recorder.emit(
        RunEvent::new("commit-check").note(format!("hits={} workers={workers}", hits.len())),
    );
    let lookup = CommitLookup::new(
        client.clone(),
        governor,
        guard.clone(),
        recorder.clone(),
        window,
        timeout,
    );
    let dates = lookup.commit_dates(hits, workers).await;
    let confirmed = dates.iter().filter(|d| d.is_some()).count();
    recorder.emit(
        RunEvent::new("commit-check-done").note(format!("confirmed={confirmed}/{}", hits.len())),
    );
    dates
}

/// Everything a commit lookup needs, cloned into each worker.
#[derive(Clone)]
pub struct CommitLookup {
    pub client: GitHubClient,
    pub governor: Arc<RateGovernor>,
    pub guard: RunGuard,
    pub recorder: Recorder,
    pub since_iso: String,
    pub timeout: Duration,
}

struct CommitJob {
    repository: String,
    path: String,
}

impl CommitLookup {
    pub fn new(
        client: GitHubClient,
        governor: Arc<RateGovernor>,
        guard: RunGuard,
        recorder: Recorder,
        window: &Window,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            governor,
            guard,
            recorder,
            since_iso: window.since_iso(),
            timeout,
        }
    }

    /// Newest commit date for each hit's file since the window start.
    ///
    /// The returned vector is aligned with `hits`. Any failure for an item
    /// (transport, status, empty history, bad date) yields `None`, and so does
    /// every lookup still pending once the run guard trips.
    pub async fn commit_dates(&self, hits: &[CodeHit], workers: usize) -> Vec<Option<DateTime<Utc>>> {
        let jobs: Vec<CommitJob> = hits
            .iter()
            .map(|h| CommitJob {
                repository: h.repository.clone(),
                path: h.file_path.clone(),
            })
            .collect();
        let lookup = self.clone();
        fan_out(jobs, workers, move |job| {
            let lookup = lookup.clone();
            async move { lookup.fetch(&job).await }
        })
        .await
        .into_iter()
        .map(Option::flatten)
        .collect()
    }

    async fn fetch(&self, job: &CommitJob) -> Option<DateTime<Utc>> {
        let url = format!("{}/repos/{}/commits", self.client.base_url(), job.repository);
        let request = self
            .client
            .request(&url)
            .query(&[
                ("path", job.path.as_str()),
                ("since", self.since_iso.as_str()),
                ("per_page", "1"),
            ])
            .timeout(self.timeout);

        let response = match self.guard.run(self.client.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::debug!(repo = %job.repository, path = %job.path, error = %err, "commit lookup failed");
                self.recorder.emit(
                    RunEvent::new("commit-check-error")
                        .url(&url)
                        .note(format!("{}: {err}", job.path)),
                );
                return None;
            }
            Err(_) => return None,
        };

        // A stopped run still keeps the response already in hand.
        let signal = RateSignal::from_headers(response.status.as_u16(), &response.headers);
        if self.guard.run(self.governor.throttle(&signal)).await.is_err() {
            tracing::trace!(repo = %job.repository, "commit lookup pause cut short");
        }

        if !response.status.is_success() {
            self.recorder.emit(
                RunEvent::new("commit-check-non200")
                    .url(&url)
                    .status(response.status.as_u16())
                    .rate(response.rate_remaining(), response.rate_reset())
                    .note(job.path.clone()),
            );
            return None;
        }

        let commits: Vec<CommitRecord> = serde_json::from_str(&response.body).ok()?;
        commits
            .first()
            .and_then(|c| c.commit.author.as_ref())
            .and_then(|a| a.date.as_deref())
            .and_then(parse_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_preserves_input_order() {
        // Later jobs finish first.
        let jobs: Vec<u64> = (0..12).collect();
        let out = fan_out(jobs, 3, |n| async move {
            tokio::time::sleep(Duration::from_millis(40 - n * 3)).await;
            n * 10
        })
        .await;
        let values: Vec<u64> = out.into_iter().map(|v| v.expect("slot filled")).collect();
        assert_eq!(values, (0..12).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fan_out_never_exceeds_worker_count() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let out = fan_out((0..10).collect::<Vec<u32>>(), 2, move |n| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await;
        assert_eq!(out.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn fan_out_empty_input() {
        let out = fan_out(Vec::<u8>::new(), 2, |n| async move { n }).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn fan_out_more_workers_than_jobs() {
        let out = fan_out(vec!["a", "b"], 8, |s| async move { s.to_uppercase() }).await;
        assert_eq!(out, vec![Some("A".to_owned()), Some("B".to_owned())]);
    }

    #[test]
    fn commit_record_parses_author_date() {
        let records: Vec<CommitRecord> = serde_json::from_str(
            r#"[{"sha":"abc","commit":{"author":{"name":"x","date":"2024-01-05T10:00:00Z"}},"html_url":"u"}]"#,
        )
        .expect("deserialize");
        let date = records[0]
            .commit
            .author
            .as_ref()
            .and_then(|a| a.date.as_deref())
            .and_then(parse_timestamp);
        assert!(date.is_some());
    }
}
