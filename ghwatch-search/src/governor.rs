//! Adaptive pacing driven by the API's rate-limit headers.
//!
//! After every response the caller hands the governor a [`RateSignal`]
//! (status + quota headers). The governor decides how long the caller must
//! wait before its next request on that resource and performs the wait.
//!
//! # Priority
//!
//! 1. `Retry-After` (secondary limits): honour it plus a small margin.
//! 2. Exhausted quota (403/429 or ≤2 remaining): sleep until the reset
//!    instant, capped per resource class, or a conservative fixed backoff
//!    when no usable reset is reported.
//! 3. Otherwise: a resource-dependent base interval plus random jitter.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::HeaderMap;

/// Margin added to server-provided waits.
const MARGIN: Duration = Duration::from_millis(500);
/// Quota at or below which the resource counts as exhausted.
const LOW_WATERMARK: i64 = 2;
/// Upper bound of the jitter added to normal pacing.
const MAX_JITTER_MS: u64 = 2000;

/// Rate-limit bucket of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Search endpoints (~30 req/min authenticated, far less in practice).
    Search,
    /// Everything else (REST core).
    Core,
}

impl ResourceClass {
    fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "search" => Self::Search,
            _ => Self::Core,
        }
    }

    /// Normal pause between consecutive requests.
    pub fn base_interval(&self) -> Duration {
        match self {
            // ~5 requests per minute keeps well clear of secondary limits.
            Self::Search => Duration::from_secs(12),
            Self::Core => Duration::from_millis(1500),
        }
    }

    /// Longest wait for a reported reset instant.
    pub fn reset_cap(&self) -> Duration {
        match self {
            Self::Search => Duration::from_secs(120),
            Self::Core => Duration::from_secs(300),
        }
    }

    /// Backoff when exhausted without a usable reset instant.
    pub fn fallback_backoff(&self) -> Duration {
        match self {
            Self::Search => Duration::from_secs(90),
            Self::Core => Duration::from_secs(30),
        }
    }
}

/// Rate-limit facts extracted from one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSignal {
    pub status: u16,
    pub remaining: Option<i64>,
    pub reset_epoch: Option<i64>,
    pub resource: ResourceClass,
    pub retry_after_secs: Option<u64>,
}

impl RateSignal {
    /// Read `X-RateLimit-*` and `Retry-After` from a response.
    ///
    /// Missing or non-numeric headers become `None`; a missing resource
    /// header is treated as [`ResourceClass::Core`].
    pub fn from_headers(status: u16, headers: &HeaderMap) -> Self {
        let text = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            status,
            remaining: text("x-ratelimit-remaining").and_then(|v| v.trim().parse().ok()),
            reset_epoch: text("x-ratelimit-reset").and_then(|v| v.trim().parse().ok()),
            resource: ResourceClass::from_header(text("x-ratelimit-resource")),
            retry_after_secs: text("retry-after").and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Whether the response says the quota is used up (or nearly).
    ///
    /// An absent remaining count is not taken as zero: without the header the
    /// response only gets normal pacing.
    pub fn is_exhausted(&self) -> bool {
        self.status == 403
            || self.status == 429
            || self.remaining.is_some_and(|r| r <= LOW_WATERMARK)
    }
}

/// Compute the pause owed after a response, given the current Unix time.
///
/// Pure apart from the random jitter in the normal-pacing branch.
pub fn plan_pause(signal: &RateSignal, now_epoch: i64) -> Duration {
    if let Some(secs) = signal.retry_after_secs.filter(|s| *s > 0) {
        return Duration::from_secs(secs) + MARGIN;
    }

    if signal.is_exhausted() {
        let until_reset = signal
            .reset_epoch
            .map(|reset| reset.saturating_sub(now_epoch))
            .filter(|secs| *secs > 0);
        return match until_reset {
            Some(secs) => {
                let wait = Duration::from_secs(secs.unsigned_abs()) + MARGIN;
                wait.min(signal.resource.reset_cap())
            }
            None => signal.resource.fallback_backoff(),
        };
    }

    let jitter = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
    signal.resource.base_interval() + Duration::from_millis(jitter)
}

/// How the governor waits. Swapped out in tests so pacing is observable
/// without real sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Applies [`plan_pause`] and waits it out.
pub struct RateGovernor {
    sleeper: Box<dyn Sleeper>,
}

impl RateGovernor {
    pub fn new(sleeper: impl Sleeper + 'static) -> Self {
        Self {
            sleeper: Box::new(sleeper),
        }
    }

    /// Pause after a response. Returns the duration waited.
    pub async fn throttle(&self, signal: &RateSignal) -> Duration {
        let now = chrono::Utc::now().timestamp();
        let pause = plan_pause(signal, now);
        tracing::debug!(
            status = signal.status,
            remaining = ?signal.remaining,
            resource = ?signal.resource,
            pause_ms = pause.as_millis() as u64,
            "rate governor pause"
        );
        self.sleeper.sleep(pause).await;
        pause
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(TokioSleeper)
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor").finish_non_exhaustive()
    }
}
