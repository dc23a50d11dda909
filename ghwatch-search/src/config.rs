//! Run-wide tuning with sensible defaults.
//!
//! [`WatchConfig`] controls the time window, pagination caps, enrichment and
//! the HTTP client. The defaults are tuned for the search API's
//! ~5 requests/minute ceiling.

use std::time::Duration;

use crate::error::SearchError;
use crate::types::QuerySpec;

/// Default API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Per-request time estimate used to size the run deadline.
const BUDGET_PER_REQUEST: Duration = Duration::from_secs(12);
/// Slack added on top of the per-request estimate.
const BUDGET_MARGIN: Duration = Duration::from_secs(60);
const BUDGET_FLOOR: Duration = Duration::from_secs(4 * 60);
const BUDGET_CAP: Duration = Duration::from_secs(10 * 60);

/// Configuration for one watch run.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Size of the recency window in days (1..=365).
    pub days_back: u32,
    /// Page cap per search (1..=10).
    pub max_pages: u32,
    /// Items requested per page (10..=100).
    pub per_page: u32,
    /// Whether to confirm code hit recency through the commits API.
    pub enrich: bool,
    /// Whether repository searches run at all.
    pub include_repo_search: bool,
    /// Worker count for the enrichment fan-out.
    pub enrich_workers: usize,
    /// Timeout for each enrichment request in seconds.
    pub detail_timeout_seconds: u64,
    /// Client-wide HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// API root, without trailing slash. Overridable for tests and GHES.
    pub api_base_url: String,
    /// Custom User-Agent. Defaults to `ghwatch/<version>`.
    pub user_agent: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            days_back: 7,
            max_pages: 2,
            per_page: 50,
            enrich: true,
            include_repo_search: true,
            enrich_workers: 2,
            detail_timeout_seconds: 10,
            timeout_seconds: 30,
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            user_agent: None,
        }
    }
}

impl WatchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(1..=365).contains(&self.days_back) {
            return Err(SearchError::Config(
                "days_back must be between 1 and 365".into(),
            ));
        }
        if !(1..=10).contains(&self.max_pages) {
            return Err(SearchError::Config(
                "max_pages must be between 1 and 10".into(),
            ));
        }
        if !(10..=100).contains(&self.per_page) {
            return Err(SearchError::Config(
                "per_page must be between 10 and 100".into(),
            ));
        }
        if self.enrich_workers == 0 {
            return Err(SearchError::Config(
                "enrich_workers must be greater than 0".into(),
            ));
        }
        if self.detail_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "detail_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(SearchError::Config(
                "api_base_url must be an http(s) URL".into(),
            ));
        }
        Ok(())
    }

    /// API root with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}

/// Deadline for the search phase, sized from the number of requests the
/// query set can issue.
///
/// `enabled searches × max_pages × 12s + 60s`, clamped to 4..=10 minutes.
/// Repository searches are counted even when `include_repo_search` is off.
pub fn run_budget(spec: &QuerySpec, config: &WatchConfig) -> Duration {
    let searches = spec.enabled_searches().count() as u32;
    let requests = searches.saturating_mul(config.max_pages.max(1));
    let budget = BUDGET_PER_REQUEST.saturating_mul(requests) + BUDGET_MARGIN;
    budget.clamp(BUDGET_FLOOR, BUDGET_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QueryGroup, SearchDefinition, SearchKind};

    fn queries_with(searches: usize) -> QuerySpec {
        QuerySpec {
            groups: vec![QueryGroup {
                name: "G".into(),
                enabled: true,
                searches: (0..searches)
                    .map(|i| SearchDefinition {
                        name: format!("s{i}"),
                        kind: SearchKind::Code,
                        query: "x".into(),
                        enabled: true,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn default_config_has_sensible_values() {
        let config = WatchConfig::default();
        assert_eq!(config.days_back, 7);
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.per_page, 50);
        assert!(config.enrich);
        assert!(config.include_repo_search);
        assert_eq!(config.enrich_workers, 2);
        assert_eq!(config.detail_timeout_seconds, 10);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(WatchConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_days_back_rejected() {
        for days_back in [0, 366] {
            let config = WatchConfig {
                days_back,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("days_back"));
        }
    }

    #[test]
    fn out_of_range_max_pages_rejected() {
        let config = WatchConfig {
            max_pages: 11,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("max_pages"));
    }

    #[test]
    fn out_of_range_per_page_rejected() {
        let config = WatchConfig {
            per_page: 5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("per_page"));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = WatchConfig {
            enrich_workers: 0,
            ..Default::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("enrich_workers"));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let config = WatchConfig {
            api_base_url: "ftp://example.com".into(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("api_base_url"));
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let config = WatchConfig {
            api_base_url: "http://127.0.0.1:9000/".into(),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn budget_is_floored_for_few_searches() {
        let budget = run_budget(&queries_with(1), &WatchConfig::default());
        assert_eq!(budget, Duration::from_secs(240));
    }

    #[test]
    fn budget_scales_with_searches_and_pages() {
        // 12 searches × 2 pages × 12s + 60s = 348s
        let budget = run_budget(&queries_with(12), &WatchConfig::default());
        assert_eq!(budget, Duration::from_secs(348));
    }

    #[test]
    fn budget_is_capped_for_many_searches() {
        let config = WatchConfig {
            max_pages: 10,
            ..Default::default()
        };
        let budget = run_budget(&queries_with(40), &config);
        assert_eq!(budget, Duration::from_secs(600));
    }
}
