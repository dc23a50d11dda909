//! Shared HTTP client for the search and commits endpoints.
//!
//! Wraps a [`reqwest::Client`] with the API base URL and the optional bearer
//! credential so every request carries the same headers.

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;

use crate::config::WatchConfig;
use crate::error::SearchError;

/// Media type requested from the API.
const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// Response body truncated in events and notes.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Default User-Agent; the API rejects requests without one.
pub fn default_user_agent() -> String {
    format!("ghwatch/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a [`reqwest::Client`] for the API.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &WatchConfig) -> Result<reqwest::Client, SearchError> {
    let ua = config
        .user_agent
        .clone()
        .unwrap_or_else(default_user_agent);

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// A fully read response: status, headers and body text.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    /// Raw header value, or `""` when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn rate_remaining(&self) -> &str {
        self.header("x-ratelimit-remaining")
    }

    pub fn rate_reset(&self) -> &str {
        self.header("x-ratelimit-reset")
    }
}

/// Authenticated API client.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Build a client from `config`. A blank `token` means anonymous access.
    pub fn new(config: &WatchConfig, token: Option<&str>) -> Result<Self, SearchError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url().to_owned(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Start a GET with the API's accept header and bearer credential.
    pub fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url).header(ACCEPT, ACCEPT_GITHUB_JSON);
        match self.token {
            Some(ref token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Send `builder` and read the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] on transport failure or when the body
    /// cannot be read. Non-success statuses are returned as `Ok`.
    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<ApiResponse, SearchError> {
        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("request failed: {e}")))?;
        let status = response.status();
        let headers = response.headers().clone();
        let mut body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("response read failed: {e}")))?;
        if body.len() > MAX_BODY_BYTES {
            body = truncate(&body, MAX_BODY_BYTES);
        }
        tracing::trace!(status = status.as_u16(), bytes = body.len(), "API response received");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// GET `url` and read the whole body.
    pub async fn get(&self, url: &str) -> Result<ApiResponse, SearchError> {
        self.send(self.request(url)).await
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_agent_names_crate_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("ghwatch/"));
    }

    #[test]
    fn build_client_with_default_config() {
        assert!(build_client(&WatchConfig::default()).is_ok());
    }

    #[test]
    fn blank_token_means_anonymous() {
        let config = WatchConfig::default();
        let client = GitHubClient::new(&config, Some("   ")).expect("client");
        assert!(!client.has_token());
        let client = GitHubClient::new(&config, Some("ghp_x")).expect("client");
        assert!(client.has_token());
    }

    #[test]
    fn bearer_header_attached_when_token_present() {
        let config = WatchConfig::default();
        let client = GitHubClient::new(&config, Some("secret")).expect("client");
        let request = client
            .request("https://api.github.com/search/code?q=x")
            .build()
            .expect("request");
        assert_eq!(
            request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
        assert_eq!(
            request.headers().get(ACCEPT).and_then(|v| v.to_str().ok()),
            Some(ACCEPT_GITHUB_JSON)
        );
    }

    #[test]
    fn no_authorization_header_without_token() {
        let client = GitHubClient::new(&WatchConfig::default(), None).expect("client");
        let request = client
            .request("https://api.github.com/rate_limit")
            .build()
            .expect("request");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn debug_output_hides_token() {
        let client = GitHubClient::new(&WatchConfig::default(), Some("ghp_secret")).expect("client");
        let debug = format!("{client:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("authenticated: true"));
    }

    #[test]
    fn truncate_short_strings_untouched() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("ééé", 3), "é…");
    }
}
