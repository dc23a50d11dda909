//! Host settings loaded from TOML.
//!
//! Every field is optional in the file; missing fields take their defaults.
//! Out-of-range numbers are reset to defaults by [`AppConfig::normalized`]
//! rather than rejected, so a stale settings file never blocks a run.

use std::path::{Path, PathBuf};

use ghwatch_search::WatchConfig;
use ghwatch_search::config::DEFAULT_API_BASE_URL;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

const DEFAULT_DAYS_BACK: u32 = 7;
const DEFAULT_MAX_PAGES: u32 = 2;
const DEFAULT_PER_PAGE: u32 = 50;
const DEFAULT_ENRICH_WORKERS: usize = 2;

/// Settings file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recency window in days (1..=365).
    pub days_back: u32,
    /// Page cap per search (1..=10).
    pub max_pages: u32,
    /// Items per page (10..=100).
    pub per_page: u32,
    /// Confirm code hit recency through the commits API.
    pub enrich: bool,
    /// Run repository searches.
    pub include_repo_search: bool,
    /// Concurrent commit lookups.
    pub enrich_workers: usize,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Query file; the built-in queries are used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries_file: Option<PathBuf>,
    /// API root (GitHub Enterprise or a mock server).
    pub api_base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            days_back: DEFAULT_DAYS_BACK,
            max_pages: DEFAULT_MAX_PAGES,
            per_page: DEFAULT_PER_PAGE,
            enrich: true,
            include_repo_search: true,
            enrich_workers: DEFAULT_ENRICH_WORKERS,
            token_env: "GITHUB_TOKEN".to_owned(),
            queries_file: None,
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            user_agent: None,
        }
    }
}

impl AppConfig {
    /// Load settings from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| WatchError::Config(format!("{}: {e}", path.display())))
    }

    /// Save settings to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if given, else the default location if it exists, else
    /// defaults.
    ///
    /// # Errors
    ///
    /// An explicitly requested file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_config_path();
                if default.is_file() {
                    tracing::debug!(path = %default.display(), "loading settings");
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Returns the default settings path: `~/.config/ghwatch/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("ghwatch").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("ghwatch")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/ghwatch-config/config.toml")
        }
    }

    /// Copy with every out-of-range number reset to its default.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        if !(1..=365).contains(&out.days_back) {
            tracing::warn!(days_back = out.days_back, "days_back out of range; using default");
            out.days_back = DEFAULT_DAYS_BACK;
        }
        if !(1..=10).contains(&out.max_pages) {
            tracing::warn!(max_pages = out.max_pages, "max_pages out of range; using default");
            out.max_pages = DEFAULT_MAX_PAGES;
        }
        if !(10..=100).contains(&out.per_page) {
            tracing::warn!(per_page = out.per_page, "per_page out of range; using default");
            out.per_page = DEFAULT_PER_PAGE;
        }
        if out.enrich_workers == 0 {
            out.enrich_workers = DEFAULT_ENRICH_WORKERS;
        }
        if out.token_env.trim().is_empty() {
            out.token_env = "GITHUB_TOKEN".to_owned();
        }
        out
    }

    /// Engine settings derived from these (already normalized) settings.
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            days_back: self.days_back,
            max_pages: self.max_pages,
            per_page: self.per_page,
            enrich: self.enrich,
            include_repo_search: self.include_repo_search,
            enrich_workers: self.enrich_workers,
            api_base_url: self.api_base_url.clone(),
            user_agent: self.user_agent.clone(),
            ..WatchConfig::default()
        }
    }

    /// Token from the configured environment variable, if set and non-blank.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let app = AppConfig::default().watch_config();
        let engine = WatchConfig::default();
        assert_eq!(app.days_back, engine.days_back);
        assert_eq!(app.max_pages, engine.max_pages);
        assert_eq!(app.per_page, engine.per_page);
        assert_eq!(app.enrich_workers, engine.enrich_workers);
        assert_eq!(app.api_base_url, engine.api_base_url);
        assert!(app.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str("days_back = 14\nenrich = false\n").unwrap();
        assert_eq!(config.days_back, 14);
        assert!(!config.enrich);
        assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.token_env, "GITHUB_TOKEN");
        assert!(config.queries_file.is_none());
    }

    #[test]
    fn normalized_resets_out_of_range_values() {
        let config = AppConfig {
            days_back: 0,
            max_pages: 50,
            per_page: 5,
            enrich_workers: 0,
            token_env: " ".into(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.days_back, 7);
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.per_page, 50);
        assert_eq!(config.enrich_workers, 2);
        assert_eq!(config.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn normalized_keeps_in_range_values() {
        let config = AppConfig {
            days_back: 365,
            max_pages: 10,
            per_page: 100,
            ..Default::default()
        };
        assert_eq!(config.normalized(), config);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig {
            days_back: 30,
            queries_file: Some(PathBuf::from("/etc/ghwatch/queries.toml")),
            user_agent: Some("watcher/1.0".into()),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/ghwatch/config.toml")));
        assert!(matches!(result, Err(WatchError::Io(_))));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "days_back = \"many\"").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(WatchError::Config(_))
        ));
    }
}
