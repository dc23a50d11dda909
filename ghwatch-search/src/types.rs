//! Core types: the caller's query specification and the hits a run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which search endpoint a [`SearchDefinition`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// `/search/code`: individual files.
    Code,
    /// `/search/repositories`: whole repositories (README, description).
    Repo,
}

impl SearchKind {
    /// Returns the lowercase name used in event phases and query files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Repo => "repo",
        }
    }

    /// API path below the base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Code => "/search/code",
            Self::Repo => "/search/repositories",
        }
    }

    /// Sort key sent with every page request.
    pub fn sort_key(&self) -> &'static str {
        match self {
            Self::Code => "indexed",
            Self::Repo => "updated",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named search inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDefinition {
    pub name: String,
    #[serde(alias = "type")]
    pub kind: SearchKind,
    /// Raw search text as the user wrote it, qualifiers included.
    pub query: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// A named collection of searches that can be toggled as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryGroup {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub searches: Vec<SearchDefinition>,
}

/// The full declarative input of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub groups: Vec<QueryGroup>,
}

fn enabled_by_default() -> bool {
    true
}

impl QuerySpec {
    /// Iterates `(group, search)` pairs that are enabled at both levels, in
    /// declaration order.
    pub fn enabled_searches(&self) -> impl Iterator<Item = (&QueryGroup, &SearchDefinition)> {
        self.groups
            .iter()
            .filter(|g| g.enabled)
            .flat_map(|g| g.searches.iter().filter(|s| s.enabled).map(move |s| (g, s)))
    }
}

/// The recency window `[now - days_back, now]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub days_back: u32,
}

impl Window {
    pub fn new(days_back: u32, now: DateTime<Utc>) -> Self {
        Self {
            since: now - chrono::Duration::days(i64::from(days_back)),
            days_back,
        }
    }

    /// Window ending now.
    pub fn ending_now(days_back: u32) -> Self {
        Self::new(days_back, Utc::now())
    }

    /// Window start as RFC 3339 (`2024-01-01T00:00:00Z`).
    pub fn since_iso(&self) -> String {
        self.since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// Window start as a search qualifier date (`2024-01-01`).
    pub fn since_date(&self) -> String {
        self.since.format("%Y-%m-%d").to_string()
    }

    /// Whether `ts` falls inside the window (inclusive of the start).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.since
    }
}

/// A file matched by code search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeHit {
    pub group: String,
    pub query_name: String,
    /// `owner/name` of the containing repository.
    pub repository: String,
    pub repo_url: String,
    pub file_path: String,
    pub file_url: String,
    pub language: String,
    /// Date of the newest commit touching the file inside the window, when
    /// enrichment has confirmed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_date: Option<DateTime<Utc>>,
}

impl CodeHit {
    /// Natural key used for deduplication.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.repository, &self.file_path, &self.file_url)
    }
}

/// A repository matched by repository search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoHit {
    pub group: String,
    pub query_name: String,
    pub full_name: String,
    pub html_url: String,
    pub description: String,
    pub pushed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of one complete run, handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Findings {
    pub run_id: String,
    /// Window start, RFC 3339.
    pub since_iso: String,
    pub days_back: u32,
    /// Generation time, RFC 3339.
    pub generated: String,
    pub code_hits: Vec<CodeHit>,
    pub repo_hits: Vec<RepoHit>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(name: &str, kind: SearchKind, enabled: bool) -> SearchDefinition {
        SearchDefinition {
            name: name.into(),
            kind,
            query: "\"api.example.com\"".into(),
            enabled,
        }
    }

    #[test]
    fn window_bounds_and_formats() {
        let now = DateTime::parse_from_rfc3339("2024-01-08T12:30:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        let window = Window::new(7, now);
        assert_eq!(window.since_iso(), "2024-01-01T12:30:00Z");
        assert_eq!(window.since_date(), "2024-01-01");
        assert!(window.contains(window.since));
        assert!(window.contains(now));
        assert!(!window.contains(window.since - chrono::Duration::seconds(1)));
    }

    #[test]
    fn search_kind_display_and_endpoints() {
        assert_eq!(SearchKind::Code.to_string(), "code");
        assert_eq!(SearchKind::Repo.to_string(), "repo");
        assert_eq!(SearchKind::Code.endpoint(), "/search/code");
        assert_eq!(SearchKind::Repo.endpoint(), "/search/repositories");
        assert_eq!(SearchKind::Code.sort_key(), "indexed");
        assert_eq!(SearchKind::Repo.sort_key(), "updated");
    }

    #[test]
    fn search_kind_deserializes_lowercase() {
        let kind: SearchKind = serde_json::from_str("\"repo\"").expect("deserialize");
        assert_eq!(kind, SearchKind::Repo);
        assert!(serde_json::from_str::<SearchKind>("\"issues\"").is_err());
    }

    #[test]
    fn enabled_searches_skips_disabled_groups_and_searches() {
        let spec = QuerySpec {
            groups: vec![
                QueryGroup {
                    name: "Alpha".into(),
                    enabled: true,
                    searches: vec![
                        search("a1", SearchKind::Code, true),
                        search("a2", SearchKind::Repo, false),
                        search("a3", SearchKind::Repo, true),
                    ],
                },
                QueryGroup {
                    name: "Beta".into(),
                    enabled: false,
                    searches: vec![search("b1", SearchKind::Code, true)],
                },
            ],
        };

        let names: Vec<_> = spec
            .enabled_searches()
            .map(|(g, s)| format!("{}/{}", g.name, s.name))
            .collect();
        assert_eq!(names, vec!["Alpha/a1", "Alpha/a3"]);
    }

    #[test]
    fn enabled_defaults_to_true_when_omitted() {
        let json = r#"{"groups":[{"name":"G","searches":[{"name":"s","kind":"code","query":"x"}]}]}"#;
        let spec: QuerySpec = serde_json::from_str(json).expect("deserialize");
        assert!(spec.groups[0].enabled);
        assert!(spec.groups[0].searches[0].enabled);
    }

    #[test]
    fn code_hit_serializes_camel_case_and_omits_missing_date() {
        let hit = CodeHit {
            group: "G".into(),
            query_name: "q".into(),
            repository: "octo/repo".into(),
            repo_url: "https://github.com/octo/repo".into(),
            file_path: "src/main.py".into(),
            file_url: "https://github.com/octo/repo/blob/main/src/main.py".into(),
            language: "Python".into(),
            commit_date: None,
        };
        let json = serde_json::to_string(&hit).expect("serialize");
        assert!(json.contains("\"queryName\":\"q\""));
        assert!(json.contains("\"filePath\""));
        assert!(!json.contains("commitDate"));
        assert_eq!(
            hit.key(),
            (
                "octo/repo",
                "src/main.py",
                "https://github.com/octo/repo/blob/main/src/main.py"
            )
        );
    }
}
