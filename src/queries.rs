//! Query files: named groups of code and repository searches in TOML.
//!
//! ```toml
//! [[groups]]
//! name = "Polygon.io"
//!
//! [[groups.searches]]
//! name = "Polygon REST endpoints"
//! kind = "code"
//! query = '"api.polygon.io"'
//! ```
//!
//! `enabled` defaults to `true` at both levels; `type` is accepted as an
//! alias for `kind`.

use std::path::Path;

use ghwatch_search::QuerySpec;

use crate::error::{Result, WatchError};

/// Built-in query set used when no query file is configured.
pub const DEFAULT_QUERIES: &str = r#"# ghwatch queries
# Toggle `enabled` to include or exclude groups and searches.
# Keep queries tight and language-specific where possible; code searches are
# sorted by index time and repository searches by update time automatically.

[[groups]]
name = "Polygon.io"
enabled = true

[[groups.searches]]
name = "Polygon REST endpoints"
kind = "code"
query = '"api.polygon.io"'

[[groups.searches]]
name = "Polygon Python usage"
kind = "code"
query = '"import polygon" OR "from polygon" language:python'

[[groups.searches]]
name = "Go module"
kind = "code"
query = 'filename:go.mod "github.com/polygon-io"'

[[groups.searches]]
name = "Repo mention (README/desc)"
kind = "repo"
query = '(polygon OR "api.polygon.io") in:readme,description'

[[groups]]
name = "Alpaca"
enabled = true

[[groups.searches]]
name = "Alpaca REST endpoints"
kind = "code"
query = '"api.alpaca.markets" OR "paper-api.alpaca.markets"'

[[groups.searches]]
name = "Alpaca Python client"
kind = "code"
query = '"import alpaca_trade_api" language:python'

[[groups.searches]]
name = "Go client"
kind = "code"
query = '"github.com/alpacahq/alpaca-trade-api-go" language:go'

[[groups.searches]]
name = "Repo mention"
kind = "repo"
query = '(alpaca OR "alpaca.markets") in:readme,description'

[[groups]]
name = "IBKR"
enabled = true

[[groups.searches]]
name = "ibapi / ib_insync (Python)"
kind = "code"
query = '"import ibapi" OR "from ibapi" OR "import ib_insync" OR "from ib_insync" language:python'

[[groups.searches]]
name = "Java client classes"
kind = "code"
query = '"com.ib.client" language:java'

[[groups.searches]]
name = "Repo mention"
kind = "repo"
query = '(ibkr OR ibapi OR "Interactive Brokers") in:readme,description'

[[groups]]
name = "Databento"
enabled = true

[[groups.searches]]
name = "Databento Python"
kind = "code"
query = '"import databento" OR "from databento" language:python'

[[groups.searches]]
name = "Endpoints / hostnames"
kind = "code"
query = '"hist.databento.com" OR "live.databento.com"'

[[groups.searches]]
name = "Repo mention"
kind = "repo"
query = 'databento in:readme,description'
"#;

/// Parse a query specification from TOML text.
///
/// # Errors
///
/// Returns [`WatchError::Config`] for malformed TOML, unknown search kinds,
/// blank names or queries, or a file with no groups.
pub fn parse_queries(text: &str) -> Result<QuerySpec> {
    let spec: QuerySpec =
        toml::from_str(text).map_err(|e| WatchError::Config(format!("queries: {e}")))?;
    if spec.groups.is_empty() {
        return Err(WatchError::Config("queries: no groups defined".into()));
    }
    for group in &spec.groups {
        if group.name.trim().is_empty() {
            return Err(WatchError::Config("queries: group with empty name".into()));
        }
        for search in &group.searches {
            if search.query.trim().is_empty() {
                return Err(WatchError::Config(format!(
                    "queries: search {:?} in group {:?} has an empty query",
                    search.name, group.name
                )));
            }
        }
    }
    Ok(spec)
}

/// Load a query specification from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails [`parse_queries`].
pub fn load_queries(path: &Path) -> Result<QuerySpec> {
    let text = std::fs::read_to_string(path)?;
    parse_queries(&text).map_err(|e| match e {
        WatchError::Config(msg) => WatchError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// The built-in query set.
///
/// # Errors
///
/// Only fails if [`DEFAULT_QUERIES`] itself is malformed.
pub fn default_queries() -> Result<QuerySpec> {
    parse_queries(DEFAULT_QUERIES)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use ghwatch_search::SearchKind;

    #[test]
    fn default_queries_parse_into_four_groups() {
        let spec = default_queries().unwrap();
        let names: Vec<&str> = spec.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Polygon.io", "Alpaca", "IBKR", "Databento"]);
        assert_eq!(spec.enabled_searches().count(), 14);
        assert!(spec
            .groups
            .iter()
            .all(|g| g.searches.iter().any(|s| s.kind == SearchKind::Repo)));
    }

    #[test]
    fn default_queries_keep_quoted_phrases() {
        let spec = default_queries().unwrap();
        assert_eq!(spec.groups[0].searches[0].query, "\"api.polygon.io\"");
    }

    #[test]
    fn type_alias_and_disabled_flags() {
        let spec = parse_queries(
            r#"
[[groups]]
name = "G"
enabled = false

[[groups.searches]]
name = "s"
type = "repo"
query = "x"
enabled = false
"#,
        )
        .unwrap();
        assert!(!spec.groups[0].enabled);
        assert_eq!(spec.groups[0].searches[0].kind, SearchKind::Repo);
        assert!(!spec.groups[0].searches[0].enabled);
        assert_eq!(spec.enabled_searches().count(), 0);
    }

    #[test]
    fn unknown_kind_rejected() {
        let err = parse_queries(
            "[[groups]]\nname = \"G\"\n[[groups.searches]]\nname = \"s\"\nkind = \"issues\"\nquery = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[test]
    fn empty_file_rejected() {
        let err = parse_queries("").unwrap_err();
        assert!(err.to_string().contains("no groups"));
    }

    #[test]
    fn blank_query_rejected() {
        let err = parse_queries(
            "[[groups]]\nname = \"G\"\n[[groups.searches]]\nname = \"s\"\nkind = \"code\"\nquery = \"  \"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty query"));
    }

    #[test]
    fn load_queries_names_the_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.toml");
        std::fs::write(&path, "groups = 3").unwrap();
        let err = load_queries(&path).unwrap_err();
        assert!(err.to_string().contains("queries.toml"));
    }
}
