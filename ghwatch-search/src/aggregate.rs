//! Final assembly of a run: deduplicate, order, and package the hits.

use std::collections::HashSet;

use chrono::Utc;

use crate::types::{CodeHit, Findings, RepoHit, Window};

/// Drop repeated `(repository, file_path, file_url)` keys, keeping the first.
pub fn dedupe_code(hits: Vec<CodeHit>) -> Vec<CodeHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| {
            let (repo, path, url) = h.key();
            seen.insert((repo.to_owned(), path.to_owned(), url.to_owned()))
        })
        .collect()
}

/// Drop repeated `full_name`s, keeping the first.
pub fn dedupe_repo(hits: Vec<RepoHit>) -> Vec<RepoHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.full_name.clone()))
        .collect()
}

/// Newest commit first; undated hits last. Ties keep their input order.
pub fn sort_code(hits: &mut [CodeHit]) {
    hits.sort_by(|a, b| match (a.commit_date, b.commit_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// Most recently pushed first. Ties keep their input order.
pub fn sort_repo(hits: &mut [RepoHit]) {
    hits.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
}

/// Keep only hits with a confirmed commit inside `window`.
pub fn retain_recent_code(hits: Vec<CodeHit>, window: &Window) -> Vec<CodeHit> {
    hits.into_iter()
        .filter(|h| h.commit_date.is_some_and(|d| window.contains(d)))
        .collect()
}

/// Deduplicate, sort and wrap everything a run produced.
pub fn assemble_findings(
    run_id: &str,
    window: &Window,
    code_hits: Vec<CodeHit>,
    repo_hits: Vec<RepoHit>,
    notes: Vec<String>,
) -> Findings {
    let mut code_hits = dedupe_code(code_hits);
    let mut repo_hits = dedupe_repo(repo_hits);
    sort_code(&mut code_hits);
    sort_repo(&mut repo_hits);

    Findings {
        run_id: run_id.to_owned(),
        since_iso: window.since_iso(),
        days_back: window.days_back,
        generated: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        code_hits,
        repo_hits,
        notes,
    }
}
