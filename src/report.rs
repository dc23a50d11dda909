//! Plain Markdown digest of a run's findings.

use std::fmt::Write as _;

use ghwatch_search::Findings;

/// Entries listed per section.
const TOP_N: usize = 10;

/// Render `findings` as a short Markdown report.
///
/// Output depends only on `findings`, so the same run always renders the
/// same text.
pub fn render_markdown(findings: &Findings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# ghwatch report {}\n", findings.run_id);
    let _ = writeln!(
        out,
        "Window: {} (last {} days)\n",
        findings.since_iso, findings.days_back
    );
    let _ = writeln!(out, "- Code hits: {}", findings.code_hits.len());
    let _ = writeln!(out, "- Repo hits: {}\n", findings.repo_hits.len());

    if !findings.notes.is_empty() {
        out.push_str("Notes:\n");
        for note in &findings.notes {
            let _ = writeln!(out, "- {note}");
        }
        out.push('\n');
    }

    if !findings.code_hits.is_empty() {
        out.push_str("Top code hits:\n");
        for hit in findings.code_hits.iter().take(TOP_N) {
            let _ = writeln!(out, "- {}: {}", hit.repository, hit.file_url);
        }
        out.push('\n');
    }

    if !findings.repo_hits.is_empty() {
        out.push_str("Top repos:\n");
        for repo in findings.repo_hits.iter().take(TOP_N) {
            let _ = writeln!(out, "- {}: {}", repo.full_name, repo.html_url);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Generated {}", findings.generated);
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::{TimeZone, Utc};
    use ghwatch_search::{CodeHit, RepoHit};

    fn findings() -> Findings {
        Findings {
            run_id: "20240110T120000Z".into(),
            since_iso: "2024-01-03T12:00:00Z".into(),
            days_back: 7,
            generated: "2024-01-10T12:00:05Z".into(),
            code_hits: Vec::new(),
            repo_hits: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn code(i: usize) -> CodeHit {
        CodeHit {
            group: "G".into(),
            query_name: "q".into(),
            repository: format!("octo/r{i}"),
            repo_url: format!("https://github.com/octo/r{i}"),
            file_path: "main.py".into(),
            file_url: format!("https://github.com/octo/r{i}/blob/main/main.py"),
            language: "Python".into(),
            commit_date: None,
        }
    }

    #[test]
    fn empty_findings_render_header_and_counts_only() {
        let md = render_markdown(&findings());
        assert!(md.starts_with("# ghwatch report 20240110T120000Z\n"));
        assert!(md.contains("Window: 2024-01-03T12:00:00Z (last 7 days)"));
        assert!(md.contains("- Code hits: 0\n- Repo hits: 0\n"));
        assert!(!md.contains("Notes:"));
        assert!(!md.contains("Top code hits:"));
        assert!(!md.contains("Top repos:"));
    }

    #[test]
    fn lists_are_capped_at_ten() {
        let mut f = findings();
        f.code_hits = (0..12).map(code).collect();
        let md = render_markdown(&f);
        assert!(md.contains("- Code hits: 12"));
        assert!(md.contains("- octo/r9: https://github.com/octo/r9/blob/main/main.py"));
        assert!(!md.contains("octo/r10"));
    }

    #[test]
    fn notes_and_repos_are_listed() {
        let mut f = findings();
        f.notes = vec!["No repo hits for G — q".into()];
        f.repo_hits = vec![RepoHit {
            group: "G".into(),
            query_name: "q".into(),
            full_name: "octo/tool".into(),
            html_url: "https://github.com/octo/tool".into(),
            description: String::new(),
            pushed_at: Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap(),
            created_at: None,
        }];
        let md = render_markdown(&f);
        assert!(md.contains("Notes:\n- No repo hits for G — q\n"));
        assert!(md.contains("Top repos:\n- octo/tool: https://github.com/octo/tool\n"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut f = findings();
        f.code_hits = (0..3).map(code).collect();
        assert_eq!(render_markdown(&f), render_markdown(&f));
    }
}
