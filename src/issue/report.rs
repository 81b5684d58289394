// src/issue/report.rs

//! Run summary comments
//!
//! After a row reaches a terminal state, one comment summarizes the run:
//! duration, package counts, per-package details, and the failure reason if
//! the adapter failed. Comments are append-only, so they need none of the
//! engine's concurrency handling, and posting is best-effort: a failed post
//! never rolls back the committed row.

use crate::adapters::{PackageManager, UpdateOutcome};
use crate::issue::client::IssueStore;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::warn;

/// Everything the comment needs about one completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Display name cell of the machine's row (may carry markdown)
    pub display_name: String,
    pub manager: PackageManager,
    pub duration: Duration,
    pub updated: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    /// Present when the adapter failed outright
    pub failure_detail: Option<String>,
}

impl RunSummary {
    /// Summary for a completed adapter run
    pub fn from_outcome(display_name: &str, manager: PackageManager, outcome: &UpdateOutcome) -> Self {
        Self {
            display_name: display_name.to_string(),
            manager,
            duration: outcome.duration,
            updated: outcome
                .updated
                .iter()
                .map(|change| change.describe())
                .collect(),
            failed: outcome.failed.clone(),
            skipped: outcome.skipped.clone(),
            failure_detail: None,
        }
    }

    /// Summary for an adapter that failed before producing an outcome
    pub fn from_failure(
        display_name: &str,
        manager: PackageManager,
        duration: Duration,
        detail: &str,
    ) -> Self {
        Self {
            display_name: display_name.to_string(),
            manager,
            duration,
            updated: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            failure_detail: Some(detail.to_string()),
        }
    }

    /// Render the comment body
    pub fn to_markdown(&self) -> String {
        let mut body = String::new();
        writeln!(body, "## {} : {} upgrade", self.display_name, self.manager).unwrap();
        writeln!(body).unwrap();
        writeln!(body, "Duration: {}", format_duration(self.duration)).unwrap();
        writeln!(body).unwrap();
        writeln!(body, "| Type | Count |").unwrap();
        writeln!(body, "| ---- | ---- |").unwrap();
        writeln!(body, "| Updated | {} |", self.updated.len()).unwrap();
        writeln!(body, "| Failed | {} |", self.failed.len()).unwrap();
        writeln!(body, "| Skipped | {} |", self.skipped.len()).unwrap();

        if let Some(detail) = &self.failure_detail {
            writeln!(body).unwrap();
            writeln!(body, "### Failure").unwrap();
            writeln!(body).unwrap();
            writeln!(body, "```\n{detail}\n```").unwrap();
        }
        push_section(&mut body, "Updated", &self.updated);
        push_section(&mut body, "Failed", &self.failed);
        push_section(&mut body, "Skipped", &self.skipped);
        body
    }
}

fn push_section(body: &mut String, title: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    writeln!(body).unwrap();
    writeln!(body, "### {title}").unwrap();
    writeln!(body).unwrap();
    for entry in entries {
        writeln!(body, "- {entry}").unwrap();
    }
}

fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total >= 60 {
        format!("{}m{}s", total / 60, total % 60)
    } else {
        format!("{total}s")
    }
}

/// Post the summary comment, logging instead of failing on error
pub fn post_summary<S: IssueStore>(store: &S, summary: &RunSummary) {
    if let Err(e) = store.post_comment(&summary.to_markdown()) {
        warn!(
            "Failed to post summary comment for {} ({}): {e}",
            summary.display_name, summary.manager
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PackageChange;
    use crate::error::{Error, Result};
    use crate::issue::client::{IssueSnapshot, WriteOutcome};

    struct UnreachableStore;

    impl IssueStore for UnreachableStore {
        fn fetch(&self) -> Result<IssueSnapshot> {
            Err(Error::Api("HTTP 503 Service Unavailable".to_string()))
        }

        fn write_if_unchanged(&self, _: &IssueSnapshot, _: &str) -> Result<WriteOutcome> {
            Err(Error::Api("HTTP 503 Service Unavailable".to_string()))
        }

        fn post_comment(&self, _: &str) -> Result<()> {
            Err(Error::Api("HTTP 503 Service Unavailable".to_string()))
        }
    }

    #[test]
    fn test_summary_mentions_counts_and_packages() {
        let outcome = UpdateOutcome {
            updated: vec![
                PackageChange::versioned("curl", "8.5.0-2", "8.6.0-1"),
                PackageChange::named("git"),
            ],
            failed: vec!["libssl3".to_string()],
            skipped: Vec::new(),
            duration: Duration::from_secs(95),
        };
        let summary = RunSummary::from_outcome("web01", PackageManager::Apt, &outcome);
        let body = summary.to_markdown();

        assert!(body.starts_with("## web01 : apt upgrade"));
        assert!(body.contains("| Updated | 2 |"));
        assert!(body.contains("| Failed | 1 |"));
        assert!(body.contains("- `curl` (`8.5.0-2` -> `8.6.0-1`)"));
        assert!(body.contains("- libssl3"));
        assert!(body.contains("Duration: 1m35s"));
    }

    #[test]
    fn test_failure_summary_includes_detail() {
        let summary = RunSummary::from_failure(
            "web01",
            PackageManager::Apt,
            Duration::from_secs(3),
            "apt-get update exited with status 100",
        );
        let body = summary.to_markdown();
        assert!(body.contains("### Failure"));
        assert!(body.contains("apt-get update exited with status 100"));
        assert!(body.contains("| Updated | 0 |"));
    }

    #[test]
    fn test_post_summary_is_best_effort() {
        let summary = RunSummary::from_outcome(
            "web01",
            PackageManager::Apt,
            &UpdateOutcome::default(),
        );
        // A failed post only warns; the committed row must stand
        post_summary(&UnreachableStore, &summary);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
    }
}
