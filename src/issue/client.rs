// src/issue/client.rs

//! GitHub issue access
//!
//! Wraps the blocking HTTP client behind the `IssueStore` seam the update
//! engine works against. GitHub has no native conditional issue update, so
//! the conditional write re-reads the issue immediately before PATCH and
//! diffs it against the revision captured at cycle start; a HTTP 409 from
//! the PATCH itself is also treated as a conflict.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Default timeout for issue API requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default API root, overridable for self-hosted installations
const API_ROOT: &str = "https://api.github.com";

/// Opaque revision marker for optimistic concurrency
///
/// For GitHub this is the issue's `updated_at` timestamp; the in-memory test
/// store uses a write counter. Only equality matters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(pub String);

/// One read of the shared document
#[derive(Debug, Clone)]
pub struct IssueSnapshot {
    pub body: String,
    pub revision: Revision,
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was unchanged since the snapshot and now carries the new body
    Committed,
    /// The document moved underneath us; re-fetch and replay
    Conflict,
}

/// Read/conditional-write/comment access to one shared issue
///
/// The engine never holds a lock across calls: it only ever reads, then
/// conditionally writes.
pub trait IssueStore {
    /// Fetch the current body and revision marker
    fn fetch(&self) -> Result<IssueSnapshot>;

    /// Write `body` only if the document still matches `expected`
    fn write_if_unchanged(&self, expected: &IssueSnapshot, body: &str) -> Result<WriteOutcome>;

    /// Append a comment; append-only, needs no concurrency control
    fn post_comment(&self, body: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    body: Option<String>,
    updated_at: String,
}

/// Issue store backed by the GitHub REST API
pub struct GitHubIssueClient {
    client: Client,
    api_root: String,
    repository: String,
    issue_number: u64,
    token: String,
}

impl GitHubIssueClient {
    pub fn new(repository: &str, issue_number: u64, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("fleet-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_root: API_ROOT.to_string(),
            repository: repository.to_string(),
            issue_number,
            token: token.to_string(),
        })
    }

    fn issue_url(&self) -> String {
        format!(
            "{}/repos/{}/issues/{}",
            self.api_root, self.repository, self.issue_number
        )
    }

    fn get_issue(&self) -> Result<IssuePayload> {
        let response = self
            .client
            .get(self.issue_url())
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "Failed to get issue {}: HTTP {}",
                self.issue_number,
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| Error::Api(format!("Failed to parse issue payload: {e}")))
    }
}

impl IssueStore for GitHubIssueClient {
    fn fetch(&self) -> Result<IssueSnapshot> {
        let payload = self.get_issue()?;
        debug!(
            "Fetched issue {} (updated_at {})",
            self.issue_number, payload.updated_at
        );
        Ok(IssueSnapshot {
            body: payload.body.unwrap_or_default(),
            revision: Revision(payload.updated_at),
        })
    }

    fn write_if_unchanged(&self, expected: &IssueSnapshot, body: &str) -> Result<WriteOutcome> {
        // Narrow the race window: re-read and diff right before the PATCH.
        let current = self.fetch()?;
        if current.revision != expected.revision || current.body != expected.body {
            debug!(
                "Issue {} changed since snapshot ({} -> {})",
                self.issue_number, expected.revision.0, current.revision.0
            );
            return Ok(WriteOutcome::Conflict);
        }

        let response = self
            .client
            .patch(self.issue_url())
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))
            .send()?;
        match response.status() {
            status if status.is_success() => Ok(WriteOutcome::Committed),
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status => Err(Error::Api(format!(
                "Failed to update issue body: HTTP {status}"
            ))),
        }
    }

    fn post_comment(&self, body: &str) -> Result<()> {
        let url = format!("{}/comments", self.issue_url());
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))
            .send()?;
        if response.status() != StatusCode::CREATED {
            return Err(Error::Api(format!(
                "Failed to post comment: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_url_shape() {
        let client = GitHubIssueClient::new("owner/repo", 123, "token").unwrap();
        assert_eq!(
            client.issue_url(),
            "https://api.github.com/repos/owner/repo/issues/123"
        );
    }

    #[test]
    fn test_revision_equality() {
        assert_eq!(
            Revision("2026-01-01T00:00:00Z".to_string()),
            Revision("2026-01-01T00:00:00Z".to_string())
        );
        assert_ne!(
            Revision("2026-01-01T00:00:00Z".to_string()),
            Revision("2026-01-01T00:00:01Z".to_string())
        );
    }
}
