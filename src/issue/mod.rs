// src/issue/mod.rs

//! Shared-issue state: table codec, optimistic update engine, reporting

pub mod client;
pub mod engine;
pub mod report;
pub mod table;

pub use client::{GitHubIssueClient, IssueSnapshot, IssueStore, Revision, WriteOutcome};
pub use engine::{RetryPolicy, UpdateEngine};
pub use report::{post_summary, RunSummary};
pub use table::{Row, RowChange, Status, StatusTable};
