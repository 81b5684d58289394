// src/lib.rs

//! fleet-updater
//!
//! Automates OS package updates (Linux apt, Windows scoop) across a fleet of
//! machines, reporting per-machine progress into a single shared GitHub
//! issue formatted as a markdown status table.
//!
//! # Architecture
//!
//! - Shared-document first: the issue body is the only coordination point;
//!   machines never talk to each other
//! - Optimistic concurrency: every row transition is a fetch/mutate/
//!   write-if-unchanged cycle with bounded, jittered retries, no locks
//! - Disjoint rows: each machine mutates only its own marker-tagged row, so
//!   conflicts are transient by construction
//! - Best-effort annotation: EOL classification and summary comments degrade
//!   to warnings, never blocking a status commit

pub mod adapters;
pub mod commands;
pub mod config;
pub mod eol;
mod error;
pub mod issue;

pub use adapters::{adapter_for, PackageChange, PackageManager, PackageManagerAdapter, UpdateOutcome};
pub use config::{detect_hostname, AdapterOptions, Config};
pub use eol::{EolClient, EolRecord, EolSeverity, OsIdentity};
pub use error::{Error, Result};
pub use issue::{
    post_summary, GitHubIssueClient, IssueSnapshot, IssueStore, Revision, RetryPolicy, Row,
    RowChange, RunSummary, Status, StatusTable, UpdateEngine, WriteOutcome,
};
