// src/commands.rs

//! Per-run orchestration
//!
//! Wires config, the issue store, the EOL classifier, and the adapters into
//! one run: enumerate this machine's rows, and for each supported manager
//! drive the row through `running` to a terminal state, then post the
//! summary comment. The process fails (non-zero exit) on any core-path
//! failure, but only after the row reflects a terminal state.

use crate::adapters::{adapter_for, PackageManager};
use crate::config::{detect_hostname, AdapterOptions, Config};
use crate::eol::{EolClient, EolRecord};
use crate::error::{Error, Result};
use crate::issue::{
    post_summary, GitHubIssueClient, IssueStore, RowChange, RunSummary, Status, StatusTable,
    UpdateEngine,
};
use std::str::FromStr;
use std::time::Instant;
use tracing::{error, info, warn};

/// CLI-level knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub issue_number: u64,
    /// Overrides hostname detection (automation and tests)
    pub hostname: Option<String>,
    pub confirm_before_stop: bool,
}

/// Run every package manager the status table lists for this machine
pub fn run_update(options: &RunOptions) -> Result<()> {
    let adapter_options = AdapterOptions {
        confirm_before_stop: options.confirm_before_stop,
    };
    let config = Config::load(adapter_options)?;
    let hostname = match &options.hostname {
        Some(hostname) => hostname.clone(),
        None => detect_hostname()?,
    };
    info!("Issue number: {}", options.issue_number);
    info!("Hostname: {hostname}");

    let store = GitHubIssueClient::new(&config.repository, options.issue_number, &config.token)?;
    let snapshot = store.fetch()?;
    let table = StatusTable::parse(&snapshot.body);
    let managers = table.managers_for(&hostname);
    if managers.is_empty() {
        warn!("No package managers found for {hostname}");
        return Ok(());
    }
    info!("Package managers: {}", managers.join(", "));
    let display_name = table
        .display_name(&hostname)
        .unwrap_or(&hostname)
        .to_string();

    // One classification per run; "days remaining" is stable within a run
    let eol = match EolClient::new() {
        Ok(client) => client.classify_current_os(),
        Err(e) => {
            warn!("EOL classifier unavailable: {e}");
            EolRecord::unknown(None)
        }
    };
    info!("OS EOL: {}", eol.annotation());

    let engine = UpdateEngine::new(&store);
    let mut first_failure: Option<Error> = None;
    for label in managers {
        let Ok(manager) = PackageManager::from_str(&label) else {
            error!("Unknown package manager in table: {label}");
            first_failure.get_or_insert(Error::Config(format!("Unknown package manager: {label}")));
            continue;
        };
        if !manager.supported_on_current_os() {
            warn!("Skipping {manager}: not supported on this platform");
            continue;
        }
        if let Err(e) = run_manager(
            &engine,
            &store,
            &display_name,
            &hostname,
            manager,
            adapter_options,
            &eol,
        ) {
            error!("{manager} run failed: {e}");
            first_failure.get_or_insert(e);
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Drive one manager's row through its full cycle
fn run_manager<S: IssueStore>(
    engine: &UpdateEngine<'_, S>,
    store: &S,
    display_name: &str,
    hostname: &str,
    manager: PackageManager,
    adapter_options: AdapterOptions,
    eol: &EolRecord,
) -> Result<()> {
    let manager_id = manager.to_string();
    let annotation = eol.annotation();

    let running = RowChange::new(Status::Running)
        .with_cleared_counts()
        .with_eol(annotation.clone());
    engine.update_row(hostname, &manager_id, &running)?;

    let start = Instant::now();
    let adapter = adapter_for(manager, adapter_options);
    match adapter.run() {
        Ok(outcome) => {
            let status = if outcome.is_success() {
                Status::Success
            } else {
                Status::Failed
            };
            let change = RowChange::new(status)
                .with_counts(outcome.updated.len(), outcome.failed.len())
                .with_eol(annotation);
            engine.update_row(hostname, &manager_id, &change)?;

            post_summary(store, &RunSummary::from_outcome(display_name, manager, &outcome));
            info!(
                "{manager} run finished: {} updated, {} failed, {} skipped",
                outcome.updated.len(),
                outcome.failed.len(),
                outcome.skipped.len()
            );

            if outcome.is_success() {
                Ok(())
            } else {
                Err(Error::AdapterFailed {
                    manager: manager_id,
                    reason: format!("{} package(s) failed to update", outcome.failed.len()),
                })
            }
        }
        Err(e) => {
            // Commit the terminal state before surfacing the adapter error
            let mut change = RowChange::new(Status::Failed)
                .with_cleared_counts()
                .with_eol(annotation);
            change.failed = Some("1".to_string());
            engine.update_row(hostname, &manager_id, &change)?;

            post_summary(
                store,
                &RunSummary::from_failure(display_name, manager, start.elapsed(), &e.to_string()),
            );
            Err(e)
        }
    }
}
