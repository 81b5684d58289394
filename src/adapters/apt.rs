// src/adapters/apt.rs

//! apt adapter (Debian/Ubuntu)
//!
//! Runs `apt-get update`, simulates `apt-get -s -V dist-upgrade` to
//! enumerate the pending changes without depending on libapt, performs the
//! real dist-upgrade, then re-simulates to account for what actually moved:
//! packages still listed afterwards are the failures.

use super::{PackageChange, PackageManager, PackageManagerAdapter, UpdateOutcome};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::process::{Command, Output};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// `candidate` captures only the version (e.g. "1.1-1"), ignoring repo metadata.
static INST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Inst\s+(?P<name>\S+)(?:\s+\[(?P<installed>[^\]]+)\])?\s+\((?P<candidate>[^\s\)]+)")
        .unwrap()
});

static REMV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Remv\s+(?P<name>\S+)(?:\s+\[(?P<installed>[^\]]+)\])?").unwrap());

static SUMMARY_UPGRADE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>\S+)\s+\((?P<installed>[^\s=>)]+)\s+=>\s+(?P<candidate>[^\s=>)]+)\)")
        .unwrap()
});

/// Pending changes reported by a dist-upgrade simulation
#[derive(Debug, Clone, Default)]
pub struct UpgradePlan {
    pub upgrade: Vec<PackageChange>,
    pub install: Vec<PackageChange>,
    pub remove: Vec<PackageChange>,
}

impl UpgradePlan {
    pub fn is_empty(&self) -> bool {
        self.upgrade.is_empty() && self.install.is_empty() && self.remove.is_empty()
    }
}

pub struct AptAdapter;

impl AptAdapter {
    pub fn new() -> Self {
        Self
    }

    fn refresh_index(&self) -> Result<()> {
        info!("Updating package list...");
        run_apt(&["update"]).map(|_| ())
    }

    fn simulate_upgrade(&self) -> Result<UpgradePlan> {
        let output = run_apt(&["-s", "-V", "dist-upgrade"])?;
        Ok(parse_simulation(&String::from_utf8_lossy(&output.stdout)))
    }

    fn full_upgrade(&self) -> Result<bool> {
        info!("Upgrading packages...");
        let status = Command::new("apt-get")
            .args(["-y", "dist-upgrade"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .status()
            .map_err(|e| Error::CommandFailed(format!("Failed to run apt-get dist-upgrade: {e}")))?;
        Ok(status.success())
    }
}

impl Default for AptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageManagerAdapter for AptAdapter {
    fn manager(&self) -> PackageManager {
        PackageManager::Apt
    }

    fn run(&self) -> Result<UpdateOutcome> {
        ensure_root()?;
        let start = Instant::now();

        self.refresh_index()?;
        let plan = self.simulate_upgrade()?;
        info!(
            "Pending changes: {} upgrades, {} installs, {} removals",
            plan.upgrade.len(),
            plan.install.len(),
            plan.remove.len()
        );

        if plan.is_empty() {
            return Ok(UpdateOutcome {
                duration: start.elapsed(),
                ..Default::default()
            });
        }

        let upgrade_ok = self.full_upgrade()?;

        // Whatever the simulation still lists did not make it.
        self.refresh_index()?;
        let remaining = self.simulate_upgrade()?;
        let remaining_names: HashSet<&str> = remaining
            .upgrade
            .iter()
            .map(|change| change.name.as_str())
            .collect();

        let mut updated = Vec::new();
        let mut failed = Vec::new();
        for change in plan.upgrade {
            if remaining_names.contains(change.name.as_str()) {
                failed.push(change.name);
            } else {
                updated.push(change);
            }
        }
        // New installs pulled in by the upgrade count as updates too
        for change in plan.install {
            if !remaining_names.contains(change.name.as_str()) {
                updated.push(change);
            }
        }

        if !upgrade_ok && failed.is_empty() {
            return Err(Error::AdapterFailed {
                manager: PackageManager::Apt.to_string(),
                reason: "apt-get -y dist-upgrade exited with failure".to_string(),
            });
        }

        Ok(UpdateOutcome {
            updated,
            failed,
            skipped: Vec::new(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(unix)]
fn ensure_root() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        return Err(Error::AdapterFailed {
            manager: PackageManager::Apt.to_string(),
            reason: "apt upgrades must run as root".to_string(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_root() -> Result<()> {
    Err(Error::AdapterFailed {
        manager: PackageManager::Apt.to_string(),
        reason: "apt is only available on Unix".to_string(),
    })
}

/// Run apt-get with piped output, classifying stderr lines
fn run_apt(args: &[&str]) -> Result<Output> {
    let output = Command::new("apt-get")
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .output()
        .map_err(|e| Error::CommandFailed(format!("Failed to run apt-get {}: {e}", args.join(" "))))?;
    log_apt_stderr(&String::from_utf8_lossy(&output.stderr), args[0]);
    if !output.status.success() {
        return Err(Error::CommandFailed(format!(
            "apt-get {} exited with {}",
            args.join(" "),
            output.status
        )));
    }
    Ok(output)
}

// apt prefixes hard errors with E: and warnings with W:
fn log_apt_stderr(stderr: &str, context: &str) {
    for line in stderr.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        if stripped.starts_with("E:") {
            error!("apt-get {context} stderr: {stripped}");
        } else if stripped.starts_with("W:") {
            warn!("apt-get {context} stderr: {stripped}");
        } else {
            debug!("apt-get {context} stderr: {stripped}");
        }
    }
}

fn is_installed_version(value: Option<&str>) -> bool {
    match value {
        Some(v) => !matches!(
            v.trim().to_lowercase().as_str(),
            "not installed" | "not-installed" | "none" | "unknown"
        ),
        None => false,
    }
}

/// Parse `apt-get -s -V dist-upgrade` output into an upgrade plan
///
/// `Inst` lines with an installed-version bracket are upgrades, without one
/// they are new installs; the "will be upgraded" summary block is the
/// fallback when no Inst lines appear.
pub fn parse_simulation(stdout: &str) -> UpgradePlan {
    let mut plan = UpgradePlan::default();
    let mut summary_upgrades = Vec::new();
    let mut in_upgrade_summary = false;
    let mut parse_failures = 0usize;

    for line in stdout.lines() {
        let line = line.trim_end();
        if line.trim_start().starts_with("Inst ") {
            let Some(captures) = INST_RE.captures(line.trim_start()) else {
                parse_failures += 1;
                debug!("Failed to parse apt-get line: {line}");
                continue;
            };
            let installed = captures.name("installed").map(|m| m.as_str());
            let change = PackageChange {
                name: captures["name"].to_string(),
                installed: Some(installed.unwrap_or("unknown").to_string()),
                candidate: Some(captures["candidate"].to_string()),
            };
            if is_installed_version(installed) {
                plan.upgrade.push(change);
            } else {
                plan.install.push(change);
            }
            continue;
        }
        if line.trim_start().starts_with("Remv ") {
            let Some(captures) = REMV_RE.captures(line.trim_start()) else {
                parse_failures += 1;
                debug!("Failed to parse apt-get line: {line}");
                continue;
            };
            plan.remove.push(PackageChange {
                name: captures["name"].to_string(),
                installed: captures
                    .name("installed")
                    .map(|m| m.as_str().to_string())
                    .or_else(|| Some("unknown".to_string())),
                candidate: None,
            });
            continue;
        }
        if line.starts_with("The following packages will be upgraded:") {
            in_upgrade_summary = true;
            continue;
        }
        if in_upgrade_summary {
            if line.trim().is_empty() {
                in_upgrade_summary = false;
                continue;
            }
            if let Some(captures) = SUMMARY_UPGRADE_RE.captures(line) {
                summary_upgrades.push(PackageChange {
                    name: captures["name"].to_string(),
                    installed: Some(captures["installed"].to_string()),
                    candidate: Some(captures["candidate"].to_string()),
                });
            }
        }
    }

    if parse_failures > 0 {
        warn!("Failed to parse {parse_failures} apt-get lines");
    }
    if plan.upgrade.is_empty() && plan.install.is_empty() && !summary_upgrades.is_empty() {
        plan.upgrade = summary_upgrades;
    }
    plan
}
