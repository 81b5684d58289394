// src/adapters/scoop.rs

//! scoop adapter (Windows)
//!
//! Refreshes the scoop buckets, parses `scoop status` (fixed-width columns,
//! ANSI color codes stripped) to enumerate outdated apps, and updates each
//! app individually so one stubborn package cannot sink the whole run. Apps
//! whose executables are currently running are skipped unless the operator
//! pre-approved stopping them (`confirm_before_stop`); scoop cannot replace
//! files that are in use.

use super::{PackageManager, PackageManagerAdapter, UpdateOutcome};
#[cfg(windows)]
use super::PackageChange;
use crate::config::AdapterOptions;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
#[cfg(windows)]
use std::time::{Duration, Instant};
#[cfg(windows)]
use tracing::{info, warn};

/// Bucket refresh and per-app update retries
#[cfg(windows)]
const MAX_RETRIES: u32 = 5;

/// Delay between retries
#[cfg(windows)]
const RETRY_DELAY: Duration = Duration::from_secs(5);

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// One row of `scoop status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoopApp {
    pub name: String,
    pub installed: String,
    pub latest: String,
    pub missing: String,
    pub info: String,
}

pub struct ScoopAdapter {
    options: AdapterOptions,
}

impl ScoopAdapter {
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl PackageManagerAdapter for ScoopAdapter {
    fn manager(&self) -> PackageManager {
        PackageManager::Scoop
    }

    #[cfg(not(windows))]
    fn run(&self) -> Result<UpdateOutcome> {
        let _ = &self.options;
        Err(Error::AdapterFailed {
            manager: PackageManager::Scoop.to_string(),
            reason: "scoop is only available on Windows".to_string(),
        })
    }

    #[cfg(windows)]
    fn run(&self) -> Result<UpdateOutcome> {
        let start = Instant::now();

        refresh_buckets()?;

        let raw = run_scoop(&["status"])?;
        let apps = parse_status(&raw);
        info!("Outdated apps: {}", apps.len());
        if apps.is_empty() {
            return Ok(UpdateOutcome {
                duration: start.elapsed(),
                ..Default::default()
            });
        }

        let running = windows::running_apps(&apps);

        let mut updated = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        for app in &apps {
            if !app.missing.is_empty() {
                warn!("Skipping {}: missing dependencies ({})", app.name, app.missing);
                skipped.push(app.name.clone());
                continue;
            }

            let processes = running.get(app.name.as_str());
            let restart = match processes {
                Some(processes) if !self.options.confirm_before_stop => {
                    info!(
                        "Skipping {}: {} running process(es) and stopping is not approved",
                        app.name,
                        processes.len()
                    );
                    skipped.push(app.name.clone());
                    continue;
                }
                Some(processes) => {
                    windows::stop_processes(processes);
                    Some(processes)
                }
                None => None,
            };

            if update_app(&app.name) {
                updated.push(PackageChange::versioned(&app.name, &app.installed, &app.latest));
            } else {
                failed.push(app.name.clone());
            }

            if let Some(processes) = restart {
                windows::restart_app(&app.name, processes);
            }
        }

        Ok(UpdateOutcome {
            updated,
            failed,
            skipped,
            duration: start.elapsed(),
        })
    }
}

/// `scoop update` refreshes the buckets; flaky on slow networks, so retry
#[cfg(windows)]
fn refresh_buckets() -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match run_scoop(&["update"]) {
            Ok(_) => return Ok(()),
            Err(e) if attempt < MAX_RETRIES => {
                warn!("Bucket refresh attempt {attempt} failed: {e}, retrying...");
                std::thread::sleep(RETRY_DELAY);
            }
            Err(e) => {
                return Err(Error::AdapterFailed {
                    manager: PackageManager::Scoop.to_string(),
                    reason: format!("Failed to refresh buckets after {MAX_RETRIES} attempts: {e}"),
                });
            }
        }
    }
}

/// Update one app with bounded retries; returns whether it succeeded
#[cfg(windows)]
fn update_app(name: &str) -> bool {
    for attempt in 1..=MAX_RETRIES {
        match run_scoop(&["update", name]) {
            Ok(_) => {
                info!("Updated {name}");
                return true;
            }
            Err(e) => {
                warn!("Update attempt {attempt}/{MAX_RETRIES} for {name} failed: {e}");
                if attempt < MAX_RETRIES {
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }
    false
}

/// Run a scoop subcommand through cmd (scoop installs as a shim script)
#[cfg(windows)]
fn run_scoop(args: &[&str]) -> Result<String> {
    use std::process::{Command, Stdio};
    use wait_timeout::ChildExt;

    // Generous bound; scoop talks to the network for most subcommands
    const TIMEOUT: Duration = Duration::from_secs(600);

    let mut child = Command::new("cmd")
        .arg("/C")
        .arg("scoop")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::CommandFailed(format!("Failed to spawn scoop {}: {e}", args.join(" "))))?;

    match child.wait_timeout(TIMEOUT)? {
        Some(status) => {
            let output = child.wait_with_output()?;
            if !status.success() {
                return Err(Error::CommandFailed(format!(
                    "scoop {} exited with {status}",
                    args.join(" ")
                )));
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        None => {
            let _ = child.kill();
            Err(Error::CommandFailed(format!(
                "scoop {} timed out after {} seconds",
                args.join(" "),
                TIMEOUT.as_secs()
            )))
        }
    }
}

/// Parse `scoop status` fixed-width output
///
/// Column boundaries come from the header line's label offsets; rows are the
/// lines after the separator. Works on the ANSI-stripped text.
pub fn parse_status(raw: &str) -> Vec<ScoopApp> {
    let cleaned = ANSI_RE.replace_all(raw, "");
    let lines: Vec<&str> = cleaned.trim().lines().collect();

    let Some(header_index) = lines
        .iter()
        .position(|line| line.contains("Name") && line.contains("Installed Version"))
    else {
        return Vec::new();
    };
    let header = lines[header_index];

    let labels = [
        "Name",
        "Installed Version",
        "Latest Version",
        "Missing Dependencies",
        "Info",
    ];
    let mut starts: Vec<Option<usize>> = labels
        .iter()
        .map(|label| header.find(label).map(|byte| header[..byte].chars().count()))
        .collect();
    starts.push(None);

    // Data starts after the dashes separator when one is present
    let data_start = match lines.get(header_index + 1) {
        Some(line) if is_separator(line) => header_index + 2,
        _ => header_index + 1,
    };

    let mut apps = Vec::new();
    for line in lines.iter().skip(data_start) {
        if line.trim().is_empty() {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut cells = Vec::with_capacity(labels.len());
        for i in 0..labels.len() {
            let Some(start) = starts[i] else {
                cells.push(String::new());
                continue;
            };
            let end = starts[i + 1].unwrap_or(chars.len()).min(chars.len());
            let start = start.min(chars.len());
            let cell: String = chars[start..end].iter().collect();
            cells.push(cell.trim().to_string());
        }
        if cells[0].is_empty() {
            continue;
        }
        apps.push(ScoopApp {
            name: cells[0].clone(),
            installed: cells[1].clone(),
            latest: cells[2].clone(),
            missing: cells[3].clone(),
            info: cells[4].clone(),
        });
    }
    apps
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-' || c.is_whitespace())
}

#[cfg(windows)]
mod windows {
    //! Running-application handling around scoop updates
    //!
    //! An app is "running" when a process's executable path lives under the
    //! app's scoop directory. Stopped apps are restarted from the app's
    //! `current` directory, which points at the new version after an update.

    use super::ScoopApp;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tracing::{debug, info, warn};

    #[derive(Debug, Clone)]
    pub struct ProcessInfo {
        pub pid: u32,
        pub exe: PathBuf,
    }

    /// Map each outdated app to its currently running processes
    pub fn running_apps<'a>(apps: &'a [ScoopApp]) -> HashMap<&'a str, Vec<ProcessInfo>> {
        let Ok(scoop_root) = std::env::var("SCOOP") else {
            warn!("SCOOP is not set, cannot detect running applications");
            return HashMap::new();
        };
        let apps_root = Path::new(&scoop_root).join("apps");

        let processes = list_processes();
        let mut running = HashMap::new();
        for app in apps {
            let app_dir = apps_root.join(&app.name);
            let matches: Vec<ProcessInfo> = processes
                .iter()
                .filter(|process| path_starts_with(&process.exe, &app_dir))
                .cloned()
                .collect();
            if !matches.is_empty() {
                debug!("{} has {} running process(es)", app.name, matches.len());
                running.insert(app.name.as_str(), matches);
            }
        }
        running
    }

    pub fn stop_processes(processes: &[ProcessInfo]) {
        for process in processes {
            let status = Command::new("taskkill")
                .args(["/PID", &process.pid.to_string()])
                .status();
            match status {
                Ok(status) if status.success() => info!("Stopped {}", process.exe.display()),
                _ => warn!("Failed to stop {}", process.exe.display()),
            }
        }
    }

    /// Relaunch an app's stopped executables from its `current` directory
    pub fn restart_app(name: &str, processes: &[ProcessInfo]) {
        let Ok(scoop_root) = std::env::var("SCOOP") else {
            return;
        };
        let current = Path::new(&scoop_root).join("apps").join(name).join("current");
        for process in processes {
            let Some(file_name) = process.exe.file_name() else {
                continue;
            };
            let exe = current.join(file_name);
            if !exe.exists() {
                warn!("Executable not found, not restarting: {}", exe.display());
                continue;
            }
            match Command::new("cmd").args(["/C", "start", ""]).arg(&exe).status() {
                Ok(_) => info!("Restarted {}", exe.display()),
                Err(e) => warn!("Failed to restart {}: {e}", exe.display()),
            }
        }
    }

    fn list_processes() -> Vec<ProcessInfo> {
        let output = Command::new("wmic")
            .args(["process", "get", "ProcessId,ExecutablePath", "/value"])
            .output();
        match output {
            Ok(output) => parse_process_list(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                warn!("Failed to enumerate processes: {e}");
                Vec::new()
            }
        }
    }

    /// Parse `wmic process … /value` key=value blocks
    fn parse_process_list(raw: &str) -> Vec<ProcessInfo> {
        let mut processes = Vec::new();
        let mut exe: Option<PathBuf> = None;
        for line in raw.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("ExecutablePath=") {
                exe = (!value.is_empty()).then(|| PathBuf::from(value));
            } else if let Some(value) = line.strip_prefix("ProcessId=") {
                if let (Some(path), Ok(pid)) = (exe.take(), value.parse()) {
                    processes.push(ProcessInfo { pid, exe: path });
                }
            }
        }
        processes
    }

    fn path_starts_with(path: &Path, prefix: &Path) -> bool {
        let path = path.to_string_lossy().to_lowercase();
        let prefix = prefix.to_string_lossy().to_lowercase();
        path.starts_with(&prefix)
    }
}
