// src/config.rs

//! Startup configuration: repository slug, API token, hostname
//!
//! The token lives at a fixed local path (`data/github_token.txt`); its
//! absence is a startup error, not an update-engine concern. The repository
//! slug comes from `GITHUB_REPOSITORY` the way CI sets it, falling back to
//! a default constant when the variable is unset.

use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::Path;

/// Fixed token file path, relative to the working directory
pub const TOKEN_PATH: &str = "data/github_token.txt";

/// Repository slug used when `GITHUB_REPOSITORY` is unset
pub const DEFAULT_REPOSITORY: &str = "fleet-updater/fleet-updater";

/// Resolved startup configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `owner/repo` slug of the repository holding the status issue
    pub repository: String,
    /// GitHub API token
    pub token: String,
    /// Behaviour switches passed through to adapters
    pub adapter_options: AdapterOptions,
}

/// Pre-resolved adapter behaviour switches
///
/// Replaces the interactive prompts some package managers would otherwise
/// need mid-run; everything is decided before an adapter starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterOptions {
    /// Allow adapters to stop (and later restart) running applications that
    /// hold files an upgrade needs. When unset such applications are skipped.
    pub confirm_before_stop: bool,
}

impl Config {
    /// Load configuration from the environment and the fixed token file
    pub fn load(adapter_options: AdapterOptions) -> Result<Self> {
        let repository = repository_slug(env::var("GITHUB_REPOSITORY").ok());
        let token = read_token(Path::new(TOKEN_PATH))?;
        Ok(Self {
            repository,
            token,
            adapter_options,
        })
    }
}

/// Resolve the repository slug, treating unset and empty alike
pub fn repository_slug(env_value: Option<String>) -> String {
    match env_value {
        Some(value) if !value.trim().is_empty() => value,
        _ => DEFAULT_REPOSITORY.to_string(),
    }
}

/// Read and trim the API token, failing if the file is missing or empty
pub fn read_token(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Token file not found: {} (create it with a GitHub API token)",
            path.display()
        )));
    }
    let token = fs::read_to_string(path)?.trim().to_string();
    if token.is_empty() {
        return Err(Error::Config(format!(
            "Token file is empty: {}",
            path.display()
        )));
    }
    Ok(token)
}

/// Resolve the machine's hostname as it appears in row markers
pub fn detect_hostname() -> Result<String> {
    real_hostname()
}

#[cfg(unix)]
fn real_hostname() -> Result<String> {
    let name = nix::unistd::gethostname()
        .map_err(|e| Error::Config(format!("Failed to resolve hostname: {e}")))?;
    name.into_string()
        .map_err(|_| Error::Config("Hostname is not valid UTF-8".to_string()))
}

#[cfg(windows)]
fn real_hostname() -> Result<String> {
    env::var("COMPUTERNAME").map_err(|_| Error::Config("COMPUTERNAME is not set".to_string()))
}
