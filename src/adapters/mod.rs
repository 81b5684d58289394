// src/adapters/mod.rs

//! Package-manager adapters
//!
//! A closed set of adapters, one per package manager, selected by an
//! explicit enum. Each adapter enumerates pending updates, applies them, and
//! returns a structured outcome the update engine renders into the status
//! row; the adapters never touch the issue themselves.

pub mod apt;
pub mod scoop;

use crate::config::AdapterOptions;
use crate::error::Result;
use std::time::Duration;
use strum_macros::{Display, EnumString};

pub use apt::AptAdapter;
pub use scoop::ScoopAdapter;

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Scoop,
}

impl PackageManager {
    /// Whether this manager can run on the current platform
    pub fn supported_on_current_os(&self) -> bool {
        match self {
            Self::Apt => cfg!(unix),
            Self::Scoop => cfg!(windows),
        }
    }
}

/// One package touched by a run
#[derive(Debug, Clone)]
pub struct PackageChange {
    pub name: String,
    pub installed: Option<String>,
    pub candidate: Option<String>,
}

impl PackageChange {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            installed: None,
            candidate: None,
        }
    }

    pub fn versioned(name: &str, installed: &str, candidate: &str) -> Self {
        Self {
            name: name.to_string(),
            installed: Some(installed.to_string()),
            candidate: Some(candidate.to_string()),
        }
    }

    /// One-line description for summary comments
    pub fn describe(&self) -> String {
        match (&self.installed, &self.candidate) {
            (Some(from), Some(to)) => format!("`{}` (`{}` -> `{}`)", self.name, from, to),
            (None, Some(to)) => format!("`{}` (`{}`)", self.name, to),
            _ => format!("`{}`", self.name),
        }
    }
}

/// Structured result of one adapter run
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub updated: Vec<PackageChange>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub duration: Duration,
}

impl UpdateOutcome {
    /// Whether every attempted package succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Contract every package-manager adapter satisfies toward the engine
pub trait PackageManagerAdapter {
    fn manager(&self) -> PackageManager;

    /// Enumerate, apply, and account for updates
    ///
    /// Per-package failures land in the outcome; an `Err` means the run
    /// itself could not proceed and maps to a terminal `failed` row.
    fn run(&self) -> Result<UpdateOutcome>;
}

/// Construct the adapter for a manager
pub fn adapter_for(
    manager: PackageManager,
    options: AdapterOptions,
) -> Box<dyn PackageManagerAdapter> {
    match manager {
        PackageManager::Apt => Box::new(AptAdapter::new()),
        PackageManager::Scoop => Box::new(ScoopAdapter::new(options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_manager_string_round_trip() {
        assert_eq!(PackageManager::Apt.to_string(), "apt");
        assert_eq!(PackageManager::Scoop.to_string(), "scoop");
        assert_eq!(PackageManager::from_str("apt").unwrap(), PackageManager::Apt);
        assert_eq!(PackageManager::from_str("scoop").unwrap(), PackageManager::Scoop);
        assert!(PackageManager::from_str("pacman").is_err());
    }

    #[test]
    fn test_describe_package_change() {
        assert_eq!(
            PackageChange::versioned("curl", "1.0", "2.0").describe(),
            "`curl` (`1.0` -> `2.0`)"
        );
        assert_eq!(PackageChange::named("git").describe(), "`git`");
    }

    #[test]
    fn test_outcome_success() {
        assert!(UpdateOutcome::default().is_success());
        let outcome = UpdateOutcome {
            failed: vec!["curl".to_string()],
            ..Default::default()
        };
        assert!(!outcome.is_success());
    }
}
