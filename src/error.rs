// src/error.rs

//! Error types for fleet-updater

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while updating and reporting software status
#[derive(Error, Debug)]
pub enum Error {
    /// The issue body has no row carrying the requested marker
    #[error("No status row for {hostname}#{manager} in the issue body")]
    RowNotFound { hostname: String, manager: String },

    /// The optimistic write loop ran out of attempts
    #[error("Issue update not committed after {attempts} attempts")]
    ConcurrencyExhausted { attempts: u32 },

    /// Remote API returned a non-success status
    #[error("GitHub API error: {0}")]
    Api(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A package-manager adapter reported failure
    #[error("{manager} adapter failed: {reason}")]
    AdapterFailed { manager: String, reason: String },

    /// An external command could not be run or exited abnormally
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Startup configuration problem (token file, repository, hostname)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the update engine may replay the cycle under its backoff
    /// budget. Input and structure errors are permanent and propagate
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Api(_) | Error::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_are_transient() {
        assert!(Error::Api("HTTP 502".to_string()).is_transient());
    }

    #[test]
    fn test_row_not_found_is_permanent() {
        let err = Error::RowNotFound {
            hostname: "web01".to_string(),
            manager: "apt".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhaustion_is_permanent() {
        assert!(!Error::ConcurrencyExhausted { attempts: 6 }.is_transient());
    }
}
