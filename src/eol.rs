// src/eol.rs

//! OS End-of-Life classification
//!
//! Probes the local OS identity, asks the public endoflife.date dataset for
//! the matching support-cycle EOL date, and buckets the remaining time into a
//! severity level. Everything here is best-effort annotation data: probe or
//! lookup failures degrade to `Unknown` and must never block a status update.

use crate::error::{Error, Result};
use chrono::{Local, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for EOL dataset requests (10 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL of the endoflife.date API
const EOL_API_ROOT: &str = "https://endoflife.date/api";

/// Days below which an upcoming EOL is considered critical
pub const CRITICAL_WINDOW_DAYS: i64 = 90;

/// OS identity keyed the way the EOL dataset keys its products
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsIdentity {
    /// Product slug, e.g. `ubuntu`, `debian`, `windows`
    pub product: String,
    /// Release cycle, e.g. `22.04`, `12`, `11`
    pub cycle: String,
}

impl fmt::Display for OsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.product, self.cycle)
    }
}

/// Time-relative severity of an OS release's support status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolSeverity {
    /// 90 days or more of support remaining
    Ok,
    /// Less than 90 days of support remaining
    Critical,
    /// Already past end of life
    Expired,
    /// Identity or EOL date could not be resolved
    Unknown,
}

impl EolSeverity {
    /// Whether this severity warrants the visually distinct marker
    pub fn is_alarming(&self) -> bool {
        matches!(self, Self::Critical | Self::Expired)
    }
}

/// One classification result; never persisted across runs since
/// `days_remaining` changes daily
#[derive(Debug, Clone)]
pub struct EolRecord {
    pub identity: Option<OsIdentity>,
    pub eol_date: Option<NaiveDate>,
    pub days_remaining: Option<i64>,
    pub severity: EolSeverity,
}

impl EolRecord {
    /// Record for an unresolvable identity or failed lookup
    pub fn unknown(identity: Option<OsIdentity>) -> Self {
        Self {
            identity,
            eol_date: None,
            days_remaining: None,
            severity: EolSeverity::Unknown,
        }
    }

    /// Render the table-cell annotation for this record
    ///
    /// Critical and expired dates are bolded and carry a red marker;
    /// ok and unknown render plainly.
    pub fn annotation(&self) -> String {
        let Some(date) = self.eol_date else {
            return "unknown".to_string();
        };
        let date = date.format("%Y/%m/%d");
        match self.severity {
            EolSeverity::Expired => format!("**{date} (expired)** 🔴"),
            EolSeverity::Critical => {
                let days = self.days_remaining.unwrap_or(0);
                format!("**{date} (in {days} days)** 🔴")
            }
            _ => match self.days_remaining {
                Some(days) => format!("{date} (in {days} days)"),
                None => date.to_string(),
            },
        }
    }
}

/// Bucket a signed days-until-EOL count into a severity level
pub fn bucket(days_remaining: i64) -> EolSeverity {
    if days_remaining < 0 {
        EolSeverity::Expired
    } else if days_remaining < CRITICAL_WINDOW_DAYS {
        EolSeverity::Critical
    } else {
        EolSeverity::Ok
    }
}

/// Derive days-remaining and severity from an optional EOL date
pub fn classify_date(eol_date: Option<NaiveDate>, today: NaiveDate) -> (Option<i64>, EolSeverity) {
    match eol_date {
        Some(date) => {
            let days = (date - today).num_days();
            (Some(days), bucket(days))
        }
        None => (None, EolSeverity::Unknown),
    }
}

/// Cycle details as returned by `/api/{product}/{cycle}.json`
///
/// The `eol` field is a date string for dated releases, or a boolean for
/// products that only publish a supported/unsupported flag.
#[derive(Debug, Deserialize)]
struct CycleDetails {
    #[serde(default)]
    eol: EolField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EolField {
    Date(String),
    Flag(bool),
}

impl Default for EolField {
    fn default() -> Self {
        Self::Flag(false)
    }
}

/// Client for the endoflife.date dataset
pub struct EolClient {
    client: Client,
    api_root: String,
}

impl EolClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("fleet-updater/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_root: EOL_API_ROOT.to_string(),
        })
    }

    /// Classify an OS identity against the dataset
    ///
    /// Never fails: network errors and unknown identifiers return an
    /// `Unknown` record.
    pub fn classify(&self, identity: &OsIdentity) -> EolRecord {
        match self.lookup_eol_date(identity) {
            Ok(Some(date)) => {
                let today = Local::now().date_naive();
                let (days_remaining, severity) = classify_date(Some(date), today);
                EolRecord {
                    identity: Some(identity.clone()),
                    eol_date: Some(date),
                    days_remaining,
                    severity,
                }
            }
            Ok(None) => {
                debug!("No EOL date published for {}", identity);
                EolRecord::unknown(Some(identity.clone()))
            }
            Err(e) => {
                warn!("EOL lookup failed for {}: {}", identity, e);
                EolRecord::unknown(Some(identity.clone()))
            }
        }
    }

    /// Classify the machine this process runs on
    pub fn classify_current_os(&self) -> EolRecord {
        match detect_os_identity() {
            Some(identity) => self.classify(&identity),
            None => {
                warn!("Could not determine OS identity, EOL severity is unknown");
                EolRecord::unknown(None)
            }
        }
    }

    fn lookup_eol_date(&self, identity: &OsIdentity) -> Result<Option<NaiveDate>> {
        let url = format!("{}/{}/{}.json", self.api_root, identity.product, identity.cycle);
        debug!("Fetching EOL data from {}", url);
        let response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Api(format!("HTTP {} from {}", response.status(), url)));
        }
        let details: CycleDetails = response
            .json()
            .map_err(|e| Error::Api(format!("Failed to parse EOL payload: {e}")))?;
        match details.eol {
            EolField::Date(raw) => {
                let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| Error::Api(format!("Bad EOL date '{raw}': {e}")))?;
                Ok(Some(date))
            }
            // A bare `true` means the cycle is already unsupported but the
            // dataset publishes no date; render it as expired as of today.
            EolField::Flag(true) => Ok(Some(Local::now().date_naive() - chrono::Days::new(1))),
            EolField::Flag(false) => Ok(None),
        }
    }
}

/// Determine the current OS identity, if possible
pub fn detect_os_identity() -> Option<OsIdentity> {
    probe_os_identity()
}

#[cfg(unix)]
fn probe_os_identity() -> Option<OsIdentity> {
    let raw = std::fs::read_to_string("/etc/os-release").ok()?;
    parse_os_release(&raw)
}

#[cfg(windows)]
fn probe_os_identity() -> Option<OsIdentity> {
    let output = std::process::Command::new("wmic")
        .args(["os", "get", "Caption,Version", "/value"])
        .output()
        .ok()?;
    parse_windows_version(&String::from_utf8_lossy(&output.stdout))
}

/// Map `/etc/os-release` contents to an EOL dataset identity
pub fn parse_os_release(raw: &str) -> Option<OsIdentity> {
    let mut name = None;
    let mut version_id = None;
    for line in raw.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "NAME" => name = Some(value.to_string()),
                "VERSION_ID" => version_id = Some(value.to_string()),
                _ => {}
            }
        }
    }
    let name = name?;
    let cycle = version_id?;
    let product = if name.contains("Ubuntu") {
        "ubuntu".to_string()
    } else if name.contains("Debian") {
        "debian".to_string()
    } else {
        name.split_whitespace().next()?.to_lowercase()
    };
    Some(OsIdentity { product, cycle })
}

/// Map `wmic os get Caption,Version /value` output to a Windows identity
///
/// Caption naming wins; otherwise the build number decides (>= 22000 is
/// Windows 11).
pub fn parse_windows_version(raw: &str) -> Option<OsIdentity> {
    let mut caption = String::new();
    let mut version = String::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("Caption=") {
            caption = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Version=") {
            version = value.trim().to_string();
        }
    }
    let cycle = if caption.contains("Windows 10") {
        "10"
    } else if caption.contains("Windows 11") {
        "11"
    } else {
        let build: u32 = version.rsplit('.').next()?.parse().ok()?;
        if build >= 22000 { "11" } else { "10" }
    };
    Some(OsIdentity {
        product: "windows".to_string(),
        cycle: cycle.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket(-1), EolSeverity::Expired);
        assert_eq!(bucket(0), EolSeverity::Critical);
        assert_eq!(bucket(89), EolSeverity::Critical);
        assert_eq!(bucket(90), EolSeverity::Ok);
    }

    #[test]
    fn test_classify_date_unknown() {
        let (days, severity) = classify_date(None, date(2026, 1, 1));
        assert_eq!(days, None);
        assert_eq!(severity, EolSeverity::Unknown);
    }

    #[test]
    fn test_classify_date_expired() {
        let (days, severity) = classify_date(Some(date(2025, 12, 31)), date(2026, 1, 1));
        assert_eq!(days, Some(-1));
        assert_eq!(severity, EolSeverity::Expired);
    }

    #[test]
    fn test_annotation_ok_renders_plainly() {
        let record = EolRecord {
            identity: None,
            eol_date: Some(date(2027, 4, 30)),
            days_remaining: Some(500),
            severity: EolSeverity::Ok,
        };
        assert_eq!(record.annotation(), "2027/04/30 (in 500 days)");
    }

    #[test]
    fn test_annotation_critical_is_marked() {
        let record = EolRecord {
            identity: None,
            eol_date: Some(date(2025, 10, 14)),
            days_remaining: Some(50),
            severity: EolSeverity::Critical,
        };
        assert_eq!(record.annotation(), "**2025/10/14 (in 50 days)** 🔴");
    }

    #[test]
    fn test_annotation_expired_is_marked() {
        let record = EolRecord {
            identity: None,
            eol_date: Some(date(2024, 6, 30)),
            days_remaining: Some(-200),
            severity: EolSeverity::Expired,
        };
        assert_eq!(record.annotation(), "**2024/06/30 (expired)** 🔴");
    }

    #[test]
    fn test_annotation_unknown() {
        assert_eq!(EolRecord::unknown(None).annotation(), "unknown");
    }

    #[test]
    fn test_parse_os_release_ubuntu() {
        let raw = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\n";
        let identity = parse_os_release(raw).unwrap();
        assert_eq!(identity.product, "ubuntu");
        assert_eq!(identity.cycle, "22.04");
    }

    #[test]
    fn test_parse_os_release_debian() {
        let raw = "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"12\"\n";
        let identity = parse_os_release(raw).unwrap();
        assert_eq!(identity.product, "debian");
        assert_eq!(identity.cycle, "12");
    }

    #[test]
    fn test_parse_os_release_other_distro() {
        let raw = "NAME=\"Fedora Linux\"\nVERSION_ID=41\n";
        let identity = parse_os_release(raw).unwrap();
        assert_eq!(identity.product, "fedora");
        assert_eq!(identity.cycle, "41");
    }

    #[test]
    fn test_parse_os_release_missing_version() {
        assert!(parse_os_release("NAME=\"Ubuntu\"\n").is_none());
    }

    #[test]
    fn test_parse_windows_version_from_caption() {
        let raw = "Caption=Microsoft Windows 11 Pro\r\nVersion=10.0.22631\r\n";
        let identity = parse_windows_version(raw).unwrap();
        assert_eq!(identity.product, "windows");
        assert_eq!(identity.cycle, "11");
    }

    #[test]
    fn test_parse_windows_version_from_build_number() {
        let raw = "Caption=Microsoft Windows\r\nVersion=10.0.19045\r\n";
        let identity = parse_windows_version(raw).unwrap();
        assert_eq!(identity.cycle, "10");
    }

    #[test]
    fn test_eol_field_parses_date_and_flag() {
        let details: CycleDetails = serde_json::from_str(r#"{"eol": "2025-10-14"}"#).unwrap();
        assert!(matches!(details.eol, EolField::Date(_)));

        let details: CycleDetails = serde_json::from_str(r#"{"eol": false}"#).unwrap();
        assert!(matches!(details.eol, EolField::Flag(false)));
    }
}
