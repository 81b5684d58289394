// src/issue/table.rs

//! Markdown status-table codec
//!
//! The issue body embeds one markdown table whose addressable rows end with a
//! hidden marker comment:
//!
//! ```text
//! | ⏳ | web01 | Ubuntu 22.04 | apt | 0 | 0 | <!-- update-softwares#web01#apt -->
//! ```
//!
//! Rows split into six cells (status, display name, OS, manager, upgraded,
//! failed) or seven (plus an EOL column). Everything else in the body,
//! including marked lines that do not match the cell shape, is preserved
//! byte-for-byte; rendering rebuilds only the rows that were mutated.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<markdown>.*) <!-- update-softwares#(?P<hostname>[^#]+)#(?P<manager>[^#]+) -->\s*$")
        .unwrap()
});

/// Per-row status within one update cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Row exists, no run started (or glyph not recognized)
    Pending,
    /// A machine is mid-cycle on this row
    Running,
    /// Terminal: last run completed
    Success,
    /// Terminal: last run failed
    Failed,
}

impl Status {
    /// Glyph rendered into the status cell
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Pending => "⬜",
            Self::Running => "⏳",
            Self::Success => "✅",
            Self::Failed => "🔴",
        }
    }

    /// Parse a status cell back into a state
    ///
    /// Unrecognized glyphs map to `Pending` so hand-seeded rows stay
    /// addressable.
    pub fn from_glyph(cell: &str) -> Self {
        match cell.trim() {
            "⏳" => Self::Running,
            "✅" => Self::Success,
            "🔴" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether no further automatic transition happens without a new run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The mutation one update cycle applies to its row
///
/// `None` fields leave the current cell untouched; `Some("")` clears it.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub status: Status,
    pub upgraded: Option<String>,
    pub failed: Option<String>,
    /// Rendered EOL annotation; only written when the table has an EOL column
    pub eol: Option<String>,
}

impl RowChange {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            upgraded: None,
            failed: None,
            eol: None,
        }
    }

    pub fn with_counts(mut self, upgraded: usize, failed: usize) -> Self {
        self.upgraded = Some(upgraded.to_string());
        self.failed = Some(failed.to_string());
        self
    }

    pub fn with_cleared_counts(mut self) -> Self {
        self.upgraded = Some(String::new());
        self.failed = Some(String::new());
        self
    }

    pub fn with_eol(mut self, annotation: impl Into<String>) -> Self {
        self.eol = Some(annotation.into());
        self
    }
}

/// Parsed cells of one addressable row
#[derive(Debug, Clone)]
pub struct RowCells {
    pub status: String,
    pub display_name: String,
    pub os_label: String,
    pub manager_label: String,
    pub upgraded: String,
    pub failed: String,
    /// Present only in bodies that carry the EOL column
    pub eol: Option<String>,
}

/// One (hostname, package-manager) unit of work in the table
#[derive(Debug, Clone)]
pub struct Row {
    /// Index into the body's line list
    line_index: usize,
    /// Original line text, emitted verbatim unless the row is mutated
    raw: String,
    /// Hostname from the marker (authoritative, not the display cell)
    pub hostname: String,
    /// Package-manager id from the marker
    pub manager: String,
    pub cells: RowCells,
    dirty: bool,
}

impl Row {
    /// Current status as parsed from the glyph cell
    pub fn status(&self) -> Status {
        Status::from_glyph(&self.cells.status)
    }

    /// Apply a change to this row's cells
    ///
    /// Any requested transition is applied over whatever is currently
    /// rendered: a stale `running` left by an interrupted run is reclaimable,
    /// never an exclusive lock.
    pub fn apply(&mut self, change: &RowChange) {
        self.cells.status = change.status.glyph().to_string();
        if let Some(upgraded) = &change.upgraded {
            self.cells.upgraded = upgraded.clone();
        }
        if let Some(failed) = &change.failed {
            self.cells.failed = failed.clone();
        }
        if let (Some(annotation), Some(eol_cell)) = (&change.eol, self.cells.eol.as_mut()) {
            *eol_cell = annotation.clone();
        }
        self.dirty = true;
    }

    /// Rebuild the markdown line for a mutated row
    fn render_line(&self) -> String {
        let mut cells = vec![
            self.cells.status.as_str(),
            self.cells.display_name.as_str(),
            self.cells.os_label.as_str(),
            self.cells.manager_label.as_str(),
            self.cells.upgraded.as_str(),
            self.cells.failed.as_str(),
        ];
        if let Some(eol) = &self.cells.eol {
            cells.push(eol.as_str());
        }
        format!(
            "| {} | <!-- update-softwares#{}#{} -->",
            cells.join(" | "),
            self.hostname,
            self.manager
        )
    }
}

/// Parsed in-memory view of the issue body
#[derive(Debug, Clone)]
pub struct StatusTable {
    lines: Vec<String>,
    rows: Vec<Row>,
}

impl StatusTable {
    /// Parse an issue body, collecting addressable rows
    pub fn parse(body: &str) -> Self {
        let lines: Vec<String> = body.split('\n').map(str::to_string).collect();
        let mut rows = Vec::new();
        for (line_index, line) in lines.iter().enumerate() {
            let Some(captures) = ROW_RE.captures(line) else {
                continue;
            };
            let markdown = &captures["markdown"];
            let Some(cells) = parse_cells(markdown) else {
                debug!("Marked row has unexpected cell shape, leaving verbatim: {line}");
                continue;
            };
            rows.push(Row {
                line_index,
                raw: line.clone(),
                hostname: captures["hostname"].to_string(),
                manager: captures["manager"].to_string(),
                cells,
                dirty: false,
            });
        }
        Self { lines, rows }
    }

    /// Serialize back to a body, byte-identical outside mutated rows
    pub fn render(&self) -> String {
        let mut lines = self.lines.clone();
        for row in &self.rows {
            if row.dirty {
                lines[row.line_index] = row.render_line();
            } else {
                debug_assert_eq!(lines[row.line_index], row.raw);
            }
        }
        lines.join("\n")
    }

    /// Locate this machine's row for one package manager
    pub fn find_row_mut(&mut self, hostname: &str, manager: &str) -> Result<&mut Row> {
        self.rows
            .iter_mut()
            .find(|row| row.hostname == hostname && row.manager == manager)
            .ok_or_else(|| Error::RowNotFound {
                hostname: hostname.to_string(),
                manager: manager.to_string(),
            })
    }

    /// Read-only row lookup
    pub fn find_row(&self, hostname: &str, manager: &str) -> Option<&Row> {
        self.rows
            .iter()
            .find(|row| row.hostname == hostname && row.manager == manager)
    }

    /// All package-manager ids the table lists for one hostname
    pub fn managers_for(&self, hostname: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter(|row| row.hostname == hostname)
            .map(|row| row.manager.clone())
            .collect()
    }

    /// Display name cell for a hostname, for comment headers
    pub fn display_name(&self, hostname: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.hostname == hostname)
            .map(|row| row.cells.display_name.as_str())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// Split the markdown part of a marked line into its cells
///
/// `| a | b | c | d | e | f |` yields eight `|`-separated parts (leading and
/// trailing empties included); nine parts carry the EOL column.
fn parse_cells(markdown: &str) -> Option<RowCells> {
    let parts: Vec<&str> = markdown.split('|').collect();
    if parts.len() != 8 && parts.len() != 9 {
        return None;
    }
    Some(RowCells {
        status: parts[1].trim().to_string(),
        display_name: parts[2].trim().to_string(),
        os_label: parts[3].trim().to_string(),
        manager_label: parts[4].trim().to_string(),
        upgraded: parts[5].trim().to_string(),
        failed: parts[6].trim().to_string(),
        eol: (parts.len() == 9).then(|| parts[7].trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "# Update Status\n\
        \n\
        | Status | Computer | OS | Manager | Upgraded | Failed |\n\
        | --- | --- | --- | --- | --- | --- |\n\
        | ⏳ | Computer1 | Linux | apt | 0 | 0 | <!-- update-softwares#Computer1#apt -->\n\
        | ✅ | Computer2 | Windows | scoop | 5 | 0 | <!-- update-softwares#Computer2#scoop -->\n\
        \n\
        End of document\n";

    #[test]
    fn test_parse_finds_marked_rows() {
        let table = StatusTable::parse(BODY);
        assert_eq!(table.rows().len(), 2);
        let row = table.find_row("Computer1", "apt").unwrap();
        assert_eq!(row.status(), Status::Running);
        assert_eq!(row.cells.display_name, "Computer1");
        assert_eq!(row.cells.os_label, "Linux");
        assert_eq!(row.cells.eol, None);
    }

    #[test]
    fn test_parse_eol_column() {
        let body = "| ⏳ | Computer1 | Linux | apt | 0 | 0 | 2027/04/30 (in 500 days) | <!-- update-softwares#Computer1#apt -->";
        let table = StatusTable::parse(body);
        let row = table.find_row("Computer1", "apt").unwrap();
        assert_eq!(row.cells.eol.as_deref(), Some("2027/04/30 (in 500 days)"));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        assert_eq!(StatusTable::parse(BODY).render(), BODY);
    }

    #[test]
    fn test_round_trip_without_trailing_newline() {
        let body = "| ⏳ | C1 | Linux | apt | 0 | 0 | <!-- update-softwares#C1#apt -->";
        assert_eq!(StatusTable::parse(body).render(), body);
    }

    #[test]
    fn test_malformed_marked_row_is_preserved_but_not_addressable() {
        let body = "| only | three | cells | <!-- update-softwares#C1#apt -->";
        let table = StatusTable::parse(body);
        assert!(table.find_row("C1", "apt").is_none());
        assert_eq!(table.render(), body);
    }

    #[test]
    fn test_mutation_touches_only_the_target_row() {
        let mut table = StatusTable::parse(BODY);
        let change = RowChange::new(Status::Success).with_counts(3, 1);
        table.find_row_mut("Computer1", "apt").unwrap().apply(&change);
        let rendered = table.render();

        assert!(rendered.contains(
            "| ✅ | Computer1 | Linux | apt | 3 | 1 | <!-- update-softwares#Computer1#apt -->"
        ));
        // Every other line is untouched
        for (before, after) in BODY.split('\n').zip(rendered.split('\n')) {
            if !before.contains("Computer1") {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_cleared_counts_render_empty_cells() {
        let body = "| ✅ | C1 | Linux | apt | 5 | 0 | <!-- update-softwares#C1#apt -->";
        let mut table = StatusTable::parse(body);
        let change = RowChange::new(Status::Running).with_cleared_counts();
        table.find_row_mut("C1", "apt").unwrap().apply(&change);
        assert_eq!(
            table.render(),
            "| ⏳ | C1 | Linux | apt |  |  | <!-- update-softwares#C1#apt -->"
        );
    }

    #[test]
    fn test_eol_annotation_ignored_without_column() {
        let body = "| ⏳ | C1 | Linux | apt | 0 | 0 | <!-- update-softwares#C1#apt -->";
        let mut table = StatusTable::parse(body);
        let change = RowChange::new(Status::Running).with_eol("**2025/10/14 (in 50 days)** 🔴");
        table.find_row_mut("C1", "apt").unwrap().apply(&change);
        assert_eq!(
            table.render(),
            "| ⏳ | C1 | Linux | apt | 0 | 0 | <!-- update-softwares#C1#apt -->"
        );
    }

    #[test]
    fn test_eol_annotation_written_with_column() {
        let body = "| ⏳ | C1 | Linux | apt | 0 | 0 | unknown | <!-- update-softwares#C1#apt -->";
        let mut table = StatusTable::parse(body);
        let change = RowChange::new(Status::Success)
            .with_counts(5, 0)
            .with_eol("2027/04/30 (in 800 days)");
        table.find_row_mut("C1", "apt").unwrap().apply(&change);
        assert_eq!(
            table.render(),
            "| ✅ | C1 | Linux | apt | 5 | 0 | 2027/04/30 (in 800 days) | <!-- update-softwares#C1#apt -->"
        );
    }

    #[test]
    fn test_find_row_not_found() {
        let mut table = StatusTable::parse(BODY);
        let result = table.find_row_mut("no-such-host", "apt");
        assert!(matches!(result, Err(Error::RowNotFound { .. })));
    }

    #[test]
    fn test_managers_for_hostname() {
        let body = "| ⏳ | C1 | Linux | apt | 0 | 0 | <!-- update-softwares#C1#apt -->\n\
                    | ⏳ | C1 | Linux | scoop | 0 | 0 | <!-- update-softwares#C1#scoop -->\n\
                    | ⏳ | C2 | Linux | apt | 0 | 0 | <!-- update-softwares#C2#apt -->";
        let table = StatusTable::parse(body);
        assert_eq!(table.managers_for("C1"), vec!["apt", "scoop"]);
        assert_eq!(table.managers_for("C3"), Vec::<String>::new());
    }

    #[test]
    fn test_status_glyph_round_trip() {
        for status in [Status::Pending, Status::Running, Status::Success, Status::Failed] {
            assert_eq!(Status::from_glyph(status.glyph()), status);
        }
        assert_eq!(Status::from_glyph("??"), Status::Pending);
    }
}
