//! Table and JSON rendering of results. Read-only over the result.

use serde::Serialize;

use super::error::{AuthoringError, Result};
use super::resource::{ResourceItem, ResourceSchema};
use super::result::AuthorResult;
use super::status::Severity;

const HEADERS: [&str; 7] = ["Name", "Service", "Type", "Status", "Details", "Severity", "Path"];

/// One rendered line of a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub name: String,
    pub service: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub status: String,
    pub details: String,
    pub severity: Severity,
    pub path: String,
}

impl ReportRow {
    fn cells(&self) -> [String; 7] {
        [
            self.name.clone(),
            self.service.clone(),
            self.type_name.clone(),
            self.status.clone(),
            self.details.clone(),
            self.severity.to_string(),
            self.path.clone(),
        ]
    }
}

fn row<S: ResourceSchema>(schema: &S, item: &ResourceItem<S::Payload>) -> ReportRow {
    ReportRow {
        name: item.name.clone(),
        service: schema.service().to_string(),
        type_name: schema.type_name().to_string(),
        status: item.status.message.clone(),
        details: item.status.detail.clone(),
        severity: item.status.severity,
        path: item.path.display().to_string(),
    }
}

/// Builds one row per item of `result`.
pub fn rows<S: ResourceSchema>(result: &AuthorResult<S::Payload>, schema: &S) -> Vec<ReportRow> {
    result.items().map(|item| row(schema, item)).collect()
}

/// Renders rows as a left-aligned text table.
pub fn render_table(rows: &[ReportRow]) -> String {
    let mut widths = HEADERS.map(str::len);
    let cells: Vec<[String; 7]> = rows.iter().map(ReportRow::cells).collect();
    for line in &cells {
        for (width, cell) in widths.iter_mut().zip(line) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for line in std::iter::once(&header).chain(&cells) {
        let padded: Vec<String> = line
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Serializes a result as pretty JSON.
pub fn to_json<P: Serialize>(result: &AuthorResult<P>) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(|e| AuthoringError::Serialize(e.to_string()))
}
