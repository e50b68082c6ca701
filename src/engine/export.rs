//! CSV report of classified databases.

use super::classify::{ClassifiedDatabase, Status};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UTF-8 byte-order mark so spreadsheet tools detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const REPORT_HEADER: [&str; 7] = [
    "name",
    "sizeGb",
    "latestConnections",
    "daysSinceActivity",
    "lastActivityDate",
    "creationDate",
    "status",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which databases end up in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSelector {
    #[default]
    All,
    DeadOnly,
    NoConnectionsOnly,
}

impl ReportSelector {
    fn includes(self, db: &ClassifiedDatabase) -> bool {
        match self {
            ReportSelector::All => true,
            ReportSelector::DeadOnly => db.status == Status::Dead,
            ReportSelector::NoConnectionsOnly => !db.has_connections,
        }
    }
}

/// Export error types.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render the selected databases, in the given order, as CSV bytes.
pub fn export_report(
    classified: &[ClassifiedDatabase],
    selector: ReportSelector,
) -> Result<Vec<u8>, ExportError> {
    let mut wtr = csv::Writer::from_writer(UTF8_BOM.to_vec());
    wtr.write_record(REPORT_HEADER)?;

    let mut rows = 0usize;
    for db in classified.iter().filter(|db| selector.includes(db)) {
        wtr.write_record([
            db.record.name.clone(),
            format!("{:.2}", db.latest_size_gb.unwrap_or(0.0)),
            db.latest_connections.unwrap_or(0).to_string(),
            db.days_since_activity.to_string(),
            format_date(db.last_activity_time),
            format_date(db.record.creation_time),
            db.status.to_string(),
        ])?;
        rows += 1;
    }

    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    tracing::debug!("ReportExporter: {} rows ({:?}), {} bytes", rows, selector, bytes.len());
    Ok(bytes)
}

fn format_date(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|d| d.format(DATE_FORMAT).to_string()).unwrap_or_default()
}
