//! Access history queries for the dashboard.
//!
//! History is read back from the time-series store, not kept in memory. The
//! HTTP backend returns InfluxDB annotated CSV, parsed here by
//! [`parse_access_csv`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::backend::TimeSeriesBackend;
use crate::error::{Result, TelemetryError};

/// Most recent records returned by [`recent_access`].
pub const RECENT_ACCESS_LIMIT: usize = 100;

/// One `metro_access` record as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub time: DateTime<Utc>,
    pub user: String,
    pub door: String,
    pub granted: bool,
}

/// Aggregate over a window of access records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccessStatistics {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    /// `granted / total * 100`, zero when there were no attempts.
    pub grant_percentage: f64,
}

impl AccessStatistics {
    pub fn from_records(records: &[AccessRecord]) -> Self {
        let total = records.len() as u64;
        let granted = records.iter().filter(|record| record.granted).count() as u64;
        let grant_percentage = if total > 0 {
            granted as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total,
            granted,
            denied: total - granted,
            grant_percentage,
        }
    }
}

/// Latest access records of the last `minutes`, newest first.
pub async fn recent_access<B: TimeSeriesBackend>(
    backend: &B,
    minutes: i64,
) -> Result<Vec<AccessRecord>> {
    let since = Utc::now() - Duration::minutes(minutes.max(0));
    backend.query_access(since, Some(RECENT_ACCESS_LIMIT)).await
}

/// Granted/denied totals over the last `hours`.
pub async fn access_statistics<B: TimeSeriesBackend>(
    backend: &B,
    hours: i64,
) -> Result<AccessStatistics> {
    let since = Utc::now() - Duration::hours(hours.max(0));
    let records = backend.query_access(since, None).await?;
    let stats = AccessStatistics::from_records(&records);
    debug!(hours, total = stats.total, granted = stats.granted, "Computed access statistics");
    Ok(stats)
}

/// Parse InfluxDB annotated CSV holding `access_granted` rows.
///
/// Annotation rows (`#...`) and blank lines end a table; the next row is
/// taken as the header of the following table.
pub fn parse_access_csv(body: &str) -> Result<Vec<AccessRecord>> {
    let mut records = Vec::new();
    let mut header: Option<Columns> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            header = None;
            continue;
        }

        let cells = split_csv_row(line);
        let Some(columns) = &header else {
            header = Some(Columns::from_header(&cells)?);
            continue;
        };

        records.push(columns.record(&cells)?);
    }

    Ok(records)
}

#[derive(Debug)]
struct Columns {
    time: usize,
    value: usize,
    user: Option<usize>,
    door: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Result<Self> {
        let position = |name: &str| cells.iter().position(|cell| cell == name);

        let time = position("_time")
            .ok_or_else(|| TelemetryError::MalformedResponse("missing _time column".to_string()))?;
        let value = position("_value")
            .ok_or_else(|| TelemetryError::MalformedResponse("missing _value column".to_string()))?;

        Ok(Self {
            time,
            value,
            user: position("user"),
            door: position("door"),
        })
    }

    fn record(&self, cells: &[String]) -> Result<AccessRecord> {
        let cell = |index: usize| cells.get(index).map(String::as_str).unwrap_or_default();
        let optional = |index: Option<usize>| index.map(cell).unwrap_or_default().to_string();

        let time = DateTime::parse_from_rfc3339(cell(self.time))
            .map_err(|e| TelemetryError::MalformedResponse(format!("bad _time: {e}")))?
            .with_timezone(&Utc);

        let granted = match cell(self.value) {
            "true" => true,
            "false" => false,
            other => {
                return Err(TelemetryError::MalformedResponse(format!(
                    "bad access_granted value: {other}"
                )));
            }
        };

        Ok(AccessRecord {
            time,
            user: optional(self.user),
            door: optional(self.door),
            granted,
        })
    }
}

fn split_csv_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}
