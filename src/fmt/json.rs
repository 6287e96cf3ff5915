use chrono::Utc;
use serde::Serialize;

use crate::error::IpsiftError;
use crate::events::ProgressEvent;
use crate::services::run::{RunReport, RunStatus};
use crate::stats::LatencyStats;

#[derive(Serialize)]
pub struct JsonRecord {
    pub rank: usize,
    pub address: String,
    pub port: u16,
    pub latency_ms: f64,
    pub token: String,
}

#[derive(Serialize)]
pub struct JsonRun<'a> {
    pub schema_version: u8,
    pub run_ts: String,
    pub status: &'static str,
    pub message: Option<String>,
    pub candidates: usize,
    pub stats: Option<&'a LatencyStats>,
    pub selected: Vec<JsonRecord>,
    pub events: &'a [ProgressEvent],
}

/// Serialize a run report into a JSON string.
pub fn report_to_json(report: &RunReport, pretty: bool) -> Result<String, IpsiftError> {
    let (status, message) = match &report.status {
        RunStatus::Uploaded { message } => ("uploaded", Some(message.clone())),
        RunStatus::DryRun => ("dry_run", None),
        RunStatus::Failed(f) => ("failed", Some(f.to_string())),
    };
    let selected = report
        .selected
        .iter()
        .enumerate()
        .map(|(i, r)| JsonRecord {
            rank: i + 1,
            address: r.address.to_string(),
            port: r.port,
            latency_ms: r.latency_ms,
            token: r.token().to_string(),
        })
        .collect();
    let run = JsonRun {
        schema_version: 1,
        run_ts: Utc::now().to_rfc3339(),
        status,
        message,
        candidates: report.candidates,
        stats: report.stats.as_ref(),
        selected,
        events: &report.messages,
    };
    to_string(&run, pretty)
}

/// Serialize any value, pretty or compact.
pub fn to_string<T: Serialize>(value: &T, pretty: bool) -> Result<String, IpsiftError> {
    let text = if pretty {
        serde_json::to_string_pretty(value).map_err(|e| IpsiftError::Other(e.to_string()))?
    } else {
        serde_json::to_string(value).map_err(|e| IpsiftError::Other(e.to_string()))?
    };
    Ok(text)
}
