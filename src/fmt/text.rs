use console::style;

use crate::domain::record::RankedRecord;
use crate::domain::store::StoreStats;
use crate::events::{ProgressEvent, Severity};
use crate::services::run::{RunReport, RunStatus};
use crate::stats::LatencyStats;

/// One progress line: `[probe] probed 50/200`.
pub fn render_event(e: &ProgressEvent) -> String {
    let stage = format!("[{}]", e.stage);
    match e.severity {
        Severity::Info => format!("{} {}", style(stage).cyan().bold(), e.message),
        Severity::Warn => format!("{} {}", style(stage).yellow().bold(), style(&e.message).yellow()),
        Severity::Error => format!("{} {}", style(stage).red().bold(), style(&e.message).red()),
    }
}

/// Ranked table, at most `max_rows` lines plus a remainder note.
pub fn render_selection(records: &[RankedRecord], max_rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}\n",
        style("Selected:").cyan().bold(),
        style(records.len()).green()
    ));
    for (i, r) in records.iter().take(max_rows).enumerate() {
        out.push_str(&format!(
            "  {rank:>3}. {addr:<21} {lat}\n",
            rank = i + 1,
            addr = style(format!("{}:{}", r.address, r.port)).blue(),
            lat = style(format!("{:.2} ms", r.latency_ms)).yellow(),
        ));
    }
    if records.len() > max_rows {
        out.push_str(&format!("  ... {} more\n", records.len() - max_rows));
    }
    out
}

/// Single-line latency summary.
pub fn render_stats(s: &LatencyStats) -> String {
    format!(
        "{} {}/{} responded (min: {:.2}, avg: {:.2}, max: {:.2} ms)",
        style("Probe:").cyan().bold(),
        s.succeeded,
        s.count,
        s.latency_min,
        s.latency_avg,
        s.latency_max
    )
}

/// Final block for a finished run.
pub fn render_report(report: &RunReport, verbose: bool) -> String {
    let mut out = String::new();
    if let Some(stats) = &report.stats {
        out.push_str(&render_stats(stats));
        out.push('\n');
    }
    if !report.selected.is_empty() {
        let rows = if verbose { report.selected.len() } else { 10 };
        out.push_str(&render_selection(&report.selected, rows));
    }
    let status = match &report.status {
        RunStatus::Uploaded { message } => style(format!("Uploaded: {message}")).green().bold(),
        RunStatus::DryRun => style("Dry run: nothing uploaded".to_string()).yellow().bold(),
        RunStatus::Failed(f) => style(format!("Failed: {f}")).red().bold(),
    };
    out.push_str(&status.to_string());
    out
}

/// Records currently held by the store.
pub fn render_current(key: &str, ips: &[String]) -> String {
    let mut out = format!(
        "{} {} ({} records)",
        style("Store key:").cyan().bold(),
        style(key).green(),
        ips.len()
    );
    for ip in ips {
        out.push_str(&format!("\n  {ip}"));
    }
    out
}

pub fn render_store_stats(s: &StoreStats) -> String {
    let size = match &s.content_size_mb {
        serde_json::Value::String(v) => v.clone(),
        serde_json::Value::Null => "?".to_string(),
        other => other.to_string(),
    };
    let mut out = format!(
        "{} {}\n{} {} MB",
        style("Total records:").cyan().bold(),
        s.total_ips,
        style("Content size:").cyan().bold(),
        size
    );
    if !s.sample_ips.is_empty() {
        out.push_str(&format!(
            "\n{} {}",
            style("Sample:").cyan().bold(),
            s.sample_ips.join(", ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Stage;
    use std::net::Ipv4Addr;

    #[test]
    fn selection_truncates_rows() {
        console::set_colors_enabled(false);
        let records: Vec<RankedRecord> = (1..=12)
            .map(|i| RankedRecord {
                address: Ipv4Addr::new(10, 0, 0, i),
                port: 443,
                latency_ms: f64::from(i),
            })
            .collect();
        let out = render_selection(&records, 10);
        assert!(out.contains("10.0.0.1:443"));
        assert!(out.contains("1.00 ms"));
        assert!(!out.contains("10.0.0.11:443"));
        assert!(out.contains("... 2 more"));
    }

    #[test]
    fn event_line_carries_stage() {
        console::set_colors_enabled(false);
        let line = render_event(&ProgressEvent::warn(Stage::Resolve, "skipped line 2"));
        assert_eq!(line, "[resolve] skipped line 2");
    }
}
