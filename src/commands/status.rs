//! Status command implementation

use super::truncate_chars;
use crate::config::Config;
use crate::error::Result;
use crate::store::{ChartDb, MetricsSummary, SnapshotStatus, SnapshotSummary};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Characters of a snapshot error shown in status output
const ERROR_PREVIEW_CHARS: usize = 60;

/// State of one tracked chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartStatus {
    pub chart_id: String,
    pub name: String,
    pub url: String,
    pub latest_snapshot: Option<SnapshotSummary>,
    pub latest_metrics: Option<MetricsSummary>,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub report_path: String,
    pub charts: Vec<ChartStatus>,
}

/// Get pipeline status for every tracked chart
pub async fn cmd_status(config: &Config, db: &ChartDb) -> Result<StatusInfo> {
    info!("Getting status");

    let mut charts = Vec::with_capacity(config.charts.len());
    for chart in &config.charts {
        charts.push(ChartStatus {
            chart_id: chart.id.clone(),
            name: chart.name.clone(),
            url: chart.url.clone(),
            latest_snapshot: db.latest_snapshot(&chart.id).await?,
            latest_metrics: db.latest_metrics(&chart.id).await?,
        });
    }

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        report_path: config.paths.report_file.display().to_string(),
        charts,
    })
}

fn error_preview(error: &str) -> String {
    let preview = truncate_chars(error, ERROR_PREVIEW_CHARS);
    if preview.len() < error.len() {
        format!("{}...", preview)
    } else {
        preview.to_string()
    }
}

fn snapshot_line(snapshot: Option<&SnapshotSummary>) -> String {
    match snapshot {
        None => "MISSING (entries: -)".to_string(),
        Some(s) if !matches!(s.get_status(), Ok(SnapshotStatus::Ok)) => {
            let mut line = format!("{} FAILED", s.snapshot_date);
            if let Some(error) = &s.error {
                line.push_str(&format!(" ({})", error_preview(error)));
            }
            line.push_str(" (entries: 0)");
            line
        }
        Some(s) => format!("{} (entries: {})", s.snapshot_date, s.entry_count),
    }
}

fn metrics_line(metrics: Option<&MetricsSummary>) -> String {
    match metrics {
        None => "MISSING (rows: -)".to_string(),
        Some(m) => format!("{} (rows: {})", m.as_of_week, m.row_count),
    }
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 Chart Continuity Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Report: {}", status.report_path);

    println!("\nTracked charts:");
    for chart in &status.charts {
        println!("  • {}: {} ({})", chart.chart_id, chart.name, chart.url);
    }

    println!("\nChart state:");
    for chart in &status.charts {
        println!("  • {}", chart.chart_id);
        println!(
            "    snapshots: {}",
            snapshot_line(chart.latest_snapshot.as_ref())
        );
        println!(
            "    metrics:   {}",
            metrics_line(chart.latest_metrics.as_ref())
        );
    }
}
