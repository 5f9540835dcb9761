//! Report command implementation

use crate::config::Config;
use crate::error::Result;
use crate::report::{build_report, render_html, ReportData};
use crate::store::ChartDb;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the report went and what it covered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// `None` when there was nothing to report
    pub output: Option<PathBuf>,
    pub charts: usize,
    pub leaderboard: usize,
}

/// Build the report and write it as HTML
pub async fn cmd_report(
    config: &Config,
    db: &ChartDb,
    as_of_week: Option<NaiveDate>,
    output: Option<&Path>,
) -> Result<(ReportData, ReportSummary)> {
    let data = build_report(db, as_of_week).await?;
    let mut summary = ReportSummary {
        output: None,
        charts: data.charts.len(),
        leaderboard: data.leaderboard.len(),
    };

    if data.is_empty() {
        warn!("No durability metrics available; skipping report");
        return Ok((data, summary));
    }

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.paths.report_file.clone());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, render_html(&data))?;
    info!("Report written to {:?}", path);

    summary.output = Some(path);
    Ok((data, summary))
}

/// Print a report summary to console
pub fn print_report_summary(summary: &ReportSummary) {
    match &summary.output {
        Some(path) => {
            println!("✓ Report written to {}", path.display());
            println!(
                "  Charts: {}, cross-chart tracks: {}",
                summary.charts, summary.leaderboard
            );
        }
        None => println!("No durability metrics available. Run 'continuity compute' first."),
    }
}
