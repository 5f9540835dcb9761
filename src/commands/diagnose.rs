//! Diagnose command implementation
//!
//! Fetches and parses every tracked chart without touching the database,
//! writing the raw page and its embedded data block for any chart that
//! parses poorly.

use super::truncate_chars;
use crate::config::Config;
use crate::error::Result;
use crate::extract::{extract_chart, find_next_data, ExtractOptions, Extraction};
use crate::fetch::PageFetcher;
use crate::weeks::current_week;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Charts parsing fewer entries than this are reported as failures
pub const MIN_HEALTHY_ENTRIES: usize = 50;

const RESPONSE_MAX_CHARS: usize = 200_000;
const NEXT_DATA_MAX_CHARS: usize = 500_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnoseStatus {
    Ok,
    Fail,
    Error,
}

/// Diagnosis of one chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDiagnosis {
    pub chart_id: String,
    pub status: DiagnoseStatus,
    pub parsed: usize,
    pub payload_chars: usize,
    pub has_next_data: bool,
    pub debug_dir: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnoseReport {
    pub snapshot_date: NaiveDate,
    pub charts: Vec<ChartDiagnosis>,
}

impl DiagnoseReport {
    pub fn all_ok(&self) -> bool {
        self.charts
            .iter()
            .all(|c| matches!(c.status, DiagnoseStatus::Ok))
    }

    /// Process exit code: 0 when every chart is healthy, else 2
    pub fn exit_code(&self) -> i32 {
        if self.all_ok() {
            0
        } else {
            2
        }
    }
}

/// Fetch and parse every tracked chart, writing debug artifacts on failure
pub async fn cmd_diagnose(
    config: &Config,
    fetcher: &dyn PageFetcher,
    snapshot_date: Option<NaiveDate>,
) -> Result<DiagnoseReport> {
    let date = snapshot_date.unwrap_or_else(current_week);
    let options = ExtractOptions::from_config(config)?;
    let mut charts = Vec::with_capacity(config.charts.len());

    for chart in &config.charts {
        info!("Diagnosing chart {} ({})", chart.id, chart.url);

        let payload = match fetcher.fetch(&chart.url).await {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to fetch chart {}: {}", chart.id, e);
                charts.push(ChartDiagnosis {
                    chart_id: chart.id.clone(),
                    status: DiagnoseStatus::Error,
                    parsed: 0,
                    payload_chars: 0,
                    has_next_data: false,
                    debug_dir: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let has_next_data = payload.contains("__NEXT_DATA__");
        let (parsed, parse_error) = match extract_chart(&payload, &options) {
            Ok(Extraction::Ranked { entries, .. }) => (entries.len(), None),
            Ok(Extraction::Unsupported) => (0, None),
            Err(e) => {
                error!("Parse error for chart {}: {}", chart.id, e);
                (0, Some(e.to_string()))
            }
        };

        let mut diagnosis = ChartDiagnosis {
            chart_id: chart.id.clone(),
            status: DiagnoseStatus::Ok,
            parsed,
            payload_chars: payload.chars().count(),
            has_next_data,
            debug_dir: None,
            error: parse_error,
        };

        if parsed < MIN_HEALTHY_ENTRIES {
            diagnosis.status = DiagnoseStatus::Fail;
            let dir = config.paths.debug_dir.join(&chart.id).join(date.to_string());
            match write_artifacts(&dir, &payload) {
                Ok(()) => diagnosis.debug_dir = Some(dir),
                Err(e) => error!("Could not write debug artifacts for {}: {}", chart.id, e),
            }
            error!(
                "Chart {} parse failure or low count: parsed={}, debug saved to {:?}",
                chart.id, parsed, diagnosis.debug_dir
            );
        }

        charts.push(diagnosis);
    }

    Ok(DiagnoseReport {
        snapshot_date: date,
        charts,
    })
}

/// Raw text of the `__NEXT_DATA__` block, pretty-printed when it parses
fn next_data_text(payload: &str) -> Option<String> {
    let document = Html::parse_document(payload);
    if let Some(value) = find_next_data(&document) {
        return serde_json::to_string_pretty(&value).ok();
    }
    let sel = Selector::parse("script#__NEXT_DATA__").ok()?;
    let raw: String = document.select(&sel).next()?.text().collect();
    (!raw.trim().is_empty()).then_some(raw)
}

fn write_artifacts(dir: &Path, payload: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join("response.html"),
        truncate_chars(payload, RESPONSE_MAX_CHARS),
    )?;
    if let Some(text) = next_data_text(payload) {
        std::fs::write(
            dir.join("next_data.json"),
            truncate_chars(&text, NEXT_DATA_MAX_CHARS),
        )?;
    }
    Ok(())
}

/// Print diagnostic results to console
pub fn print_diagnose_report(report: &DiagnoseReport) {
    println!("\nDiagnostic Results:");
    for chart in &report.charts {
        let next_data = if chart.has_next_data { "yes" } else { "no" };
        match chart.status {
            DiagnoseStatus::Ok => println!(
                "[OK] {} parsed={} html={} next_data={}",
                chart.chart_id, chart.parsed, chart.payload_chars, next_data
            ),
            DiagnoseStatus::Fail => println!(
                "[FAIL] {} parsed={} html={} next_data={} debug={}",
                chart.chart_id,
                chart.parsed,
                chart.payload_chars,
                next_data,
                chart
                    .debug_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
            DiagnoseStatus::Error => println!("[ERROR] {} fetch failed", chart.chart_id),
        }
    }
}
