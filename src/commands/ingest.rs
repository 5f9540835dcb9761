//! Ingest command implementation
//!
//! Each tracked chart is fetched, parsed and written independently. Fetching
//! and parsing may overlap across charts; writes happen one chart at a time,
//! each in its own transaction.

use super::truncate_chars;
use crate::config::{ChartConfig, Config};
use crate::error::{Error, Result};
use crate::extract::{extract_chart, ExtractOptions, Extraction, Strategy};
use crate::fetch::PageFetcher;
use crate::progress::{advance, chart_progress, finish};
use crate::store::{ChartDb, SnapshotStatus, SnapshotWrite};
use crate::weeks::{current_week, week_bucket};
use chrono::{Datelike, NaiveDate, Weekday};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Snapshot error recorded when a genre has no hype chart
pub const UNSUPPORTED_MESSAGE: &str = "hype not available for this genre (count=0)";

/// Stored parse errors are cut to this many characters
const ERROR_MAX_CHARS: usize = 200;

/// What happened to one chart during ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChartOutcome {
    Ingested {
        strategy: Strategy,
        entries: usize,
    },
    /// Sanctioned empty chart, recorded as a failed snapshot
    Unsupported {
        debug_file: Option<PathBuf>,
    },
    FetchFailed {
        error: String,
    },
    ParseFailed {
        error: String,
        debug_file: Option<PathBuf>,
    },
    StorageFailed {
        error: String,
    },
}

impl ChartOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ChartOutcome::Ingested { .. } | ChartOutcome::Unsupported { .. }
        )
    }
}

/// Ingestion result for one chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartIngest {
    pub chart_id: String,
    pub url: String,
    pub payload_bytes: Option<usize>,
    #[serde(flatten)]
    pub outcome: ChartOutcome,
}

/// Per-chart results of one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub snapshot_date: NaiveDate,
    pub charts: Vec<ChartIngest>,
}

impl IngestReport {
    pub fn ingested(&self) -> usize {
        self.charts
            .iter()
            .filter(|c| matches!(c.outcome, ChartOutcome::Ingested { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.charts.iter().filter(|c| !c.outcome.is_success()).count()
    }
}

/// Resolve the week bucket for an ingestion date, defaulting to this week
pub fn resolve_snapshot_week(date: Option<NaiveDate>) -> NaiveDate {
    match date {
        Some(d) => {
            if d.weekday() != Weekday::Mon {
                warn!("Snapshot date {} is not a Monday; bucketing to its week", d);
            }
            week_bucket(d)
        }
        None => current_week(),
    }
}

/// Result of the fetch and parse stage for one chart
enum Fetched {
    Failed(Error),
    Page {
        payload: String,
        extraction: Result<Extraction>,
    },
}

async fn fetch_and_parse(
    fetcher: &dyn PageFetcher,
    chart: &ChartConfig,
    options: &ExtractOptions,
) -> Fetched {
    info!("Fetching chart {} ({})", chart.id, chart.url);
    match fetcher.fetch(&chart.url).await {
        Ok(payload) => {
            info!("Fetched chart {} ({} bytes)", chart.id, payload.len());
            let extraction = extract_chart(&payload, options);
            Fetched::Page {
                payload,
                extraction,
            }
        }
        Err(e) => Fetched::Failed(e),
    }
}

/// Ingest every tracked chart for the week of `snapshot_date`
pub async fn cmd_ingest(
    config: &Config,
    db: &ChartDb,
    fetcher: &dyn PageFetcher,
    snapshot_date: Option<NaiveDate>,
) -> Result<IngestReport> {
    let week = resolve_snapshot_week(snapshot_date);
    let options = ExtractOptions::from_config(config)?;
    info!(
        "Ingesting {} charts for week {}",
        config.charts.len(),
        week
    );

    let pb = chart_progress(config.charts.len(), "Ingesting charts");
    let mut pages = stream::iter(config.charts.iter())
        .map(|chart| {
            let options = &options;
            async move { (chart, fetch_and_parse(fetcher, chart, options).await) }
        })
        .buffered(config.ingest.concurrency.max(1));

    let mut charts = Vec::with_capacity(config.charts.len());
    while let Some((chart, fetched)) = pages.next().await {
        let result = persist_chart(config, db, chart, week, fetched).await;
        advance(&pb, &chart.id);
        charts.push(result);
    }
    finish(pb, "Ingestion complete");

    let report = IngestReport {
        snapshot_date: week,
        charts,
    };
    info!(
        "Ingestion for {} finished: {} ingested, {} failed",
        week,
        report.ingested(),
        report.failed()
    );
    Ok(report)
}

async fn persist_chart(
    config: &Config,
    db: &ChartDb,
    chart: &ChartConfig,
    week: NaiveDate,
    fetched: Fetched,
) -> ChartIngest {
    let (payload, extraction) = match fetched {
        Fetched::Failed(e) => {
            error!("Fetch failed for chart {}: {}", chart.id, e);
            return ChartIngest {
                chart_id: chart.id.clone(),
                url: chart.url.clone(),
                payload_bytes: None,
                outcome: ChartOutcome::FetchFailed {
                    error: e.to_string(),
                },
            };
        }
        Fetched::Page {
            payload,
            extraction,
        } => (payload, extraction),
    };
    let payload_bytes = payload.len();

    let mut write = SnapshotWrite {
        chart,
        snapshot_date: week,
        status: SnapshotStatus::Failed,
        error: None,
        payload_bytes: Some(payload_bytes),
        entries: &[],
    };

    let outcome = match &extraction {
        Ok(Extraction::Ranked { strategy, entries }) => {
            info!(
                "Parsed {} entries for chart {} via {}",
                entries.len(),
                chart.id,
                strategy
            );
            if entries.len() < config.ingest.expected_entries {
                warn!(
                    "Parsed {} entries for chart {} (expected up to {})",
                    entries.len(),
                    chart.id,
                    config.ingest.expected_entries
                );
            }
            write.status = SnapshotStatus::Ok;
            write.entries = entries.as_slice();
            ChartOutcome::Ingested {
                strategy: *strategy,
                entries: entries.len(),
            }
        }
        Ok(Extraction::Unsupported) => {
            let debug_file = keep_debug_payload(config, chart, week, &payload);
            warn!(
                "Chart {}: {}; payload saved to {:?}",
                chart.id, UNSUPPORTED_MESSAGE, debug_file
            );
            write.error = Some(UNSUPPORTED_MESSAGE.to_string());
            ChartOutcome::Unsupported { debug_file }
        }
        Err(e) => {
            let message = truncate_chars(&e.to_string(), ERROR_MAX_CHARS).to_string();
            let debug_file = keep_debug_payload(config, chart, week, &payload);
            error!(
                "Parse failure for chart {} ({}) week {}: {}; payload saved to {:?}",
                chart.id, chart.url, week, message, debug_file
            );
            write.error = Some(message.clone());
            ChartOutcome::ParseFailed {
                error: message,
                debug_file,
            }
        }
    };

    let outcome = match db.write_snapshot(&write).await {
        Ok(id) => {
            info!("Wrote snapshot {} ({})", id, write.status);
            outcome
        }
        Err(e) => {
            error!("Database error writing snapshot for chart {}: {}", chart.id, e);
            ChartOutcome::StorageFailed {
                error: e.to_string(),
            }
        }
    };

    ChartIngest {
        chart_id: chart.id.clone(),
        url: chart.url.clone(),
        payload_bytes: Some(payload_bytes),
        outcome,
    }
}

/// Save a payload that produced no entries, logging instead of failing
fn keep_debug_payload(
    config: &Config,
    chart: &ChartConfig,
    week: NaiveDate,
    payload: &str,
) -> Option<PathBuf> {
    match save_debug_payload(
        &config.paths.debug_dir,
        &chart.id,
        week,
        payload,
        config.ingest.debug_payload_max_chars,
    ) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Could not save debug payload for {}: {}", chart.id, e);
            None
        }
    }
}

/// Write the head of a payload without entries to `{dir}/{chart}_{week}.html`
pub fn save_debug_payload(
    dir: &Path,
    chart_id: &str,
    week: NaiveDate,
    payload: &str,
    max_chars: usize,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}.html", chart_id, week));
    std::fs::write(&path, truncate_chars(payload, max_chars))?;
    Ok(path)
}

/// Print an ingestion report to console
pub fn print_ingest_report(report: &IngestReport) {
    println!("\nIngestion for week {}\n", report.snapshot_date);

    for chart in &report.charts {
        match &chart.outcome {
            ChartOutcome::Ingested { strategy, entries } => {
                println!("✓ {}: {} entries ({})", chart.chart_id, entries, strategy);
            }
            ChartOutcome::Unsupported { debug_file } => {
                println!("⚠ {}: {}", chart.chart_id, UNSUPPORTED_MESSAGE);
                if let Some(path) = debug_file {
                    println!("  Payload saved to {}", path.display());
                }
            }
            ChartOutcome::FetchFailed { error } => {
                println!("✗ {}: fetch failed: {}", chart.chart_id, error);
            }
            ChartOutcome::ParseFailed { error, debug_file } => {
                println!("✗ {}: {}", chart.chart_id, error);
                if let Some(path) = debug_file {
                    println!("  Payload saved to {}", path.display());
                }
            }
            ChartOutcome::StorageFailed { error } => {
                println!("✗ {}: storage failed: {}", chart.chart_id, error);
            }
        }
    }

    println!(
        "\n{} ingested, {} failed",
        report.ingested(),
        report.failed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Serves canned pages by URL; unknown URLs fail to fetch
    struct StubFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.pages.get(url).cloned().ok_or_else(|| Error::Fetch {
                url: url.to_string(),
                message: "HTTP status server error (503 Service Unavailable)".to_string(),
            })
        }
    }

    fn chart(id: &str) -> ChartConfig {
        ChartConfig {
            id: id.to_string(),
            chart_type: "top100".to_string(),
            genre_slug: id.to_string(),
            name: id.to_string(),
            url: format!("https://charts.test/{}", id),
        }
    }

    fn chart_page(n: usize) -> String {
        let tracks: Vec<_> = (1..=n)
            .map(|i| json!({"id": i, "name": format!("T{}", i), "slug": "t", "bpm": 124}))
            .collect();
        let data = json!({"props": {"pageProps": {"tracks": tracks}}});
        format!(
            r#"<html><script id="__NEXT_DATA__" type="application/json">{}</script></html>"#,
            data
        )
    }

    fn unsupported_hype_page() -> String {
        let data = json!({"props": {"pageProps": {"dehydratedState": {"queries": [
            {"state": {"data": {"is_included_in_hype": false}}}
        ]}}}});
        format!(
            r#"<html><a href="/genre/x?hype=true">Hype</a><script id="__NEXT_DATA__">{}</script></html>"#,
            data
        )
    }

    async fn setup(charts: Vec<ChartConfig>) -> (Config, ChartDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.charts = charts;
        config.ingest.concurrency = 2;
        let db = ChartDb::new(&config.paths.db_file).await.unwrap();
        (config, db, tmp)
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_isolates_chart_failures() {
        let charts = vec![chart("good"), chart("down"), chart("broken"), chart("hype")];
        let (config, db, _tmp) = setup(charts).await;

        let fetcher = StubFetcher {
            pages: HashMap::from([
                ("https://charts.test/good".to_string(), chart_page(30)),
                (
                    "https://charts.test/broken".to_string(),
                    "<html><body>maintenance</body></html>".to_string(),
                ),
                ("https://charts.test/hype".to_string(), unsupported_hype_page()),
            ]),
        };

        // Wednesday is bucketed to Monday
        let wednesday = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let report = cmd_ingest(&config, &db, &fetcher, Some(wednesday))
            .await
            .unwrap();

        assert_eq!(report.snapshot_date, monday());
        let ids: Vec<&str> = report.charts.iter().map(|c| c.chart_id.as_str()).collect();
        assert_eq!(ids, vec!["good", "down", "broken", "hype"]);

        assert_eq!(
            report.charts[0].outcome,
            ChartOutcome::Ingested {
                strategy: Strategy::NextData,
                entries: 30
            }
        );
        assert!(matches!(
            report.charts[1].outcome,
            ChartOutcome::FetchFailed { .. }
        ));
        assert!(matches!(
            report.charts[2].outcome,
            ChartOutcome::ParseFailed { .. }
        ));
        let hype_debug = config.paths.debug_dir.join("hype_2024-05-13.html");
        assert_eq!(
            report.charts[3].outcome,
            ChartOutcome::Unsupported {
                debug_file: Some(hype_debug.clone())
            }
        );
        assert!(hype_debug.exists());
        assert_eq!(report.ingested(), 1);
        assert_eq!(report.failed(), 2);

        let good = db.latest_snapshot("good").await.unwrap().unwrap();
        assert_eq!(good.status, "ok");
        assert_eq!(good.entry_count, 30);

        // Fetch failures leave no snapshot behind
        assert!(db.latest_snapshot("down").await.unwrap().is_none());

        let broken = db.latest_snapshot("broken").await.unwrap().unwrap();
        assert_eq!(broken.status, "failed");
        assert!(broken.error.unwrap().starts_with("Parse error"));
        let debug = config.paths.debug_dir.join("broken_2024-05-13.html");
        assert!(debug.exists());

        let hype = db.latest_snapshot("hype").await.unwrap().unwrap();
        assert_eq!(hype.status, "failed");
        assert_eq!(hype.error.as_deref(), Some(UNSUPPORTED_MESSAGE));
    }

    #[tokio::test]
    async fn test_reingest_replaces_entries() {
        let (config, db, _tmp) = setup(vec![chart("good")]).await;
        let url = "https://charts.test/good".to_string();

        let first = StubFetcher {
            pages: HashMap::from([(url.clone(), chart_page(40))]),
        };
        cmd_ingest(&config, &db, &first, Some(monday())).await.unwrap();

        let second = StubFetcher {
            pages: HashMap::from([(url, chart_page(25))]),
        };
        cmd_ingest(&config, &db, &second, Some(monday())).await.unwrap();

        let snap = db.latest_snapshot("good").await.unwrap().unwrap();
        assert_eq!(snap.entry_count, 25);
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_only_that_chart() {
        let (config, db, _tmp) = setup(vec![chart("bad"), chart("good")]).await;

        // Reject the tenth entry of the bad chart, after its snapshot row went in
        let raw = sqlx::SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new().filename(&config.paths.db_file),
        )
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER reject_bad_entry BEFORE INSERT ON chart_entries
            WHEN NEW.snapshot_id LIKE 'bad:%' AND NEW.rank = 10
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
            "#,
        )
        .execute(&raw)
        .await
        .unwrap();
        raw.close().await;

        let fetcher = StubFetcher {
            pages: HashMap::from([
                ("https://charts.test/bad".to_string(), chart_page(30)),
                ("https://charts.test/good".to_string(), chart_page(30)),
            ]),
        };
        let report = cmd_ingest(&config, &db, &fetcher, Some(monday()))
            .await
            .unwrap();

        assert!(matches!(
            report.charts[0].outcome,
            ChartOutcome::StorageFailed { .. }
        ));
        assert_eq!(report.charts[1].chart_id, "good");
        assert!(matches!(
            report.charts[1].outcome,
            ChartOutcome::Ingested { entries: 30, .. }
        ));
        assert_eq!(report.failed(), 1);

        // Snapshot row and earlier entries of the bad chart are gone
        assert!(db.latest_snapshot("bad").await.unwrap().is_none());
        let good = db.latest_snapshot("good").await.unwrap().unwrap();
        assert_eq!(good.entry_count, 30);
    }

    #[test]
    fn test_save_debug_payload_truncates() {
        let tmp = TempDir::new().unwrap();
        let payload = "é".repeat(50);
        let path = save_debug_payload(tmp.path(), "c", monday(), &payload, 10).unwrap();
        assert!(path.ends_with("c_2024-05-13.html"));
        assert_eq!(std::fs::read_to_string(path).unwrap().chars().count(), 10);
    }
}
