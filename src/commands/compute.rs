//! Compute command implementation

use crate::error::Result;
use crate::store::ChartDb;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// What happened to one chart's metrics batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComputeOutcome {
    Computed { as_of_week: NaiveDate, tracks: usize },
    /// No successful snapshot entries up to the as-of week
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartCompute {
    pub chart_id: String,
    #[serde(flatten)]
    pub outcome: ComputeOutcome,
}

/// Per-chart results of one compute run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeReport {
    /// Upper bound used for every chart; `None` when nothing was ingested yet
    pub as_of_week: Option<NaiveDate>,
    pub charts: Vec<ChartCompute>,
}

impl ComputeReport {
    pub fn computed(&self) -> usize {
        self.charts
            .iter()
            .filter(|c| matches!(c.outcome, ComputeOutcome::Computed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.charts
            .iter()
            .filter(|c| matches!(c.outcome, ComputeOutcome::Failed { .. }))
            .count()
    }
}

/// Recompute durability metrics for every chart with history up to `as_of`.
///
/// Each chart uses its own latest observed week as the as-of week, so a
/// chart that missed the latest week still gets metrics for its last one.
pub async fn cmd_compute(db: &ChartDb, as_of: Option<NaiveDate>) -> Result<ComputeReport> {
    let target = match as_of {
        Some(week) => week,
        None => match db.latest_snapshot_week().await? {
            Some(week) => week,
            None => {
                warn!("No snapshots found; skipping compute");
                return Ok(ComputeReport::default());
            }
        },
    };

    let chart_ids = db.charts_with_snapshots(target).await?;
    info!("Computing metrics for {} charts up to {}", chart_ids.len(), target);

    let mut charts = Vec::with_capacity(chart_ids.len());
    for chart_id in chart_ids {
        let outcome = match compute_chart(db, &chart_id, target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to compute metrics for chart {}: {}", chart_id, e);
                ComputeOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        charts.push(ChartCompute { chart_id, outcome });
    }

    Ok(ComputeReport {
        as_of_week: Some(target),
        charts,
    })
}

async fn compute_chart(db: &ChartDb, chart_id: &str, target: NaiveDate) -> Result<ComputeOutcome> {
    let history = db.chart_history(chart_id, target).await?;
    let Some(as_of_week) = history.as_of_week() else {
        info!("No weeks for chart {} up to {}; skipping", chart_id, target);
        return Ok(ComputeOutcome::Skipped);
    };

    let metrics = history.compute_metrics();
    if metrics.is_empty() {
        info!("No entries for chart {}; skipping", chart_id);
        return Ok(ComputeOutcome::Skipped);
    }

    db.replace_metrics(chart_id, as_of_week, &metrics).await?;
    info!(
        "Computed metrics for chart {} as of {} ({} tracks)",
        chart_id,
        as_of_week,
        metrics.len()
    );

    Ok(ComputeOutcome::Computed {
        as_of_week,
        tracks: metrics.len(),
    })
}

/// Print a compute report to console
pub fn print_compute_report(report: &ComputeReport) {
    let Some(as_of) = report.as_of_week else {
        println!("No snapshots found. Run 'continuity ingest' first.");
        return;
    };

    println!("\nDurability metrics up to {}\n", as_of);
    for chart in &report.charts {
        match &chart.outcome {
            ComputeOutcome::Computed { as_of_week, tracks } => {
                println!("✓ {}: {} tracks as of {}", chart.chart_id, tracks, as_of_week);
            }
            ComputeOutcome::Skipped => println!("- {}: no entries", chart.chart_id),
            ComputeOutcome::Failed { error } => println!("✗ {}: {}", chart.chart_id, error),
        }
    }
    println!("\n{} computed, {} failed", report.computed(), report.failed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartConfig;
    use crate::extract::ParsedEntry;
    use crate::store::{SnapshotStatus, SnapshotWrite};
    use tempfile::TempDir;

    fn chart(id: &str) -> ChartConfig {
        ChartConfig {
            id: id.to_string(),
            chart_type: "top100".to_string(),
            genre_slug: id.to_string(),
            name: id.to_string(),
            url: format!("https://charts.test/{}", id),
        }
    }

    fn entries(ids: &[&str]) -> Vec<ParsedEntry> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| ParsedEntry {
                track_id: id.to_string(),
                title: format!("Track {}", id),
                url: format!("https://charts.test/track/t/{}", id),
                mix_name: None,
                artists: Vec::new(),
                remixers: Vec::new(),
                rank: i as u32 + 1,
            })
            .collect()
    }

    fn week(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::weeks(n)
    }

    async fn write(db: &ChartDb, chart: &ChartConfig, n: i64, ids: &[&str]) {
        let entries = entries(ids);
        db.write_snapshot(&SnapshotWrite {
            chart,
            snapshot_date: week(n),
            status: SnapshotStatus::Ok,
            error: None,
            payload_bytes: None,
            entries: &entries,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_compute_uses_each_charts_latest_week() {
        let tmp = TempDir::new().unwrap();
        let db = ChartDb::new(&tmp.path().join("db.sqlite")).await.unwrap();
        let (a, b) = (chart("a"), chart("b"));

        write(&db, &a, 0, &["1", "2"]).await;
        write(&db, &a, 1, &["2", "1"]).await;
        write(&db, &a, 2, &["1"]).await;
        write(&db, &b, 0, &["1", "3"]).await;
        write(&db, &b, 1, &["3"]).await;

        let report = cmd_compute(&db, None).await.unwrap();
        assert_eq!(report.as_of_week, Some(week(2)));
        assert_eq!(report.computed(), 2);

        let a_out = &report.charts[0];
        assert_eq!(a_out.chart_id, "a");
        assert_eq!(
            a_out.outcome,
            ComputeOutcome::Computed {
                as_of_week: week(2),
                tracks: 2
            }
        );
        // Chart b missed the latest week and is computed as of its own last week
        assert_eq!(
            report.charts[1].outcome,
            ComputeOutcome::Computed {
                as_of_week: week(1),
                tracks: 2
            }
        );

        let rows = db.chart_metrics("a", week(2)).await.unwrap();
        let one = rows.iter().find(|r| r.metric.track_id == "1").unwrap();
        assert_eq!(one.metric.current_streak_weeks, 3);
        assert_eq!(one.metric.wow_delta, Some(1));
        let two = rows.iter().find(|r| r.metric.track_id == "2").unwrap();
        assert_eq!(two.metric.current_streak_weeks, 0);
        assert_eq!(two.metric.last_rank, None);
    }

    #[tokio::test]
    async fn test_compute_as_of_earlier_week() {
        let tmp = TempDir::new().unwrap();
        let db = ChartDb::new(&tmp.path().join("db.sqlite")).await.unwrap();
        let a = chart("a");
        write(&db, &a, 0, &["1"]).await;
        write(&db, &a, 3, &["1"]).await;

        let report = cmd_compute(&db, Some(week(1))).await.unwrap();
        assert_eq!(
            report.charts[0].outcome,
            ComputeOutcome::Computed {
                as_of_week: week(0),
                tracks: 1
            }
        );
        assert!(!db.has_metrics("a", week(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_metrics_failure_rolls_back_only_that_chart() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.sqlite");
        let db = ChartDb::new(&path).await.unwrap();
        let (a, b) = (chart("a"), chart("b"));
        write(&db, &a, 0, &["1", "2"]).await;
        write(&db, &b, 0, &["1", "3"]).await;

        let first = cmd_compute(&db, None).await.unwrap();
        assert_eq!(first.computed(), 2);

        write(&db, &a, 1, &["2"]).await;
        write(&db, &b, 1, &["3"]).await;

        // Chart a fails on its second metric row, after the first was written
        let raw = sqlx::SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new().filename(&path),
        )
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER reject_a_metrics BEFORE INSERT ON durability_metrics
            WHEN NEW.chart_id = 'a' AND NEW.track_id = '2'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
            "#,
        )
        .execute(&raw)
        .await
        .unwrap();
        raw.close().await;

        let report = cmd_compute(&db, None).await.unwrap();
        assert_eq!(report.charts[0].chart_id, "a");
        assert!(matches!(
            report.charts[0].outcome,
            ComputeOutcome::Failed { .. }
        ));
        assert_eq!(
            report.charts[1].outcome,
            ComputeOutcome::Computed {
                as_of_week: week(1),
                tracks: 2
            }
        );
        assert_eq!(report.failed(), 1);

        // Nothing of chart a's failed batch survives; its earlier batch does
        assert!(!db.has_metrics("a", week(1)).await.unwrap());
        assert_eq!(db.chart_metrics("a", week(0)).await.unwrap().len(), 2);
        assert_eq!(db.chart_metrics("b", week(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compute_without_snapshots() {
        let tmp = TempDir::new().unwrap();
        let db = ChartDb::new(&tmp.path().join("db.sqlite")).await.unwrap();

        let report = cmd_compute(&db, None).await.unwrap();
        assert_eq!(report.as_of_week, None);
        assert!(report.charts.is_empty());
    }
}
