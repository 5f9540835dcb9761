//! Chart storage using SQLite
//!
//! This module holds everything the pipeline persists:
//! - Charts (reference data from the configured registry)
//! - Snapshots (one fetch of one chart for one week)
//! - Tracks and ranked chart entries
//! - Durability metrics per chart and as-of week

mod schema;

pub use schema::*;

use crate::config::{ChartConfig, Config};
use crate::durability::{ChartHistory, ChartMetric, DurabilityMetric};
use crate::error::{Error, Result};
use crate::extract::ParsedEntry;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};

/// Snapshot status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Ok,
    Failed,
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotStatus::Ok => write!(f, "ok"),
            SnapshotStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SnapshotStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(SnapshotStatus::Ok),
            "failed" => Ok(SnapshotStatus::Failed),
            _ => Err(Error::Other(format!("Unknown snapshot status: {}", s))),
        }
    }
}

/// Snapshot id for a chart and week
pub fn snapshot_id(chart_id: &str, snapshot_date: NaiveDate) -> String {
    format!("{}:{}", chart_id, snapshot_date)
}

/// Everything written for one chart fetch
#[derive(Debug, Clone)]
pub struct SnapshotWrite<'a> {
    pub chart: &'a ChartConfig,
    pub snapshot_date: NaiveDate,
    pub status: SnapshotStatus,
    pub error: Option<String>,
    pub payload_bytes: Option<usize>,
    pub entries: &'a [ParsedEntry],
}

/// Chart with its latest metrics week
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChartMetricsWeek {
    pub chart_id: String,
    pub chart_name: String,
    pub as_of_week: NaiveDate,
}

/// Latest snapshot of a chart, with its entry count
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_date: NaiveDate,
    pub status: String,
    pub error: Option<String>,
    pub entry_count: u32,
}

impl SnapshotSummary {
    pub fn get_status(&self) -> Result<SnapshotStatus> {
        self.status.parse()
    }
}

/// Latest metrics batch of a chart
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub as_of_week: NaiveDate,
    pub row_count: u32,
}

fn join_names(names: &[String]) -> Option<String> {
    (!names.is_empty()).then(|| names.join(", "))
}

/// Chart database handle
#[derive(Clone)]
pub struct ChartDb {
    pool: SqlitePool,
}

impl ChartDb {
    /// Connect to the configured database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open a database by path, creating the schema if needed
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='durability_metrics'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Ingestion =====

    /// Write a snapshot and its entries in one transaction.
    ///
    /// Re-writing the same chart and week updates the snapshot and replaces
    /// its entries. Returns the snapshot id.
    pub async fn write_snapshot(&self, write: &SnapshotWrite<'_>) -> Result<String> {
        let chart = write.chart;
        let id = snapshot_id(&chart.id, write.snapshot_date);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO charts (id, chart_type, genre_slug, name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chart_type = excluded.chart_type,
                genre_slug = excluded.genre_slug,
                name = excluded.name
            "#,
        )
        .bind(&chart.id)
        .bind(&chart.chart_type)
        .bind(&chart.genre_slug)
        .bind(&chart.name)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO chart_snapshots
                (id, chart_id, snapshot_date, fetched_at, source_url, status, error, payload_bytes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chart_id, snapshot_date) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                source_url = excluded.source_url,
                status = excluded.status,
                error = excluded.error,
                payload_bytes = excluded.payload_bytes
            "#,
        )
        .bind(&id)
        .bind(&chart.id)
        .bind(write.snapshot_date)
        .bind(Utc::now().to_rfc3339())
        .bind(&chart.url)
        .bind(write.status.to_string())
        .bind(&write.error)
        .bind(write.payload_bytes.map(|b| b as i64))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chart_entries WHERE snapshot_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for entry in write.entries {
            if entry.rank == 0 {
                return Err(Error::Other(format!(
                    "Rank must be positive for track {}",
                    entry.track_id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO tracks (id, title, url, mix_name, artists, remixers)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    mix_name = excluded.mix_name,
                    artists = excluded.artists,
                    remixers = excluded.remixers
                "#,
            )
            .bind(&entry.track_id)
            .bind(&entry.title)
            .bind(&entry.url)
            .bind(&entry.mix_name)
            .bind(join_names(&entry.artists))
            .bind(join_names(&entry.remixers))
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chart_entries (snapshot_id, track_id, rank) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(&entry.track_id)
                .bind(entry.rank)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(
            "Wrote snapshot {} ({}, {} entries)",
            id,
            write.status,
            write.entries.len()
        );
        Ok(id)
    }

    // ===== History =====

    /// Latest snapshot week on any chart
    pub async fn latest_snapshot_week(&self) -> Result<Option<NaiveDate>> {
        let week: Option<NaiveDate> =
            sqlx::query_scalar("SELECT MAX(snapshot_date) FROM chart_snapshots")
                .fetch_one(&self.pool)
                .await?;
        Ok(week)
    }

    /// Charts with a snapshot on or before `as_of`
    pub async fn charts_with_snapshots(&self, as_of: NaiveDate) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT chart_id FROM chart_snapshots
            WHERE snapshot_date <= ?
            ORDER BY chart_id
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Rank history of a chart up to `as_of`.
    ///
    /// Failed snapshots count as observed weeks with no entries.
    pub async fn chart_history(&self, chart_id: &str, as_of: NaiveDate) -> Result<ChartHistory> {
        let weeks: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT snapshot_date FROM chart_snapshots
            WHERE chart_id = ? AND snapshot_date <= ?
            ORDER BY snapshot_date
            "#,
        )
        .bind(chart_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        let entries = sqlx::query_as::<_, (NaiveDate, String, u32)>(
            r#"
            SELECT cs.snapshot_date, ce.track_id, ce.rank
            FROM chart_entries ce
            JOIN chart_snapshots cs ON cs.id = ce.snapshot_id
            WHERE cs.chart_id = ? AND cs.snapshot_date <= ?
            ORDER BY cs.snapshot_date, ce.rank
            "#,
        )
        .bind(chart_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(ChartHistory { weeks, entries })
    }

    // ===== Metrics =====

    /// Replace a chart's metrics for one as-of week in one transaction
    pub async fn replace_metrics(
        &self,
        chart_id: &str,
        as_of_week: NaiveDate,
        metrics: &[DurabilityMetric],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM durability_metrics WHERE chart_id = ? AND as_of_week = ?")
            .bind(chart_id)
            .bind(as_of_week)
            .execute(&mut *tx)
            .await?;

        for m in metrics {
            sqlx::query(
                r#"
                INSERT INTO durability_metrics (
                    chart_id, track_id, as_of_week,
                    weeks_on_chart, first_seen_week, last_seen_week, age_weeks, presence_ratio,
                    current_streak_weeks, max_streak_weeks, last_streak_weeks,
                    reentry_count, segments_count,
                    best_rank, best_rank_week, avg_rank, rank_stddev, top10_weeks, top25_weeks,
                    last_rank, prev_rank, wow_delta, momentum_4w, volatility_4w,
                    durability_score
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chart_id)
            .bind(&m.track_id)
            .bind(as_of_week)
            .bind(m.weeks_on_chart)
            .bind(m.first_seen_week)
            .bind(m.last_seen_week)
            .bind(m.age_weeks)
            .bind(m.presence_ratio)
            .bind(m.current_streak_weeks)
            .bind(m.max_streak_weeks)
            .bind(m.last_streak_weeks)
            .bind(m.reentry_count)
            .bind(m.segments_count)
            .bind(m.best_rank)
            .bind(m.best_rank_week)
            .bind(m.avg_rank)
            .bind(m.rank_stddev)
            .bind(m.top10_weeks)
            .bind(m.top25_weeks)
            .bind(m.last_rank)
            .bind(m.prev_rank)
            .bind(m.wow_delta)
            .bind(m.momentum_4w)
            .bind(m.volatility_4w)
            .bind(m.durability_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Every chart with metrics and its latest as-of week, ordered by name
    pub async fn latest_metrics_weeks(&self) -> Result<Vec<ChartMetricsWeek>> {
        let rows = sqlx::query_as::<_, ChartMetricsWeek>(
            r#"
            SELECT c.id AS chart_id, c.name AS chart_name, MAX(dm.as_of_week) AS as_of_week
            FROM charts c
            JOIN durability_metrics dm ON dm.chart_id = c.id
            GROUP BY c.id, c.name
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether a chart has metrics for an as-of week
    pub async fn has_metrics(&self, chart_id: &str, as_of_week: NaiveDate) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM durability_metrics WHERE chart_id = ? AND as_of_week = ? LIMIT 1",
        )
        .bind(chart_id)
        .bind(as_of_week)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// A chart's metric rows for one week, best durability first
    pub async fn chart_metrics(
        &self,
        chart_id: &str,
        as_of_week: NaiveDate,
    ) -> Result<Vec<ChartMetric>> {
        let rows = sqlx::query_as::<_, ChartMetric>(
            r#"
            SELECT dm.*, t.title, t.url
            FROM durability_metrics dm
            JOIN tracks t ON t.id = dm.track_id
            WHERE dm.chart_id = ? AND dm.as_of_week = ?
            ORDER BY dm.durability_score DESC, dm.track_id
            "#,
        )
        .bind(chart_id)
        .bind(as_of_week)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct snapshot weeks of a chart up to `as_of`, failed ones included
    pub async fn weeks_observed(&self, chart_id: &str, as_of: NaiveDate) -> Result<u32> {
        let count: u32 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT snapshot_date) FROM chart_snapshots
            WHERE chart_id = ? AND snapshot_date <= ?
            "#,
        )
        .bind(chart_id)
        .bind(as_of)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ===== Status =====

    /// Latest snapshot of a chart, whatever its status
    pub async fn latest_snapshot(&self, chart_id: &str) -> Result<Option<SnapshotSummary>> {
        let summary = sqlx::query_as::<_, SnapshotSummary>(
            r#"
            SELECT cs.snapshot_date, cs.status, cs.error,
                   (SELECT COUNT(*) FROM chart_entries ce WHERE ce.snapshot_id = cs.id) AS entry_count
            FROM chart_snapshots cs
            WHERE cs.chart_id = ?
            ORDER BY cs.snapshot_date DESC
            LIMIT 1
            "#,
        )
        .bind(chart_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    /// Latest metrics week of a chart and its row count
    pub async fn latest_metrics(&self, chart_id: &str) -> Result<Option<MetricsSummary>> {
        let summary = sqlx::query_as::<_, MetricsSummary>(
            r#"
            SELECT as_of_week, COUNT(*) AS row_count
            FROM durability_metrics
            WHERE chart_id = ?
              AND as_of_week = (SELECT MAX(as_of_week) FROM durability_metrics WHERE chart_id = ?)
            GROUP BY as_of_week
            "#,
        )
        .bind(chart_id)
        .bind(chart_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }
}
