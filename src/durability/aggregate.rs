//! Cross-chart leaderboard

use super::{bucket_row, Bucket, DurabilityMetric};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

const MULTIPLIER_STEP: f64 = 0.15;
const MULTIPLIER_CAP: f64 = 1.60;
const MIN_CHARTS: usize = 2;

/// A metric row together with the chart and track it belongs to
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChartMetric {
    pub chart_id: String,
    pub title: String,
    pub url: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metric: DurabilityMetric,
}

impl ChartMetric {
    pub fn label(&self) -> Option<Bucket> {
        bucket_row(&self.metric)
    }
}

/// One track on the cross-chart leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub track_id: String,
    pub title: String,
    pub url: Option<String>,
    pub charts: Vec<String>,
    pub chart_count: usize,
    pub avg_durability: f64,
    pub multiplier: f64,
    pub aggregate_score: f64,
    /// Chart holding the track's highest durability score
    pub best_chart_id: String,
    pub label: Option<Bucket>,
}

/// Breadth bonus for appearing on several charts
pub fn chart_multiplier(chart_count: usize) -> f64 {
    (1.0 + MULTIPLIER_STEP * chart_count.saturating_sub(1) as f64).min(MULTIPLIER_CAP)
}

/// Group rows by track and rank tracks present on at least two charts.
///
/// Each chart is expected to contribute rows for a single as-of week.
pub fn aggregate(rows: &[ChartMetric]) -> Vec<AggregateRow> {
    let mut by_track: HashMap<&str, Vec<&ChartMetric>> = HashMap::new();
    for row in rows {
        by_track.entry(&row.metric.track_id).or_default().push(row);
    }

    let mut out: Vec<AggregateRow> = by_track
        .into_values()
        .filter(|group| group.len() >= MIN_CHARTS)
        .filter_map(|group| {
            let best = group.iter().copied().max_by(|a, b| {
                a.metric
                    .durability_score
                    .total_cmp(&b.metric.durability_score)
                    // Earlier rows win ties
                    .then(std::cmp::Ordering::Greater)
            })?;

            let chart_count = group.len();
            let avg_durability = group
                .iter()
                .map(|r| r.metric.durability_score)
                .sum::<f64>()
                / chart_count as f64;
            let multiplier = chart_multiplier(chart_count);

            let mut charts: Vec<String> = group.iter().map(|r| r.chart_id.clone()).collect();
            charts.sort();

            Some(AggregateRow {
                track_id: best.metric.track_id.clone(),
                title: best.title.clone(),
                url: best.url.clone(),
                charts,
                chart_count,
                avg_durability,
                multiplier,
                aggregate_score: avg_durability * multiplier,
                best_chart_id: best.chart_id.clone(),
                label: best.label(),
            })
        })
        .collect();

    out.sort_by(|a, b| {
        b.aggregate_score
            .total_cmp(&a.aggregate_score)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    out
}
