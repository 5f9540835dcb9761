//! Durability metrics
//!
//! Turns the weekly rank history of a track on one chart into streak,
//! presence, momentum and volatility figures plus a composite score in
//! `[0, 1]`.
//!
//! Weeks are indexed by their position among the chart's snapshot weeks, not
//! by calendar week: a week that was never ingested is not a gap, while a
//! failed snapshot is a week in which no track was seen.

mod aggregate;
mod classify;

pub use aggregate::*;
pub use classify::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap};

/// Rank domain assumed by the rank-quality component
const RANK_DOMAIN_MAX: f64 = 100.0;
/// Trailing observations used for momentum and volatility
const MOTION_WINDOW: usize = 4;

const WEIGHT_RANK_QUALITY: f64 = 0.35;
const WEIGHT_LONGEVITY: f64 = 0.25;
const WEIGHT_STREAK: f64 = 0.20;
const WEIGHT_PRESENCE: f64 = 0.10;
const WEIGHT_CHURN: f64 = 0.10;

/// One week a track was seen on a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Position of the week among the chart's observed weeks
    pub index: usize,
    pub week: NaiveDate,
    pub rank: u32,
}

/// Rank history of every track on one chart up to an as-of week
#[derive(Debug, Clone, Default)]
pub struct ChartHistory {
    /// Distinct observed weeks, ascending
    pub weeks: Vec<NaiveDate>,
    /// (week, track id, rank), ordered by week
    pub entries: Vec<(NaiveDate, String, u32)>,
}

impl ChartHistory {
    /// The chart's latest observed week
    pub fn as_of_week(&self) -> Option<NaiveDate> {
        self.weeks.last().copied()
    }

    /// Observations grouped by track, each list ascending by index
    pub fn observations(&self) -> BTreeMap<String, Vec<Observation>> {
        let week_index: HashMap<NaiveDate, usize> =
            self.weeks.iter().enumerate().map(|(i, w)| (*w, i)).collect();

        let mut tracks: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for (week, track_id, rank) in &self.entries {
            let Some(&index) = week_index.get(week) else {
                continue;
            };
            tracks.entry(track_id.clone()).or_default().push(Observation {
                index,
                week: *week,
                rank: *rank,
            });
        }
        for obs in tracks.values_mut() {
            obs.sort_by_key(|o| o.index);
        }
        tracks
    }

    /// Metrics for every track, as of the chart's latest observed week
    pub fn compute_metrics(&self) -> Vec<DurabilityMetric> {
        let Some(as_of_week) = self.as_of_week() else {
            return Vec::new();
        };
        let as_of_index = self.weeks.len() - 1;
        let weeks_observed = self.weeks.len();

        self.observations()
            .into_iter()
            .filter_map(|(track_id, obs)| {
                compute_metric(track_id, &obs, as_of_week, as_of_index, weeks_observed)
            })
            .collect()
    }
}

/// Durability metrics for one track on one chart as of one week
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DurabilityMetric {
    pub track_id: String,
    pub as_of_week: NaiveDate,
    pub weeks_on_chart: u32,
    pub first_seen_week: NaiveDate,
    pub last_seen_week: NaiveDate,
    pub age_weeks: u32,
    pub presence_ratio: f64,
    pub current_streak_weeks: u32,
    pub max_streak_weeks: u32,
    pub last_streak_weeks: u32,
    pub reentry_count: u32,
    pub segments_count: u32,
    pub best_rank: u32,
    pub best_rank_week: NaiveDate,
    pub avg_rank: f64,
    pub rank_stddev: f64,
    pub top10_weeks: u32,
    pub top25_weeks: u32,
    pub last_rank: Option<u32>,
    pub prev_rank: Option<u32>,
    /// Positive means the track moved up
    pub wow_delta: Option<i32>,
    pub momentum_4w: Option<f64>,
    pub volatility_4w: Option<f64>,
    pub durability_score: f64,
}

/// Contiguous runs of observation indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segments {
    pub count: u32,
    pub max_len: u32,
    pub last_len: u32,
}

/// Split ascending indices into maximal runs of consecutive values
pub fn segments(indices: &[usize]) -> Segments {
    let Some((&first, rest)) = indices.split_first() else {
        return Segments {
            count: 0,
            max_len: 0,
            last_len: 0,
        };
    };

    let mut seg = Segments {
        count: 1,
        max_len: 1,
        last_len: 1,
    };
    let mut prev = first;
    for &curr in rest {
        if curr == prev + 1 {
            seg.last_len += 1;
        } else {
            seg.count += 1;
            seg.last_len = 1;
        }
        seg.max_len = seg.max_len.max(seg.last_len);
        prev = curr;
    }
    seg
}

/// Population standard deviation; 0 for fewer than two values
pub fn pop_stddev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Rank movement over the trailing window, only for tracks on the as-of chart
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Motion {
    last_rank: Option<u32>,
    prev_rank: Option<u32>,
    wow_delta: Option<i32>,
    momentum: Option<f64>,
    volatility: Option<f64>,
}

fn motion(obs: &[Observation], as_of_week: NaiveDate) -> Motion {
    let Some(last) = obs.last() else {
        return Motion::default();
    };
    if last.week != as_of_week {
        return Motion::default();
    }

    let prev_rank = obs.len().checked_sub(2).map(|i| obs[i].rank);
    let window: Vec<f64> = obs[obs.len().saturating_sub(MOTION_WINDOW)..]
        .iter()
        .map(|o| o.rank as f64)
        .collect();

    let momentum = (window.len() >= 2)
        .then(|| (window[0] - window[window.len() - 1]) / (window.len() - 1) as f64);
    let volatility = (window.len() >= 3).then(|| {
        let deltas: Vec<f64> = window.windows(2).map(|w| w[0] - w[1]).collect();
        pop_stddev(&deltas)
    });

    Motion {
        last_rank: Some(last.rank),
        prev_rank,
        wow_delta: prev_rank.map(|p| p as i32 - last.rank as i32),
        momentum,
        volatility,
    }
}

/// Compute one track's metrics.
///
/// `observations` must be ascending by index; `as_of_index` is the index of
/// `as_of_week` and `weeks_observed` the chart's distinct week count.
/// Returns `None` for an empty history.
pub fn compute_metric(
    track_id: String,
    observations: &[Observation],
    as_of_week: NaiveDate,
    as_of_index: usize,
    weeks_observed: usize,
) -> Option<DurabilityMetric> {
    let first = observations.first()?;
    let last = observations.last()?;

    let weeks_on_chart = observations.len() as u32;
    let age_weeks = (as_of_index.saturating_sub(first.index) + 1) as u32;
    let presence_ratio = weeks_on_chart as f64 / age_weeks as f64;

    let indices: Vec<usize> = observations.iter().map(|o| o.index).collect();
    let seg = segments(&indices);
    let reentry_count = seg.count.saturating_sub(1);
    let current_streak_weeks = if last.week == as_of_week {
        seg.last_len
    } else {
        0
    };

    let best = observations.iter().min_by_key(|o| o.rank)?;
    let ranks: Vec<f64> = observations.iter().map(|o| o.rank as f64).collect();
    let avg_rank = ranks.iter().sum::<f64>() / ranks.len() as f64;
    let rank_stddev = pop_stddev(&ranks);
    let top10_weeks = observations.iter().filter(|o| o.rank <= 10).count() as u32;
    let top25_weeks = observations.iter().filter(|o| o.rank <= 25).count() as u32;

    let motion = motion(observations, as_of_week);

    let n = weeks_observed as f64;
    let rank_quality = clamp01(1.0 - (avg_rank - 1.0) / (RANK_DOMAIN_MAX - 1.0));
    let longevity = if weeks_observed > 0 {
        clamp01((weeks_on_chart as f64).ln_1p() / n.ln_1p())
    } else {
        0.0
    };
    let streak = if weeks_observed > 0 {
        clamp01(seg.max_len as f64 / n)
    } else {
        0.0
    };
    let presence = clamp01(presence_ratio);
    let churn = clamp01(1.0 / (1.0 + reentry_count as f64));

    let durability_score = WEIGHT_RANK_QUALITY * rank_quality
        + WEIGHT_LONGEVITY * longevity
        + WEIGHT_STREAK * streak
        + WEIGHT_PRESENCE * presence
        + WEIGHT_CHURN * churn;

    Some(DurabilityMetric {
        track_id,
        as_of_week,
        weeks_on_chart,
        first_seen_week: first.week,
        last_seen_week: last.week,
        age_weeks,
        presence_ratio,
        current_streak_weeks,
        max_streak_weeks: seg.max_len,
        last_streak_weeks: seg.last_len,
        reentry_count,
        segments_count: seg.count,
        best_rank: best.rank,
        best_rank_week: best.week,
        avg_rank,
        rank_stddev,
        top10_weeks,
        top25_weeks,
        last_rank: motion.last_rank,
        prev_rank: motion.prev_rank,
        wow_delta: motion.wow_delta,
        momentum_4w: motion.momentum,
        volatility_4w: motion.volatility,
        durability_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::weeks(i as i64)
    }

    fn obs(indices: &[usize], ranks: &[u32]) -> Vec<Observation> {
        indices
            .iter()
            .zip(ranks)
            .map(|(&index, &rank)| Observation {
                index,
                week: week(index),
                rank,
            })
            .collect()
    }

    fn metric(indices: &[usize], ranks: &[u32], as_of: usize, n: usize) -> DurabilityMetric {
        compute_metric("t".to_string(), &obs(indices, ranks), week(as_of), as_of, n).unwrap()
    }

    #[test]
    fn test_segments_counts_runs() {
        let cases: [(&[usize], u32, u32, u32); 5] = [
            (&[], 0, 0, 0),
            (&[3], 1, 1, 1),
            (&[0, 1, 2], 1, 3, 3),
            (&[0, 1, 2, 4, 5], 2, 3, 2),
            (&[0, 2, 4, 5, 6, 7, 9], 4, 4, 1),
        ];
        for (indices, count, max_len, last_len) in cases {
            let seg = segments(indices);
            assert_eq!(seg.count, count, "{:?}", indices);
            assert_eq!(seg.max_len, max_len, "{:?}", indices);
            assert_eq!(seg.last_len, last_len, "{:?}", indices);
        }
    }

    #[test]
    fn test_reentry_is_segments_minus_one() {
        let m = metric(&[0, 2, 4, 6], &[10, 10, 10, 10], 6, 7);
        assert_eq!(m.segments_count, 4);
        assert_eq!(m.reentry_count, 3);
    }

    #[test]
    fn test_reference_scenario() {
        let m = metric(&[0, 1, 2, 4, 5], &[50, 40, 30, 20, 15], 5, 6);

        assert_eq!(m.weeks_on_chart, 5);
        assert_eq!(m.age_weeks, 6);
        assert!((m.presence_ratio - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(m.segments_count, 2);
        assert_eq!(m.max_streak_weeks, 3);
        assert_eq!(m.current_streak_weeks, 2);
        assert_eq!(m.reentry_count, 1);
        assert_eq!(m.best_rank, 15);
        assert_eq!(m.best_rank_week, week(5));
        assert!((m.avg_rank - 31.0).abs() < 1e-9);
        assert_eq!(m.top10_weeks, 0);
        assert_eq!(m.top25_weeks, 2);
        assert_eq!(m.last_rank, Some(15));
        assert_eq!(m.prev_rank, Some(20));
        assert_eq!(m.wow_delta, Some(5));
        assert!((m.momentum_4w.unwrap() - 25.0 / 3.0).abs() < 1e-9);
        // deltas 10, 10, 5
        let expected = pop_stddev(&[10.0, 10.0, 5.0]);
        assert!((m.volatility_4w.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_off_chart_at_as_of_week_has_no_motion() {
        let m = metric(&[0, 1, 2], &[5, 4, 3], 4, 5);
        assert_eq!(m.current_streak_weeks, 0);
        assert_eq!(m.last_rank, None);
        assert_eq!(m.prev_rank, None);
        assert_eq!(m.wow_delta, None);
        assert_eq!(m.momentum_4w, None);
        assert_eq!(m.volatility_4w, None);
        assert_eq!(m.age_weeks, 5);
    }

    #[test]
    fn test_volatility_needs_three_points() {
        let m = metric(&[0, 1], &[20, 10], 1, 2);
        assert_eq!(m.momentum_4w, Some(10.0));
        assert_eq!(m.volatility_4w, None);

        let m = metric(&[0], &[20], 0, 1);
        assert_eq!(m.momentum_4w, None);
        assert_eq!(m.prev_rank, None);
        assert_eq!(m.wow_delta, None);
        assert_eq!(m.last_rank, Some(20));
    }

    #[test]
    fn test_volatility_uses_trailing_window_only() {
        // Early wild swings fall outside the last four observations
        let m = metric(&[0, 1, 2, 3, 4, 5], &[1, 100, 10, 12, 14, 16], 5, 6);
        assert_eq!(m.volatility_4w, Some(0.0));
        assert_eq!(m.momentum_4w, Some(-2.0));
        assert_eq!(m.wow_delta, Some(-2));
    }

    #[test]
    fn test_best_rank_week_is_first_occurrence() {
        let m = metric(&[0, 1, 2], &[7, 3, 3], 2, 3);
        assert_eq!(m.best_rank, 3);
        assert_eq!(m.best_rank_week, week(1));
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let histories: [(&[usize], &[u32], usize, usize); 5] = [
            (&[0], &[1], 0, 1),
            (&[0], &[100], 0, 1),
            (&[0, 1, 2, 3], &[1, 1, 1, 1], 3, 4),
            (&[0, 3, 9], &[250, 300, 400], 20, 21),
            (&[5], &[50], 5, 6),
        ];
        for (indices, ranks, as_of, n) in histories {
            let m = metric(indices, ranks, as_of, n);
            assert!(
                (0.0..=1.0).contains(&m.durability_score),
                "score {} out of range for {:?}",
                m.durability_score,
                indices
            );
        }

        // Every component saturated
        let m = metric(&[0, 1, 2, 3], &[1, 1, 1, 1], 3, 4);
        assert!((m.durability_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_indexes_observed_weeks_only() {
        // Calendar weeks 0, 1 and 5 were ingested; the skipped weeks are not gaps
        let history = ChartHistory {
            weeks: vec![week(0), week(1), week(5)],
            entries: vec![
                (week(0), "a".to_string(), 3),
                (week(1), "a".to_string(), 2),
                (week(5), "a".to_string(), 1),
                (week(5), "b".to_string(), 9),
            ],
        };

        let metrics = history.compute_metrics();
        assert_eq!(metrics.len(), 2);
        let a = metrics.iter().find(|m| m.track_id == "a").unwrap();
        assert_eq!(a.segments_count, 1);
        assert_eq!(a.current_streak_weeks, 3);
        assert_eq!(a.as_of_week, week(5));
        let b = metrics.iter().find(|m| m.track_id == "b").unwrap();
        assert_eq!(b.age_weeks, 1);
        assert_eq!(b.weeks_on_chart, 1);
    }

    #[test]
    fn test_empty_history_has_no_metrics() {
        assert!(ChartHistory::default().compute_metrics().is_empty());
        assert!(compute_metric("t".to_string(), &[], week(0), 0, 1).is_none());
    }
}
