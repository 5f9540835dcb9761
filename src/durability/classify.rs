//! Rule-based labels for a single chart/week metric row

use super::DurabilityMetric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Behaviour label for a track on a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Long, stable presence with a high score
    Anchor,
    /// Short, high-placing and erratic
    Spike,
    /// New and moving up
    Climber,
    /// Long-running and sliding down
    Fader,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Anchor => "Anchor",
            Bucket::Spike => "Spike",
            Bucket::Climber => "Climber",
            Bucket::Fader => "Fader",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// A missing optional value never satisfies a comparison.
fn at_most(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v <= bound)
}

fn at_least(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v >= bound)
}

/// Label a metric row; first matching rule wins
pub fn bucket_row(m: &DurabilityMetric) -> Option<Bucket> {
    let wow = m.wow_delta.map(f64::from);

    if m.durability_score >= 0.70
        && m.max_streak_weeks >= 4
        && (at_most(m.volatility_4w, 1.0) || m.rank_stddev <= 10.0)
    {
        return Some(Bucket::Anchor);
    }

    if m.weeks_on_chart <= 2
        && m.best_rank <= 15
        && (at_least(m.volatility_4w, 4.0) || m.rank_stddev >= 20.0)
    {
        return Some(Bucket::Spike);
    }

    if m.age_weeks <= 3
        && (at_least(m.momentum_4w, 2.0) || at_least(wow, 3.0))
        && m.last_rank.is_some()
    {
        return Some(Bucket::Climber);
    }

    if m.weeks_on_chart >= 8 && (at_most(wow, -3.0) || m.momentum_4w.is_some_and(|v| v < 0.0)) {
        return Some(Bucket::Fader);
    }

    None
}
