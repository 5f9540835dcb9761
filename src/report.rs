//! Report data and HTML rendering

use crate::durability::{aggregate, AggregateRow, Bucket, ChartMetric};
use crate::error::Result;
use crate::store::ChartDb;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::warn;

/// A chart metric row with its classifier label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledRow {
    #[serde(flatten)]
    pub row: ChartMetric,
    pub label: Option<Bucket>,
}

/// One chart's section of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartReport {
    pub chart_id: String,
    pub chart_name: String,
    pub as_of_week: NaiveDate,
    pub weeks_observed: u32,
    /// Best durability first
    pub rows: Vec<LabeledRow>,
}

/// Everything the report shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub charts: Vec<ChartReport>,
    pub leaderboard: Vec<AggregateRow>,
}

impl ReportData {
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}

/// Collect report data.
///
/// With `as_of_week`, charts lacking metrics for that week are skipped;
/// otherwise each chart contributes its latest metrics week.
pub async fn build_report(db: &ChartDb, as_of_week: Option<NaiveDate>) -> Result<ReportData> {
    let mut charts = Vec::new();

    for chart in db.latest_metrics_weeks().await? {
        let week = match as_of_week {
            Some(week) => {
                if !db.has_metrics(&chart.chart_id, week).await? {
                    warn!(
                        "No durability metrics for chart {} at {}; skipping",
                        chart.chart_id, week
                    );
                    continue;
                }
                week
            }
            None => chart.as_of_week,
        };

        let rows = db.chart_metrics(&chart.chart_id, week).await?;
        if rows.is_empty() {
            continue;
        }
        let weeks_observed = db.weeks_observed(&chart.chart_id, week).await?;

        charts.push(ChartReport {
            chart_id: chart.chart_id,
            chart_name: chart.chart_name,
            as_of_week: week,
            weeks_observed,
            rows: rows
                .into_iter()
                .map(|row| {
                    let label = row.label();
                    LabeledRow { row, label }
                })
                .collect(),
        });
    }

    let all_rows: Vec<ChartMetric> = charts
        .iter()
        .flat_map(|c| c.rows.iter().map(|r| r.row.clone()))
        .collect();

    Ok(ReportData {
        generated_at: Utc::now(),
        leaderboard: aggregate(&all_rows),
        charts,
    })
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; margin: 2rem; color: #1d1d1f; }
h1 { margin-bottom: 0.2rem; }
.meta { color: #6e6e73; margin-top: 0; }
table { border-collapse: collapse; width: 100%; margin-bottom: 2.5rem; font-size: 0.9rem; }
th, td { padding: 0.35rem 0.6rem; border-bottom: 1px solid #e5e5ea; text-align: right; }
th:nth-child(2), td:nth-child(2) { text-align: left; }
th { background: #f5f5f7; }
.label { font-size: 0.75rem; padding: 0.1rem 0.45rem; border-radius: 0.6rem; background: #e5e5ea; }
.label-anchor { background: #d1f2dc; }
.label-spike { background: #fde2cf; }
.label-climber { background: #dbe9ff; }
.label-fader { background: #f2d6d6; }
"#;

fn label_cell(label: Option<Bucket>) -> String {
    match label {
        Some(b) => format!(
            r#"<span class="label label-{}">{}</span>"#,
            b.as_str().to_lowercase(),
            b
        ),
        None => String::new(),
    }
}

fn track_cell(title: &str, url: Option<&str>) -> String {
    match url {
        Some(url) => format!(
            r#"<a href="{}">{}</a>"#,
            escape_html(url),
            escape_html(title)
        ),
        None => escape_html(title),
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "–".to_string())
}

fn signed(value: Option<i32>) -> String {
    match value {
        Some(v) if v > 0 => format!("+{}", v),
        other => opt(other),
    }
}

fn render_leaderboard(out: &mut String, rows: &[AggregateRow]) {
    out.push_str("<h2>Cross-chart leaderboard</h2>\n");
    if rows.is_empty() {
        out.push_str("<p class=\"meta\">No track appears on more than one chart.</p>\n");
        return;
    }

    out.push_str(
        "<table>\n<tr><th>#</th><th>Track</th><th>Label</th><th>Charts</th>\
         <th>Avg durability</th><th>Multiplier</th><th>Score</th></tr>\n",
    );
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td><td>{:.2}</td><td>{:.3}</td></tr>",
            i + 1,
            track_cell(&row.title, row.url.as_deref()),
            label_cell(row.label),
            escape_html(&row.charts.join(", ")),
            row.avg_durability,
            row.multiplier,
            row.aggregate_score,
        );
    }
    out.push_str("</table>\n");
}

fn render_chart(out: &mut String, chart: &ChartReport) {
    let _ = writeln!(
        out,
        "<h2>{}</h2>\n<p class=\"meta\">As of {} · {} weeks observed</p>",
        escape_html(&chart.chart_name),
        chart.as_of_week,
        chart.weeks_observed
    );
    out.push_str(
        "<table>\n<tr><th>#</th><th>Track</th><th>Label</th><th>Durability</th><th>Weeks</th>\
         <th>Streak</th><th>Max streak</th><th>Re-entries</th><th>Best</th><th>Avg</th>\
         <th>Last</th><th>WoW</th><th>Top 10</th><th>Top 25</th></tr>\n",
    );
    for (i, labeled) in chart.rows.iter().enumerate() {
        let r = &labeled.row;
        let m = &r.metric;
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            i + 1,
            track_cell(&r.title, r.url.as_deref()),
            label_cell(labeled.label),
            m.durability_score,
            m.weeks_on_chart,
            m.current_streak_weeks,
            m.max_streak_weeks,
            m.reentry_count,
            m.best_rank,
            m.avg_rank,
            opt(m.last_rank),
            signed(m.wow_delta),
            m.top10_weeks,
            m.top25_weeks,
        );
    }
    out.push_str("</table>\n");
}

/// Render a self-contained HTML page
pub fn render_html(data: &ReportData) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Chart Continuity</title>\n<style>");
    out.push_str(STYLE);
    out.push_str("</style>\n</head>\n<body>\n<h1>Chart Continuity</h1>\n");
    let _ = writeln!(
        out,
        "<p class=\"meta\">Generated {}</p>",
        data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if data.is_empty() {
        out.push_str("<p>No durability metrics available yet.</p>\n");
    } else {
        render_leaderboard(&mut out, &data.leaderboard);
        for chart in &data.charts {
            render_chart(&mut out, chart);
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::DurabilityMetric;

    fn metric_row(chart: &str, track: &str, title: &str, score: f64) -> ChartMetric {
        let week = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        ChartMetric {
            chart_id: chart.to_string(),
            title: title.to_string(),
            url: Some(format!("https://www.beatport.com/track/x/{}?a=1&b=2", track)),
            metric: DurabilityMetric {
                track_id: track.to_string(),
                as_of_week: week,
                weeks_on_chart: 6,
                first_seen_week: week,
                last_seen_week: week,
                age_weeks: 6,
                presence_ratio: 1.0,
                current_streak_weeks: 6,
                max_streak_weeks: 6,
                last_streak_weeks: 6,
                reentry_count: 0,
                segments_count: 1,
                best_rank: 2,
                best_rank_week: week,
                avg_rank: 4.5,
                rank_stddev: 1.2,
                top10_weeks: 6,
                top25_weeks: 6,
                last_rank: Some(3),
                prev_rank: Some(5),
                wow_delta: Some(2),
                momentum_4w: Some(0.5),
                volatility_4w: Some(0.8),
                durability_score: score,
            },
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_render_escapes_titles_and_links() {
        let row = metric_row("house", "1", "<script>alert(1)</script>", 0.9);
        let data = ReportData {
            generated_at: Utc::now(),
            charts: vec![ChartReport {
                chart_id: "house".to_string(),
                chart_name: "House & Garage".to_string(),
                as_of_week: row.metric.as_of_week,
                weeks_observed: 6,
                rows: vec![LabeledRow {
                    label: row.label(),
                    row,
                }],
            }],
            leaderboard: Vec::new(),
        };

        let html = render_html(&data);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("House &amp; Garage"));
        assert!(html.contains("?a=1&amp;b=2"));
        assert!(html.contains("label-anchor"));
        assert!(html.contains("+2"));
    }

    #[test]
    fn test_render_empty_report() {
        let data = ReportData {
            generated_at: Utc::now(),
            charts: Vec::new(),
            leaderboard: Vec::new(),
        };
        assert!(render_html(&data).contains("No durability metrics available yet."));
    }

    #[test]
    fn test_render_leaderboard() {
        let rows = vec![
            metric_row("a", "1", "Shared", 0.8),
            metric_row("b", "1", "Shared", 0.6),
        ];
        let board = aggregate(&rows);
        let data = ReportData {
            generated_at: Utc::now(),
            charts: vec![ChartReport {
                chart_id: "a".to_string(),
                chart_name: "A".to_string(),
                as_of_week: rows[0].metric.as_of_week,
                weeks_observed: 6,
                rows: Vec::new(),
            }],
            leaderboard: board,
        };

        let html = render_html(&data);
        assert!(html.contains("Cross-chart leaderboard"));
        assert!(html.contains("<td>0.805</td>"));
        assert!(html.contains("<td>a, b</td>"));
    }
}
