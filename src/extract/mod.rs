//! Chart page extraction
//!
//! Recovers an ordered list of ranked tracks from a chart page using a
//! cascade of strategies, most complete first:
//! - Embedded Next.js data (`__NEXT_DATA__`), full track fields
//! - Analytics-annotated DOM elements with explicit positions
//! - Track links in document order
//!
//! A hype page for a genre that has no hype chart yields
//! [`Extraction::Unsupported`], which is not an error. Every other page that
//! yields nothing is a parse failure.

mod dom;
mod next_data;

pub use dom::*;
pub use next_data::*;

use crate::config::Config;
use crate::error::{Error, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

/// Marker present in hype chart pages
const HYPE_MARKER: &str = "hype=true";

/// A ranked track recovered from a chart page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub track_id: String,
    pub title: String,
    pub url: String,
    pub mix_name: Option<String>,
    pub artists: Vec<String>,
    pub remixers: Vec<String>,
    pub rank: u32,
}

/// Which extraction strategy produced the entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NextData,
    AnalyticsAttributes,
    LinkOrder,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::NextData => write!(f, "next_data"),
            Strategy::AnalyticsAttributes => write!(f, "analytics_attributes"),
            Strategy::LinkOrder => write!(f, "link_order"),
        }
    }
}

/// Outcome of a successful extraction
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Entries in rank order
    Ranked {
        strategy: Strategy,
        entries: Vec<ParsedEntry>,
    },
    /// The page explicitly says this chart variant does not exist for the genre
    Unsupported,
}

/// Extraction parameters
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum number of entries to return
    pub limit: usize,
    /// Base used to resolve relative track links
    pub base_url: Url,
}

impl ExtractOptions {
    pub fn new(limit: usize, base_url: &str) -> Result<Self> {
        Ok(Self {
            limit,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.ingest.expected_entries, &config.site_base_url)
    }

    /// Resolve a (possibly relative) link to an absolute URL
    pub(crate) fn resolve(&self, href: &str) -> String {
        self.base_url
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Parse a chart page into ranked entries
pub fn extract_chart(payload: &str, options: &ExtractOptions) -> Result<Extraction> {
    let document = Html::parse_document(payload);
    let next_data = find_next_data(&document);

    if payload.contains(HYPE_MARKER) {
        if let Some(data) = &next_data {
            if genre_supports_hype(data) == Some(false) {
                debug!("Hype chart not available for this genre");
                return Ok(Extraction::Unsupported);
            }
        }
    }

    if let Some(data) = &next_data {
        let entries = extract_from_next_data(data, options);
        if !entries.is_empty() {
            return Ok(ranked(Strategy::NextData, entries));
        }
        debug!("__NEXT_DATA__ present but no track list found");
    }

    let entries = extract_from_analytics_attributes(&document, options);
    if !entries.is_empty() {
        return Ok(ranked(Strategy::AnalyticsAttributes, entries));
    }

    let entries = extract_from_link_order(&document, options);
    if !entries.is_empty() {
        return Ok(ranked(Strategy::LinkOrder, entries));
    }

    Err(Error::Parse(
        "No valid chart entries could be parsed from page".to_string(),
    ))
}

fn ranked(strategy: Strategy, entries: Vec<ParsedEntry>) -> Extraction {
    debug!(%strategy, count = entries.len(), "Extracted chart entries");
    Extraction::Ranked { strategy, entries }
}

fn track_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/track/[^/]+/(\d+)").expect("track id pattern is valid"))
}

/// Canonical track id from a track link (`/track/<slug>/<digits>`)
pub fn track_id_from_href(href: &str) -> Option<String> {
    track_id_pattern()
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Visible link text, falling back to descriptive attributes
pub(crate) fn link_title(link: &ElementRef<'_>) -> Option<String> {
    let text = link.text().collect::<String>();
    let text = text.trim();
    if !text.is_empty() {
        return Some(text.to_string());
    }
    ["title", "aria-label"].iter().find_map(|attr| {
        link.value()
            .attr(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn options() -> ExtractOptions {
        ExtractOptions::new(100, "https://www.beatport.com").unwrap()
    }

    fn track(id: u64) -> Value {
        json!({
            "id": id,
            "name": format!("Track {}", id),
            "slug": format!("track-{}", id),
            "bpm": 124,
            "mix_name": "Extended Mix",
            "artists": [{"name": "Artist A"}, {"name": "Artist B"}],
            "remixers": [],
        })
    }

    fn page_with_next_data(data: &Value) -> String {
        format!(
            r#"<html><head></head><body><main></main>
            <script id="__NEXT_DATA__" type="application/json">{}</script>
            </body></html>"#,
            data
        )
    }

    #[test]
    fn test_track_id_from_href() {
        assert_eq!(
            track_id_from_href("/track/edge-of-the-night/12345678"),
            Some("12345678".to_string())
        );
        assert_eq!(
            track_id_from_href("https://www.beatport.com/track/x/42?foo=bar"),
            Some("42".to_string())
        );
        assert_eq!(track_id_from_href("/release/x/42"), None);
        assert_eq!(track_id_from_href("/track/no-id/abc"), None);
    }

    #[test]
    fn test_next_data_sixty_tracks_ranked_in_order() {
        let tracks: Vec<Value> = (1..=60).map(track).collect();
        let data = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [
                {"state": {"data": {"results": tracks}}}
            ]}}}
        });

        let result = extract_chart(&page_with_next_data(&data), &options()).unwrap();
        let Extraction::Ranked { strategy, entries } = result else {
            panic!("expected ranked entries");
        };
        assert_eq!(strategy, Strategy::NextData);
        assert_eq!(entries.len(), 60);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.rank as usize, i + 1);
            assert_eq!(entry.track_id, (i + 1).to_string());
        }
        assert_eq!(
            entries[0].url,
            "https://www.beatport.com/track/track-1/1".to_string()
        );
        assert_eq!(entries[0].mix_name.as_deref(), Some("Extended Mix"));
        assert_eq!(entries[0].artists, vec!["Artist A", "Artist B"]);
    }

    #[test]
    fn test_unsupported_hype_genre_is_empty_not_error() {
        let data = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [
                {"state": {"data": {"name": "Minimal", "is_included_in_hype": false}}}
            ]}}}
        });
        let html = format!(
            r#"<a href="/genre/minimal/14/hype-100?hype=true">Hype</a>{}"#,
            page_with_next_data(&data)
        );

        let result = extract_chart(&html, &options()).unwrap();
        assert_eq!(result, Extraction::Unsupported);
    }

    #[test]
    fn test_hype_flag_ignored_without_hype_marker() {
        let data = json!({
            "props": {"pageProps": {"dehydratedState": {"queries": [
                {"state": {"data": {"is_included_in_hype": false}}}
            ]}}}
        });

        let result = extract_chart(&page_with_next_data(&data), &options());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_falls_back_to_analytics_attributes() {
        let html = r#"
        <html><body>
            <div data-ec-position="2" data-ec-name="Second">
                <a href="/track/second/200">Second</a>
            </div>
            <div data-ec-position="1" data-ec-name="First">
                <a href="/track/first/100">First</a>
            </div>
            <div data-ec-position="x" data-ec-name="Broken">
                <a href="/track/broken/300">Broken</a>
            </div>
        </body></html>
        "#;

        let result = extract_chart(html, &options()).unwrap();
        let Extraction::Ranked { strategy, entries } = result else {
            panic!("expected ranked entries");
        };
        assert_eq!(strategy, Strategy::AnalyticsAttributes);
        let ids: Vec<&str> = entries.iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids, vec!["100", "200"]);
        assert_eq!(entries[0].title, "First");
    }

    #[test]
    fn test_falls_back_to_link_order() {
        let html = r#"
        <html><body>
            <nav><a href="/track/nav/999">Nav</a></nav>
            <main>
                <a href="/track/a/1">A</a>
                <a href="/track/a/1">A again</a>
                <a href="/track/b/2" title="B title"></a>
            </main>
        </body></html>
        "#;

        let result = extract_chart(html, &options()).unwrap();
        let Extraction::Ranked { strategy, entries } = result else {
            panic!("expected ranked entries");
        };
        assert_eq!(strategy, Strategy::LinkOrder);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "B title");
        assert_eq!(entries[1].rank, 2);
    }

    #[test]
    fn test_no_strategy_is_parse_failure() {
        let html = "<html><body><p>Nothing to see</p></body></html>";
        assert!(matches!(
            extract_chart(html, &options()),
            Err(Error::Parse(_))
        ));
    }
}
