//! DOM fallbacks for pages without usable embedded data

use super::{link_title, selector, track_id_from_href, ExtractOptions, ParsedEntry};
use scraper::Html;
use std::collections::HashSet;

const TRACK_LINK: &str = "a[href*='/track/']";

fn entry(track_id: String, title: Option<String>, url: String, rank: u32) -> ParsedEntry {
    ParsedEntry {
        title: title.unwrap_or_else(|| format!("track-{}", track_id)),
        track_id,
        url,
        mix_name: None,
        artists: Vec::new(),
        remixers: Vec::new(),
        rank,
    }
}

/// Elements carrying explicit analytics position and name attributes.
///
/// Source order is not reliable here, so results are sorted by position.
pub fn extract_from_analytics_attributes(
    document: &Html,
    options: &ExtractOptions,
) -> Vec<ParsedEntry> {
    let (Some(nodes), Some(link_sel)) = (
        selector("[data-ec-position][data-ec-name]"),
        selector(TRACK_LINK),
    ) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for node in document.select(&nodes) {
        let Some(link) = node.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(track_id) = track_id_from_href(href) else {
            continue;
        };
        let position = node.value().attr("data-ec-position").unwrap_or("").trim();
        let Ok(rank) = position.parse::<u32>() else {
            continue;
        };

        let title = node
            .value()
            .attr("data-ec-name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| link_title(&link));

        entries.push(entry(track_id, title, options.resolve(href), rank));
    }

    entries.sort_by_key(|e| e.rank);

    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert(e.track_id.clone()));
    entries.truncate(options.limit);
    entries
}

/// Track links in document order, ranked by first appearance.
///
/// Links inside `<main>` are preferred to skip navigation and footers.
pub fn extract_from_link_order(document: &Html, options: &ExtractOptions) -> Vec<ParsedEntry> {
    let (Some(in_main), Some(anywhere)) =
        (selector(&format!("main {}", TRACK_LINK)), selector(TRACK_LINK))
    else {
        return Vec::new();
    };

    let mut links: Vec<_> = document.select(&in_main).collect();
    if links.is_empty() {
        links = document.select(&anywhere).collect();
    }

    let mut out: Vec<ParsedEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for link in links {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(track_id) = track_id_from_href(href) else {
            continue;
        };
        if !seen.insert(track_id.clone()) {
            continue;
        }

        let rank = out.len() as u32 + 1;
        out.push(entry(track_id, link_title(&link), options.resolve(href), rank));

        if out.len() >= options.limit {
            break;
        }
    }

    out
}
