//! Extraction from the embedded Next.js data block
//!
//! The page state is an arbitrary JSON tree. The track list is found by
//! scoring every array in the tree on how many of its elements look like
//! track objects.

use super::{selector, track_id_from_href, ExtractOptions, ParsedEntry};
use scraper::Html;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Arrays shorter than this are never chart lists
const MIN_LIST_LEN: usize = 20;
/// Elements scored per array
const MAX_SCORED_ELEMENTS: usize = 250;
/// Minimum track-like elements for a candidate
const MIN_TRACK_LIKE: usize = 20;
/// Minimum share of track-like elements for a candidate
const MIN_DENSITY: f64 = 0.50;
/// A candidate this strong ends the scan
const GOOD_ENOUGH: usize = 50;

/// Keys commonly present on track objects; two are required
const SUPPORTING_KEYS: [&str; 8] = [
    "slug",
    "bpm",
    "genre",
    "image",
    "artists",
    "release_date",
    "encoded_date",
    "current_status",
];

const LINK_KEYS: [&str; 5] = ["url", "href", "path", "canonicalUrl", "canonical_url"];
const MIX_KEYS: [&str; 3] = ["mix", "mix_name", "mixName"];

/// Parse the `__NEXT_DATA__` script block, if present and valid JSON
pub fn find_next_data(document: &Html) -> Option<Value> {
    let sel = selector("script#__NEXT_DATA__")?;
    let script = document.select(&sel).next()?;
    let raw: String = script.text().collect();
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Invalid __NEXT_DATA__ JSON: {}", e);
            None
        }
    }
}

/// Read the genre's hype flag from the dehydrated query states.
///
/// `Some(false)` means the genre explicitly has no hype chart; `None` means
/// the flag is absent.
pub fn genre_supports_hype(next_data: &Value) -> Option<bool> {
    let queries = next_data
        .pointer("/props/pageProps/dehydratedState/queries")?
        .as_array()?;

    queries.iter().find_map(|query| {
        query
            .pointer("/state/data")
            .and_then(Value::as_object)
            .and_then(|data| data.get("is_included_in_hype"))
            .map(truthy)
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Best track list found so far
struct Candidate<'a> {
    items: &'a [Value],
    track_like: usize,
}

/// Score an array; `None` if it cannot be a chart list
fn score_list(items: &[Value]) -> Option<usize> {
    if items.len() < MIN_LIST_LEN {
        return None;
    }
    let track_like = items
        .iter()
        .take(MAX_SCORED_ELEMENTS)
        .filter(|v| is_track_like(v))
        .count();
    if track_like < MIN_TRACK_LIKE {
        return None;
    }
    let density = track_like as f64 / items.len() as f64;
    (density >= MIN_DENSITY).then_some(track_like)
}

/// Walk every array in the tree, keeping the strongest candidate
fn scan<'a>(node: &'a Value, best: &mut Option<Candidate<'a>>) {
    match node {
        Value::Array(items) => {
            if let Some(track_like) = score_list(items) {
                let better = match best {
                    None => true,
                    Some(b) => {
                        track_like > b.track_like
                            || (track_like == b.track_like && items.len() > b.items.len())
                    }
                };
                if better {
                    *best = Some(Candidate { items, track_like });
                }
            }
            for item in items {
                scan(item, best);
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                scan(value, best);
            }
        }
        _ => {}
    }
}

/// Innermost `props.pageProps` object, where the chart state usually lives
fn page_props(next_data: &Value) -> Option<&Value> {
    let outer = next_data.pointer("/props/pageProps")?;
    match outer.get("pageProps") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => Some(outer),
    }
}

/// Strongest list under `pageProps`, widening to the whole payload only when
/// that root has no good-enough candidate
fn find_track_list(next_data: &Value) -> Option<Candidate<'_>> {
    let mut best = None;
    if let Some(root) = page_props(next_data) {
        scan(root, &mut best);
    }
    if best.as_ref().is_some_and(|b| b.track_like >= GOOD_ENOUGH) {
        return best;
    }
    scan(next_data, &mut best);
    best
}

/// Does this value look like a track object?
pub fn is_track_like(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if id_string(obj).is_none() || display_name(obj).is_none() {
        return false;
    }
    SUPPORTING_KEYS.iter().filter(|k| obj.contains_key(**k)).count() >= 2
}

fn id_string(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn display_name(obj: &Map<String, Value>) -> Option<&str> {
    non_blank(obj.get("name")).or_else(|| non_blank(obj.get("title")))
}

/// Link to the track page, built from slug + id when no link key exists
fn track_href(obj: &Map<String, Value>) -> Option<String> {
    let direct = LINK_KEYS.iter().find_map(|k| {
        obj.get(*k)
            .and_then(Value::as_str)
            .filter(|v| v.contains("/track/"))
    });
    if let Some(href) = direct {
        return Some(href.to_string());
    }
    let slug = non_blank(obj.get("slug"))?;
    let id = id_string(obj)?;
    Some(format!("/track/{}/{}", slug, id))
}

fn people(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|p| display_name(p).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract ranked entries from the best track list in the data tree
pub fn extract_from_next_data(next_data: &Value, options: &ExtractOptions) -> Vec<ParsedEntry> {
    let Some(best) = find_track_list(next_data) else {
        return Vec::new();
    };
    debug!(
        len = best.items.len(),
        track_like = best.track_like,
        "Selected track list from __NEXT_DATA__"
    );

    let mut out: Vec<ParsedEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for obj in best.items.iter().filter(|v| is_track_like(v)).filter_map(Value::as_object) {
        let Some(href) = track_href(obj) else {
            continue;
        };
        let track_id = match track_id_from_href(&href).or_else(|| id_string(obj)) {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };
        if !seen.insert(track_id.clone()) {
            continue;
        }

        let title = display_name(obj)
            .map(str::to_string)
            .unwrap_or_else(|| format!("track-{}", track_id));
        let mix_name = MIX_KEYS
            .iter()
            .find_map(|k| non_blank(obj.get(*k)))
            .map(str::to_string);

        out.push(ParsedEntry {
            url: options.resolve(&href),
            title,
            mix_name,
            artists: people(obj.get("artists")),
            remixers: people(obj.get("remixers")),
            rank: out.len() as u32 + 1,
            track_id,
        });
        if out.len() >= options.limit {
            break;
        }
    }

    out
}
