//! Default values for configuration

use super::ChartConfig;

/// Default site used to resolve relative track links
pub fn default_site_base_url() -> String {
    std::env::var("CONTINUITY_SITE_URL").unwrap_or_else(|_| "https://www.beatport.com".to_string())
}

/// Browser-like user agent; the chart pages serve a reduced shell to unknown agents
pub fn default_fetch_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

/// Default request timeout in seconds
pub fn default_fetch_timeout() -> u64 {
    15
}

/// Default number of fetch attempts per chart
pub fn default_fetch_retry_attempts() -> u32 {
    3
}

/// Default delay before the first retry (doubles on each attempt)
pub fn default_fetch_retry_base_delay_ms() -> u64 {
    1000
}

/// Default ceiling on entries extracted from one chart page
pub fn default_ingest_expected_entries() -> usize {
    100
}

/// Default number of charts fetched at once
pub fn default_ingest_concurrency() -> usize {
    1
}

/// Default cap on characters written to a debug payload file
pub fn default_ingest_debug_payload_max_chars() -> usize {
    200_000
}

/// Default tracked charts
pub fn default_charts() -> Vec<ChartConfig> {
    vec![
        ChartConfig {
            id: "overall-top-100".to_string(),
            chart_type: "top100".to_string(),
            genre_slug: "overall".to_string(),
            name: "Beatport Top 100".to_string(),
            url: "https://www.beatport.com/top-100".to_string(),
        },
        ChartConfig {
            id: "house-top-100".to_string(),
            chart_type: "top100".to_string(),
            genre_slug: "house".to_string(),
            name: "House Top 100".to_string(),
            url: "https://www.beatport.com/genre/house/5/top-100".to_string(),
        },
        ChartConfig {
            id: "techno-top-100".to_string(),
            chart_type: "top100".to_string(),
            genre_slug: "techno".to_string(),
            name: "Techno (Peak Time / Driving) Top 100".to_string(),
            url: "https://www.beatport.com/genre/techno-peak-time-driving/6/top-100".to_string(),
        },
        ChartConfig {
            id: "overall-hype-100".to_string(),
            chart_type: "hype".to_string(),
            genre_slug: "overall".to_string(),
            name: "Beatport Hype 100".to_string(),
            url: "https://www.beatport.com/hype".to_string(),
        },
    ]
}
