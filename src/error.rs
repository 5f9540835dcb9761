//! Custom error types for chart-continuity

use thiserror::Error;

/// Main error type for continuity operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network or HTTP failure after the retry budget was spent
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// No extraction strategy produced any entries
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid date: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Not initialized: run 'continuity init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for continuity
pub type Result<T> = std::result::Result<T, Error>;
