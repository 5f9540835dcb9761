//! CLI commands implementation

pub mod compute;
pub mod diagnose;
pub mod ingest;
pub mod init;
pub mod report;
pub mod status;

pub use compute::*;
pub use diagnose::*;
pub use ingest::*;
pub use init::*;
pub use report::*;
pub use status::*;

/// The first `max_chars` characters of `text`
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
