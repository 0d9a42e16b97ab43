use std::time::Duration;
use thiserror::Error;

/// Failures of a headless browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("page interaction failed on `{selector}`: {reason}")]
    Interaction { selector: String, reason: String },
    #[error("failed to read page content: {0}")]
    Content(String),
}

/// Failures of a metadata catalog lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cinema chain not found")]
    ChainNotFound,
    #[error("Cinema location not found")]
    LocationNotFound,
    #[error("Invalid date, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Failed to fetch movies")]
    ScrapeFailed(String),
}
