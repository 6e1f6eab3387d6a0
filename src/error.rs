//! Error types for the site-audit crate

use thiserror::Error;

/// Result type for site-audit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for site-audit operations
#[derive(Debug, Error)]
pub enum Error {
    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Page extraction error
    #[error("Extract error: {0}")]
    Extract(String),

    /// Report export error
    #[error("Export error: {0}")]
    Export(String),

    /// Invalid seed or page URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
