//! Error types for the crawler module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for crawl engine operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The engine could not be started
    #[error("Launch error: {0}")]
    Launch(String),

    /// HTML parsing error
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The crawl was used out of order (e.g. idle before queue)
    #[error("Invalid crawl state: {0}")]
    State(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::UrlParse(e) => CrateError::Url(e),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
