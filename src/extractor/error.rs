//! Error types for the extractor module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for page extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A CSS selector could not be parsed
    #[error("Selector error: {0}")]
    Selector(String),

    /// The page URL could not be parsed
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A custom field expression is malformed
    #[error("Expression parse error at {position}: {message}")]
    ExpressionParse { position: usize, message: String },

    /// A custom field expression failed against the page
    #[error("Expression evaluation error: {0}")]
    Evaluate(String),
}

impl From<ExtractError> for CrateError {
    fn from(err: ExtractError) -> Self {
        CrateError::Extract(err.to_string())
    }
}
