//! Error types for the export module

use crate::error::Error as CrateError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for report export
#[derive(Debug, Error)]
pub enum ExportError {
    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// CSV write or read failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet generation failure
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// JSON serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The target file is locked by another process
    #[error("{0} is busy")]
    Busy(PathBuf),

    /// The sink no longer accepts rows
    #[error("Export already finalized")]
    Closed,

    /// Background conversion task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl ExportError {
    /// Whether the failure is a locked target that may clear on retry
    pub fn is_busy(&self) -> bool {
        matches!(self, ExportError::Busy(_))
    }
}

/// Whether an IO error means another process holds the file open
pub(crate) fn is_locked(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ResourceBusy
        || (cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33)))
}

impl From<ExportError> for CrateError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => CrateError::Io(e),
            ExportError::Json(e) => CrateError::Json(e),
            other => CrateError::Export(other.to_string()),
        }
    }
}
