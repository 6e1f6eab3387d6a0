//! # Export Module
//!
//! Streams audit rows into a `;`-separated CSV report while the crawl runs,
//! then converts it into a spreadsheet once the crawl is over.
//!
//! ## Key Components
//!
//! - `ExportSink`: Row-by-row CSV writer with the final conversion step
//! - `ExportConfig`: Output formats and cleanup switches
//! - `SpreadsheetConverter`: CSV to XLSX conversion, `XlsxConverter` by default
//! - `Publisher`: Optional destination for the JSON artifact

mod error;
mod spreadsheet;

pub use error::ExportError;
pub use spreadsheet::{SpreadsheetConverter, XlsxConverter};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::fields::FieldPath;

/// Column separator of the CSV report
pub const CSV_DELIMITER: u8 = b';';

/// Default wait before retrying a locked spreadsheet
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// One report row, ordered like the active field list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportRow {
    cells: Vec<String>,
}

impl ExportRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// Output formats and cleanup switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Convert the CSV into a spreadsheet
    pub xlsx: bool,

    /// Also write a JSON artifact
    pub json: bool,

    /// Delete the CSV after a successful conversion
    pub remove_csv: bool,

    /// Delete the JSON artifact after a successful publish
    pub remove_json: bool,

    /// Wait before the single retry of a locked spreadsheet
    pub retry_delay: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            xlsx: true,
            json: false,
            remove_csv: true,
            remove_json: true,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ExportConfig {
    pub fn with_xlsx(mut self, xlsx: bool) -> Self {
        self.xlsx = xlsx;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_remove_csv(mut self, remove_csv: bool) -> Self {
        self.remove_csv = remove_csv;
        self
    }

    pub fn with_remove_json(mut self, remove_json: bool) -> Self {
        self.remove_json = remove_json;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Result of finalizing the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The report was written to this path
    Saved(PathBuf),

    /// The report could not be produced
    Failed(String),
}

impl ExportOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, ExportOutcome::Saved(_))
    }
}

/// Destination the JSON artifact is uploaded to
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, path: &Path) -> Result<(), ExportError>;
}

/// Streaming report writer for one crawl session
pub struct ExportSink {
    csv_path: PathBuf,
    xlsx_path: PathBuf,
    json_path: PathBuf,
    fields: Vec<FieldPath>,
    config: ExportConfig,
    writer: Mutex<Option<csv::Writer<File>>>,
    converter: Arc<dyn SpreadsheetConverter>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl std::fmt::Debug for ExportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSink")
            .field("csv_path", &self.csv_path)
            .field("xlsx_path", &self.xlsx_path)
            .field("fields", &self.fields)
            .field("config", &self.config)
            .finish()
    }
}

impl ExportSink {
    /// Create the CSV report and write its header row
    pub fn create(
        csv_path: impl Into<PathBuf>,
        xlsx_path: impl Into<PathBuf>,
        fields: Vec<FieldPath>,
        config: ExportConfig,
    ) -> Result<Self, ExportError> {
        let csv_path = csv_path.into();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(CSV_DELIMITER)
            .from_path(&csv_path)?;
        writer.write_record(fields.iter().map(FieldPath::as_str))?;
        writer.flush()?;

        debug!(path = %csv_path.display(), columns = fields.len(), "Report created");

        Ok(Self {
            json_path: csv_path.with_extension("json"),
            csv_path,
            xlsx_path: xlsx_path.into(),
            fields,
            config,
            writer: Mutex::new(Some(writer)),
            converter: Arc::new(XlsxConverter),
            publisher: None,
        })
    }

    /// Replace the spreadsheet converter
    pub fn with_converter(mut self, converter: Arc<dyn SpreadsheetConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Publish the JSON artifact after it is written
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn xlsx_path(&self) -> &Path {
        &self.xlsx_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    /// Append one row; the file is flushed so it stays readable mid-crawl
    pub fn append_row(&self, row: &ExportRow) -> Result<(), ExportError> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard.as_mut().ok_or(ExportError::Closed)?;
        writer.write_record(row.cells())?;
        writer.flush()?;
        Ok(())
    }

    /// Close the CSV and produce the final artifacts. Failures are logged
    /// and reported in the outcome.
    #[instrument(skip(self), fields(csv = %self.csv_path.display()))]
    pub async fn finalize(&self) -> ExportOutcome {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut writer) = writer else {
            return ExportOutcome::Failed(ExportError::Closed.to_string());
        };
        if let Err(e) = writer.flush() {
            error!("Failed to flush report: {}", e);
            return ExportOutcome::Failed(e.to_string());
        }
        drop(writer);

        if self.config.json {
            self.export_json().await;
        }

        if !self.config.xlsx {
            return ExportOutcome::Saved(self.csv_path.clone());
        }

        if let Err(e) = self.convert_with_retry().await {
            error!(path = %self.xlsx_path.display(), "Spreadsheet export failed: {}", e);
            return ExportOutcome::Failed(e.to_string());
        }

        if self.config.remove_csv {
            if let Err(e) = fs::remove_file(&self.csv_path) {
                warn!("Failed to remove {}: {}", self.csv_path.display(), e);
            }
        }

        info!(path = %self.xlsx_path.display(), "Report saved");
        ExportOutcome::Saved(self.xlsx_path.clone())
    }

    /// Convert, retrying exactly once if the target is locked
    async fn convert_with_retry(&self) -> Result<(), ExportError> {
        match self.convert().await {
            Err(e) if e.is_busy() => {
                warn!(
                    path = %self.xlsx_path.display(),
                    "{} is busy, please close the file in {} seconds",
                    self.xlsx_path.display(),
                    self.config.retry_delay.as_secs()
                );
                tokio::time::sleep(self.config.retry_delay).await;
                self.convert().await
            }
            result => result,
        }
    }

    async fn convert(&self) -> Result<(), ExportError> {
        let converter = Arc::clone(&self.converter);
        let csv_path = self.csv_path.clone();
        let xlsx_path = self.xlsx_path.clone();
        tokio::task::spawn_blocking(move || converter.convert(&csv_path, &xlsx_path))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?
    }

    async fn export_json(&self) {
        if let Err(e) = self.write_json() {
            error!(path = %self.json_path.display(), "Failed to write JSON report: {}", e);
            return;
        }
        info!(path = %self.json_path.display(), "JSON report saved");

        let Some(publisher) = &self.publisher else {
            return;
        };
        match publisher.publish(&self.json_path).await {
            Ok(()) => {
                info!(path = %self.json_path.display(), "JSON report published");
                if self.config.remove_json {
                    if let Err(e) = fs::remove_file(&self.json_path) {
                        warn!("Failed to remove {}: {}", self.json_path.display(), e);
                    }
                }
            }
            Err(e) => error!(path = %self.json_path.display(), "Failed to publish JSON report: {}", e),
        }
    }

    /// Stream the finished CSV into a JSON array of row objects
    fn write_json(&self) -> Result<(), ExportError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(CSV_DELIMITER)
            .from_path(&self.csv_path)?;
        let headers = reader.headers()?.clone();
        let mut writer = BufWriter::new(File::create(&self.json_path)?);

        writer.write_all(b"[")?;
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(field, cell)| (field.to_string(), Value::String(cell.to_string())))
                .collect();
            if index > 0 {
                writer.write_all(b",")?;
            }
            writer.write_all(b"\n  ")?;
            serde_json::to_writer(&mut writer, &row)?;
        }
        writer.write_all(b"\n]\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Reports the target as locked for the first `busy` calls
    struct LockedConverter {
        busy: usize,
        calls: AtomicUsize,
    }

    impl LockedConverter {
        fn new(busy: usize) -> Arc<Self> {
            Arc::new(Self {
                busy,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SpreadsheetConverter for LockedConverter {
        fn convert(&self, _csv_path: &Path, xlsx_path: &Path) -> Result<(), ExportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.busy {
                return Err(ExportError::Busy(xlsx_path.to_path_buf()));
            }
            fs::write(xlsx_path, b"xlsx")?;
            Ok(())
        }
    }

    struct RecordingPublisher {
        published: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, path: &Path) -> Result<(), ExportError> {
            assert!(path.exists());
            self.published.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn fields() -> Vec<FieldPath> {
        vec!["response.url".into(), "result.title".into()]
    }

    fn config() -> ExportConfig {
        ExportConfig::default().with_retry_delay(Duration::from_millis(10))
    }

    fn row(url: &str, title: &str) -> ExportRow {
        ExportRow::new(vec![url.to_string(), title.to_string()])
    }

    #[test]
    fn test_header_and_rows_are_flushed() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("x.test.csv");
        let sink = ExportSink::create(&csv_path, dir.path().join("x.test.xlsx"), fields(), config())
            .unwrap();

        assert_eq!(fs::read_to_string(&csv_path).unwrap(), "response.url;result.title\n");

        sink.append_row(&row("https://x.test/", "Home; sweet home")).unwrap();
        sink.append_row(&row("https://x.test/a", "")).unwrap();
        assert_eq!(
            fs::read_to_string(&csv_path).unwrap(),
            "response.url;result.title\nhttps://x.test/;\"Home; sweet home\"\nhttps://x.test/a;\n"
        );
    }

    #[tokio::test]
    async fn test_finalize_converts_and_removes_csv() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("x.test.csv");
        let xlsx_path = dir.path().join("x.test.xlsx");
        let converter = LockedConverter::new(0);
        let sink = ExportSink::create(&csv_path, &xlsx_path, fields(), config())
            .unwrap()
            .with_converter(converter.clone());
        sink.append_row(&row("https://x.test/", "Home")).unwrap();

        assert_eq!(sink.finalize().await, ExportOutcome::Saved(xlsx_path.clone()));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
        assert!(xlsx_path.exists());
        assert!(!csv_path.exists());
    }

    #[tokio::test]
    async fn test_busy_target_is_retried_once() {
        let dir = tempdir().unwrap();
        let xlsx_path = dir.path().join("x.test.xlsx");
        let converter = LockedConverter::new(1);
        let sink = ExportSink::create(dir.path().join("x.test.csv"), &xlsx_path, fields(), config())
            .unwrap()
            .with_converter(converter.clone());

        assert_eq!(sink.finalize().await, ExportOutcome::Saved(xlsx_path));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_busy_fails_without_further_retries() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("x.test.csv");
        let converter = LockedConverter::new(5);
        let sink = ExportSink::create(&csv_path, dir.path().join("x.test.xlsx"), fields(), config())
            .unwrap()
            .with_converter(converter.clone());

        let outcome = sink.finalize().await;
        assert!(matches!(outcome, ExportOutcome::Failed(ref reason) if reason.contains("busy")));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);
        // the CSV is kept when conversion fails
        assert!(csv_path.exists());
    }

    #[tokio::test]
    async fn test_csv_only_export() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("x.test.csv");
        let converter = LockedConverter::new(0);
        let sink = ExportSink::create(
            &csv_path,
            dir.path().join("x.test.xlsx"),
            fields(),
            config().with_xlsx(false),
        )
        .unwrap()
        .with_converter(converter.clone());

        assert_eq!(sink.finalize().await, ExportOutcome::Saved(csv_path.clone()));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
        assert!(csv_path.exists());
    }

    #[tokio::test]
    async fn test_rows_rejected_after_finalize() {
        let dir = tempdir().unwrap();
        let sink = ExportSink::create(
            dir.path().join("x.test.csv"),
            dir.path().join("x.test.xlsx"),
            fields(),
            config().with_xlsx(false),
        )
        .unwrap();

        assert!(sink.finalize().await.is_saved());
        assert!(matches!(
            sink.append_row(&row("https://x.test/", "")),
            Err(ExportError::Closed)
        ));
        assert!(!sink.finalize().await.is_saved());
    }

    #[tokio::test]
    async fn test_json_written_and_removed_after_publish() {
        let dir = tempdir().unwrap();
        let publisher = Arc::new(RecordingPublisher {
            published: Mutex::new(Vec::new()),
        });
        let sink = ExportSink::create(
            dir.path().join("x.test.csv"),
            dir.path().join("x.test.xlsx"),
            fields(),
            config().with_xlsx(false).with_json(true),
        )
        .unwrap()
        .with_publisher(publisher.clone());
        sink.append_row(&row("https://x.test/", "Home")).unwrap();

        sink.finalize().await;

        let json_path = dir.path().join("x.test.json");
        assert_eq!(*publisher.published.lock().unwrap(), vec![json_path.clone()]);
        assert!(!json_path.exists());
    }

    #[tokio::test]
    async fn test_json_kept_without_publisher() {
        let dir = tempdir().unwrap();
        let sink = ExportSink::create(
            dir.path().join("x.test.csv"),
            dir.path().join("x.test.xlsx"),
            fields(),
            config().with_xlsx(false).with_json(true),
        )
        .unwrap();
        sink.append_row(&row("https://x.test/", "Home; sweet home")).unwrap();
        sink.append_row(&row("https://x.test/a", "")).unwrap();

        sink.finalize().await;

        let json: Value =
            serde_json::from_str(&fs::read_to_string(sink.json_path()).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"response.url": "https://x.test/", "result.title": "Home; sweet home"},
                {"response.url": "https://x.test/a", "result.title": ""}
            ])
        );
    }
}
