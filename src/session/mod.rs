//! # Crawl Session Module
//!
//! Runs one site audit from configuration to saved report. A session wires
//! the admission filter, page extractor, validator and export sink into a
//! crawl engine, drives the engine until it is idle and then finalizes the
//! report.
//!
//! ## Key Components
//!
//! - `CrawlSession`: One audit of one seed URL
//! - `PendingExport`: A finished crawl waiting for its report to be written
//! - `SessionOptions`: Everything configurable about a session
//! - `SessionSummary`: What a finished session reports back
//! - `Console`: Coloured operator output

mod console;
mod options;

pub use console::Console;
pub use options::{SessionOptions, SessionOptionsBuilder};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::admission::{Admission, AdmissionFilter, CandidateRequest};
use crate::crawler::{
    CrawlEngine, CrawlEvent, CrawlHooks, CrawlerConfig, PageRecord, PageSnapshot, PageVisit,
    decode_url,
};
use crate::export::{ExportOutcome, ExportSink, Publisher, SpreadsheetConverter};
use crate::extractor::PageExtractor;
use crate::fields::FieldPath;
use crate::validator::{ResultValidator, Severity};

/// Lifecycle of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configuring,
    Running,
    Draining,
    Exporting,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Exporting => "exporting",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub seed_url: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,

    /// Requests started by the engine
    pub requested: usize,

    /// Rows appended to the report
    pub pages: usize,

    pub elapsed: Duration,

    /// Rounded seconds per request, 0 when nothing was requested
    pub per_page_secs: f64,

    /// `None` when the session failed before exporting
    pub export: Option<ExportOutcome>,

    pub warnings: usize,
    pub errors: usize,
}

/// Seconds per request rounded to two decimals, from the rounded total time
pub fn per_page_seconds(elapsed: Duration, requested: usize) -> f64 {
    if requested == 0 {
        return 0.0;
    }
    let total = elapsed.as_secs_f64().round();
    (total / requested as f64 * 100.0).round() / 100.0
}

/// Session policies exposed to the crawl engine
struct SessionHooks {
    admission: AdmissionFilter,
    extractor: PageExtractor,
    validator: ResultValidator,
    sink: Arc<ExportSink>,
    fields: Vec<FieldPath>,
    console: Arc<Console>,
    console_validate: bool,
    requested: AtomicUsize,
    pages: AtomicUsize,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl CrawlHooks for SessionHooks {
    fn admit(&self, request: &CandidateRequest) -> Admission {
        self.admission.should_fetch(request)
    }

    fn extract(&self, page: &PageSnapshot<'_>) -> Map<String, Value> {
        self.extractor.extract(page)
    }

    fn on_page(&self, visit: PageVisit) {
        let record = PageRecord::from_visit(visit);

        if let Some(err) = &record.error {
            self.console
                .error(&format!("Error collect page data: {}", err));
        }

        let findings = self.validator.validate(&record, &self.fields);
        for finding in findings.values() {
            let counter = match finding.severity {
                Severity::Warning => &self.warnings,
                Severity::Error => &self.errors,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if self.console_validate {
            self.console.findings(&findings);
        }

        match self.sink.append_row(&record.project(&self.fields)) {
            Ok(()) => {
                self.pages.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => error!(url = %record.url, "Failed to append report row: {}", e),
        }
    }

    fn on_event(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::RequestStarted { url, queue_size } => {
                let count = self.requested.fetch_add(1, Ordering::Relaxed) + 1;
                self.console
                    .print(&format!("{} {} ({})", count, decode_url(&url), queue_size));
            }
            CrawlEvent::RequestFailed { url, reason } => {
                let reason = reason.map(|r| format!(" ({})", r)).unwrap_or_default();
                self.console
                    .error(&format!("Failed: {}{}", decode_url(&url), reason));
            }
            CrawlEvent::RequestDisallowed { url } => {
                self.console
                    .warn(&format!("Disallowed in robots.txt: {}", decode_url(&url)));
            }
            CrawlEvent::MaxDepthReached { url } => {
                debug!(url = %url, "Max depth reached");
                self.console.warn("Max depth reached");
            }
            CrawlEvent::MaxRequestsReached => {
                self.console.warn("Max requests reached");
            }
            CrawlEvent::MixedContent { page_url, url } => {
                debug!(page = %page_url, "Mixed content");
                self.console.error(&format!("mixed content: {}", url));
            }
            CrawlEvent::PagesLost { count } => {
                self.console
                    .error(&format!("Lost {} crawled pages, the report is incomplete", count));
            }
        }
    }
}

/// One audit of one seed URL
pub struct CrawlSession {
    seed_url: String,
    options: SessionOptions,
    console: Arc<Console>,
    publisher: Option<Arc<dyn Publisher>>,
    converter: Option<Arc<dyn SpreadsheetConverter>>,
    state: SessionState,
    started_at: DateTime<Utc>,
}

impl fmt::Debug for CrawlSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlSession")
            .field("seed_url", &self.seed_url)
            .field("state", &self.state)
            .finish()
    }
}

/// Where a session stands once its crawl is over
pub enum CrawlOutcome {
    /// Pages were collected; the report still has to be written
    Crawled(PendingExport),

    /// The session ended before exporting
    Finished(SessionSummary),
}

impl CrawlSession {
    pub fn new(seed_url: impl Into<String>, options: SessionOptions, console: Arc<Console>) -> Self {
        Self {
            seed_url: seed_url.into(),
            options,
            console,
            publisher: None,
            converter: None,
            state: SessionState::Configuring,
            started_at: Utc::now(),
        }
    }

    /// Upload the JSON report through `publisher` once it is written
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Replace the CSV to spreadsheet converter of the report
    pub fn with_converter(mut self, converter: Arc<dyn SpreadsheetConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, state: SessionState) {
        debug!(seed = %self.seed_url, from = %self.state, to = %state, "Session state");
        self.state = state;
    }

    fn summary(
        &self,
        hooks: Option<&SessionHooks>,
        elapsed: Duration,
        export: Option<ExportOutcome>,
    ) -> SessionSummary {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        let (requested, pages, warnings, errors) = match hooks {
            Some(h) => (
                load(&h.requested),
                load(&h.pages),
                load(&h.warnings),
                load(&h.errors),
            ),
            None => (0, 0, 0, 0),
        };
        SessionSummary {
            seed_url: self.seed_url.clone(),
            state: self.state,
            started_at: self.started_at,
            requested,
            pages,
            elapsed,
            per_page_secs: per_page_seconds(elapsed, requested),
            export,
            warnings,
            errors,
        }
    }

    fn fail(&mut self, message: &str) -> SessionSummary {
        error!(seed = %self.seed_url, "{}", message);
        self.console.error(message);
        self.transition(SessionState::Failed);
        self.summary(None, Duration::ZERO, None)
    }

    /// Build the per-session components and the engine settings
    fn configure(&mut self) -> crate::Result<(SessionHooks, CrawlerConfig)> {
        let seed = Url::parse(&self.seed_url)?;
        let domain = seed.host_str().unwrap_or_default();

        let fields = self.options.resolve_fields();
        let admission = AdmissionFilter::new(self.options.admission_config(&self.seed_url)?);
        let extractor = PageExtractor::new(&self.options.custom_fields)?;

        fs::create_dir_all(&self.options.out_dir)?;
        let (csv_path, xlsx_path) = self.options.report_paths(&seed);
        let mut sink = ExportSink::create(
            &csv_path,
            xlsx_path,
            fields.clone(),
            self.options.export.clone(),
        )?;
        if let Some(converter) = &self.converter {
            sink = sink.with_converter(Arc::clone(converter));
        }
        if let Some(publisher) = &self.publisher {
            sink = sink.with_publisher(Arc::clone(publisher));
        }

        let mut config = self.options.crawler_config(domain);
        config.excluded_url_patterns = admission.url_blacklist();

        info!(seed = %self.seed_url, columns = fields.len(), csv = %csv_path.display(), "Session configured");

        let hooks = SessionHooks {
            admission,
            extractor,
            validator: ResultValidator::default(),
            sink: Arc::new(sink),
            fields,
            console: Arc::clone(&self.console),
            console_validate: self.options.console_validate,
            requested: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        Ok((hooks, config))
    }

    /// Crawl the site and write the report
    pub async fn run(self, engine: &dyn CrawlEngine) -> SessionSummary {
        match self.crawl(engine).await {
            CrawlOutcome::Crawled(pending) => pending.export().await,
            CrawlOutcome::Finished(summary) => summary,
        }
    }

    /// Crawl the site without writing the report yet
    #[instrument(skip(self, engine), fields(seed = %self.seed_url))]
    pub async fn crawl(mut self, engine: &dyn CrawlEngine) -> CrawlOutcome {
        let (hooks, config) = match self.configure() {
            Ok(configured) => configured,
            Err(e) => {
                let message = format!("Failed to configure {}: {}", self.seed_url, e);
                return CrawlOutcome::Finished(self.fail(&message));
            }
        };
        let hooks = Arc::new(hooks);

        self.transition(SessionState::Running);
        self.console.warn(&format!("Scrapping {}...", self.seed_url));
        self.started_at = Utc::now();
        let start = Instant::now();

        if let Err(e) = self.drive(engine, config, Arc::clone(&hooks)).await {
            let message = format!("Failed to launch crawler: {}", e);
            let mut summary = self.fail(&message);
            summary.elapsed = start.elapsed();
            return CrawlOutcome::Finished(summary);
        }

        CrawlOutcome::Crawled(PendingExport {
            session: self,
            hooks,
            elapsed: start.elapsed(),
        })
    }

    /// Launch the engine and wait until it is idle. Only a failed launch is
    /// returned as an error.
    async fn drive(
        &mut self,
        engine: &dyn CrawlEngine,
        config: CrawlerConfig,
        hooks: Arc<SessionHooks>,
    ) -> crate::Result<()> {
        let mut handle = engine.launch(config, hooks).await?;

        if let Err(e) = handle.queue(&self.seed_url).await {
            error!("Failed to queue {}: {}", self.seed_url, e);
            self.console
                .error(&format!("Failed: {}", decode_url(&self.seed_url)));
        }

        self.transition(SessionState::Draining);
        if let Err(e) = handle.on_idle().await {
            warn!("Crawl ended with an error: {}", e);
        }
        if let Err(e) = handle.close().await {
            warn!("Failed to close crawler: {}", e);
        }
        Ok(())
    }

    fn print_finish(&self, path: &Path, elapsed: Duration, requested: usize) {
        self.console.print("");
        self.console.warn(&format!("Saved to {}", path.display()));
        self.console.print(&format!(
            "Finish: {} sec ({} per page)",
            elapsed.as_secs_f64().round(),
            per_page_seconds(elapsed, requested)
        ));
    }
}

/// A crawled session whose report is not written yet
pub struct PendingExport {
    session: CrawlSession,
    hooks: Arc<SessionHooks>,
    elapsed: Duration,
}

impl PendingExport {
    pub fn seed_url(&self) -> &str {
        &self.session.seed_url
    }

    /// Finalize the report. A locked spreadsheet keeps the session in
    /// `Exporting` until its single retry is done, so callers auditing
    /// several sites run this on its own task.
    #[instrument(skip(self), fields(seed = %self.session.seed_url))]
    pub async fn export(self) -> SessionSummary {
        let Self {
            mut session,
            hooks,
            elapsed,
        } = self;

        session.transition(SessionState::Exporting);
        let outcome = hooks.sink.finalize().await;

        let final_state = match &outcome {
            ExportOutcome::Saved(path) => {
                session.print_finish(path, elapsed, hooks.requested.load(Ordering::Relaxed));
                SessionState::Done
            }
            ExportOutcome::Failed(reason) => {
                session
                    .console
                    .error(&format!("Failed to save report: {}", reason));
                SessionState::Failed
            }
        };
        session.transition(final_state);

        let summary = session.summary(Some(hooks.as_ref()), elapsed, Some(outcome));
        info!(
            state = %summary.state,
            started_at = %summary.started_at.to_rfc3339(),
            requested = summary.requested,
            pages = summary.pages,
            warnings = summary.warnings,
            errors = summary.errors,
            "Session finished"
        );
        summary
    }
}
