//! Contract between the audit session and a crawl engine
//!
//! The engine owns navigation, scheduling and parallelism. The session plugs
//! its policies in through `CrawlHooks`, which the engine calls from whatever
//! tasks it runs pages on.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::admission::{Admission, CandidateRequest};
use crate::crawler::config::CrawlerConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::record::PageVisit;

/// Loaded page state handed to the extractor
#[derive(Debug, Clone, Copy)]
pub struct PageSnapshot<'a> {
    /// URL of the loaded page as reported by the engine
    pub url: &'a str,

    /// Full page markup
    pub html: &'a str,

    /// Time between request start and response end, when the engine knows it
    pub request_time_ms: Option<u64>,
}

/// Lifecycle notifications emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    RequestStarted { url: String, queue_size: usize },
    RequestFailed { url: String, reason: Option<String> },
    RequestDisallowed { url: String },
    MaxDepthReached { url: String },
    MaxRequestsReached,
    /// An insecure sub-resource on a secure page was aborted
    MixedContent { page_url: String, url: String },
    /// Fetched pages the engine could not hand over for processing
    PagesLost { count: u64 },
}

/// Hook points the session implements for the engine.
///
/// Engines must record the URL of every `Admission::MixedContent` decision on
/// the `PageVisit` of the page that issued the request, and report every
/// `Admission::Document` navigation as `PageVisit::document`.
pub trait CrawlHooks: Send + Sync {
    /// Decide whether a request may be fetched
    fn admit(&self, request: &CandidateRequest) -> Admission;

    /// Compute the extracted fields of a loaded page
    fn extract(&self, page: &PageSnapshot<'_>) -> Map<String, Value>;

    /// Receive a completed page visit
    fn on_page(&self, visit: PageVisit);

    /// Receive a lifecycle notification
    fn on_event(&self, event: CrawlEvent);
}

/// A crawl engine that can be launched for one session
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    async fn launch(
        &self,
        config: CrawlerConfig,
        hooks: Arc<dyn CrawlHooks>,
    ) -> Result<Box<dyn CrawlHandle>, CrawlError>;
}

/// A launched crawl
#[async_trait]
pub trait CrawlHandle: Send {
    /// Queue the seed URL
    async fn queue(&mut self, seed_url: &str) -> Result<(), CrawlError>;

    /// Number of known URLs not yet visited
    fn queue_size(&self) -> usize;

    /// Number of requests made so far
    fn requested_count(&self) -> usize;

    /// Resolve once the engine has no pending work
    async fn on_idle(&mut self) -> Result<(), CrawlError>;

    /// Release engine resources
    async fn close(&mut self) -> Result<(), CrawlError>;
}
