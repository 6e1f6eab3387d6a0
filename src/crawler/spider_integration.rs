//! Integration with spider library for web crawling

use async_trait::async_trait;
use scraper::{Html, Selector};
use spider::compact_str::CompactString;
use spider::page::Page;
use spider::website::Website;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn};
use url::Url;

use crate::admission::{Admission, CandidateRequest, ResourceType};
use crate::crawler::config::CrawlerConfig;
use crate::crawler::engine::{CrawlEngine, CrawlEvent, CrawlHandle, CrawlHooks, PageSnapshot};
use crate::crawler::error::CrawlError;
use crate::crawler::record::PageVisit;

const PAGE_CHANNEL_CAPACITY: usize = 256;

/// Crawl engine running on `spider::website::Website`.
///
/// spider fetches pages over plain HTTP, so sub-resources are never loaded;
/// they are still screened through the admission hook to detect mixed
/// content. URLs the session never wants fetched reach spider as a regex
/// blacklist. robots.txt disallowances are handled inside spider and are not
/// reported as events.
#[derive(Debug, Default, Clone)]
pub struct SpiderEngine;

impl SpiderEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CrawlEngine for SpiderEngine {
    #[instrument(skip(self, hooks))]
    async fn launch(
        &self,
        config: CrawlerConfig,
        hooks: Arc<dyn CrawlHooks>,
    ) -> Result<Box<dyn CrawlHandle>, CrawlError> {
        if config.follow_sitemap {
            warn!("Sitemap discovery is not available with the spider engine");
        }
        if !config.headless {
            debug!("spider fetches without a browser window, ignoring headless=false");
        }

        Ok(Box::new(SpiderCrawl {
            shared: Arc::new(Shared::new(config, hooks)?),
            website: None,
            forwarder: None,
            processor: None,
        }))
    }
}

/// Configure a spider website for one crawl
fn build_website(seed_url: &str, config: &CrawlerConfig) -> Website {
    let mut website = Website::new(seed_url);
    website
        .configuration
        .with_respect_robots_txt(config.obey_robots_txt)
        .with_user_agent(Some(config.user_agent.as_str()))
        .with_delay(config.delay_ms)
        .with_depth(config.max_depth.try_into().unwrap_or(0))
        .with_subdomains(!config.is_domain_limited());
    website.configuration.concurrency_limit = Some(config.max_concurrency.max(1));
    if let Some(limit) = config.max_requests {
        website.configuration.with_limit(limit);
    }

    if !config.excluded_url_patterns.is_empty() {
        let patterns: Vec<CompactString> = config
            .excluded_url_patterns
            .iter()
            .map(|pattern| CompactString::new(pattern.as_str()))
            .collect();
        website.with_blacklist_url(Some(patterns));
        website.configuration.configure_allowlist();
    }
    website
}

/// A running spider crawl
pub struct SpiderCrawl {
    shared: Arc<Shared>,
    website: Option<Website>,
    forwarder: Option<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
}

#[async_trait]
impl CrawlHandle for SpiderCrawl {
    async fn queue(&mut self, seed_url: &str) -> Result<(), CrawlError> {
        if self.website.is_some() {
            return Err(CrawlError::State("seed already queued".to_string()));
        }
        Url::parse(seed_url)?;

        let mut website = build_website(seed_url, &self.shared.config);
        let rx = website
            .subscribe(PAGE_CHANNEL_CAPACITY)
            .ok_or_else(|| CrawlError::Launch("Failed to subscribe to website".to_string()))?;

        // The subscriber only hands pages over; parsing runs on a blocking
        // worker so the broadcast channel never lags behind spider.
        let (tx, pages) = mpsc::unbounded_channel();
        self.shared.graph().seed(seed_url);
        self.forwarder = Some(tokio::spawn(forward_pages(
            rx,
            tx,
            Arc::clone(&self.shared),
        )));
        let shared = Arc::clone(&self.shared);
        self.processor = Some(tokio::task::spawn_blocking(move || {
            process_pages(pages, &shared)
        }));
        self.website = Some(website);
        info!("Queued {}", seed_url);
        Ok(())
    }

    fn queue_size(&self) -> usize {
        self.shared.graph().pending()
    }

    fn requested_count(&self) -> usize {
        self.shared.requested.load(Ordering::SeqCst)
    }

    async fn on_idle(&mut self) -> Result<(), CrawlError> {
        let website = self
            .website
            .as_mut()
            .ok_or_else(|| CrawlError::State("no seed queued".to_string()))?;

        website.crawl().await;
        website.unsubscribe();

        for worker in [self.forwarder.take(), self.processor.take()]
            .into_iter()
            .flatten()
        {
            worker
                .await
                .map_err(|e| CrawlError::Other(format!("Task join error: {}", e)))?;
        }
        info!("Crawl finished after {} requests", self.requested_count());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CrawlError> {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        // The processor stops once the forwarder drops its sender
        self.processor = None;
        self.website = None;
        Ok(())
    }
}

async fn forward_pages(
    mut rx: broadcast::Receiver<Page>,
    tx: mpsc::UnboundedSender<Page>,
    shared: Arc<Shared>,
) {
    loop {
        match rx.recv().await {
            Ok(page) => {
                if tx.send(page).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Page subscriber lagged, {} pages were not processed", skipped);
                shared
                    .hooks
                    .on_event(CrawlEvent::PagesLost { count: skipped });
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn process_pages(mut pages: mpsc::UnboundedReceiver<Page>, shared: &Shared) {
    while let Some(page) = pages.blocking_recv() {
        shared.process_page(FetchedPage::from(&page));
    }
}

/// The parts of a spider page the audit needs
#[derive(Debug, Clone, Default)]
struct FetchedPage {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    html: String,
}

impl From<&Page> for FetchedPage {
    fn from(page: &Page) -> Self {
        let headers = page
            .headers
            .as_ref()
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|value| (name.as_str().to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            url: page.get_url().to_string(),
            status: page.status_code.as_u16(),
            headers,
            html: page.get_html(),
        }
    }
}

/// State shared between the handle and the page workers
struct Shared {
    config: CrawlerConfig,
    hooks: Arc<dyn CrawlHooks>,
    selectors: ReferenceSelectors,
    graph: Mutex<LinkGraph>,
    requested: AtomicUsize,
    max_depth_reported: AtomicBool,
    max_requests_reported: AtomicBool,
}

impl Shared {
    fn new(config: CrawlerConfig, hooks: Arc<dyn CrawlHooks>) -> Result<Self, CrawlError> {
        let selectors = ReferenceSelectors::new()
            .map_err(|e| CrawlError::Launch(format!("Failed to prepare selectors: {}", e)))?;
        Ok(Self {
            config,
            hooks,
            selectors,
            graph: Mutex::new(LinkGraph::default()),
            requested: AtomicUsize::new(0),
            max_depth_reported: AtomicBool::new(false),
            max_requests_reported: AtomicBool::new(false),
        })
    }

    fn graph(&self) -> MutexGuard<'_, LinkGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_page(&self, page: FetchedPage) {
        let FetchedPage {
            url,
            status,
            headers,
            html,
        } = page;
        let _page_span = info_span!("process_page", url = %url).entered();

        match self.hooks.admit(&CandidateRequest::document(&url)) {
            Admission::Document => {
                self.report_document(&url);
                return;
            }
            Admission::Skip(reason) => {
                debug!("Skipping {}: {}", url, reason);
                return;
            }
            Admission::Continue | Admission::MixedContent => {}
        }

        let node = self.graph().visit(&url);
        let requested = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let queue_size = self.graph().pending();
        self.hooks.on_event(CrawlEvent::RequestStarted {
            url: url.clone(),
            queue_size,
        });

        if !(200..400).contains(&status) {
            self.hooks.on_event(CrawlEvent::RequestFailed {
                url: url.clone(),
                reason: Some(format!("HTTP {}", status)),
            });
        }

        let mut mixed_content_url = None;
        match Url::parse(&url) {
            Ok(base) => {
                let references = self.selectors.collect(&html, &base);
                for asset in &references.assets {
                    if self.hooks.admit(asset) == Admission::MixedContent {
                        self.hooks.on_event(CrawlEvent::MixedContent {
                            page_url: url.clone(),
                            url: asset.url.clone(),
                        });
                        mixed_content_url = Some(asset.url.clone());
                    }
                }
                self.follow_links(&url, &references.links);
            }
            Err(e) => warn!("Cannot resolve references of {}: {}", url, e),
        }

        let fields = self.hooks.extract(&PageSnapshot {
            url: &url,
            html: &html,
            request_time_ms: None,
        });

        self.hooks.on_page(PageVisit {
            url,
            depth: node.depth,
            previous_url: node.previous_url,
            status: Some(status),
            headers,
            fields,
            content: Some(html),
            mixed_content_url,
            document: false,
        });

        if let Some(max) = self.config.max_requests {
            if requested >= max as usize && !self.max_requests_reported.swap(true, Ordering::SeqCst)
            {
                self.hooks.on_event(CrawlEvent::MaxRequestsReached);
            }
        }
    }

    fn follow_links(&self, page_url: &str, links: &[String]) {
        for link in links {
            match self.hooks.admit(&CandidateRequest::document(link)) {
                Admission::Document => self.report_document(link),
                Admission::Continue if self.in_scope(link) => {
                    let depth = self.graph().discover(link, page_url);
                    if depth > self.config.max_depth
                        && !self.max_depth_reported.swap(true, Ordering::SeqCst)
                    {
                        self.hooks
                            .on_event(CrawlEvent::MaxDepthReached { url: link.clone() });
                    }
                }
                _ => {}
            }
        }
    }

    fn in_scope(&self, url: &str) -> bool {
        match &self.config.allowed_domains {
            None => true,
            Some(domains) => Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(|host| domains.iter().any(|d| d == host)))
                .unwrap_or(false),
        }
    }

    fn report_document(&self, url: &str) {
        if self.graph().record_document(url) {
            self.hooks.on_page(PageVisit::document(url));
        }
    }
}

/// URLs referenced by a page
#[derive(Debug, Default)]
struct PageReferences {
    links: Vec<String>,
    assets: Vec<CandidateRequest>,
}

struct ReferenceSelectors {
    links: Selector,
    images: Selector,
    stylesheets: Selector,
    scripts: Selector,
}

impl ReferenceSelectors {
    fn new() -> Result<Self, CrawlError> {
        let parse = |selector: &str| {
            Selector::parse(selector).map_err(|e| {
                CrawlError::HtmlParse(format!("Failed to parse selector '{}': {}", selector, e))
            })
        };
        Ok(Self {
            links: parse("a[href]")?,
            images: parse("img[src]")?,
            stylesheets: parse("link[rel=\"stylesheet\"][href]")?,
            scripts: parse("script[src]")?,
        })
    }

    /// Resolve links and sub-resources of a page against its URL
    fn collect(&self, html: &str, base: &Url) -> PageReferences {
        let document = Html::parse_document(html);
        let resolve = |value: &str| base.join(value.trim()).ok().map(|url| url.to_string());

        let links = document
            .select(&self.links)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| !href.starts_with('#') && !href.starts_with("javascript"))
            .filter_map(resolve)
            .collect();

        let mut assets = Vec::new();
        for (selector, attr, resource_type) in [
            (&self.images, "src", ResourceType::Image),
            (&self.stylesheets, "href", ResourceType::Stylesheet),
            (&self.scripts, "src", ResourceType::Script),
        ] {
            assets.extend(
                document
                    .select(selector)
                    .filter_map(|el| el.value().attr(attr))
                    .filter_map(resolve)
                    .map(|url| CandidateRequest::new(url, resource_type)),
            );
        }

        PageReferences { links, assets }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkNode {
    depth: u32,
    previous_url: Option<String>,
}

/// Depth and referrer of every URL discovered during the crawl
#[derive(Debug, Default)]
struct LinkGraph {
    nodes: HashMap<String, LinkNode>,
    visited: HashSet<String>,
    documents: HashSet<String>,
}

impl LinkGraph {
    fn seed(&mut self, url: &str) {
        self.nodes.insert(
            link_key(url),
            LinkNode {
                depth: 1,
                previous_url: None,
            },
        );
    }

    /// Record a link found on `parent`; the first discovery fixes its depth
    fn discover(&mut self, url: &str, parent: &str) -> u32 {
        let parent_depth = self.node(parent).depth;
        self.nodes
            .entry(link_key(url))
            .or_insert_with(|| LinkNode {
                depth: parent_depth + 1,
                previous_url: Some(parent.to_string()),
            })
            .depth
    }

    fn node(&self, url: &str) -> LinkNode {
        self.nodes.get(&link_key(url)).cloned().unwrap_or(LinkNode {
            depth: 1,
            previous_url: None,
        })
    }

    fn visit(&mut self, url: &str) -> LinkNode {
        self.visited.insert(link_key(url));
        self.node(url)
    }

    /// Returns false when the document was already reported
    fn record_document(&mut self, url: &str) -> bool {
        self.documents.insert(link_key(url))
    }

    fn pending(&self) -> usize {
        self.nodes
            .keys()
            .filter(|key| !self.visited.contains(*key))
            .count()
    }
}

fn link_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
