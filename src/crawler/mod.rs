//! # Crawl Engine Module
//!
//! The boundary between the audit session and the engine that actually walks
//! a website. The engine owns navigation, the URL frontier, concurrency,
//! depth limits and robots.txt; the session plugs its admission, extraction
//! and reporting policies in through `CrawlHooks`.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: Launch settings (depth, limits, delay, robots.txt)
//! - `CrawlEngine` / `CrawlHandle`: Launch and drive a crawl
//! - `CrawlHooks`: Callbacks the engine invokes per request and per page
//! - `PageVisit` / `PageRecord`: Per-page results
//! - `SpiderEngine`: Engine backed by the `spider` crate

mod config;
mod engine;
mod error;
mod record;
mod spider_integration;

pub use config::{CrawlerConfig, CrawlerConfigBuilder};
pub use engine::{CrawlEngine, CrawlEvent, CrawlHandle, CrawlHooks, PageSnapshot};
pub use error::CrawlError;
pub use record::{
    ERROR_FIELD, MIXED_CONTENT_FIELD, PageRecord, PageVisit, decode_url, render_value,
};
pub use spider_integration::{SpiderCrawl, SpiderEngine};
