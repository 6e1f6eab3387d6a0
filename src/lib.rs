//! # site-audit - Website Crawler and SEO Auditor
//!
//! This crate crawls a website and produces a per-page SEO report: one row per
//! page with the columns of a chosen field preset, streamed to CSV while the
//! crawl runs and converted to a spreadsheet at the end.
//!
//! ## Features
//!
//! - Field presets (`minimal`, `seo`, `headers`, `parse`) with exclusions and
//!   site-specific custom fields
//! - Request admission: image and junk-URL filtering, static asset skipping,
//!   document links recorded without download, mixed-content detection
//! - Page metrics: title, headings, DOM and markup sizes, text ratio, images,
//!   links, meta tags, canonical and schema.org types
//! - Per-field validation with warnings and errors
//! - CSV streaming with XLSX conversion and a retry for locked files
//! - Pluggable crawl engine, `spider` by default
//!
//! ## Example
//!
//! ```rust,no_run
//! use site_audit::crawler::SpiderEngine;
//! use site_audit::session::{Console, CrawlSession, SessionOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = SessionOptions::builder()
//!         .preset("seo")
//!         .max_requests(Some(100))
//!         .build();
//!     let console = Arc::new(Console::stdout(true));
//!
//!     let summary = CrawlSession::new("https://example.com/", options, console)
//!         .run(&SpiderEngine::new())
//!         .await;
//!
//!     println!("{} pages, {} errors", summary.pages, summary.errors);
//! }
//! ```

mod error;

pub mod admission;
pub mod crawler;
pub mod export;
pub mod extractor;
pub mod fields;
pub mod session;
pub mod validator;

pub use error::{Error, Result};
