//! # site-audit CLI Application
//!
//! Crawls one or more websites and writes an SEO report per site.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Mapping of flags onto `SessionOptions`
//! - Sites crawled one after another on the `spider` engine, reports
//!   written on background tasks
//!
//! ```text
//! site-audit -p seo -m 500 --json https://example.com https://example.org
//! site-audit --fields 'price=$(".price").text().trim()' https://shop.example.com
//! ```

mod logging;

use anyhow::anyhow;
use clap::Parser;
use site_audit::crawler::SpiderEngine;
use site_audit::fields::DEFAULT_PRESET;
use site_audit::session::{
    Console, CrawlOutcome, CrawlSession, SessionOptions, SessionState, SessionSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

#[derive(Parser, Debug)]
#[command(author, version, about = "Crawl websites and audit every page for SEO problems", long_about = None)]
struct Cli {
    /// Sites to crawl, one session each
    #[arg(required = true)]
    urls: Vec<String>,

    /// Field preset: default, minimal, seo, headers, parse
    #[arg(short, long, default_value = DEFAULT_PRESET)]
    preset: String,

    /// Fields to exclude, by path or short name (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Custom field as name=expression, e.g. 'price=$(".price").text()'
    #[arg(short, long = "fields", value_parser = parse_custom_field)]
    fields: Vec<(String, String)>,

    /// Maximum link depth from the seed page
    #[arg(short = 'd', long, default_value = "10")]
    max_depth: u32,

    /// Pages fetched in parallel
    #[arg(short, long, default_value = "2")]
    concurrency: usize,

    /// Stop after this many requests
    #[arg(short, long)]
    max_requests: Option<u32>,

    /// Delay between requests in milliseconds
    #[arg(long, default_value = "0")]
    delay: u64,

    /// Fetch images, stylesheets and scripts
    #[arg(long)]
    no_skip_static: bool,

    /// Extensions recorded as documents instead of being fetched (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "doc,docx,xls,xlsx,ppt,pptx,pdf,rar,zip")]
    docs_extensions: Vec<String>,

    /// Discover more pages from sitemap.xml
    #[arg(long)]
    follow_xml_sitemap: bool,

    /// Crawl pages disallowed by robots.txt
    #[arg(long)]
    ignore_robots_txt: bool,

    /// Follow links to other hosts
    #[arg(long)]
    no_limit_domain: bool,

    /// Show the browser window
    #[arg(long)]
    no_headless: bool,

    /// Directory the reports are written to
    #[arg(short, long, default_value = "data/reports")]
    out_dir: PathBuf,

    /// Report file name without extension, the site's host by default
    #[arg(long)]
    out_name: Option<String>,

    /// Keep the CSV report instead of converting it to XLSX
    #[arg(long)]
    no_xlsx: bool,

    /// Also save the report as JSON
    #[arg(long)]
    json: bool,

    /// Keep the CSV after the XLSX is written
    #[arg(long)]
    no_remove_csv: bool,

    /// Keep the JSON after it is published
    #[arg(long)]
    no_remove_json: bool,

    /// Seconds to wait before retrying a locked XLSX file
    #[arg(long, default_value = "10")]
    retry_delay: u64,

    /// Don't print validation findings per page
    #[arg(long)]
    no_console_validate: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Also write a detailed log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn parse_custom_field(value: &str) -> Result<(String, String), String> {
    let (name, expression) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=expression, got '{}'", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{}'", value));
    }
    Ok((name.to_string(), expression.trim().to_string()))
}

impl Cli {
    fn session_options(&self) -> SessionOptions {
        let builder = self.fields.iter().fold(
            SessionOptions::builder(),
            |builder, (name, expression)| builder.custom_field(name, expression),
        );

        builder
            .preset(&self.preset)
            .exclude(self.exclude.clone())
            .max_depth(self.max_depth)
            .max_concurrency(self.concurrency)
            .max_requests(self.max_requests)
            .delay_ms(self.delay)
            .skip_static(!self.no_skip_static)
            .docs_extensions(self.docs_extensions.clone())
            .follow_sitemap(self.follow_xml_sitemap)
            .obey_robots_txt(!self.ignore_robots_txt)
            .limit_domain(!self.no_limit_domain)
            .headless(!self.no_headless)
            .out_dir(&self.out_dir)
            .out_name(self.out_name.clone())
            .xlsx(!self.no_xlsx)
            .json(self.json)
            .remove_csv(!self.no_remove_csv)
            .remove_json(!self.no_remove_json)
            .retry_delay(Duration::from_secs(self.retry_delay))
            .console_validate(!self.no_console_validate)
            .color(!self.no_color)
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::setup_logging(cli.log_dir.as_deref())?;

    let options = cli.session_options();
    let console = Arc::new(Console::stdout(options.color));
    console.brief(&options);

    let failed = audit_sites(&cli.urls, &options, &console).await;
    if failed > 0 {
        return Err(anyhow!("{} of {} sites failed", failed, cli.urls.len()));
    }
    Ok(())
}

/// Crawl the sites in order while their reports are written in the
/// background. Returns the number of failed sessions.
#[instrument(skip(options, console))]
async fn audit_sites(urls: &[String], options: &SessionOptions, console: &Arc<Console>) -> usize {
    let engine = SpiderEngine::new();
    let mut exports = JoinSet::new();
    let mut failed = 0;

    for url in urls {
        match CrawlSession::new(url, options.clone(), Arc::clone(console))
            .crawl(&engine)
            .await
        {
            CrawlOutcome::Crawled(pending) => {
                info!(url = %pending.seed_url(), "Crawl done, writing report");
                exports.spawn(pending.export());
            }
            CrawlOutcome::Finished(summary) => failed += site_finished(&summary),
        }
    }

    while let Some(joined) = exports.join_next().await {
        match joined {
            Ok(summary) => failed += site_finished(&summary),
            Err(e) => {
                error!("Report task failed: {}", e);
                failed += 1;
            }
        }
    }

    failed
}

/// Log a finished site; returns 1 when it failed
fn site_finished(summary: &SessionSummary) -> usize {
    info!(
        url = %summary.seed_url,
        state = %summary.state,
        pages = summary.pages,
        elapsed_secs = summary.elapsed.as_secs(),
        "Site finished"
    );
    usize::from(summary.state == SessionState::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_custom_field() {
        assert_eq!(
            parse_custom_field("price=$('.price').text()").unwrap(),
            ("price".to_string(), "$('.price').text()".to_string())
        );
        assert_eq!(
            parse_custom_field("eq=$('a[href=\"/\"]').length").unwrap().1,
            "$('a[href=\"/\"]').length"
        );
        assert!(parse_custom_field("no-expression").is_err());
        assert!(parse_custom_field("=$('a').length").is_err());
    }

    #[test]
    fn test_cli_maps_to_session_options() {
        let cli = Cli::parse_from([
            "site-audit",
            "-p",
            "seo",
            "-e",
            "keywords,og_image",
            "--fields",
            "price=$('.price').text()",
            "-m",
            "50",
            "--no-xlsx",
            "--ignore-robots-txt",
            "https://example.test/",
        ]);
        let options = cli.session_options();

        assert_eq!(options.preset, "seo");
        assert_eq!(options.exclude, vec!["keywords", "og_image"]);
        assert_eq!(options.custom_fields.len(), 1);
        assert_eq!(options.max_requests, Some(50));
        assert!(!options.export.xlsx);
        assert!(!options.obey_robots_txt);
        assert!(options.skip_static);
        assert!(options.docs_extensions.contains(&"pdf".to_string()));
        assert_eq!(cli.urls, vec!["https://example.test/"]);
    }
}
