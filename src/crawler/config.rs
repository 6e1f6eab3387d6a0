//! # Crawl Engine Configuration Module
//!
//! Settings handed to the crawl engine at launch: domain scoping, depth and
//! request limits, concurrency, politeness delay and robots.txt compliance.
//! Built with the same builder pattern used across the crate.

/// Configuration passed to `CrawlEngine::launch`
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Domains the crawl may leave the seed for; `None` means unrestricted
    pub allowed_domains: Option<Vec<String>>,

    /// Maximum link depth from the seed page
    pub max_depth: u32,

    /// Number of pages fetched in parallel
    pub max_concurrency: usize,

    /// Stop after this many requests; `None` means unlimited
    pub max_requests: Option<u32>,

    /// Delay in milliseconds between requests
    pub delay_ms: u64,

    /// Run the browser without a window
    pub headless: bool,

    /// Discover extra pages from sitemap.xml
    pub follow_sitemap: bool,

    /// Whether to respect robots.txt
    pub obey_robots_txt: bool,

    /// User agent to use for requests
    pub user_agent: String,

    /// Regular expressions of URLs the engine must never request
    pub excluded_url_patterns: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            allowed_domains: None,
            max_depth: 10,
            max_concurrency: 2,
            max_requests: None,
            delay_ms: 0,
            headless: true,
            follow_sitemap: false,
            obey_robots_txt: true,
            user_agent: format!("site-audit/{}", env!("CARGO_PKG_VERSION")),
            excluded_url_patterns: Vec::new(),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Restrict the crawl to the given domains
    pub fn allowed_domains(mut self, domains: Option<Vec<String>>) -> Self {
        self.config.allowed_domains = domains;
        self
    }

    /// Set the maximum depth to crawl
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the number of parallel page fetches
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// Set the request limit
    pub fn max_requests(mut self, max_requests: Option<u32>) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    /// Set the delay in milliseconds between requests
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.delay_ms = delay_ms;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn follow_sitemap(mut self, follow_sitemap: bool) -> Self {
        self.config.follow_sitemap = follow_sitemap;
        self
    }

    /// Set whether to respect robots.txt
    pub fn obey_robots_txt(mut self, obey_robots_txt: bool) -> Self {
        self.config.obey_robots_txt = obey_robots_txt;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn excluded_url_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.excluded_url_patterns = patterns;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Whether the crawl is restricted to its allowed domains
    pub fn is_domain_limited(&self) -> bool {
        self.allowed_domains.is_some()
    }
}
