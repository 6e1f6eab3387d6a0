//! Per-site session options

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::admission::{AdmissionConfig, DEFAULT_DOCUMENT_EXTENSIONS};
use crate::crawler::CrawlerConfig;
use crate::export::ExportConfig;
use crate::extractor::CustomField;
use crate::fields::{self, DEFAULT_PRESET, FieldPath};

/// Everything a crawl session needs to know about one run
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Field preset name
    pub preset: String,

    /// Fields dropped from the preset, by full path or short name
    pub exclude: Vec<String>,

    /// Site-specific fields, prepended to the preset columns
    pub custom_fields: Vec<CustomField>,

    pub max_depth: u32,
    pub max_concurrency: usize,
    pub max_requests: Option<u32>,
    pub delay_ms: u64,
    pub headless: bool,
    pub follow_sitemap: bool,
    pub obey_robots_txt: bool,

    /// Only crawl the seed's host
    pub limit_domain: bool,

    /// Refuse images, stylesheets and scripts
    pub skip_static: bool,

    /// File extensions recorded as documents instead of fetched
    pub docs_extensions: Vec<String>,

    /// Directory the reports are written to
    pub out_dir: PathBuf,

    /// Report file stem, the seed's host when unset
    pub out_name: Option<String>,

    pub export: ExportConfig,

    /// Print per-page validation findings
    pub console_validate: bool,

    /// Colour console output
    pub color: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preset: DEFAULT_PRESET.to_string(),
            exclude: Vec::new(),
            custom_fields: Vec::new(),
            max_depth: 10,
            max_concurrency: 2,
            max_requests: None,
            delay_ms: 0,
            headless: true,
            follow_sitemap: false,
            obey_robots_txt: true,
            limit_domain: true,
            skip_static: true,
            docs_extensions: DEFAULT_DOCUMENT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            out_dir: PathBuf::from("data/reports"),
            out_name: None,
            export: ExportConfig::default(),
            console_validate: true,
            color: true,
        }
    }
}

impl SessionOptions {
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::new()
    }

    /// Report columns: custom fields, then the preset, minus exclusions
    pub fn resolve_fields(&self) -> Vec<FieldPath> {
        let custom: Vec<&str> = self
            .custom_fields
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        fields::exclude(fields::resolve(&self.preset, &custom), &self.exclude)
    }

    /// Admission policy for a seed URL
    pub fn admission_config(&self, seed_url: &str) -> Result<AdmissionConfig, url::ParseError> {
        Ok(AdmissionConfig::for_seed(seed_url)?
            .with_skip_static(self.skip_static)
            .with_document_extensions(self.docs_extensions.clone()))
    }

    /// Engine settings for a crawl of `domain`
    pub fn crawler_config(&self, domain: &str) -> CrawlerConfig {
        CrawlerConfig::builder()
            .allowed_domains(self.limit_domain.then(|| vec![domain.to_string()]))
            .max_depth(self.max_depth)
            .max_concurrency(self.max_concurrency)
            .max_requests(self.max_requests)
            .delay_ms(self.delay_ms)
            .headless(self.headless)
            .follow_sitemap(self.follow_sitemap)
            .obey_robots_txt(self.obey_robots_txt)
            .build()
    }

    /// CSV and XLSX report paths for a seed URL
    pub fn report_paths(&self, seed: &Url) -> (PathBuf, PathBuf) {
        let stem = self
            .out_name
            .clone()
            .unwrap_or_else(|| seed.host_str().unwrap_or("report").to_string());
        (
            self.out_dir.join(format!("{}.csv", stem)),
            self.out_dir.join(format!("{}.xlsx", stem)),
        )
    }
}

/// Builder for `SessionOptions`
#[derive(Debug, Clone, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.options.preset = preset.into();
        self
    }

    pub fn exclude(mut self, exclude: Vec<String>) -> Self {
        self.options.exclude = exclude;
        self
    }

    pub fn custom_field(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.options
            .custom_fields
            .push(CustomField::new(name, expression));
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.options.max_concurrency = max_concurrency;
        self
    }

    pub fn max_requests(mut self, max_requests: Option<u32>) -> Self {
        self.options.max_requests = max_requests;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.options.delay_ms = delay_ms;
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.options.headless = headless;
        self
    }

    pub fn follow_sitemap(mut self, follow_sitemap: bool) -> Self {
        self.options.follow_sitemap = follow_sitemap;
        self
    }

    pub fn obey_robots_txt(mut self, obey_robots_txt: bool) -> Self {
        self.options.obey_robots_txt = obey_robots_txt;
        self
    }

    pub fn limit_domain(mut self, limit_domain: bool) -> Self {
        self.options.limit_domain = limit_domain;
        self
    }

    pub fn skip_static(mut self, skip_static: bool) -> Self {
        self.options.skip_static = skip_static;
        self
    }

    pub fn docs_extensions(mut self, docs_extensions: Vec<String>) -> Self {
        self.options.docs_extensions = docs_extensions;
        self
    }

    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.options.out_dir = out_dir.into();
        self
    }

    pub fn out_name(mut self, out_name: Option<String>) -> Self {
        self.options.out_name = out_name;
        self
    }

    pub fn xlsx(mut self, xlsx: bool) -> Self {
        self.options.export.xlsx = xlsx;
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.options.export.json = json;
        self
    }

    pub fn remove_csv(mut self, remove_csv: bool) -> Self {
        self.options.export.remove_csv = remove_csv;
        self
    }

    pub fn remove_json(mut self, remove_json: bool) -> Self {
        self.options.export.remove_json = remove_json;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.options.export.retry_delay = retry_delay;
        self
    }

    pub fn console_validate(mut self, console_validate: bool) -> Self {
        self.options.console_validate = console_validate;
        self
    }

    pub fn color(mut self, color: bool) -> Self {
        self.options.color = color;
        self
    }

    pub fn build(self) -> SessionOptions {
        self.options
    }
}
