//! # Request Admission Module
//!
//! Decides, for every resource a crawled page references, whether the crawl
//! engine should fetch it, skip it, or record it as a terminal document.
//!
//! The filter is a pure function of the candidate request and the
//! per-session `AdmissionConfig`, so it can be shared across concurrent page
//! visits without locking.

mod config;

pub use config::{AdmissionConfig, DEFAULT_DOCUMENT_EXTENSIONS};

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Kind of resource a request loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Document,
    Image,
    Stylesheet,
    Script,
    Other,
}

impl ResourceType {
    /// Whether this is an image, stylesheet or script
    pub fn is_static_asset(self) -> bool {
        matches!(self, Self::Image | Self::Stylesheet | Self::Script)
    }
}

/// A request the engine is about to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRequest {
    pub url: String,
    pub resource_type: ResourceType,
}

impl CandidateRequest {
    pub fn new(url: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            url: url.into(),
            resource_type,
        }
    }

    /// A navigation request for a page
    pub fn document(url: impl Into<String>) -> Self {
        Self::new(url, ResourceType::Document)
    }
}

/// Why a request was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ImageExtension,
    ExcludedPattern,
    ProtocolMismatch,
    StaticAsset,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ImageExtension => "image extension",
            Self::ExcludedPattern => "excluded pattern",
            Self::ProtocolMismatch => "protocol mismatch",
            Self::StaticAsset => "static asset",
        };
        f.write_str(reason)
    }
}

/// Outcome of the admission filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Fetch the resource
    Continue,
    /// Abort without recording anything
    Skip(SkipReason),
    /// Never fetch, but record the URL as a terminal report entry
    Document,
    /// Insecure sub-resource on a secure page; abort and report it
    MixedContent,
}

impl Admission {
    pub fn is_continue(self) -> bool {
        self == Self::Continue
    }
}

/// Query and path patterns produced by common site builders (Bitrix galleries,
/// filters, sort orders, accessibility versions). Following them explodes the
/// crawl into near-duplicate pages.
const EXCLUDED_SUBSTRINGS: &[&str] = &[
    "?vi=y",
    "gallery/?page=detail",
    "/?lightbox=",
    "rk.php",
    "/?catalog_view=",
    "/?SORT=",
    "/filter/clear/apply/",
];

static IMAGE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif)").expect("valid image regex"));

// Resized image cards (staff photos, business cards)
static RESIZED_IMAGE_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?width=\d+&height=\d+").expect("valid resize regex"));

// End of the path: the extension must not be followed by more path or host
const PATH_END: &str = r"(?:[?#]|$)";

/// Admission filter bound to one crawl session
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    config: AdmissionConfig,
}

impl AdmissionFilter {
    /// Build a filter for the given session configuration
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    /// Decide what to do with a request. The first matching rule wins.
    pub fn should_fetch(&self, request: &CandidateRequest) -> Admission {
        let url = request.url.as_str();
        let scheme = scheme_of(url);

        if self.config.is_secure()
            && request.resource_type.is_static_asset()
            && scheme.as_deref() == Some("http")
        {
            return Admission::MixedContent;
        }

        if IMAGE_EXTENSION.is_match(url) {
            return Admission::Skip(SkipReason::ImageExtension);
        }

        if RESIZED_IMAGE_QUERY.is_match(url)
            || EXCLUDED_SUBSTRINGS.iter().any(|pattern| url.contains(pattern))
        {
            return Admission::Skip(SkipReason::ExcludedPattern);
        }

        if scheme.as_deref() != Some(self.config.seed_scheme.as_str()) {
            return Admission::Skip(SkipReason::ProtocolMismatch);
        }

        if self.is_document(url) {
            return Admission::Document;
        }

        if self.config.skip_static && request.resource_type.is_static_asset() {
            return Admission::Skip(SkipReason::StaticAsset);
        }

        Admission::Continue
    }

    /// Regular expressions for the URLs this filter never lets through as
    /// pages, for engines that screen their frontier before fetching.
    ///
    /// Documents are included: they are recorded from the links that point
    /// to them and must not be downloaded.
    pub fn url_blacklist(&self) -> Vec<String> {
        let mut patterns = vec![
            format!(r"(?i)\.(?:jpg|jpeg|png|gif){}", PATH_END),
            RESIZED_IMAGE_QUERY.as_str().to_string(),
        ];
        patterns.extend(EXCLUDED_SUBSTRINGS.iter().map(|pattern| regex::escape(pattern)));

        let foreign_scheme = if self.config.is_secure() { "http" } else { "https" };
        patterns.push(format!("^{}://", foreign_scheme));

        if !self.config.document_extensions.is_empty() {
            let extensions: Vec<String> = self
                .config
                .document_extensions
                .iter()
                .map(|ext| regex::escape(ext))
                .collect();
            patterns.push(format!(r"\.(?:{}){}", extensions.join("|"), PATH_END));
        }
        patterns
    }

    /// Whether the URL carries one of the configured document extensions
    pub fn is_document(&self, url: &str) -> bool {
        self.config
            .document_extensions
            .iter()
            .any(|ext| url.contains(&format!(".{}", ext)))
    }
}

fn scheme_of(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|parsed| parsed.scheme().to_string())
}
