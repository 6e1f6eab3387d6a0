//! Per-session admission settings

use url::Url;

/// Extensions treated as downloadable documents rather than pages
pub const DEFAULT_DOCUMENT_EXTENSIONS: &[&str] =
    &["doc", "docx", "xls", "xlsx", "ppt", "pptx", "pdf", "rar", "zip"];

/// Admission settings for one crawl session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Scheme of the seed page, without the trailing colon
    pub seed_scheme: String,

    /// Abort images, stylesheets and scripts
    pub skip_static: bool,

    /// Extensions recorded as terminal document entries
    pub document_extensions: Vec<String>,
}

impl AdmissionConfig {
    /// Default settings for a crawl starting at `seed_url`
    pub fn for_seed(seed_url: &str) -> Result<Self, url::ParseError> {
        let seed = Url::parse(seed_url)?;
        Ok(Self {
            seed_scheme: seed.scheme().to_string(),
            skip_static: true,
            document_extensions: DEFAULT_DOCUMENT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        })
    }

    pub fn with_skip_static(mut self, skip_static: bool) -> Self {
        self.skip_static = skip_static;
        self
    }

    pub fn with_document_extensions(mut self, extensions: Vec<String>) -> Self {
        self.document_extensions = extensions;
        self
    }

    /// Whether the seed was fetched over a secure protocol
    pub fn is_secure(&self) -> bool {
        self.seed_scheme == "https"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_seed() {
        let config = AdmissionConfig::for_seed("https://example.test/start").unwrap();
        assert_eq!(config.seed_scheme, "https");
        assert!(config.is_secure());
        assert!(config.skip_static);
        assert!(config.document_extensions.iter().any(|ext| ext == "pdf"));
    }

    #[test]
    fn test_for_seed_rejects_relative_url() {
        assert!(AdmissionConfig::for_seed("example.test").is_err());
    }
}
