//! # Field Presets Module
//!
//! Maps preset names to the ordered list of field paths that become the
//! columns of the exported report.
//!
//! ## Key Components
//!
//! - `FieldPath`: A dotted identifier addressing a value in a page record
//! - `resolve`: Turns a preset name plus custom field names into a field list
//! - `exclude`: Drops explicitly excluded fields from a resolved list
//!
//! Field paths resolve against the record shape
//! `{response: {url, status, headers}, result: {..}, depth, previousUrl}`.

mod presets;

pub use presets::{DEFAULT_PRESET, PRESET_NAMES, preset_fields};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A dotted path selecting a value inside a page record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    /// Create a field path from its dotted form
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path for a value computed by the page extractor
    pub fn result(name: &str) -> Self {
        Self(format!("result.{}", name))
    }

    /// The dotted form, e.g. `result.title`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the path, used as the display name in findings.
    ///
    /// Header paths keep the full header name, so `response.headers.x-page-speed`
    /// becomes `x-page-speed`.
    pub fn short_name(&self) -> &str {
        if let Some(header) = self.0.strip_prefix("response.headers.") {
            return header;
        }
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Resolve a preset name and custom field names into the ordered field list.
///
/// Unknown or empty preset names fall back to the default preset. Custom
/// fields are prepended as `result.<name>` in the order given.
pub fn resolve<S: AsRef<str>>(preset_name: &str, custom_field_names: &[S]) -> Vec<FieldPath> {
    let preset = match preset_fields(preset_name) {
        Some(fields) => fields,
        None => {
            warn!(
                "Unknown field preset '{}', falling back to '{}'",
                preset_name, DEFAULT_PRESET
            );
            preset_fields(DEFAULT_PRESET).unwrap_or_default()
        }
    };

    custom_field_names
        .iter()
        .map(|name| FieldPath::result(name.as_ref()))
        .chain(preset.iter().map(|path| FieldPath::new(*path)))
        .collect()
}

/// Remove excluded fields, keeping the order of what remains.
///
/// An exclusion matches either the full path or its short name, so both
/// `result.title` and `title` drop the title column.
pub fn exclude<S: AsRef<str>>(fields: Vec<FieldPath>, exclusions: &[S]) -> Vec<FieldPath> {
    if exclusions.is_empty() {
        return fields;
    }
    fields
        .into_iter()
        .filter(|field| {
            !exclusions.iter().any(|ex| {
                let ex = ex.as_ref();
                field.as_str() == ex || field.short_name() == ex
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(fields: &[FieldPath]) -> Vec<&str> {
        fields.iter().map(FieldPath::as_str).collect()
    }

    #[test]
    fn test_minimal_preset() {
        let fields = resolve::<&str>("minimal", &[]);
        assert_eq!(paths(&fields), vec!["response.url"]);
    }

    #[test]
    fn test_seo_preset_columns() {
        let fields = resolve::<&str>("seo", &[]);
        assert_eq!(fields[0].as_str(), "response.url");
        for required in ["result.canonical", "result.is_canonical", "result.images_outer"] {
            assert!(
                fields.iter().any(|f| f.as_str() == required),
                "missing {}",
                required
            );
        }
    }

    #[test]
    fn test_unknown_preset_falls_back_to_default() {
        let fields = resolve::<&str>("sSeo-typo", &[]);
        assert_eq!(paths(&fields), vec!["response.url", "depth"]);

        let fields = resolve::<&str>("", &[]);
        assert_eq!(paths(&fields), vec!["response.url", "depth"]);
    }

    #[test]
    fn test_custom_fields_prepended_in_order() {
        let fields = resolve("parse", &["section", "price"]);
        assert_eq!(
            paths(&fields),
            vec![
                "result.section",
                "result.price",
                "response.url",
                "result.title",
                "result.h1",
                "result.description",
                "result.keywords",
            ]
        );
    }

    #[test]
    fn test_custom_fields_not_deduplicated() {
        let fields = resolve("parse", &["title"]);
        let titles = fields.iter().filter(|f| f.as_str() == "result.title").count();
        assert_eq!(titles, 2);
    }

    #[test]
    fn test_exclude_by_path_and_short_name() {
        let fields = resolve::<&str>("parse", &[]);
        let fields = exclude(fields, &["result.h1", "keywords"]);
        assert_eq!(
            paths(&fields),
            vec!["response.url", "result.title", "result.description"]
        );
    }

    #[test]
    fn test_short_name() {
        assert_eq!(FieldPath::new("result.title").short_name(), "title");
        assert_eq!(FieldPath::new("depth").short_name(), "depth");
        assert_eq!(
            FieldPath::new("response.headers.content-type").short_name(),
            "content-type"
        );
    }
}
