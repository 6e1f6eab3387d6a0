//! Per-page results reported by the crawl engine

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::export::ExportRow;
use crate::fields::FieldPath;

/// Key under which a failed extraction reports its error
pub const ERROR_FIELD: &str = "error";

/// Key under which the last mixed-content URL of a page is stamped
pub const MIXED_CONTENT_FIELD: &str = "mixed_content_url";

/// What the engine reports once a page visit completes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageVisit {
    /// URL as requested, possibly percent-encoded
    pub url: String,

    /// Link depth from the seed (the seed is 1)
    pub depth: u32,

    /// Page the URL was discovered on
    pub previous_url: Option<String>,

    /// HTTP status of the response
    pub status: Option<u16>,

    /// Response headers
    pub headers: Vec<(String, String)>,

    /// Values computed by the page extractor
    pub fields: Map<String, Value>,

    /// Raw page markup
    pub content: Option<String>,

    /// Last insecure sub-resource aborted on this page
    pub mixed_content_url: Option<String>,

    /// Document link recorded without being fetched
    pub document: bool,
}

impl PageVisit {
    /// Terminal entry for a document link that is never fetched
    pub fn document(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            document: true,
            ..Self::default()
        }
    }
}

/// A page result as surfaced to validation and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// URL as reported by the engine
    pub url: String,

    /// Percent-decoded URL shown to consumers
    pub decoded_url: String,

    pub depth: u32,
    pub status: Option<u16>,

    /// Response headers keyed by lowercase name
    pub headers: BTreeMap<String, String>,

    pub previous_url: Option<String>,

    /// Extracted fields, including the stamped mixed-content URL
    pub result: Map<String, Value>,

    pub content: Option<String>,

    pub mixed_content_url: Option<String>,

    /// Set when the extractor failed for this page
    pub error: Option<String>,

    pub document: bool,
}

impl PageRecord {
    /// Build a record from an engine visit: decode the URL and stamp the
    /// mixed-content URL into the result fields.
    pub fn from_visit(visit: PageVisit) -> Self {
        let mut result = visit.fields;
        let error = result.get(ERROR_FIELD).map(render_value);

        if !visit.document {
            result.insert(
                MIXED_CONTENT_FIELD.to_string(),
                Value::String(visit.mixed_content_url.clone().unwrap_or_default()),
            );
        }

        Self {
            decoded_url: decode_url(&visit.url),
            url: visit.url,
            depth: visit.depth,
            status: visit.status,
            headers: visit
                .headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            previous_url: visit.previous_url,
            result,
            content: visit.content,
            mixed_content_url: visit.mixed_content_url,
            error,
            document: visit.document,
        }
    }

    /// Terminal record for a document link
    pub fn document(url: impl Into<String>) -> Self {
        Self::from_visit(PageVisit::document(url))
    }

    /// Whether this record stands for a document that was never fetched
    pub fn is_document(&self) -> bool {
        self.document
    }

    /// Raw value of an extracted field
    pub fn result_value(&self, name: &str) -> Option<&Value> {
        self.result.get(name)
    }

    /// Resolve a field path to its display string. Unknown paths resolve to
    /// an empty string.
    pub fn field(&self, path: &FieldPath) -> String {
        let path = path.as_str();
        match path.split_once('.') {
            Some(("response", "url")) => self.decoded_url.clone(),
            Some(("response", "status")) => {
                self.status.map(|s| s.to_string()).unwrap_or_default()
            }
            Some(("response", rest)) => rest
                .strip_prefix("headers.")
                .and_then(|name| self.headers.get(&name.to_ascii_lowercase()))
                .cloned()
                .unwrap_or_default(),
            Some(("result", name)) => self.result.get(name).map(render_value).unwrap_or_default(),
            None if path == "depth" => self.depth.to_string(),
            None if path == "previousUrl" => self
                .previous_url
                .as_deref()
                .map(decode_url)
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Project the record onto an ordered field list
    pub fn project(&self, fields: &[FieldPath]) -> ExportRow {
        ExportRow::new(fields.iter().map(|path| self.field(path)).collect())
    }
}

// Escapes of the characters that delimit URL components: # $ & + , / : ; = ? @
static RESERVED_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)%(?:2[346bcf]|3[abdf]|40)").expect("valid reserved escape regex")
});

/// Percent-decode a URL for display. Escaped component delimiters stay
/// encoded so the URL keeps its meaning; undecodable input is returned
/// unchanged.
pub fn decode_url(url: &str) -> String {
    let mut decoded = String::with_capacity(url.len());
    let mut last = 0;
    for escape in RESERVED_ESCAPE.find_iter(url) {
        let Ok(piece) = urlencoding::decode(&url[last..escape.start()]) else {
            return url.to_string();
        };
        decoded.push_str(&piece);
        decoded.push_str(escape.as_str());
        last = escape.end();
    }
    match urlencoding::decode(&url[last..]) {
        Ok(piece) => {
            decoded.push_str(&piece);
            decoded
        }
        Err(_) => url.to_string(),
    }
}

/// Render an extracted value as a report cell
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn visit() -> PageVisit {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!("Home"));
        fields.insert("h1_count".to_string(), json!(1));
        fields.insert("schema_types".to_string(), json!(["Organization", "WebPage"]));
        PageVisit {
            url: "http://x.test/p%20age".to_string(),
            depth: 2,
            previous_url: Some("http://x.test/".to_string()),
            status: Some(200),
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            fields,
            content: Some("<html></html>".to_string()),
            mixed_content_url: None,
            document: false,
        }
    }

    #[test]
    fn test_url_is_decoded() {
        let record = PageRecord::from_visit(visit());
        assert_eq!(record.url, "http://x.test/p%20age");
        assert_eq!(record.field(&"response.url".into()), "http://x.test/p age");
    }

    #[test]
    fn test_decode_url_keeps_invalid_input() {
        assert_eq!(decode_url("http://x.test/%E0%A4%A"), "http://x.test/%E0%A4%A");
        assert_eq!(
            decode_url("https://x.test/%D0%BE%D0%BA"),
            "https://x.test/ок"
        );
    }

    #[test]
    fn test_decode_url_keeps_reserved_escapes() {
        assert_eq!(
            decode_url("https://x.test/a%2Fb%3Fc%20d%23e"),
            "https://x.test/a%2Fb%3Fc d%23e"
        );
        assert_eq!(
            decode_url("https://x.test/%D0%BE%2f%D0%BA?q=%26"),
            "https://x.test/о%2fк?q=%26"
        );
    }

    #[test]
    fn test_field_resolution() {
        let record = PageRecord::from_visit(visit());
        assert_eq!(record.field(&"response.status".into()), "200");
        assert_eq!(
            record.field(&"response.headers.content-type".into()),
            "text/html"
        );
        assert_eq!(record.field(&"response.headers.".into()), "");
        assert_eq!(record.field(&"result.title".into()), "Home");
        assert_eq!(record.field(&"result.h1_count".into()), "1");
        assert_eq!(
            record.field(&"result.schema_types".into()),
            "Organization, WebPage"
        );
        assert_eq!(record.field(&"depth".into()), "2");
        assert_eq!(record.field(&"previousUrl".into()), "http://x.test/");
        assert_eq!(record.field(&"result.unknown".into()), "");
        assert_eq!(record.field(&"bogus.path".into()), "");
    }

    #[test]
    fn test_mixed_content_stamped() {
        let mut page = visit();
        page.mixed_content_url = Some("http://cdn.x.test/a.js".to_string());
        let record = PageRecord::from_visit(page);
        assert_eq!(
            record.field(&"result.mixed_content_url".into()),
            "http://cdn.x.test/a.js"
        );

        let record = PageRecord::from_visit(visit());
        assert_eq!(
            record.result_value(MIXED_CONTENT_FIELD),
            Some(&json!(""))
        );
    }

    #[test]
    fn test_document_record() {
        let record = PageRecord::document("https://x.test/files/price%20list.pdf");
        assert!(record.is_document());
        assert_eq!(record.depth, 0);
        assert!(record.result.is_empty());
        assert!(record.content.is_none());
        assert_eq!(
            record.field(&"response.url".into()),
            "https://x.test/files/price list.pdf"
        );
        assert_eq!(record.field(&"result.title".into()), "");
    }

    #[test]
    fn test_error_record_keeps_url() {
        let mut fields = Map::new();
        fields.insert(ERROR_FIELD.to_string(), json!("selector failed"));
        let record = PageRecord::from_visit(PageVisit {
            url: "https://x.test/broken".to_string(),
            depth: 1,
            fields,
            ..PageVisit::default()
        });
        assert_eq!(record.error.as_deref(), Some("selector failed"));
        assert_eq!(record.field(&"response.url".into()), "https://x.test/broken");
    }

    #[test]
    fn test_project_keeps_column_order() {
        let record = PageRecord::from_visit(visit());
        let fields: Vec<FieldPath> = vec!["result.title".into(), "response.url".into(), "depth".into()];
        let row = record.project(&fields);
        assert_eq!(row.cells(), &["Home", "http://x.test/p age", "2"]);
    }
}
