//! # Result Validator Module
//!
//! Flags SEO problems in a page record: missing titles, duplicate H1s,
//! oversized DOMs, slow responses and so on. Validation is pure and runs on
//! the rendered field values, so every rule sees exactly what ends up in the
//! report.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::crawler::PageRecord;
use crate::fields::FieldPath;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A problem found in one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// A check applied to the rendered value of one field
pub trait ValidationRule: Send + Sync {
    /// Return a finding when the value violates the rule
    fn check(&self, value: &str) -> Option<Finding>;
}

/// Conditions used by the built-in rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    Empty,
    NotEmpty,
    LongerThan(usize),
    GreaterThan(f64),
    LessThan(f64),
    AtLeast(f64),
    Equals(f64),
}

impl Condition {
    fn matches(&self, value: &str) -> bool {
        let number = || value.trim().parse::<f64>().ok();
        match *self {
            Condition::Empty => value.is_empty(),
            Condition::NotEmpty => !value.is_empty(),
            Condition::LongerThan(max) => value.chars().count() > max,
            Condition::GreaterThan(limit) => number().is_some_and(|n| n > limit),
            Condition::LessThan(limit) => number().is_some_and(|n| n < limit),
            Condition::AtLeast(limit) => number().is_some_and(|n| n >= limit),
            Condition::Equals(limit) => number().is_some_and(|n| n == limit),
        }
    }
}

/// A condition with the severity and message it reports
#[derive(Debug, Clone)]
pub struct Rule {
    condition: Condition,
    severity: Severity,
    message: &'static str,
}

impl Rule {
    pub const fn new(condition: Condition, severity: Severity, message: &'static str) -> Self {
        Self {
            condition,
            severity,
            message,
        }
    }
}

impl ValidationRule for Rule {
    fn check(&self, value: &str) -> Option<Finding> {
        if !self.condition.matches(value) {
            return None;
        }
        let message = match self.condition {
            Condition::Empty | Condition::NotEmpty => self.message.to_string(),
            Condition::LongerThan(_) => format!("{}: {} chars", self.message, value.chars().count()),
            _ => format!("{}: {}", self.message, value.trim()),
        };
        Some(Finding {
            severity: self.severity,
            message,
        })
    }
}

/// Per-field validation of page records
pub struct ResultValidator {
    rules: Vec<(FieldPath, Box<dyn ValidationRule>)>,
}

impl fmt::Debug for ResultValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultValidator")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Default for ResultValidator {
    fn default() -> Self {
        use Condition::*;
        use Severity::{Error, Warning};

        let builtin = [
            ("response.status", Rule::new(AtLeast(400.0), Error, "bad status")),
            ("result.mixed_content_url", Rule::new(NotEmpty, Error, "mixed content")),
            ("result.title", Rule::new(Empty, Error, "empty")),
            ("result.title", Rule::new(LongerThan(70), Warning, "too long")),
            ("result.description", Rule::new(Empty, Warning, "empty")),
            ("result.description", Rule::new(LongerThan(256), Warning, "too long")),
            ("result.h1_count", Rule::new(Equals(0.0), Error, "no h1")),
            ("result.h1_count", Rule::new(GreaterThan(1.0), Warning, "more than one h1")),
            ("result.is_canonical", Rule::new(Equals(0.0), Warning, "page is not canonical")),
            ("result.images_without_alt", Rule::new(GreaterThan(0.0), Warning, "images without alt")),
            ("result.dom_size", Rule::new(GreaterThan(3000.0), Error, "too big DOM")),
            ("result.dom_size", Rule::new(GreaterThan(1500.0), Warning, "big DOM")),
            ("result.text_ratio_percent", Rule::new(LessThan(10.0), Warning, "low text ratio")),
            ("result.request_time", Rule::new(GreaterThan(3000.0), Warning, "slow response, ms")),
        ];

        builtin
            .into_iter()
            .fold(Self::empty(), |validator, (path, rule)| {
                validator.with_rule(FieldPath::new(path), rule)
            })
    }
}

impl ResultValidator {
    /// A validator without rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule for a field path
    pub fn with_rule(mut self, field: FieldPath, rule: impl ValidationRule + 'static) -> Self {
        self.rules.push((field, Box::new(rule)));
        self
    }

    /// Validate the active fields of a record, keyed by short field name.
    ///
    /// When several rules of a field fire, the most severe finding is kept.
    /// Extracted fields of error and document records are not checked.
    pub fn validate(&self, record: &PageRecord, fields: &[FieldPath]) -> BTreeMap<String, Finding> {
        let skip_results = record.error.is_some() || record.is_document();
        let mut findings: BTreeMap<String, Finding> = BTreeMap::new();

        for field in fields {
            if skip_results && field.as_str().starts_with("result.") {
                continue;
            }

            let mut value: Option<String> = None;
            for (path, rule) in &self.rules {
                if path != field {
                    continue;
                }
                let value = value.get_or_insert_with(|| record.field(field));
                let Some(finding) = rule.check(value) else {
                    continue;
                };
                let name = field.short_name().to_string();
                match findings.get(&name) {
                    Some(existing) if existing.severity >= finding.severity => {}
                    _ => {
                        findings.insert(name, finding);
                    }
                }
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::PageVisit;
    use serde_json::{Map, Value, json};

    fn record(fields: Value) -> PageRecord {
        let fields: Map<String, Value> = serde_json::from_value(fields).unwrap();
        PageRecord::from_visit(PageVisit {
            url: "https://x.test/".to_string(),
            depth: 1,
            status: Some(200),
            fields,
            ..PageVisit::default()
        })
    }

    fn all_fields() -> Vec<FieldPath> {
        [
            "response.status",
            "result.mixed_content_url",
            "result.title",
            "result.description",
            "result.h1_count",
            "result.is_canonical",
            "result.images_without_alt",
            "result.dom_size",
            "result.text_ratio_percent",
            "result.request_time",
        ]
        .into_iter()
        .map(FieldPath::from)
        .collect()
    }

    fn healthy() -> Value {
        json!({
            "title": "Home",
            "description": "A page",
            "h1_count": 1,
            "is_canonical": 1,
            "images_without_alt": 0,
            "dom_size": 500,
            "text_ratio_percent": 25,
            "request_time": 300,
        })
    }

    #[test]
    fn test_healthy_page_has_no_findings() {
        let validator = ResultValidator::default();
        assert!(validator.validate(&record(healthy()), &all_fields()).is_empty());
    }

    #[test]
    fn test_empty_title_and_missing_h1_are_errors() {
        let mut fields = healthy();
        fields["title"] = json!("");
        fields["h1_count"] = json!(0);
        let findings = ResultValidator::default().validate(&record(fields), &all_fields());

        assert_eq!(findings["title"].severity, Severity::Error);
        assert_eq!(findings["h1_count"].severity, Severity::Error);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn test_warnings() {
        let mut fields = healthy();
        fields["title"] = json!("t".repeat(71));
        fields["description"] = json!("");
        fields["h1_count"] = json!(2);
        fields["is_canonical"] = json!(0);
        fields["images_without_alt"] = json!(3);
        fields["text_ratio_percent"] = json!(5);
        fields["request_time"] = json!(3500);
        let findings = ResultValidator::default().validate(&record(fields), &all_fields());

        for name in [
            "title",
            "description",
            "h1_count",
            "is_canonical",
            "images_without_alt",
            "text_ratio_percent",
            "request_time",
        ] {
            assert_eq!(findings[name].severity, Severity::Warning, "{}", name);
        }
        assert_eq!(findings["title"].message, "too long: 71 chars");
    }

    #[test]
    fn test_dom_size_keeps_most_severe() {
        let mut fields = healthy();
        fields["dom_size"] = json!(1600);
        let findings = ResultValidator::default().validate(&record(fields.clone()), &all_fields());
        assert_eq!(findings["dom_size"].severity, Severity::Warning);

        fields["dom_size"] = json!(3001);
        let findings = ResultValidator::default().validate(&record(fields), &all_fields());
        assert_eq!(findings["dom_size"].severity, Severity::Error);
        assert_eq!(findings["dom_size"].message, "too big DOM: 3001");
    }

    #[test]
    fn test_status_and_mixed_content() {
        let mut visit = PageVisit {
            url: "https://x.test/".to_string(),
            status: Some(404),
            mixed_content_url: Some("http://x.test/a.js".to_string()),
            ..PageVisit::default()
        };
        visit.fields = serde_json::from_value(healthy()).unwrap();
        let findings =
            ResultValidator::default().validate(&PageRecord::from_visit(visit), &all_fields());

        assert_eq!(findings["status"].severity, Severity::Error);
        assert_eq!(findings["status"].message, "bad status: 404");
        assert_eq!(findings["mixed_content_url"], Finding::error("mixed content"));
    }

    #[test]
    fn test_only_active_fields_are_checked() {
        let mut fields = healthy();
        fields["title"] = json!("");
        let findings = ResultValidator::default()
            .validate(&record(fields), &[FieldPath::from("response.url"), FieldPath::from("result.h1_count")]);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_document_and_error_records_skip_result_rules() {
        let validator = ResultValidator::default();
        let document = PageRecord::document("https://x.test/price.pdf");
        assert!(validator.validate(&document, &all_fields()).is_empty());

        let failed = record(json!({"error": "boom"}));
        assert!(validator.validate(&failed, &all_fields()).is_empty());
    }

    #[test]
    fn test_custom_rule() {
        struct NoHttp;
        impl ValidationRule for NoHttp {
            fn check(&self, value: &str) -> Option<Finding> {
                value.starts_with("http://").then(|| Finding::warning("insecure"))
            }
        }

        let validator = ResultValidator::empty().with_rule("result.canonical".into(), NoHttp);
        let findings = validator.validate(
            &record(json!({"canonical": "http://x.test/"})),
            &["result.canonical".into()],
        );
        assert_eq!(findings["canonical"], Finding::warning("insecure"));
    }
}
