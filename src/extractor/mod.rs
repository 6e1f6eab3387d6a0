//! # Page Extractor Module
//!
//! Computes the per-page SEO fields from a loaded page: title, headings,
//! markup sizes, text ratio, image and link counts, meta tags, canonical
//! and schema.org types. Site-specific custom fields are evaluated with the
//! restricted expression language in `expression`.

mod error;
mod expression;

pub use error::ExtractError;
pub use expression::Expression;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::crawler::{ERROR_FIELD, PageSnapshot, decode_url};

static SCHEMA_ORG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://schema\.org/").expect("valid schema.org regex"));

/// Elements whose text never counts as visible
const INVISIBLE_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// A named custom field and its expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub name: String,
    pub expression: String,
}

impl CustomField {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Selectors used by the built-in fields, parsed once
#[derive(Debug, Clone)]
struct PageSelectors {
    title: Selector,
    headings: [Selector; 4],
    any: Selector,
    head: Selector,
    body: Selector,
    img: Selector,
    link: Selector,
    description: Selector,
    keywords: Selector,
    canonical: Selector,
    og_title: Selector,
    og_image: Selector,
    itemtype: Selector,
}

fn selector(source: &str) -> Result<Selector, ExtractError> {
    Selector::parse(source).map_err(|e| {
        ExtractError::Selector(format!("Failed to parse selector '{}': {}", source, e))
    })
}

impl PageSelectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            title: selector("title")?,
            headings: [
                selector("h1")?,
                selector("h2")?,
                selector("h3")?,
                selector("h4")?,
            ],
            any: selector("*")?,
            head: selector("head")?,
            body: selector("body")?,
            img: selector("img")?,
            link: selector("a[href]")?,
            description: selector(r#"meta[name="description"]"#)?,
            keywords: selector(r#"meta[name="keywords"]"#)?,
            canonical: selector(r#"link[rel="canonical"]"#)?,
            og_title: selector(r#"meta[property="og:title"]"#)?,
            og_image: selector(r#"meta[property="og:image"]"#)?,
            itemtype: selector("[itemtype]")?,
        })
    }
}

/// Per-page field extractor
#[derive(Debug)]
pub struct PageExtractor {
    selectors: PageSelectors,
    custom_fields: Vec<(String, Result<Expression, String>)>,
}

impl PageExtractor {
    /// Create an extractor. Custom field expressions are parsed here; a field
    /// whose expression does not parse is kept and always yields an empty
    /// value.
    pub fn new(custom_fields: &[CustomField]) -> Result<Self, ExtractError> {
        let custom_fields = custom_fields
            .iter()
            .map(|field| {
                let parsed = Expression::parse(&field.expression).map_err(|e| {
                    warn!(field = %field.name, expression = %field.expression, "Invalid custom field: {}", e);
                    e.to_string()
                });
                (field.name.clone(), parsed)
            })
            .collect();

        Ok(Self {
            selectors: PageSelectors::new()?,
            custom_fields,
        })
    }

    /// Names of the configured custom fields, in order
    pub fn custom_field_names(&self) -> Vec<&str> {
        self.custom_fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Extract all fields from a page. Never fails: an internal failure
    /// yields a map with a single `error` entry.
    pub fn extract(&self, page: &PageSnapshot<'_>) -> Map<String, Value> {
        match self.extract_fields(page) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(url = %page.url, "Page extraction failed: {}", e);
                let mut fields = Map::new();
                fields.insert(ERROR_FIELD.to_string(), Value::String(e.to_string()));
                fields
            }
        }
    }

    fn extract_fields(&self, page: &PageSnapshot<'_>) -> Result<Map<String, Value>, ExtractError> {
        let page_url = Url::parse(page.url)?;
        let domain = second_level_domain(page_url.host_str().unwrap_or_default());
        let document = Html::parse_document(page.html);
        let s = &self.selectors;
        let mut fields = Map::new();

        fields.insert(
            "request_time".to_string(),
            page.request_time_ms.map(Value::from).unwrap_or(Value::Null),
        );

        fields.insert(
            "title".to_string(),
            Value::String(document.select(&s.title).flat_map(|el| el.text()).collect()),
        );
        let h1: String = document.select(&s.headings[0]).flat_map(|el| el.text()).collect();
        fields.insert("h1".to_string(), Value::String(h1.trim().to_string()));
        for (level, heading) in s.headings.iter().enumerate() {
            fields.insert(
                format!("h{}_count", level + 1),
                Value::from(document.select(heading).count()),
            );
        }

        let head = document.select(&s.head).next();
        let body = document.select(&s.body).next();
        // Sizes count characters, not bytes
        let head_size = head.map(|el| el.inner_html().chars().count()).unwrap_or(0);
        let body_size = body.map(|el| el.inner_html().chars().count()).unwrap_or(0);
        let text_size = body.map(|el| visible_text(el).chars().count()).unwrap_or(0);
        fields.insert("dom_size".to_string(), Value::from(document.select(&s.any).count()));
        fields.insert("head_size".to_string(), Value::from(head_size));
        fields.insert("body_size".to_string(), Value::from(body_size));
        fields.insert("html_size".to_string(), Value::from(head_size + body_size));
        fields.insert(
            "text_ratio_percent".to_string(),
            Value::from(text_ratio_percent(text_size, body_size)),
        );

        let images: Vec<ElementRef<'_>> = document.select(&s.img).collect();
        let alt = |el: &ElementRef<'_>| el.value().attr("alt").map(str::to_string);
        fields.insert("images".to_string(), Value::from(images.len()));
        fields.insert(
            "images_without_alt".to_string(),
            Value::from(images.iter().filter(|el| alt(el).is_none()).count()),
        );
        fields.insert(
            "images_alt_empty".to_string(),
            Value::from(images.iter().filter(|el| alt(el).as_deref() == Some("")).count()),
        );
        fields.insert(
            "images_outer".to_string(),
            Value::from(
                images
                    .iter()
                    .filter_map(|el| el.value().attr("src"))
                    .filter(|src| src.starts_with("http") && !src.contains(domain.as_str()))
                    .count(),
            ),
        );

        let links: Vec<&str> = document
            .select(&s.link)
            .filter_map(|el| el.value().attr("href"))
            .filter(|href| !href.starts_with("javascript") && !href.starts_with('#'))
            .collect();
        let inner = links
            .iter()
            .filter(|href| href.starts_with('/') || href.contains(domain.as_str()))
            .count();
        fields.insert("links".to_string(), Value::from(links.len()));
        fields.insert("links_inner".to_string(), Value::from(inner));
        fields.insert("links_outer".to_string(), Value::from(links.len() - inner));

        let description = meta_content(&document, &s.description)
            .map(|d| d.replace("\r\n", " ").replace('\n', " "))
            .unwrap_or_default();
        fields.insert("description".to_string(), Value::String(description));
        fields.insert("keywords".to_string(), optional(meta_content(&document, &s.keywords)));

        let canonical = document
            .select(&s.canonical)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string);
        let is_canonical = match &canonical {
            Some(href) => Value::from(u8::from(*href == decode_url(page.url))),
            None => Value::String(String::new()),
        };
        fields.insert("canonical".to_string(), optional(canonical));
        fields.insert("is_canonical".to_string(), is_canonical);
        fields.insert("og_title".to_string(), optional(meta_content(&document, &s.og_title)));
        fields.insert("og_image".to_string(), optional(meta_content(&document, &s.og_image)));

        let mut schema_types: Vec<String> = Vec::new();
        for itemtype in document
            .select(&s.itemtype)
            .filter_map(|el| el.value().attr("itemtype"))
        {
            let name = SCHEMA_ORG_PREFIX.replace(itemtype, "").into_owned();
            if !schema_types.contains(&name) {
                schema_types.push(name);
            }
        }
        fields.insert("schema_types".to_string(), Value::String(schema_types.join(", ")));

        for (name, expression) in &self.custom_fields {
            let value = match expression {
                Ok(expression) => expression.evaluate(&document).unwrap_or_else(|e| {
                    warn!(
                        url = %page.url,
                        field = %name,
                        expression = %expression.source(),
                        "Custom field failed: {}",
                        e
                    );
                    Value::Null
                }),
                Err(_) => Value::Null,
            };
            fields.insert(name.clone(), value);
        }

        debug!(url = %page.url, fields = fields.len(), "Extracted page fields");
        Ok(fields)
    }
}

/// Share of visible text in the body markup, as a rounded percentage
pub fn text_ratio_percent(text_len: usize, markup_len: usize) -> u32 {
    if markup_len == 0 {
        return 0;
    }
    (text_len as f64 / markup_len as f64 * 100.0).round() as u32
}

/// Last two labels of a host name
fn second_level_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

fn optional(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

/// Rendered text of an element with whitespace collapsed, skipping script
/// and style content
fn visible_text(root: ElementRef<'_>) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| INVISIBLE_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}
