//! Restricted expression language for custom fields
//!
//! A custom field is a selector query with a chain of accessors, written in
//! the jQuery-like form site owners already use:
//!
//! ```text
//! $(".price").first().text().trim()
//! $('meta[name="author"]').attr("content")
//! $(".views-field-section a").length
//! ```
//!
//! Supported accessors: `text()`, `html()`, `attr(name)`, `length`, `trim()`,
//! `first()`, `last()`, `eq(n)`. Strings may be quoted with `'`, `"` or
//! backticks. Nothing else is evaluated.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::fmt;

use crate::extractor::error::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Accessor {
    Text,
    Html,
    Attr(String),
    Length,
    Trim,
    First,
    Last,
    Eq(usize),
}

/// A parsed custom field expression
#[derive(Clone)]
pub struct Expression {
    source: String,
    selector: Selector,
    accessors: Vec<Accessor>,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("accessors", &self.accessors)
            .finish()
    }
}

/// Intermediate evaluation state
enum Current<'a> {
    Selection(Vec<ElementRef<'a>>),
    Value(Value),
}

impl Expression {
    /// Parse an expression
    pub fn parse(source: &str) -> Result<Self, ExtractError> {
        let mut cursor = Cursor::new(source);
        cursor.skip_ws();
        cursor.expect('$')?;
        cursor.skip_ws();
        cursor.expect('(')?;
        cursor.skip_ws();
        let selector_source = cursor.string()?;
        cursor.skip_ws();
        cursor.expect(')')?;

        let selector = Selector::parse(&selector_source).map_err(|e| {
            ExtractError::Selector(format!("Failed to parse selector '{}': {}", selector_source, e))
        })?;

        let mut accessors = Vec::new();
        loop {
            cursor.skip_ws();
            if cursor.at_end() {
                break;
            }
            cursor.expect('.')?;
            cursor.skip_ws();
            let position = cursor.position;
            let name = cursor.ident()?;
            let accessor = match name.as_str() {
                "length" => Accessor::Length,
                "text" => cursor.call(|_| Ok(Accessor::Text))?,
                "html" => cursor.call(|_| Ok(Accessor::Html))?,
                "trim" => cursor.call(|_| Ok(Accessor::Trim))?,
                "first" => cursor.call(|_| Ok(Accessor::First))?,
                "last" => cursor.call(|_| Ok(Accessor::Last))?,
                "attr" => cursor.call(|c| c.string().map(Accessor::Attr))?,
                "eq" => cursor.call(|c| c.integer().map(Accessor::Eq))?,
                other => {
                    return Err(ExtractError::ExpressionParse {
                        position,
                        message: format!("unsupported accessor '{}'", other),
                    });
                }
            };
            accessors.push(accessor);
        }

        Ok(Self {
            source: source.to_string(),
            selector,
            accessors,
        })
    }

    /// The expression as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression against a parsed page
    pub fn evaluate(&self, document: &Html) -> Result<Value, ExtractError> {
        let mut current = Current::Selection(document.select(&self.selector).collect());

        for accessor in &self.accessors {
            current = match (accessor, current) {
                (Accessor::Text, Current::Selection(elements)) => Current::Value(Value::String(
                    elements
                        .iter()
                        .flat_map(|el| el.text())
                        .collect::<String>(),
                )),
                (Accessor::Html, Current::Selection(elements)) => Current::Value(
                    elements
                        .first()
                        .map(|el| Value::String(el.inner_html()))
                        .unwrap_or(Value::Null),
                ),
                (Accessor::Attr(name), Current::Selection(elements)) => Current::Value(
                    elements
                        .first()
                        .and_then(|el| el.value().attr(name))
                        .map(|value| Value::String(value.to_string()))
                        .unwrap_or(Value::Null),
                ),
                (Accessor::Length, Current::Selection(elements)) => {
                    Current::Value(Value::from(elements.len()))
                }
                (Accessor::Length, Current::Value(Value::String(s))) => {
                    Current::Value(Value::from(s.chars().count()))
                }
                (Accessor::Trim, Current::Value(Value::String(s))) => {
                    Current::Value(Value::String(s.trim().to_string()))
                }
                (Accessor::First, Current::Selection(elements)) => {
                    Current::Selection(elements.into_iter().take(1).collect())
                }
                (Accessor::Last, Current::Selection(mut elements)) => {
                    Current::Selection(elements.pop().into_iter().collect())
                }
                (Accessor::Eq(index), Current::Selection(elements)) => {
                    Current::Selection(elements.into_iter().skip(*index).take(1).collect())
                }
                (accessor, Current::Value(value)) => {
                    return Err(ExtractError::Evaluate(format!(
                        "{:?} cannot be applied to {}",
                        accessor, value
                    )));
                }
                (accessor, Current::Selection(_)) => {
                    return Err(ExtractError::Evaluate(format!(
                        "{:?} cannot be applied to a selection",
                        accessor
                    )));
                }
            };
        }

        match current {
            Current::Value(value) => Ok(value),
            Current::Selection(_) => Err(ExtractError::Evaluate(format!(
                "'{}' ends in a selection, add .text(), .attr() or .length",
                self.source
            ))),
        }
    }
}

struct Cursor<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> ExtractError {
        ExtractError::ExpressionParse {
            position: self.position,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ExtractError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn ident(&mut self) -> Result<String, ExtractError> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        if start == self.position {
            return Err(self.error("expected accessor name"));
        }
        Ok(self.source[start..self.position].to_string())
    }

    fn string(&mut self) -> Result<String, ExtractError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"' | '`')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn integer(&mut self) -> Result<usize, ExtractError> {
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.source[start..self.position]
            .parse()
            .map_err(|_| self.error("expected non-negative integer"))
    }

    /// Parse `( <args> )` around an accessor's arguments
    fn call<T>(
        &mut self,
        args: impl FnOnce(&mut Self) -> Result<T, ExtractError>,
    ) -> Result<T, ExtractError> {
        self.skip_ws();
        self.expect('(')?;
        self.skip_ws();
        let value = args(self)?;
        self.skip_ws();
        self.expect(')')?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<html><head>
        <meta name="author" content="Jane">
        </head><body>
        <div class="price"> 120 </div>
        <div class="price">90</div>
        <ul><li>one</li><li>two</li><li>three</li></ul>
        </body></html>"#;

    fn eval(source: &str) -> Result<Value, ExtractError> {
        let document = Html::parse_document(PAGE);
        Expression::parse(source)?.evaluate(&document)
    }

    #[test]
    fn test_text_and_trim() {
        assert_eq!(eval("$('.price').first().text().trim()").unwrap(), json!("120"));
        assert_eq!(eval("$(\".price\").text()").unwrap(), json!(" 120 90"));
    }

    #[test]
    fn test_attr_with_backticks() {
        assert_eq!(
            eval("$(`meta[name=\"author\"]`).attr(`content`)").unwrap(),
            json!("Jane")
        );
        assert_eq!(eval("$('meta').attr('missing')").unwrap(), Value::Null);
    }

    #[test]
    fn test_length_and_positions() {
        assert_eq!(eval("$('li').length").unwrap(), json!(3));
        assert_eq!(eval("$('li').eq(1).text()").unwrap(), json!("two"));
        assert_eq!(eval("$('li').last().text()").unwrap(), json!("three"));
        assert_eq!(eval("$('li').eq(7).text()").unwrap(), json!(""));
        assert_eq!(eval("$('li').first().text().length").unwrap(), json!(3));
    }

    #[test]
    fn test_html_accessor() {
        assert_eq!(eval("$('ul').html()").unwrap(), json!("<li>one</li><li>two</li><li>three</li>"));
        assert_eq!(eval("$('table').html()").unwrap(), Value::Null);
    }

    #[test]
    fn test_rejects_arbitrary_code() {
        assert!(matches!(
            Expression::parse("fetch('http://evil.test')"),
            Err(ExtractError::ExpressionParse { .. })
        ));
        assert!(matches!(
            Expression::parse("$('a').remove()"),
            Err(ExtractError::ExpressionParse { .. })
        ));
        assert!(matches!(
            Expression::parse("$('a').text(); alert(1)"),
            Err(ExtractError::ExpressionParse { .. })
        ));
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(
            Expression::parse("$('<<<').text()"),
            Err(ExtractError::Selector(_))
        ));
    }

    #[test]
    fn test_evaluation_errors() {
        assert!(matches!(eval("$('li')"), Err(ExtractError::Evaluate(_))));
        assert!(matches!(
            eval("$('li').text().first()"),
            Err(ExtractError::Evaluate(_))
        ));
        assert!(matches!(eval("$('li').trim()"), Err(ExtractError::Evaluate(_))));
    }
}
