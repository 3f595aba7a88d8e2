//! Record extraction
//!
//! Turns a parsed page into records. The cascade is:
//!
//! 1. Declared selector schema: one record per container (or one record for
//!    the whole page when the schema has fields but no container).
//! 2. Smart extraction: the dominant repeating sibling group (see [`smart`]).
//! 3. Page text: a single record with one `content` field.
//!
//! A schema miss is not an error; it only moves extraction down the cascade.

mod content;
mod document;
pub mod smart;

pub use content::{principal_text, MAX_CONTENT_CHARS};
pub use document::{attribute, collapse_whitespace, select_within, text, text_runs, HtmlDocument};

use crate::config::{split_field_selector, SelectorSchema};
use crate::ConfigError;
use indexmap::IndexMap;
use scraper::{ElementRef, Selector};
use tracing::{debug, trace};

/// Field name -> extracted value, in field order
pub type Record = IndexMap<String, String>;

/// Which step of the cascade produced the records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Schema,
    Smart,
    Content,
    /// Nothing extractable on the page
    Empty,
}

/// Records produced from one page, with the step that produced them
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub method: ExtractionMethod,
}

/// How a field's value is read from its matched element
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueSource {
    Text,
    /// Explicit `@attr` suffix; absent attribute yields ""
    Attribute(String),
    /// `link`/`url`/`href` fields: `href`, else text
    Link,
    /// `image`/`img`/`src`/`thumbnail` fields: `src`, `data-src`, else text
    Image,
}

impl ValueSource {
    fn for_field(name: &str, attr: Option<&str>) -> Self {
        if let Some(attr) = attr {
            return Self::Attribute(attr.to_string());
        }
        match name.to_ascii_lowercase().as_str() {
            "link" | "url" | "href" => Self::Link,
            "image" | "img" | "src" | "thumbnail" => Self::Image,
            _ => Self::Text,
        }
    }
}

struct FieldRule {
    name: String,
    selector: Selector,
    source: ValueSource,
}

/// Compiled extraction rules for one run
///
/// Built once from the run's schema (if any) and shared read-only by all
/// workers.
pub struct Extractor {
    container: Option<Selector>,
    fields: Vec<FieldRule>,
}

impl Extractor {
    /// Compiles a schema's selectors
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSelector` if any selector fails to parse.
    pub fn new(schema: Option<&SelectorSchema>) -> Result<Self, ConfigError> {
        let schema = match schema {
            Some(schema) => schema,
            None => return Ok(Self::heuristic()),
        };

        let container = schema
            .container_selector
            .as_deref()
            .map(compile)
            .transpose()?;

        let fields = schema
            .fields
            .iter()
            .map(|(name, spec)| {
                let (css, attr) = split_field_selector(spec);
                Ok(FieldRule {
                    name: name.clone(),
                    selector: compile(css)?,
                    source: ValueSource::for_field(name, attr),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { container, fields })
    }

    /// An extractor with no schema: smart extraction, then page text
    pub fn heuristic() -> Self {
        Self {
            container: None,
            fields: Vec::new(),
        }
    }

    /// Extracts the records of one page
    pub fn extract(&self, doc: &HtmlDocument) -> Vec<Record> {
        self.extract_detailed(doc).records
    }

    /// Extracts the records of one page and reports which step produced them
    pub fn extract_detailed(&self, doc: &HtmlDocument) -> Extraction {
        if let Some(records) = self.extract_with_schema(doc) {
            return Extraction {
                records,
                method: ExtractionMethod::Schema,
            };
        }

        if let Some(records) = smart::extract_repeating(doc) {
            debug!("Smart extraction found {} record(s)", records.len());
            return Extraction {
                records,
                method: ExtractionMethod::Smart,
            };
        }

        match principal_text(doc) {
            Some(content) => {
                debug!("Falling back to page text ({} chars)", content.chars().count());
                let mut record = Record::new();
                record.insert("content".to_string(), content);
                Extraction {
                    records: vec![record],
                    method: ExtractionMethod::Content,
                }
            }
            None => Extraction {
                records: Vec::new(),
                method: ExtractionMethod::Empty,
            },
        }
    }

    /// Step 1 of the cascade; `None` means fall through
    fn extract_with_schema(&self, doc: &HtmlDocument) -> Option<Vec<Record>> {
        if let Some(container) = &self.container {
            let containers = doc.select(container);
            if containers.is_empty() {
                debug!("Schema container matched nothing; trying smart extraction");
                return None;
            }
            trace!("Schema container matched {} node(s)", containers.len());

            return Some(
                containers
                    .into_iter()
                    .map(|node| self.record_from(node, doc))
                    .collect(),
            );
        }

        if self.fields.is_empty() {
            return None;
        }

        let record = self.record_from(doc.root(), doc);
        if record.values().all(|v| v.is_empty()) {
            debug!("Schema fields matched nothing; trying smart extraction");
            return None;
        }
        Some(vec![record])
    }

    /// One record with every schema field, "" where nothing matched
    fn record_from(&self, scope: ElementRef<'_>, doc: &HtmlDocument) -> Record {
        self.fields
            .iter()
            .map(|field| {
                let value = select_within(scope, &field.selector)
                    .map(|node| read_value(node, &field.source, doc))
                    .unwrap_or_default();
                (field.name.clone(), value)
            })
            .collect()
    }
}

fn compile(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

fn read_value(node: ElementRef<'_>, source: &ValueSource, doc: &HtmlDocument) -> String {
    match source {
        ValueSource::Text => text(node),
        ValueSource::Attribute(name) => attribute(node, name)
            .map(|v| resolve_if_url(name, v, doc))
            .unwrap_or_default(),
        ValueSource::Link => match attribute(node, "href") {
            Some(href) => absolutize(href, doc),
            None => text(node),
        },
        ValueSource::Image => match attribute(node, "src").or_else(|| attribute(node, "data-src")) {
            Some(src) => absolutize(src, doc),
            None => text(node),
        },
    }
}

fn resolve_if_url(attr: &str, value: &str, doc: &HtmlDocument) -> String {
    match attr {
        "href" | "src" | "data-src" => absolutize(value, doc),
        _ => value.to_string(),
    }
}

/// Resolves a link against the page URL when one is known
fn absolutize(value: &str, doc: &HtmlDocument) -> String {
    doc.base_url()
        .and_then(|base| base.join(value).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn item_schema() -> SelectorSchema {
        SelectorSchema::new("test", "example.com")
            .with_container(".item")
            .with_field("title", "h2")
            .with_field("price", ".price")
    }

    #[test]
    fn test_schema_extraction() {
        let html = r#"
            <div class="item"><h2>First</h2><span class="price">$1</span></div>
            <div class="item"><h2>Second</h2><span class="price">$2</span></div>
            <div class="item"><h2>Third</h2><span class="price">$3</span></div>
        "#;
        let extractor = Extractor::new(Some(&item_schema())).unwrap();
        let result = extractor.extract_detailed(&HtmlDocument::parse(html));

        assert_eq!(result.method, ExtractionMethod::Schema);
        assert_eq!(result.records.len(), 3);
        for record in &result.records {
            let keys: Vec<_> = record.keys().cloned().collect();
            assert_eq!(keys, vec!["title", "price"]);
        }
        assert_eq!(result.records[1]["title"], "Second");
        assert_eq!(result.records[2]["price"], "$3");
    }

    #[test]
    fn test_missing_field_is_empty_string() {
        let html = r#"
            <div class="item"><h2>Only title</h2></div>
            <div class="item"><span class="price">$9</span></div>
        "#;
        let extractor = Extractor::new(Some(&item_schema())).unwrap();
        let records = extractor.extract(&HtmlDocument::parse(html));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["price"], "");
        assert_eq!(records[1]["title"], "");
    }

    #[test]
    fn test_empty_containers_still_emit_records() {
        let html = r#"<div class="item"></div><div class="item"></div>"#;
        let extractor = Extractor::new(Some(&item_schema())).unwrap();
        let records = extractor.extract(&HtmlDocument::parse(html));
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_schema_miss_falls_back_to_smart() {
        let html = r#"
            <html><body>
              <div class="card"><h3>Alpha</h3><p>One</p></div>
              <div class="card"><h3>Beta</h3><p>Two</p></div>
              <div class="card"><h3>Gamma</h3><p>Three</p></div>
              <div class="card"><h3>Delta</h3><p>Four</p></div>
              <div class="card"><h3>Epsilon</h3><p>Five</p></div>
            </body></html>
        "#;
        let extractor = Extractor::new(Some(&item_schema())).unwrap();
        let result = extractor.extract_detailed(&HtmlDocument::parse(html));

        assert_eq!(result.method, ExtractionMethod::Smart);
        assert_eq!(result.records.len(), 5);
        assert!(result.records[0].contains_key("field_1"));
        assert!(result.records[0].contains_key("field_2"));
    }

    #[test]
    fn test_falls_back_to_content() {
        let html = "<html><body><main><p>A single article.</p></main></body></html>";
        let result = Extractor::heuristic().extract_detailed(&HtmlDocument::parse(html));

        assert_eq!(result.method, ExtractionMethod::Content);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0]["content"], "A single article.");
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let result = Extractor::heuristic().extract_detailed(&HtmlDocument::parse(""));
        assert_eq!(result.method, ExtractionMethod::Empty);
        assert!(result.records.is_empty());
    }

    #[test]
    fn test_fields_without_container() {
        let schema = SelectorSchema::new("detail", "example.com")
            .with_field("name", "h1")
            .with_field("sku", ".sku");
        let html = "<h1>Widget</h1><p>Details</p>";
        let records = Extractor::new(Some(&schema))
            .unwrap()
            .extract(&HtmlDocument::parse(html));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Widget");
        assert_eq!(records[0]["sku"], "");
    }

    #[test]
    fn test_link_and_image_fields() {
        let schema = SelectorSchema::new("s", "example.com")
            .with_container(".item")
            .with_field("link", "a")
            .with_field("image", "img")
            .with_field("alt", "img@alt")
            .with_field("missing", "img@title");
        let html = r#"
            <div class="item"><a href="/p/1">One</a><img data-src="/i/1.png" alt="first"></div>
        "#;
        let base = Url::parse("https://example.com/list").unwrap();
        let doc = HtmlDocument::parse(html).with_base_url(base);
        let records = Extractor::new(Some(&schema)).unwrap().extract(&doc);

        assert_eq!(records[0]["link"], "https://example.com/p/1");
        assert_eq!(records[0]["image"], "https://example.com/i/1.png");
        assert_eq!(records[0]["alt"], "first");
        assert_eq!(records[0]["missing"], "");
    }

    #[test]
    fn test_link_field_without_href_uses_text() {
        let schema = SelectorSchema::new("s", "example.com")
            .with_container(".item")
            .with_field("url", "span");
        let html = r#"<div class="item"><span>example.org</span></div>"#;
        let records = Extractor::new(Some(&schema))
            .unwrap()
            .extract(&HtmlDocument::parse(html));
        assert_eq!(records[0]["url"], "example.org");
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let schema = SelectorSchema::new("s", "example.com").with_field("x", "div[[");
        assert!(matches!(
            Extractor::new(Some(&schema)),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }
}
