//! Queryable HTML document
//!
//! Extraction and pagination only need four things from a page: select all
//! matches of a CSS selector, select the first one, read a node's text and
//! read an attribute. [`HtmlDocument`] offers exactly that over a parsed
//! `scraper` tree.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;
use url::Url;

/// Elements whose text never counts as page content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that separate words when their text is joined
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// A parsed page
pub struct HtmlDocument {
    html: Html,
    base_url: Option<Url>,
}

impl HtmlDocument {
    /// Parses a full HTML document
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
            base_url: None,
        }
    }

    /// Sets the URL the document was fetched from
    ///
    /// Link and image fields are resolved against it.
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// The `<html>` element
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// All elements matching `css`, in document order
    ///
    /// An unparseable selector matches nothing.
    pub fn select_all(&self, css: &str) -> Vec<ElementRef<'_>> {
        match parse_selector(css) {
            Some(selector) => self.html.select(&selector).collect(),
            None => Vec::new(),
        }
    }

    /// The first element matching `css`
    pub fn select_first(&self, css: &str) -> Option<ElementRef<'_>> {
        let selector = parse_selector(css)?;
        self.html.select(&selector).next()
    }

    /// All elements matching a precompiled selector
    pub fn select(&self, selector: &Selector) -> Vec<ElementRef<'_>> {
        self.html.select(selector).collect()
    }

    /// Returns true if the document has no visible text at all
    pub fn is_blank(&self) -> bool {
        text(self.root()).is_empty()
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            debug!("Ignoring unparseable selector '{}': {:?}", css, e);
            None
        }
    }
}

/// First descendant of `node` matching a selector
pub fn select_within<'a>(node: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    node.select(selector).next()
}

/// Whitespace-collapsed, trimmed text content of a node
///
/// Script and style contents are skipped; block elements separate words.
pub fn text(node: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(node, &mut raw);
    collapse_whitespace(&raw)
}

/// Value of an attribute, trimmed; empty values count as absent
pub fn attribute<'a>(node: ElementRef<'a>, name: &str) -> Option<&'a str> {
    node.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Individual text nodes under `node`, collapsed, in document order
pub fn text_runs(node: ElementRef<'_>) -> Vec<String> {
    let mut runs = Vec::new();
    collect_runs(node, &mut runs);
    runs
}

fn collect_text(node: ElementRef<'_>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push(' ');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collect_runs(node: ElementRef<'_>, out: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                let run = collapse_whitespace(text);
                if !run.is_empty() {
                    out.push(run);
                }
            }
            Node::Element(element) => {
                if SKIPPED_ELEMENTS.contains(&element.name()) {
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_runs(child_element, out);
                }
            }
            _ => {}
        }
    }
}

/// Collapses runs of whitespace into single spaces and trims
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
