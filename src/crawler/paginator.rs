//! Next-page discovery
//!
//! Given a fetched document and the schema's pagination rule, the paginator
//! yields the unit for the next page or `None` when the branch ends:
//!
//! - `next_button`: follow the first element matching the selector, unless it
//!   has no link or is marked disabled
//! - `page_param`: substitute `current page + 1` into the URL template; the
//!   crawl ceiling is the only stop condition
//! - `infinite_scroll`: follow the link target the scroll trigger carries in
//!   one of its attributes, if the page exposes one
//!
//! A missing rule always ends pagination.

use crate::config::{PaginationKind, PaginationRule, PAGE_PLACEHOLDER};
use crate::extract::{attribute, HtmlDocument};
use crate::state::WorkUnit;
use crate::url::resolve_link;
use scraper::ElementRef;
use tracing::{debug, trace};
use url::Url;

/// Stand-in for the page number while a template is resolved to a URL
const PAGE_MARKER: &str = "trawlpagemarker";

/// Attributes a scroll trigger may carry its target in, by preference
const SCROLL_TARGET_ATTRS: &[&str] = &["href", "data-href", "data-url", "data-next"];

/// Follows one schema's pagination rule
#[derive(Debug, Clone, Default)]
pub struct Paginator {
    rule: Option<PaginationRule>,
}

impl Paginator {
    pub fn new(rule: Option<PaginationRule>) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> Option<&PaginationRule> {
        self.rule.as_ref()
    }

    /// Page ceiling declared by the rule itself
    pub fn max_pages(&self) -> Option<u32> {
        self.rule.as_ref().and_then(|r| r.max_pages)
    }

    /// The unit for the page after `current`, if there is one
    pub fn next(&self, doc: &HtmlDocument, current: &WorkUnit) -> Option<WorkUnit> {
        let rule = self.rule.as_ref()?;
        let base = doc.base_url().unwrap_or_else(|| current.url());

        let target = match rule.kind {
            PaginationKind::NextButton => next_button(doc, rule.selector.as_deref()?, base),
            PaginationKind::PageParam => next_page_param(rule.template.as_deref()?, current.url()),
            PaginationKind::InfiniteScroll => scroll_target(doc, rule.selector.as_deref()?, base),
        }?;

        let unit = WorkUnit::discovered(target, current).ok()?;
        if unit.key() == current.key() {
            debug!("Pagination on {} points back at itself", current.url());
            return None;
        }

        trace!("Next page after {}: {}", current.url(), unit.url());
        Some(unit)
    }
}

fn next_button(doc: &HtmlDocument, selector: &str, base: &Url) -> Option<Url> {
    let node = doc.select_first(selector)?;
    if is_disabled(node) {
        debug!("Next control '{}' is disabled", selector);
        return None;
    }

    // Selectors often target the wrapper (`li.next`) rather than the link
    let href = attribute(node, "href")
        .or_else(|| first_link_within(node).and_then(|a| attribute(a, "href")))?;

    resolve_link(href, base)
}

fn first_link_within(node: ElementRef<'_>) -> Option<ElementRef<'_>> {
    node.descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())
}

fn is_disabled(node: ElementRef<'_>) -> bool {
    let el = node.value();
    el.attr("disabled").is_some()
        || el
            .attr("aria-disabled")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        || el.classes().any(|c| c.eq_ignore_ascii_case("disabled"))
}

fn scroll_target(doc: &HtmlDocument, selector: &str, base: &Url) -> Option<Url> {
    let node = doc.select_first(selector)?;
    if is_disabled(node) {
        return None;
    }

    SCROLL_TARGET_ATTRS
        .iter()
        .find_map(|name| attribute(node, name))
        .and_then(|href| resolve_link(href, base))
}

/// Resolves `template` for page `page` against `current`
fn render_template(template: &str, page: &str, current: &Url) -> Option<Url> {
    current.join(&template.replace(PAGE_PLACEHOLDER, page)).ok()
}

/// Reads the page number of `current` through the template
///
/// A URL that does not match the template is page 1.
fn current_page(template: &str, current: &Url) -> u32 {
    let pattern = match render_template(template, PAGE_MARKER, current) {
        Some(url) => url.to_string(),
        None => return 1,
    };
    let (prefix, suffix) = match pattern.split_once(PAGE_MARKER) {
        Some(parts) => parts,
        None => return 1,
    };

    current
        .as_str()
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .and_then(|number| number.parse().ok())
        .unwrap_or(1)
}

fn next_page_param(template: &str, current: &Url) -> Option<Url> {
    let next = current_page(template, current).checked_add(1)?;
    render_template(template, &next.to_string(), current)
}
