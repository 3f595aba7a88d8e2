use crate::extract::document::{text, HtmlDocument};

/// Longest `content` value emitted by the page-text fallback, in characters
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Regions tried in order when looking for the page's main text
const MAIN_REGIONS: &[&str] = &["main", "article", "[role='main']", "#content", "body"];

/// Returns the page's principal text block
///
/// The first main-content region with any text wins; the whole document is
/// the last resort. Returns `None` when the page has no text at all.
pub fn principal_text(doc: &HtmlDocument) -> Option<String> {
    let block = MAIN_REGIONS
        .iter()
        .filter_map(|css| doc.select_first(css))
        .map(text)
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| text(doc.root()));

    if block.is_empty() {
        return None;
    }

    Some(truncate_chars(&block, MAX_CONTENT_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}
