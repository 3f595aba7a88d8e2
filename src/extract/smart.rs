//! Repeating-structure detection
//!
//! Finds the most probable list of items on a page without any selectors.
//! Candidates are groups of sibling elements with the same tag and class
//! signature. Each group is summarised into a [`CandidateGroup`] and scored
//! by [`score`], which knows nothing about the DOM.

use crate::extract::document::{text, text_runs, HtmlDocument};
use crate::extract::Record;
use indexmap::IndexMap;
use scraper::ElementRef;
use std::collections::HashMap;
use tracing::debug;

/// Minimum number of similar siblings for a group to count as a list
pub const MIN_REPEAT: usize = 3;

/// Share of a group's items that must look like items
pub const MIN_QUALIFYING_RATIO: f64 = 0.6;

/// Text runs an item needs to look like an item (title + label, ...)
pub const MIN_RUNS_PER_ITEM: usize = 2;

/// Longest text run still considered a short label
pub const MAX_RUN_CHARS: usize = 300;

/// Plausible average text length of one item, in characters
pub const AVG_TEXT_RANGE: (f64, f64) = (3.0, 2000.0);

/// Below this text/markup ratio a group is mostly markup
pub const MIN_TEXT_DENSITY: f64 = 0.02;

/// At most this many synthesized fields per record
pub const MAX_FIELDS: usize = 8;

/// Tags that never form item groups
const IGNORED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "meta", "link", "br", "hr", "option",
    "source", "track", "input",
];

/// DOM-free summary of one sibling group
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    /// `tag.class1.class2` of the group's elements
    pub signature: String,
    /// Number of sibling elements in the group
    pub size: usize,
    /// Elements with at least [`MIN_RUNS_PER_ITEM`] short text runs
    pub qualifying: usize,
    /// Mean collapsed text length per element
    pub avg_text_len: f64,
    /// Total text length divided by total markup length
    pub text_density: f64,
}

/// Scores a candidate group; `None` rejects it
///
/// A group is accepted when it repeats at least [`MIN_REPEAT`] times, enough
/// of its members carry several short text runs, and its text is neither
/// trivially short, implausibly long, nor drowned in markup. The score is
/// the number of qualifying members.
pub fn score(group: &CandidateGroup) -> Option<usize> {
    if group.size < MIN_REPEAT || group.qualifying < MIN_REPEAT {
        return None;
    }

    let ratio = group.qualifying as f64 / group.size as f64;
    if ratio < MIN_QUALIFYING_RATIO {
        return None;
    }

    let (min_len, max_len) = AVG_TEXT_RANGE;
    if group.avg_text_len < min_len || group.avg_text_len > max_len {
        return None;
    }

    if group.text_density < MIN_TEXT_DENSITY {
        return None;
    }

    Some(group.qualifying)
}

/// Picks the best-scoring group; ties go to the earliest in the document
pub fn select_best(groups: &[CandidateGroup]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, group) in groups.iter().enumerate() {
        if let Some(s) = score(group) {
            if best.map_or(true, |(_, best_score)| s > best_score) {
                best = Some((index, s));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Detects the dominant repeating group and turns it into records
///
/// Returns `None` when no group passes [`score`].
pub fn extract_repeating(doc: &HtmlDocument) -> Option<Vec<Record>> {
    let groups = sibling_groups(doc.root());
    let summaries: Vec<CandidateGroup> = groups
        .iter()
        .map(|(signature, members)| summarize(signature, members))
        .collect();

    let best = select_best(&summaries)?;
    let (signature, members) = &groups[best];
    debug!(
        "Smart extraction picked '{}' ({} of {} siblings qualify)",
        signature, summaries[best].qualifying, summaries[best].size
    );

    Some(synthesize_records(members))
}

/// Collects sibling groups with at least [`MIN_REPEAT`] members
fn sibling_groups(root: ElementRef<'_>) -> Vec<(String, Vec<ElementRef<'_>>)> {
    let mut groups = Vec::new();

    for node in root.descendants() {
        let parent = match ElementRef::wrap(node) {
            Some(parent) => parent,
            None => continue,
        };

        let mut order: Vec<String> = Vec::new();
        let mut by_signature: HashMap<String, Vec<ElementRef<'_>>> = HashMap::new();

        for child in parent.children().filter_map(ElementRef::wrap) {
            if IGNORED_TAGS.contains(&child.value().name()) {
                continue;
            }
            let sig = signature(child);
            by_signature
                .entry(sig.clone())
                .or_insert_with(|| {
                    order.push(sig);
                    Vec::new()
                })
                .push(child);
        }

        for sig in order {
            if let Some(members) = by_signature.remove(&sig) {
                if members.len() >= MIN_REPEAT {
                    groups.push((sig, members));
                }
            }
        }
    }

    groups
}

fn signature(element: ElementRef<'_>) -> String {
    let mut classes: Vec<&str> = element.value().classes().collect();
    classes.sort_unstable();
    classes.dedup();

    let mut sig = element.value().name().to_string();
    for class in classes {
        sig.push('.');
        sig.push_str(class);
    }
    sig
}

/// Distinct short text runs of an item, in order
fn item_runs(element: ElementRef<'_>) -> Vec<String> {
    let mut seen = Vec::new();
    for run in text_runs(element) {
        if run.chars().count() <= MAX_RUN_CHARS && !seen.contains(&run) {
            seen.push(run);
        }
    }
    seen
}

fn summarize(signature: &str, members: &[ElementRef<'_>]) -> CandidateGroup {
    let mut qualifying = 0;
    let mut text_len = 0usize;
    let mut markup_len = 0usize;

    for member in members {
        if item_runs(*member).len() >= MIN_RUNS_PER_ITEM {
            qualifying += 1;
        }
        text_len += text(*member).chars().count();
        markup_len += member.html().len();
    }

    let size = members.len();
    CandidateGroup {
        signature: signature.to_string(),
        size,
        qualifying,
        avg_text_len: if size == 0 {
            0.0
        } else {
            text_len as f64 / size as f64
        },
        text_density: if markup_len == 0 {
            0.0
        } else {
            text_len as f64 / markup_len as f64
        },
    }
}

/// One record per non-empty member, keyed `field_1..field_n`
///
/// All records share the same key set; missing runs become "".
fn synthesize_records(members: &[ElementRef<'_>]) -> Vec<Record> {
    let runs: Vec<Vec<String>> = members
        .iter()
        .map(|m| item_runs(*m))
        .filter(|runs| !runs.is_empty())
        .collect();

    let width = runs
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .min(MAX_FIELDS);

    runs.into_iter()
        .map(|item| {
            let mut record: Record = IndexMap::with_capacity(width);
            let mut values = item.into_iter();
            for i in 1..=width {
                record.insert(format!("field_{}", i), values.next().unwrap_or_default());
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(size: usize, qualifying: usize, avg: f64, density: f64) -> CandidateGroup {
        CandidateGroup {
            signature: "div.card".to_string(),
            size,
            qualifying,
            avg_text_len: avg,
            text_density: density,
        }
    }

    #[test]
    fn test_score_accepts_plausible_group() {
        assert_eq!(score(&group(5, 5, 20.0, 0.3)), Some(5));
    }

    #[test]
    fn test_score_requires_repeat_count() {
        assert_eq!(score(&group(2, 2, 20.0, 0.3)), None);
    }

    #[test]
    fn test_score_requires_qualifying_ratio() {
        // 3 of 6 is below 60%
        assert_eq!(score(&group(6, 3, 20.0, 0.3)), None);
        assert_eq!(score(&group(5, 3, 20.0, 0.3)), Some(3));
    }

    #[test]
    fn test_score_rejects_implausible_text() {
        assert_eq!(score(&group(5, 5, 1.0, 0.3)), None);
        assert_eq!(score(&group(5, 5, 5000.0, 0.3)), None);
    }

    #[test]
    fn test_score_rejects_markup_heavy_group() {
        assert_eq!(score(&group(5, 5, 20.0, 0.001)), None);
    }

    #[test]
    fn test_select_best_prefers_larger_group() {
        let groups = vec![group(4, 4, 20.0, 0.3), group(9, 8, 20.0, 0.3)];
        assert_eq!(select_best(&groups), Some(1));
    }

    #[test]
    fn test_select_best_ties_keep_first() {
        let groups = vec![group(4, 4, 20.0, 0.3), group(4, 4, 30.0, 0.3)];
        assert_eq!(select_best(&groups), Some(0));
    }

    #[test]
    fn test_select_best_none() {
        let groups = vec![group(2, 2, 20.0, 0.3)];
        assert_eq!(select_best(&groups), None);
    }

    #[test]
    fn test_extract_cards() {
        let html = r#"
            <html><body>
              <div class="card"><h3>Alpha</h3><span>$10</span></div>
              <div class="card"><h3>Beta</h3><span>$20</span></div>
              <div class="card"><h3>Gamma</h3><span>$30</span></div>
              <div class="card"><h3>Delta</h3><span>$40</span></div>
              <div class="card"><h3>Epsilon</h3><span>$50</span></div>
            </body></html>
        "#;
        let doc = HtmlDocument::parse(html);
        let records = extract_repeating(&doc).unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[0]["field_1"], "Alpha");
        assert_eq!(records[0]["field_2"], "$10");
        assert_eq!(records[4]["field_1"], "Epsilon");
    }

    #[test]
    fn test_nav_bar_is_not_a_list() {
        let html = r#"
            <nav><ul>
              <li><a href="/">Home</a></li>
              <li><a href="/about">About</a></li>
              <li><a href="/contact">Contact</a></li>
            </ul></nav>
        "#;
        let doc = HtmlDocument::parse(html);
        assert!(extract_repeating(&doc).is_none());
    }

    #[test]
    fn test_records_share_key_set() {
        let html = r#"
            <ul>
              <li class="row"><b>One</b><i>a</i><em>x</em></li>
              <li class="row"><b>Two</b><i>b</i></li>
              <li class="row"><b>Three</b><i>c</i></li>
            </ul>
        "#;
        let doc = HtmlDocument::parse(html);
        let records = extract_repeating(&doc).unwrap();

        assert_eq!(records.len(), 3);
        for record in &records {
            let keys: Vec<_> = record.keys().cloned().collect();
            assert_eq!(keys, vec!["field_1", "field_2", "field_3"]);
        }
        assert_eq!(records[1]["field_3"], "");
    }

    #[test]
    fn test_field_count_is_capped() {
        let item = (1..=12)
            .map(|i| format!("<span>v{}</span>", i))
            .collect::<String>();
        let html = format!(
            "<div><p class=\"r\">{0}</p><p class=\"r\">{0}</p><p class=\"r\">{0}</p></div>",
            item
        );
        let doc = HtmlDocument::parse(&html);
        let records = extract_repeating(&doc).unwrap();
        assert_eq!(records[0].len(), MAX_FIELDS);
    }

    #[test]
    fn test_signature_sorts_classes() {
        let doc = HtmlDocument::parse(r#"<div class="b a b">x</div>"#);
        let div = doc.select_first("div").unwrap();
        assert_eq!(signature(div), "div.a.b");
    }
}
