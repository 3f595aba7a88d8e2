//! Per-record cleanup between extraction and the output buffer
//!
//! Every page's records pass through a [`RecordPipeline`] before they are
//! appended:
//!
//! 1. Values are trimmed of surrounding whitespace
//! 2. Records already emitted in this run are dropped
//!
//! A record's identity is its `link` (or `url`) value when it has a
//! non-empty one, otherwise a SHA-256 fingerprint of all its fields. Listing
//! sites often repeat items across pages (featured rows, shifting offsets),
//! and those repeats are dropped here.

use crate::extract::Record;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

/// Fields whose value identifies a record on its own, by preference
const IDENTITY_FIELDS: &[&str] = &["link", "url"];

/// Records kept and dropped for one page
#[derive(Debug, Default)]
pub struct Processed {
    pub records: Vec<Record>,
    pub duplicates: usize,
}

/// Cleans records and drops repeats within a run
#[derive(Debug, Default)]
pub struct RecordPipeline {
    seen: Mutex<HashSet<String>>,
}

impl RecordPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one page's records through the pipeline, keeping their order
    pub fn process(&self, records: Vec<Record>) -> Processed {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut processed = Processed::default();
        for mut record in records {
            trim_values(&mut record);

            let id = fingerprint(&record);
            if !seen.insert(id) {
                processed.duplicates += 1;
                continue;
            }
            processed.records.push(record);
        }

        if processed.duplicates > 0 {
            debug!("Dropped {} duplicate record(s)", processed.duplicates);
        }
        processed
    }

    /// Number of distinct records seen so far
    pub fn seen_count(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn trim_values(record: &mut Record) {
    for value in record.values_mut() {
        let trimmed = value.trim();
        if trimmed.len() != value.len() {
            *value = trimmed.to_string();
        }
    }
}

/// Identity of a record within a run
fn fingerprint(record: &Record) -> String {
    if let Some(link) = IDENTITY_FIELDS
        .iter()
        .filter_map(|field| record.get(*field))
        .find(|value| !value.is_empty())
    {
        return format!("link:{}", link);
    }

    let mut hasher = Sha256::new();
    for (key, value) in record {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    format!("hash:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_values_are_trimmed() {
        let pipeline = RecordPipeline::new();
        let out = pipeline.process(vec![record(&[("title", "  Dune \n"), ("price", "£9")])]);

        assert_eq!(out.records[0]["title"], "Dune");
        assert_eq!(out.records[0]["price"], "£9");
        assert_eq!(
            out.records[0].keys().collect::<Vec<_>>(),
            vec!["title", "price"]
        );
    }

    #[test]
    fn test_duplicates_by_content_across_pages() {
        let pipeline = RecordPipeline::new();
        let first = pipeline.process(vec![
            record(&[("title", "Dune"), ("price", "£9")]),
            record(&[("title", "Emma"), ("price", "£7")]),
        ]);
        assert_eq!(first.records.len(), 2);

        // Whitespace differences do not make a record distinct
        let second = pipeline.process(vec![
            record(&[("title", " Dune "), ("price", "£9")]),
            record(&[("title", "Ulysses"), ("price", "£12")]),
        ]);
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0]["title"], "Ulysses");
        assert_eq!(pipeline.seen_count(), 3);
    }

    #[test]
    fn test_duplicates_by_link() {
        let pipeline = RecordPipeline::new();
        let out = pipeline.process(vec![
            record(&[("title", "Dune"), ("link", "https://example.com/dune")]),
            record(&[("title", "Dune (paperback)"), ("link", "https://example.com/dune")]),
            record(&[("title", "Dune"), ("url", "https://example.com/dune-2")]),
        ]);

        assert_eq!(out.duplicates, 1);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1]["url"], "https://example.com/dune-2");
    }

    #[test]
    fn test_empty_link_falls_back_to_content() {
        let pipeline = RecordPipeline::new();
        let out = pipeline.process(vec![
            record(&[("title", "A"), ("link", "")]),
            record(&[("title", "B"), ("link", "")]),
        ]);
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn test_same_values_under_different_keys_are_distinct() {
        let pipeline = RecordPipeline::new();
        let out = pipeline.process(vec![
            record(&[("field_1", "x"), ("field_2", "")]),
            record(&[("field_1", ""), ("field_2", "x")]),
        ]);
        assert_eq!(out.duplicates, 0);
    }
}
