//! JSON-lines record file
//!
//! The record file doubles as the state target, so a resumed run must add
//! to it rather than replace it: the records of units completed earlier are
//! only in that file.

use crate::extract::Record;
use crate::storage::StateStore;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// How an existing record file is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Start the file over
    Truncate,
    /// Keep earlier records and add after them
    Append,
}

impl WriteMode {
    /// Appends when the store already holds completed units for its target
    ///
    /// Must be decided before the run starts; a fresh start clears the store
    /// first and so truncates.
    pub fn for_store(store: &StateStore) -> Self {
        if store.completed_count() > 0 {
            Self::Append
        } else {
            Self::Truncate
        }
    }
}

/// Writes records to `path`, one JSON object per line
///
/// Returns the number of records written.
pub fn write_json_lines(path: &Path, records: &[Record], mode: WriteMode) -> io::Result<usize> {
    let file = match mode {
        WriteMode::Truncate => File::create(path)?,
        WriteMode::Append => OpenOptions::new().create(true).append(true).open(path)?,
    };

    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(records.len())
}
