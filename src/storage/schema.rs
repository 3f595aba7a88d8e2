//! Database schema definitions
//!
//! Every row is keyed by the output target, so several crawl targets can
//! share one state database without seeing each other's progress.

/// SQL schema for the state database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    items_extracted INTEGER NOT NULL DEFAULT 0,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    units_failed INTEGER NOT NULL DEFAULT 0,
    units_skipped INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_runs_target ON runs(target);

-- Per-target bookkeeping
CREATE TABLE IF NOT EXISTS targets (
    target TEXT PRIMARY KEY,
    last_updated TEXT NOT NULL
);

-- Completed work units (normalized URL); only grows within a run
CREATE TABLE IF NOT EXISTS completed_units (
    target TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    run_id INTEGER REFERENCES runs(id),
    PRIMARY KEY (target, url)
);

-- Units queued but not yet completed, for resuming pagination
CREATE TABLE IF NOT EXISTS frontier (
    target TEXT NOT NULL,
    url TEXT NOT NULL,
    fetch_url TEXT NOT NULL,
    depth INTEGER NOT NULL,
    discovered_from TEXT,
    PRIMARY KEY (target, url)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
