//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CompletedUnit, CompletionStatus, FrontierRecord, RunRecord, RunStatus, RunTotals,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

const RUN_COLUMNS: &str = "id, target, started_at, finished_at, config_hash, status,
     items_extracted, pages_visited, units_failed, units_skipped";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        target: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            items_extracted: row.get::<_, i64>(6)? as u64,
            pages_visited: row.get::<_, i64>(7)? as u64,
            units_failed: row.get::<_, i64>(8)? as u64,
            units_skipped: row.get::<_, i64>(9)? as u64,
        },
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, target: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (target, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![target, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self, target: &str) -> StorageResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE target = ?1 ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        );
        let run = self
            .conn
            .query_row(&sql, params![target], run_from_row)
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, items_extracted = ?3,
             pages_visited = ?4, units_failed = ?5, units_skipped = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.items_extracted as i64,
                totals.pages_visited as i64,
                totals.units_failed as i64,
                totals.units_skipped as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Completed Set =====

    fn load_completed(&self, target: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM completed_units WHERE target = ?1")?;

        let urls = stmt
            .query_map(params![target], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(urls)
    }

    fn append_completed(
        &mut self,
        target: &str,
        run_id: Option<i64>,
        units: &[CompletedUnit],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO completed_units (target, url, status, completed_at, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut dequeue = tx.prepare("DELETE FROM frontier WHERE target = ?1 AND url = ?2")?;

            for unit in units {
                insert.execute(params![
                    target,
                    unit.key,
                    unit.status.to_db_string(),
                    unit.completed_at.to_rfc3339(),
                    run_id
                ])?;
                dequeue.execute(params![target, unit.key])?;
            }

            tx.execute(
                "INSERT OR REPLACE INTO targets (target, last_updated) VALUES (?1, ?2)",
                params![target, Utc::now().to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn count_completed(&self, target: &str) -> StorageResult<(u64, u64)> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM completed_units WHERE target = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![target], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut succeeded = 0;
        let mut failed = 0;
        for row in rows {
            let (status, count) = row?;
            match CompletionStatus::from_db_string(&status) {
                Some(CompletionStatus::Success) => succeeded += count as u64,
                Some(CompletionStatus::Failed) => failed += count as u64,
                None => {}
            }
        }

        Ok((succeeded, failed))
    }

    fn last_updated(&self, target: &str) -> StorageResult<Option<String>> {
        let ts = self
            .conn
            .query_row(
                "SELECT last_updated FROM targets WHERE target = ?1",
                params![target],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    // ===== Frontier =====

    fn save_frontier(&mut self, target: &str, units: &[FrontierRecord]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM frontier WHERE target = ?1", params![target])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO frontier (target, url, fetch_url, depth, discovered_from)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for unit in units {
                insert.execute(params![
                    target,
                    unit.key,
                    unit.url,
                    unit.depth,
                    unit.discovered_from
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_frontier(&self, target: &str) -> StorageResult<Vec<FrontierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, fetch_url, depth, discovered_from FROM frontier
             WHERE target = ?1 ORDER BY depth ASC, rowid ASC",
        )?;

        let records = stmt
            .query_map(params![target], |row| {
                Ok(FrontierRecord {
                    key: row.get(0)?,
                    url: row.get(1)?,
                    depth: row.get(2)?,
                    discovered_from: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Maintenance =====

    fn clear_target(&mut self, target: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM completed_units WHERE target = ?1",
            params![target],
        )?;
        tx.execute("DELETE FROM frontier WHERE target = ?1", params![target])?;
        tx.execute("DELETE FROM targets WHERE target = ?1", params![target])?;
        tx.commit()?;
        Ok(())
    }
}
