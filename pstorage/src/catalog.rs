use crate::config::StorageConfig;
use crate::errors::{Result, StorageError};
use crate::models::{CollectionStat, LastRun, RunOutcome, RunSource, TaskLog};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives the metadata of every completed run.
pub trait RunMetadataSink: Send + Sync {
    fn write_last_run(&self, last_run: &LastRun) -> Result<()>;
}

pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.catalog_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.catalog_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Other(anyhow::anyhow!("catalog connection lock poisoned")))
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS run_metadata (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                finished_at INTEGER NOT NULL,
                source TEXT NOT NULL,
                outcome TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS collection_stats (
                collection TEXT PRIMARY KEY,
                record_count INTEGER NOT NULL,
                origin TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS task_logs (
                task_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_name TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT,
                details TEXT
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn get_last_run(&self) -> Result<Option<LastRun>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT finished_at, source, outcome FROM run_metadata ORDER BY run_id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((finished_at, source, outcome)) = row else {
            return Ok(None);
        };
        let timestamp = Utc
            .timestamp_opt(finished_at, 0)
            .single()
            .ok_or_else(|| StorageError::InvalidArg(format!("invalid run timestamp {}", finished_at)))?;
        let source = RunSource::parse(&source)
            .ok_or_else(|| StorageError::InvalidArg(format!("unknown run source '{}'", source)))?;
        let outcome = RunOutcome::parse(&outcome)
            .ok_or_else(|| StorageError::InvalidArg(format!("unknown run outcome '{}'", outcome)))?;
        Ok(Some(LastRun {
            timestamp,
            source,
            outcome,
        }))
    }

    pub fn upsert_collection_stat(&self, stat: &CollectionStat) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO collection_stats (collection, record_count, origin, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection) DO UPDATE SET
                record_count = excluded.record_count,
                origin = excluded.origin,
                updated_at = excluded.updated_at",
            params![
                stat.collection,
                stat.record_count,
                stat.origin,
                stat.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn list_collection_stats(&self) -> Result<Vec<CollectionStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT collection, record_count, origin, updated_at FROM collection_stats ORDER BY collection",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CollectionStat {
                collection: row.get(0)?,
                record_count: row.get(1)?,
                origin: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn create_task_log(&self, task_name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let start_time = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO task_logs (task_name, start_time, status) VALUES (?1, ?2, 'RUNNING')",
            params![task_name, start_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_task_log_status(&self, task_id: i64, status: &str, details: &str) -> Result<()> {
        let conn = self.conn()?;
        let end_time = Utc::now().timestamp();
        conn.execute(
            "UPDATE task_logs SET status = ?1, details = ?2, end_time = ?3 WHERE task_id = ?4",
            params![status, details, end_time, task_id],
        )?;
        Ok(())
    }

    pub fn list_task_logs(&self, limit: usize) -> Result<Vec<TaskLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, task_name, start_time, end_time, status, details
             FROM task_logs ORDER BY task_id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(TaskLog {
                task_id: row.get(0)?,
                task_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                details: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

impl RunMetadataSink for Catalog {
    fn write_last_run(&self, last_run: &LastRun) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO run_metadata (finished_at, source, outcome) VALUES (?1, ?2, ?3)",
            params![
                last_run.timestamp.timestamp(),
                last_run.source.as_str(),
                last_run.outcome.as_str()
            ],
        )?;
        Ok(())
    }
}
