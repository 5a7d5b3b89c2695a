//! Bounded persistence for completed measurement runs
//!
//! Keeps the last few `{timestamp, download, upload}` summaries in a small
//! SQLite file. Only derived numbers are stored, never raw samples, and the
//! table is pruned on every append so it can never grow past capacity.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::storage::schema::create_tables;

/// Number of completed runs retained
pub const HISTORY_CAPACITY: usize = 5;

/// Summary of one completed measurement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub recorded_at: DateTime<Local>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// SQLite-backed history store, bounded to [`HISTORY_CAPACITY`] runs
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Opens (or creates) the history database at the given path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create history database directory")?;
            }
        }

        let conn = Connection::open(&db_path).context("Failed to open history database")?;

        // Enable WAL mode for better concurrent access (ignore errors for in-memory DBs)
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        create_tables(&conn).context("Failed to create history tables")?;

        debug!("History store ready at {}", db_path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends a completed run and evicts the oldest rows beyond capacity
    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO speed_history (recorded_at, download_mbps, upload_mbps)
             VALUES (?1, ?2, ?3)",
            params![
                record.recorded_at.to_rfc3339(),
                record.download_mbps,
                record.upload_mbps
            ],
        )
        .context("Failed to insert history record")?;

        conn.execute(
            "DELETE FROM speed_history WHERE id NOT IN (
                SELECT id FROM speed_history ORDER BY id DESC LIMIT ?1
            )",
            params![HISTORY_CAPACITY as i64],
        )
        .context("Failed to prune history")?;

        info!(
            "History record stored: down {:.2} / up {:.2} Mbit/s",
            record.download_mbps, record.upload_mbps
        );
        Ok(())
    }

    /// Returns the retained runs, oldest first
    pub fn recent(&self) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT recorded_at, download_mbps, upload_mbps
             FROM speed_history ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (recorded_at, download_mbps, upload_mbps) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .context("Invalid timestamp in history database")?
                .with_timezone(&Local);
            records.push(HistoryRecord {
                recorded_at,
                download_mbps,
                upload_mbps,
            });
        }
        Ok(records)
    }
}
