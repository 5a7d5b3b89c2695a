use anyhow::Result;
use rusqlite::Connection;

/// Creates the history schema if it does not exist yet
///
/// A single small table is enough: the store is bounded to a handful of rows,
/// so there is nothing to index.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS speed_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            download_mbps REAL NOT NULL,
            upload_mbps REAL NOT NULL
        )",
        [],
    )?;

    Ok(())
}
