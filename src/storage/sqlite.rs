use rusqlite::{Connection, Result};
use std::time::Duration;
use tracing::debug;

/// Connection to the host platform's record store.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let db = Self::prepare(Connection::open(path)?)?;
        debug!("Opened record store at {}", path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        // Every statement is `IF NOT EXISTS`, so reopening an existing store is a no-op.
        conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Record store schema applied");

        Ok(Database { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
