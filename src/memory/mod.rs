// src/memory/mod.rs — Attempt persistence

pub mod schema;
pub mod store;
pub mod store_server;

pub use store_server::{spawn_store_server, StoreHandle};

use rusqlite::Connection;
use std::path::Path;

/// Owns the SQLite connection until it is handed to the store server.
pub struct MemoryManager {
    pub store: store::Store,
}

impl MemoryManager {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        schema::run_migrations(&conn)?;

        Ok(Self {
            store: store::Store::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            store: store::Store::new(conn),
        })
    }

    /// Move the store onto its own task and return the async handle.
    pub fn spawn(self) -> StoreHandle {
        let (handle, _join) = spawn_store_server(self.store);
        handle
    }
}
