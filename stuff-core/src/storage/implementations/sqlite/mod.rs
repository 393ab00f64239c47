//! SQLite storage backend
//!
//! `SqliteStore` implements the row stores (`TagStore`, `FileStore`,
//! `AssetStore`). It holds no connection of its own: every call runs on the
//! executor it is handed, which the components take from the current
//! transaction scope.
//!
//! Trait implementations are in submodules:
//! - `asset` - AssetStore impl, parts, purchases and full-text search
//! - `file` - FileStore impl
//! - `tag` - TagStore impl

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::implementations::fs::FsBlobStore;
use crate::storage::traits::StorageTypes;

mod asset;
mod file;
mod tag;

/// Row store backed by SQLite. Stateless; share it via `Arc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteStore;

impl SqliteStore {
    pub fn new() -> Self {
        Self
    }
}

/// SQLite rows with blobs on the local filesystem.
pub struct SqliteStorage;

impl StorageTypes for SqliteStorage {
    type Asset = SqliteStore;
    type File = SqliteStore;
    type Tag = SqliteStore;
    type Blob = FsBlobStore;
}

/// Per-connection settings. Must run outside a transaction.
pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    rusqlite::vtab::array::load_module(conn)?;
    Ok(())
}

/// Create all tables, indexes and triggers that do not exist yet.
pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    tag::init_schema(conn)?;
    asset::init_schema(conn)?;
    file::init_schema(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        configure(&conn).unwrap();
        init_schema(&conn).unwrap();
        // running twice is harmless
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();

        for expected in ["asset_files", "asset_parts", "asset_purchases", "assets", "assets_fts", "tags"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }
}
