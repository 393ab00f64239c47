//! SQLite implementation of FileStore

use rusqlite::{Connection, Row, params};
use std::path::PathBuf;

use super::SqliteStore;
use crate::error::{Error, OptionalRow, Result};
use crate::storage::helper::{limit_offset, now, rarray};
use crate::storage::ids::FileId;
use crate::storage::traits::FileStore;
use crate::storage::types::file::{File, ListFilesQuery, StoredFile};
use crate::storage::types::list::ListPage;
use crate::storage::types::stored::{Editable, Stored};

pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS asset_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asset_id INTEGER REFERENCES assets(id),
            name TEXT NOT NULL,
            filetype TEXT NOT NULL,
            sha256 BLOB NOT NULL,
            size_bytes INTEGER NOT NULL,
            public_path TEXT NOT NULL,
            full_path TEXT NOT NULL,
            created_by INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_asset_files_asset ON asset_files(asset_id);
        CREATE INDEX IF NOT EXISTS idx_asset_files_sha256 ON asset_files(sha256);
        CREATE INDEX IF NOT EXISTS idx_asset_files_public_path ON asset_files(public_path);
        "#,
    )?;
    Ok(())
}

const FILE_COLUMNS: &str =
    "id, asset_id, name, filetype, sha256, size_bytes, public_path, full_path, created_by, created_at, updated_at";

fn map_file(row: &Row<'_>) -> rusqlite::Result<StoredFile> {
    let full_path: String = row.get(7)?;
    Ok(Stored::new(
        row.get(0)?,
        Editable::new(
            File {
                asset_id: row.get(1)?,
                name: row.get(2)?,
                filetype: row.get(3)?,
                sha256: row.get(4)?,
                size_bytes: row.get(5)?,
                public_path: row.get(6)?,
                full_path: PathBuf::from(full_path),
                created_by: row.get(8)?,
            },
            row.get(10)?,
        ),
        row.get(9)?,
    ))
}

const LIST_FILTER: &str =
    "WHERE (?1 IS NULL OR asset_id = ?1) AND (?2 = 0 OR sha256 IN rarray(?3))";

impl FileStore for SqliteStore {
    fn get(&self, exec: &Connection, id: FileId) -> Result<StoredFile> {
        exec.query_row(
            &format!("SELECT {FILE_COLUMNS} FROM asset_files WHERE id = ?1"),
            [id],
            map_file,
        )
        .or_not_found(Error::FileNotFound)
    }

    fn get_by_public_path(&self, exec: &Connection, public_path: &str) -> Result<StoredFile> {
        exec.query_row(
            &format!(
                "SELECT {FILE_COLUMNS} FROM asset_files WHERE public_path = ?1 ORDER BY id LIMIT 1"
            ),
            [public_path],
            map_file,
        )
        .or_not_found(Error::FileNotFound)
    }

    fn list(&self, exec: &Connection, query: &ListFilesQuery) -> Result<ListPage<StoredFile>> {
        let filter_hashes = query.hashes.is_some();
        let hashes = rarray(query.hashes.iter().flatten().copied());

        let total: u64 = exec.query_row(
            &format!("SELECT COUNT(*) FROM asset_files {LIST_FILTER}"),
            params![query.asset_id, filter_hashes, hashes],
            |row| row.get(0),
        )?;

        let (limit, offset) = match query.page_size {
            Some(page_size) => limit_offset(query.page, page_size),
            None => (-1, 0),
        };

        let mut stmt = exec.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM asset_files {LIST_FILTER} ORDER BY id ASC LIMIT ?4 OFFSET ?5"
        ))?;
        let items = stmt
            .query_map(
                params![query.asset_id, filter_hashes, hashes, limit, offset],
                map_file,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ListPage::new(
            items,
            total,
            query.page,
            query.page_size.unwrap_or(0),
        ))
    }

    fn create(&self, exec: &Connection, file: &File) -> Result<StoredFile> {
        let now = now();
        exec.execute(
            "INSERT INTO asset_files
                (asset_id, name, filetype, sha256, size_bytes, public_path, full_path, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                file.asset_id,
                file.name,
                file.filetype,
                file.sha256,
                file.size_bytes,
                file.public_path,
                file.full_path.to_string_lossy(),
                file.created_by,
                now,
            ],
        )?;
        let id = FileId::new(exec.last_insert_rowid());
        Ok(Stored::new(id, Editable::new(file.clone(), now), now))
    }

    fn delete(&self, exec: &Connection, ids: &[FileId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        exec.execute(
            "DELETE FROM asset_files WHERE id IN rarray(?1)",
            [rarray(ids.iter().map(|id| id.get()))],
        )?;
        Ok(())
    }
}
