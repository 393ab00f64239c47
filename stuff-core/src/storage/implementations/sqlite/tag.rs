//! SQLite implementation of TagStore

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::SqliteStore;
use crate::error::{Error, OptionalRow, Result};
use crate::storage::helper::{limit_offset, now};
use crate::storage::traits::TagStore;
use crate::storage::types::list::ListPage;
use crate::storage::types::stored::{Editable, Stored};
use crate::storage::types::tag::{ListTagsQuery, StoredTag, Tag};

pub(crate) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag TEXT NOT NULL UNIQUE CHECK (tag <> ''),
            in_use INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tags_in_use ON tags(in_use, id);
        "#,
    )?;
    Ok(())
}

const TAG_COLUMNS: &str = "id, tag, in_use, created_at, updated_at";

fn map_tag(row: &Row<'_>) -> rusqlite::Result<StoredTag> {
    Ok(Stored::new(
        row.get(0)?,
        Editable::new(
            Tag {
                tag: row.get(1)?,
                in_use: row.get(2)?,
            },
            row.get(4)?,
        ),
        row.get(3)?,
    ))
}

fn set_in_use(exec: &Connection, tag: &str, in_use: bool) -> Result<()> {
    exec.execute(
        "UPDATE tags SET in_use = ?2, updated_at = ?3 WHERE tag = ?1",
        params![tag, in_use, now()],
    )?;
    Ok(())
}

impl TagStore for SqliteStore {
    fn list(&self, exec: &Connection, query: &ListTagsQuery) -> Result<ListPage<StoredTag>> {
        let total: u64 = exec.query_row(
            "SELECT COUNT(*) FROM tags WHERE (?1 IS NULL OR in_use = ?1)",
            params![query.in_use],
            |row| row.get(0),
        )?;

        let page_size = query.effective_page_size();
        let (limit, offset) = limit_offset(query.page, page_size);
        let mut stmt = exec.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE (?1 IS NULL OR in_use = ?1)
             ORDER BY id ASC LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(params![query.in_use, limit, offset], map_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ListPage::new(items, total, query.page, page_size))
    }

    fn get_unused(&self, exec: &Connection) -> Result<Option<String>> {
        let tag = exec
            .query_row(
                "SELECT tag FROM tags WHERE in_use = 0 ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tag)
    }

    fn get(&self, exec: &Connection, tag: &str) -> Result<StoredTag> {
        exec.query_row(
            &format!("SELECT {TAG_COLUMNS} FROM tags WHERE tag = ?1"),
            [tag],
            map_tag,
        )
        .or_not_found(Error::TagNotFound)
    }

    fn create(&self, exec: &Connection, tag: &str) -> Result<()> {
        let now = now();
        exec.execute(
            "INSERT INTO tags (tag, in_use, created_at, updated_at) VALUES (?1, 1, ?2, ?2)",
            params![tag, now],
        )?;
        Ok(())
    }

    fn mark_used(&self, exec: &Connection, tag: &str) -> Result<()> {
        set_in_use(exec, tag, true)
    }

    fn mark_unused(&self, exec: &Connection, tag: &str) -> Result<()> {
        set_in_use(exec, tag, false)
    }

    fn delete(&self, exec: &Connection, tag: &str) -> Result<()> {
        exec.execute("DELETE FROM tags WHERE tag = ?1 AND in_use = 0", [tag])?;
        Ok(())
    }

    fn next_sequential(&self, exec: &Connection) -> Result<i64> {
        let seq: Option<i64> = exec
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'tags'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.map_or(1, |seq| seq + 1))
    }
}
