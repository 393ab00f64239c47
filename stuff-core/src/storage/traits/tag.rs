//! TagStore trait

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::types::list::ListPage;
use crate::storage::types::tag::{ListTagsQuery, StoredTag};

pub trait TagStore: Send + Sync {
    fn list(&self, exec: &Connection, query: &ListTagsQuery) -> Result<ListPage<StoredTag>>;

    /// The oldest tag that is not in use, if any.
    fn get_unused(&self, exec: &Connection) -> Result<Option<String>>;

    /// Fails with `TagNotFound` when no row exists.
    fn get(&self, exec: &Connection, tag: &str) -> Result<StoredTag>;

    /// Insert a new in-use tag.
    fn create(&self, exec: &Connection, tag: &str) -> Result<()>;

    fn mark_used(&self, exec: &Connection, tag: &str) -> Result<()>;

    fn mark_unused(&self, exec: &Connection, tag: &str) -> Result<()>;

    /// Remove a tag row. Tags still in use are left alone.
    fn delete(&self, exec: &Connection, tag: &str) -> Result<()>;

    /// The value the insertion sequence of the tag table would hand out next.
    fn next_sequential(&self, exec: &Connection) -> Result<i64>;
}
