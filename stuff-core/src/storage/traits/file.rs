//! FileStore trait for the file catalogue

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::ids::FileId;
use crate::storage::types::file::{File, ListFilesQuery, StoredFile};
use crate::storage::types::list::ListPage;

/// Catalogue rows describing stored blobs.
///
/// Rows only describe content; the bytes live in a `BlobStore`. Several rows
/// may point at the same hash.
pub trait FileStore: Send + Sync {
    /// Fails with `FileNotFound` when no row exists.
    fn get(&self, exec: &Connection, id: FileId) -> Result<StoredFile>;

    fn get_by_public_path(&self, exec: &Connection, public_path: &str) -> Result<StoredFile>;

    fn list(&self, exec: &Connection, query: &ListFilesQuery) -> Result<ListPage<StoredFile>>;

    fn create(&self, exec: &Connection, file: &File) -> Result<StoredFile>;

    /// Delete all listed rows in one statement. Missing ids are ignored.
    fn delete(&self, exec: &Connection, ids: &[FileId]) -> Result<()>;
}
