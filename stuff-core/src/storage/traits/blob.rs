//! BlobStore trait for content-addressed file bytes

use std::io::Read;

use crate::error::Result;
use crate::storage::transaction::OpContext;
use crate::storage::types::file::{File, Upload};

/// Storage for file bytes, addressed by SHA-256 of the content.
///
/// Writes and removals happen outside any database transaction.
pub trait BlobStore: Send + Sync {
    /// Store the upload's bytes and describe where they ended up.
    ///
    /// Partial writes are never visible at the final path.
    fn write_file(&self, ctx: &OpContext<'_>, upload: &mut Upload) -> Result<File>;

    /// Remove a blob and prune the shard directories it leaves empty.
    ///
    /// A blob that is already gone is not an error.
    fn remove_file(&self, file: &File) -> Result<()>;

    fn open(&self, file: &File) -> Result<Box<dyn Read + Send>>;
}
