//! File catalogue with dedup-aware blob lifecycle
//!
//! A blob stays on disk exactly as long as at least one catalogue row
//! points at its path (hash plus extension). Rows are created right after their blob is written
//! and deleted before the blob is considered for removal, so the survivor
//! check always runs against the post-delete state of the transaction.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::ids::{AssetId, FileId};
use crate::storage::traits::{BlobStore, FileStore};
use crate::storage::transaction::{Database, OpContext};
use crate::storage::types::{ContentHash, File, ListFilesQuery, ListPage, StoredFile, Upload};

pub struct FileLedger<F: FileStore, B: BlobStore> {
    db: Arc<Database>,
    store: Arc<F>,
    blobs: Arc<B>,
}

impl<F: FileStore, B: BlobStore> FileLedger<F, B> {
    pub fn new(db: Arc<Database>, store: Arc<F>, blobs: Arc<B>) -> Self {
        Self { db, store, blobs }
    }

    pub fn get(&self, ctx: &OpContext<'_>, id: FileId) -> Result<StoredFile> {
        self.db.read(ctx, |exec| self.store.get(exec, id))
    }

    pub fn get_by_public_path(&self, ctx: &OpContext<'_>, public_path: &str) -> Result<StoredFile> {
        self.db
            .read(ctx, |exec| self.store.get_by_public_path(exec, public_path))
    }

    pub fn list(&self, ctx: &OpContext<'_>, query: &ListFilesQuery) -> Result<ListPage<StoredFile>> {
        self.db.read(ctx, |exec| self.store.list(exec, query))
    }

    /// Open the bytes of a catalogued file.
    pub fn open(&self, ctx: &OpContext<'_>, id: FileId) -> Result<(StoredFile, Box<dyn Read + Send>)> {
        let file = self.get(ctx, id)?;
        let reader = self.blobs.open(&file)?;
        Ok((file, reader))
    }

    /// Store the upload's bytes and catalogue them.
    ///
    /// If the row cannot be written, the blob is removed again unless
    /// another row already references the same content.
    pub fn write_file(&self, ctx: &OpContext<'_>, mut upload: Upload) -> Result<StoredFile> {
        self.db.in_transaction(ctx, |ctx, exec| {
            let file = self.blobs.write_file(ctx, &mut upload)?;

            match self.store.create(exec, &file) {
                Ok(created) => {
                    debug!(id = %created.id, hash = %file.sha256, name = %file.name, "catalogued file");
                    Ok(created)
                }
                Err(e) => {
                    warn!(error = %e, hash = %file.sha256, "catalogue insert failed, removing blob");
                    Err(Error::join(e, self.remove_if_unreferenced(exec, &file)))
                }
            }
        })
    }

    /// Delete one row; its blob goes too if no other row shares the hash.
    pub fn delete(&self, ctx: &OpContext<'_>, id: FileId) -> Result<()> {
        self.db.in_transaction(ctx, |_, exec| {
            let file = self.store.get(exec, id)?;
            self.store.delete(exec, &[id])?;
            self.remove_if_unreferenced(exec, &file)
        })
    }

    /// Like `delete`, addressed by public path. A missing file is not an error.
    pub fn delete_by_public_path(&self, ctx: &OpContext<'_>, public_path: &str) -> Result<()> {
        self.db.in_transaction(ctx, |ctx, exec| {
            match self.store.get_by_public_path(exec, public_path) {
                Ok(file) => self.delete(ctx, file.id),
                Err(Error::FileNotFound) => {
                    debug!(public_path, "no file to delete");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Delete the asset's own row for `public_path`. Rows of other assets
    /// sharing the same content are left alone.
    pub fn delete_asset_file(
        &self,
        ctx: &OpContext<'_>,
        asset_id: AssetId,
        public_path: &str,
    ) -> Result<()> {
        self.db.in_transaction(ctx, |ctx, exec| {
            let owned = self
                .store
                .list(exec, &ListFilesQuery::for_asset(asset_id))?
                .items
                .into_iter()
                .find(|f| f.public_path == public_path);
            match owned {
                Some(file) => self.delete(ctx, file.id),
                None => {
                    debug!(asset_id = %asset_id, public_path, "asset has no such file");
                    Ok(())
                }
            }
        })
    }

    /// Delete every file of an asset with one survivor check for the batch.
    pub fn delete_all_for_asset(&self, ctx: &OpContext<'_>, asset_id: AssetId) -> Result<()> {
        self.db.in_transaction(ctx, |_, exec| {
            let files = self
                .store
                .list(exec, &ListFilesQuery::for_asset(asset_id))?
                .items;
            if files.is_empty() {
                return Ok(());
            }

            let ids: Vec<FileId> = files.iter().map(|f| f.id).collect();
            self.store.delete(exec, &ids)?;

            let mut candidates: Vec<File> = Vec::new();
            for stored in files {
                let file = stored.into_content().into_content();
                if !candidates.iter().any(|f| f.full_path == file.full_path) {
                    candidates.push(file);
                }
            }

            let hashes: BTreeSet<ContentHash> = candidates.iter().map(|f| f.sha256).collect();
            let survivors = self.store.list(exec, &ListFilesQuery::for_hashes(hashes))?;
            let referenced: BTreeSet<&Path> =
                survivors.items.iter().map(|f| f.full_path.as_path()).collect();

            for file in candidates.iter().filter(|f| !referenced.contains(f.full_path.as_path())) {
                self.blobs.remove_file(file)?;
            }
            debug!(asset_id = %asset_id, files = ids.len(), "deleted asset files");
            Ok(())
        })
    }

    fn remove_if_unreferenced(&self, exec: &rusqlite::Connection, file: &File) -> Result<()> {
        // same hash under another extension is a different blob
        let refs = self
            .store
            .list(exec, &ListFilesQuery::for_hashes([file.sha256]))?
            .items
            .iter()
            .filter(|f| f.full_path == file.full_path)
            .count();
        if refs > 0 {
            debug!(hash = %file.sha256, refs, "blob still referenced");
            return Ok(());
        }
        self.blobs.remove_file(file)
    }
}
