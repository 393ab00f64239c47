//! Asset create/update/delete as all-or-nothing operations
//!
//! Each operation runs in one transaction spanning the tag, file catalogue
//! and asset rows. Blob bytes are written and removed outside of it: a
//! rolled back create can leave an unreferenced blob behind, and a rolled
//! back delete can restore a file row whose blob is already gone.

use std::sync::Arc;
use tracing::info;

use crate::error::{DeleteStep, Error, Result};
use crate::ledger::FileLedger;
use crate::storage::ids::AssetId;
use crate::storage::traits::{AssetStore, StorageTypes};
use crate::storage::transaction::{Database, OpContext};
use crate::storage::types::{
    Asset, GetAssetQuery, ListAssetsQuery, ListPage, StoredAsset, StoredFile, Upload,
};
use crate::tags::TagAllocator;

pub struct AssetLifecycleManager<S: StorageTypes> {
    db: Arc<Database>,
    tags: Arc<TagAllocator<S::Tag>>,
    files: Arc<FileLedger<S::File, S::Blob>>,
    repo: Arc<S::Asset>,
}

impl<S: StorageTypes> AssetLifecycleManager<S> {
    pub fn new(
        db: Arc<Database>,
        tags: Arc<TagAllocator<S::Tag>>,
        files: Arc<FileLedger<S::File, S::Blob>>,
        repo: Arc<S::Asset>,
    ) -> Self {
        Self {
            db,
            tags,
            files,
            repo,
        }
    }

    pub fn tags(&self) -> &TagAllocator<S::Tag> {
        &self.tags
    }

    pub fn files(&self) -> &FileLedger<S::File, S::Blob> {
        &self.files
    }

    pub fn get(&self, ctx: &OpContext<'_>, query: &GetAssetQuery) -> Result<StoredAsset> {
        self.db.read(ctx, |exec| self.repo.get(exec, query))
    }

    pub fn list(&self, ctx: &OpContext<'_>, query: &ListAssetsQuery) -> Result<ListPage<StoredAsset>> {
        self.db.read(ctx, |exec| self.repo.list(exec, query))
    }

    /// Create an asset under an already chosen tag, optionally with an image.
    ///
    /// The image can only be named and owned once the asset row exists, so
    /// the row is written first and updated with the image URLs afterwards.
    pub fn create(
        &self,
        ctx: &OpContext<'_>,
        mut asset: Asset,
        image: Option<Upload>,
    ) -> Result<StoredAsset> {
        if asset.tag.is_empty() {
            return Err(Error::AssetMissingTag);
        }

        asset.parts_total_counter = parts_count(&asset);

        self.db.in_transaction(ctx, |ctx, exec| {
            self.tags.create_if_not_exists(ctx, &asset.tag)?;
            let id = self.repo.create(exec, &asset)?;

            if let Some(image) = image {
                let file = self.write_image(ctx, id, &asset.tag, image)?;
                asset.image_url = Some(file.public_path.clone());
                asset.thumbnail_url = Some(file.public_path.clone());
                self.repo.update(exec, id, &asset)?;
            }

            let created = self.repo.get(
                exec,
                &GetAssetQuery::by_id(id).with_parts().with_purchases(),
            )?;
            info!(id = %id, tag = %created.tag, "created asset");
            Ok(created)
        })
    }

    /// Overwrite an asset, replacing parts and purchases wholesale.
    ///
    /// A new image is stored before the row changes; the previous image and
    /// thumbnail are only deleted once the row points away from them.
    pub fn update(
        &self,
        ctx: &OpContext<'_>,
        id: AssetId,
        mut asset: Asset,
        image: Option<Upload>,
    ) -> Result<StoredAsset> {
        if asset.tag.is_empty() {
            return Err(Error::AssetMissingTag);
        }
        asset.parts_total_counter = parts_count(&asset);

        self.db.in_transaction(ctx, |ctx, exec| {
            let current = self.repo.get(exec, &GetAssetQuery::by_id(id))?;
            let old_image = current.image_url.clone().filter(|u| !u.is_empty());
            let old_thumbnail = current.thumbnail_url.clone().filter(|u| !u.is_empty());

            if current.tag != asset.tag {
                self.tags.create_if_not_exists(ctx, &asset.tag)?;
                self.tags.mark_tag_unused(ctx, &current.tag)?;
            }

            let replaced_image = match image {
                Some(image) => {
                    let file = self
                        .write_image(ctx, id, &asset.tag, image)
                        .map_err(|e| e.context(format!("error writing image file for asset {}", asset.tag)))?;
                    asset.image_url = Some(file.public_path.clone());
                    asset.thumbnail_url = Some(file.public_path.clone());
                    true
                }
                None => false,
            };

            self.repo
                .update(exec, id, &asset)
                .map_err(|e| e.context(format!("error updating asset {} in database", asset.tag)))?;

            if replaced_image {
                if let Some(old) = &old_image {
                    self.files
                        .delete_asset_file(ctx, id, old)
                        .map_err(|e| e.context(format!("error deleting old image for asset {}", asset.tag)))?;
                }
                if let Some(old) = old_thumbnail.filter(|t| Some(t) != old_image.as_ref()) {
                    self.files
                        .delete_asset_file(ctx, id, &old)
                        .map_err(|e| e.context(format!("error deleting old thumbnail for asset {}", asset.tag)))?;
                }
            }

            let updated = self.repo.get(
                exec,
                &GetAssetQuery::by_id(id)
                    .with_parts()
                    .with_purchases()
                    .with_children(),
            )?;
            info!(id = %id, tag = %updated.tag, replaced_image, "updated asset");
            Ok(updated)
        })
    }

    /// Attach files to an existing asset, all or none.
    pub fn add_files(
        &self,
        ctx: &OpContext<'_>,
        id: AssetId,
        uploads: Vec<Upload>,
    ) -> Result<Vec<StoredFile>> {
        self.db.in_transaction(ctx, |ctx, exec| {
            let asset = self.repo.get(exec, &GetAssetQuery::by_id(id))?;

            let mut added = Vec::with_capacity(uploads.len());
            for upload in uploads {
                let name = upload.name.clone();
                let file = self
                    .files
                    .write_file(ctx, upload.with_asset(id))
                    .map_err(|e| e.context(format!("error adding file {name} to asset {}", asset.tag)))?;
                added.push(file);
            }
            info!(id = %id, tag = %asset.tag, files = added.len(), "added asset files");
            Ok(added)
        })
    }

    /// Delete an asset: release its tag, sweep its files, drop the row.
    pub fn delete(&self, ctx: &OpContext<'_>, id: AssetId) -> Result<()> {
        self.db.in_transaction(ctx, |ctx, exec| {
            let asset = self.repo.get(exec, &GetAssetQuery::by_id(id))?;

            self.tags
                .mark_tag_unused(ctx, &asset.tag)
                .map_err(Error::delete_asset(DeleteStep::MarkTagUnused))?;
            self.files
                .delete_all_for_asset(ctx, id)
                .map_err(Error::delete_asset(DeleteStep::DeleteFiles))?;
            self.repo
                .delete(exec, id)
                .map_err(Error::delete_asset(DeleteStep::DeleteAsset))?;

            info!(id = %id, tag = %asset.tag, "deleted asset");
            Ok(())
        })
    }

    fn write_image(
        &self,
        ctx: &OpContext<'_>,
        id: AssetId,
        tag: &str,
        image: Upload,
    ) -> Result<StoredFile> {
        let mut image = image.with_asset(id);
        image.name = format!("{tag}_image{}", image.extension());
        self.files.write_file(ctx, image)
    }
}

fn parts_count(asset: &Asset) -> u32 {
    u32::try_from(asset.parts.len()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::implementations::{FsBlobStore, SqliteStorage, SqliteStore};
    use crate::storage::types::Part;
    use crate::tags::TagAlgorithm;
    use tempfile::TempDir;

    fn manager() -> (TempDir, AssetLifecycleManager<SqliteStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::in_memory().unwrap());
        let store = Arc::new(SqliteStore);
        let blobs = Arc::new(FsBlobStore::new(dir.path().join("files"), dir.path().join("tmp")));
        let tags = Arc::new(TagAllocator::new(db.clone(), store.clone(), TagAlgorithm::Nanoid));
        let files = Arc::new(FileLedger::new(db.clone(), store.clone(), blobs));
        (dir, AssetLifecycleManager::new(db, tags, files, store))
    }

    fn part(tag: &str, name: &str) -> Part {
        Part {
            tag: tag.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_requires_tag() {
        let (_dir, assets) = manager();
        let err = assets
            .create(&OpContext::background(), Asset::new("", "Nameless"), None)
            .unwrap_err();
        assert!(matches!(err, Error::AssetMissingTag));
    }

    #[test]
    fn test_duplicate_tag_rolls_back() {
        let (_dir, assets) = manager();
        let ctx = OpContext::background();
        assets.create(&ctx, Asset::new("DUP", "First"), None).unwrap();

        let err = assets.create(&ctx, Asset::new("DUP", "Second"), None);
        assert!(err.is_err());

        let page = assets.list(&ctx, &ListAssetsQuery::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "First");
    }

    #[test]
    fn test_update_moves_tag() {
        let (_dir, assets) = manager();
        let ctx = OpContext::background();
        let created = assets.create(&ctx, Asset::new("OLD1", "Box"), None).unwrap();
        let id = created.id;

        let mut asset = created.into_content().into_content();
        asset.tag = "NEW1".into();
        let updated = assets.update(&ctx, id, asset, None).unwrap();

        assert_eq!(updated.tag, "NEW1");
        assert!(!assets.tags().get(&ctx, "OLD1").unwrap().unwrap().in_use);
        assert!(assets.tags().get(&ctx, "NEW1").unwrap().unwrap().in_use);
    }

    #[test]
    fn test_parts_counter_follows_parts() {
        let (_dir, assets) = manager();
        let ctx = OpContext::background();

        let mut asset = Asset::new("KIT1", "Toolkit");
        asset.parts = vec![part("KIT1-1", "Hammer"), part("KIT1-2", "Saw")];
        asset.parts_total_counter = 99;
        let created = assets.create(&ctx, asset, None).unwrap();
        assert_eq!(created.parts_total_counter, 2);

        let id = created.id;
        let mut asset = created.into_content().into_content();
        asset.parts.pop();
        let updated = assets.update(&ctx, id, asset, None).unwrap();
        assert_eq!(updated.parts_total_counter, 1);
        assert_eq!(updated.parts.len(), 1);
    }

    #[test]
    fn test_add_files_to_missing_asset() {
        let (_dir, assets) = manager();
        let err = assets
            .add_files(
                &OpContext::background(),
                AssetId::new(3),
                vec![Upload::new("manual.pdf", "application/pdf", &b"pdf"[..])],
            )
            .unwrap_err();
        assert!(matches!(err, Error::AssetNotFound));
    }

    #[test]
    fn test_delete_missing_asset() {
        let (_dir, assets) = manager();
        let err = assets
            .delete(&OpContext::background(), AssetId::new(5))
            .unwrap_err();
        assert!(matches!(err, Error::AssetNotFound));
    }
}
