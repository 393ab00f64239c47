//! End-to-end asset lifecycle against SQLite and a temp blob root

use rusqlite::Connection;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stuff_core::storage::implementations::{FsBlobStore, SqliteStore};
use stuff_core::storage::traits::{AssetStore, FileStore, StorageTypes, TagStore};
use stuff_core::{
    Asset, AssetId, AssetLifecycleManager, Database, DeleteStep, Error, File, FileId, FileLedger,
    GetAssetQuery, ListAssetsQuery, ListFilesQuery, ListPage, ListTagsQuery, OpContext, Result,
    StoredAsset, StoredFile, StoredTag, TagAlgorithm, TagAllocator, Upload,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// SqliteStore with switchable failures.
#[derive(Default)]
struct FaultyStore {
    inner: SqliteStore,
    fail_file_create: AtomicBool,
    fail_asset_delete: AtomicBool,
}

fn injected() -> Error {
    Error::Io(std::io::Error::other("injected failure"))
}

impl FileStore for FaultyStore {
    fn get(&self, exec: &Connection, id: FileId) -> Result<StoredFile> {
        FileStore::get(&self.inner, exec, id)
    }

    fn get_by_public_path(&self, exec: &Connection, public_path: &str) -> Result<StoredFile> {
        self.inner.get_by_public_path(exec, public_path)
    }

    fn list(&self, exec: &Connection, query: &ListFilesQuery) -> Result<ListPage<StoredFile>> {
        FileStore::list(&self.inner, exec, query)
    }

    fn create(&self, exec: &Connection, file: &File) -> Result<StoredFile> {
        if self.fail_file_create.load(Ordering::SeqCst) {
            return Err(injected());
        }
        FileStore::create(&self.inner, exec, file)
    }

    fn delete(&self, exec: &Connection, ids: &[FileId]) -> Result<()> {
        FileStore::delete(&self.inner, exec, ids)
    }
}

impl AssetStore for FaultyStore {
    fn get(&self, exec: &Connection, query: &GetAssetQuery) -> Result<StoredAsset> {
        AssetStore::get(&self.inner, exec, query)
    }

    fn list(&self, exec: &Connection, query: &ListAssetsQuery) -> Result<ListPage<StoredAsset>> {
        AssetStore::list(&self.inner, exec, query)
    }

    fn create(&self, exec: &Connection, asset: &Asset) -> Result<AssetId> {
        AssetStore::create(&self.inner, exec, asset)
    }

    fn update(&self, exec: &Connection, id: AssetId, asset: &Asset) -> Result<()> {
        self.inner.update(exec, id, asset)
    }

    fn delete(&self, exec: &Connection, id: AssetId) -> Result<()> {
        if self.fail_asset_delete.load(Ordering::SeqCst) {
            return Err(injected());
        }
        AssetStore::delete(&self.inner, exec, id)
    }
}

impl TagStore for FaultyStore {
    fn list(&self, exec: &Connection, query: &ListTagsQuery) -> Result<ListPage<StoredTag>> {
        TagStore::list(&self.inner, exec, query)
    }

    fn get_unused(&self, exec: &Connection) -> Result<Option<String>> {
        self.inner.get_unused(exec)
    }

    fn get(&self, exec: &Connection, tag: &str) -> Result<StoredTag> {
        TagStore::get(&self.inner, exec, tag)
    }

    fn create(&self, exec: &Connection, tag: &str) -> Result<()> {
        TagStore::create(&self.inner, exec, tag)
    }

    fn mark_used(&self, exec: &Connection, tag: &str) -> Result<()> {
        self.inner.mark_used(exec, tag)
    }

    fn mark_unused(&self, exec: &Connection, tag: &str) -> Result<()> {
        self.inner.mark_unused(exec, tag)
    }

    fn delete(&self, exec: &Connection, tag: &str) -> Result<()> {
        TagStore::delete(&self.inner, exec, tag)
    }

    fn next_sequential(&self, exec: &Connection) -> Result<i64> {
        self.inner.next_sequential(exec)
    }
}

struct FaultyStorage;

impl StorageTypes for FaultyStorage {
    type Asset = FaultyStore;
    type File = FaultyStore;
    type Tag = FaultyStore;
    type Blob = FsBlobStore;
}

struct Harness {
    _dir: TempDir,
    root: std::path::PathBuf,
    store: Arc<FaultyStore>,
    assets: AssetLifecycleManager<FaultyStorage>,
}

impl Harness {
    fn new(algorithm: TagAlgorithm) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("files");
        let db = Arc::new(Database::in_memory().unwrap());
        let store = Arc::new(FaultyStore::default());
        let blobs = Arc::new(FsBlobStore::new(&root, dir.path().join("tmp")));

        let tags = Arc::new(TagAllocator::new(db.clone(), store.clone(), algorithm));
        let files = Arc::new(FileLedger::new(db.clone(), store.clone(), blobs));
        let assets = AssetLifecycleManager::new(db, tags, files, store.clone());

        Self {
            _dir: dir,
            root,
            store,
            assets,
        }
    }

    fn file_rows(&self, asset_id: AssetId) -> u64 {
        self.assets
            .files()
            .list(&OpContext::background(), &ListFilesQuery::for_asset(asset_id))
            .unwrap()
            .total
    }

    fn blob_root_is_empty(&self) -> bool {
        is_empty_dir(&self.root)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn image(name: &str, data: &'static [u8]) -> Upload {
    Upload::new(name, "image/jpeg", data)
}

fn read_blob(harness: &Harness, public_path: &str) -> Vec<u8> {
    let ctx = OpContext::background();
    let file = harness
        .assets
        .files()
        .get_by_public_path(&ctx, public_path)
        .unwrap();
    let (_, mut reader) = harness.assets.files().open(&ctx, file.id).unwrap();
    let mut data = Vec::new();
    reader.read_to_end(&mut data).unwrap();
    data
}

#[test]
fn create_with_image_then_delete() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let created = h
        .assets
        .create(
            &ctx,
            Asset::new("ABC123", "Label printer"),
            Some(image("photo.jpg", b"0123456789")),
        )
        .unwrap();

    assert_eq!(created.tag, "ABC123");
    let image_url = created.image_url.clone().unwrap();
    assert!(image_url.ends_with(".jpg"));
    assert_eq!(created.thumbnail_url.as_deref(), Some(image_url.as_str()));
    assert!(h.assets.tags().get(&ctx, "ABC123").unwrap().unwrap().in_use);
    assert_eq!(read_blob(&h, &image_url), b"0123456789");

    let file = h.assets.files().get_by_public_path(&ctx, &image_url).unwrap();
    assert_eq!(file.name, "ABC123_image.jpg");
    assert_eq!(file.asset_id, Some(created.id));
    assert_eq!(file.size_bytes, 10);
    let blob_path = file.full_path.clone();
    assert!(blob_path.exists());

    h.assets.delete(&ctx, created.id).unwrap();

    assert!(!h.assets.tags().get(&ctx, "ABC123").unwrap().unwrap().in_use);
    assert_eq!(h.file_rows(created.id), 0);
    assert!(!blob_path.exists());
    assert!(h.blob_root_is_empty());
    assert!(matches!(
        h.assets.get(&ctx, &GetAssetQuery::by_id(created.id)),
        Err(Error::AssetNotFound)
    ));
}

#[test]
fn update_replaces_image_without_leaking() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let created = h
        .assets
        .create(&ctx, Asset::new("CAM001", "Camera"), Some(image("old.png", b"old image")))
        .unwrap();
    let old_url = created.image_url.clone().unwrap();
    let old_path = h.assets.files().get_by_public_path(&ctx, &old_url).unwrap().full_path.clone();

    let mut asset = created.into_content().into_content();
    asset.notes = "new lens".into();
    let id = h.assets.get(&ctx, &GetAssetQuery::by_tag("CAM001")).unwrap().id;
    let updated = h
        .assets
        .update(&ctx, id, asset, Some(image("new.png", b"new image")))
        .unwrap();

    let new_url = updated.image_url.clone().unwrap();
    assert_ne!(new_url, old_url);
    assert_eq!(updated.notes, "new lens");
    assert!(!old_path.exists());
    assert_eq!(read_blob(&h, &new_url), b"new image");
    assert_eq!(h.file_rows(id), 1);
}

#[test]
fn update_keeps_image_shared_with_another_asset() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let a = h
        .assets
        .create(&ctx, Asset::new("A1", "Chair"), Some(image("c.png", b"chair photo")))
        .unwrap();
    let b = h
        .assets
        .create(&ctx, Asset::new("B1", "Chair"), Some(image("c.png", b"chair photo")))
        .unwrap();
    assert_eq!(a.image_url, b.image_url);

    let shared_path = h
        .assets
        .files()
        .get_by_public_path(&ctx, a.image_url.as_deref().unwrap())
        .unwrap()
        .full_path
        .clone();

    let a_id = a.id;
    let asset = a.into_content().into_content();
    h.assets
        .update(&ctx, a_id, asset, Some(image("d.png", b"different photo")))
        .unwrap();

    assert!(shared_path.exists());
    assert_eq!(h.file_rows(b.id), 1);
    assert_eq!(read_blob(&h, b.image_url.as_deref().unwrap()), b"chair photo");
}

#[test]
fn failed_file_insert_rolls_back_create() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();
    h.store.fail_file_create.store(true, Ordering::SeqCst);

    let err = h
        .assets
        .create(&ctx, Asset::new("ROLL01", "Lamp"), Some(image("lamp.jpg", b"lamp")))
        .unwrap_err();

    assert!(matches!(err, Error::Io(_)));
    assert!(h.assets.tags().get(&ctx, "ROLL01").unwrap().is_none());
    assert!(matches!(
        h.assets.get(&ctx, &GetAssetQuery::by_tag("ROLL01")),
        Err(Error::AssetNotFound)
    ));
    assert!(h.blob_root_is_empty());
}

#[test]
fn failed_file_insert_keeps_blob_referenced_elsewhere() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let first = h
        .assets
        .create(&ctx, Asset::new("KEEP01", "Lamp"), Some(image("lamp.jpg", b"lamp")))
        .unwrap();

    h.store.fail_file_create.store(true, Ordering::SeqCst);
    h.assets
        .create(&ctx, Asset::new("KEEP02", "Lamp"), Some(image("lamp.jpg", b"lamp")))
        .unwrap_err();

    assert_eq!(read_blob(&h, first.image_url.as_deref().unwrap()), b"lamp");
}

#[test]
fn failed_asset_delete_restores_everything() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let created = h
        .assets
        .create(&ctx, Asset::new("DEL001", "Table"), Some(image("t.png", b"table")))
        .unwrap();
    h.store.fail_asset_delete.store(true, Ordering::SeqCst);

    let err = h.assets.delete(&ctx, created.id).unwrap_err();
    assert!(matches!(
        err,
        Error::DeleteAsset {
            step: DeleteStep::DeleteAsset,
            ..
        }
    ));

    assert!(h.assets.tags().get(&ctx, "DEL001").unwrap().unwrap().in_use);
    assert_eq!(h.file_rows(created.id), 1);
    assert!(h.assets.get(&ctx, &GetAssetQuery::by_id(created.id)).is_ok());
}

#[test]
fn tag_recycling_for_every_algorithm() {
    for algorithm in [
        TagAlgorithm::Nanoid,
        TagAlgorithm::Ksuid,
        TagAlgorithm::Uuid,
        TagAlgorithm::Sequential,
    ] {
        let h = Harness::new(algorithm);
        let ctx = OpContext::background();
        let tags = h.assets.tags();

        let tag = tags.get_next(&ctx).unwrap();
        let created = h.assets.create(&ctx, Asset::new(&tag, "Thing"), None).unwrap();
        assert_ne!(tags.get_next(&ctx).unwrap(), tag, "{algorithm}");

        h.assets.delete(&ctx, created.id).unwrap();
        assert_eq!(tags.get_next(&ctx).unwrap(), tag, "{algorithm}");

        // still reserved by nothing, so it can be removed for good
        tags.delete(&ctx, &tag).unwrap();
        assert!(tags.get(&ctx, &tag).unwrap().is_none(), "{algorithm}");
    }
}

#[test]
fn cancelled_create_persists_nothing() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let token = CancellationToken::new();
    token.cancel();
    let ctx = OpContext::with_cancellation(token);

    let err = h
        .assets
        .create(&ctx, Asset::new("CXL001", "Fan"), Some(image("fan.jpg", b"fan")))
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let page = h
        .assets
        .list(&OpContext::background(), &ListAssetsQuery::default())
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(h.blob_root_is_empty());
}

#[test]
fn outer_transaction_spans_several_creates() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::in_memory().unwrap());
    let store = Arc::new(SqliteStore);
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("files"), dir.path().join("tmp")));
    let tags = Arc::new(TagAllocator::new(db.clone(), store.clone(), TagAlgorithm::Sequential));
    let files = Arc::new(FileLedger::new(db.clone(), store.clone(), blobs));
    let assets: AssetLifecycleManager<stuff_core::storage::SqliteStorage> =
        AssetLifecycleManager::new(db.clone(), tags, files, store);

    let result: Result<()> = db.in_transaction(&OpContext::background(), |ctx, _| {
        let first = assets.tags().get_next(ctx)?;
        assets.create(ctx, Asset::new(&first, "One"), None)?;
        let second = assets.tags().get_next(ctx)?;
        assert_eq!(second, "000002");
        assets.create(ctx, Asset::new(&second, "Two"), None)?;
        Err(Error::InvalidTag)
    });
    assert!(result.is_err());

    let ctx = OpContext::background();
    assert_eq!(assets.list(&ctx, &ListAssetsQuery::default()).unwrap().total, 0);
    assert_eq!(assets.tags().get_next(&ctx).unwrap(), "000001");
}

#[test]
fn same_bytes_under_other_extension_are_swept_separately() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let a = h
        .assets
        .create(&ctx, Asset::new("EXT01", "Poster"), Some(image("x.png", b"poster")))
        .unwrap();
    let b = h
        .assets
        .create(&ctx, Asset::new("EXT02", "Poster"), Some(image("y.jpg", b"poster")))
        .unwrap();
    let png = h.assets.files().get_by_public_path(&ctx, a.image_url.as_deref().unwrap()).unwrap();
    let jpg = h.assets.files().get_by_public_path(&ctx, b.image_url.as_deref().unwrap()).unwrap();
    assert_eq!(png.sha256, jpg.sha256);

    h.assets.delete(&ctx, a.id).unwrap();
    assert!(!png.full_path.exists());
    assert!(jpg.full_path.exists());

    h.assets.delete(&ctx, b.id).unwrap();
    assert!(h.blob_root_is_empty());
}

#[test]
fn delete_sweeps_attachments_and_keeps_shared_ones() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();

    let a = h.assets.create(&ctx, Asset::new("ATT01", "Router"), None).unwrap();
    let b = h.assets.create(&ctx, Asset::new("ATT02", "Switch"), None).unwrap();

    let attached = h
        .assets
        .add_files(
            &ctx,
            a.id,
            vec![
                Upload::new("manual.pdf", "application/pdf", &b"router manual"[..]),
                Upload::new("receipt.png", "image/png", &b"shared receipt"[..]),
                Upload::new("label.txt", "text/plain", &b"shared label"[..]),
                Upload::new("manual-copy.pdf", "application/pdf", &b"router manual"[..]),
            ],
        )
        .unwrap();
    assert_eq!(attached.len(), 4);
    assert_eq!(attached[0].full_path, attached[3].full_path);
    assert_eq!(h.file_rows(a.id), 4);

    let theirs = h
        .assets
        .add_files(
            &ctx,
            b.id,
            vec![
                Upload::new("receipt.png", "image/png", &b"shared receipt"[..]),
                Upload::new("label.jpg", "image/jpeg", &b"shared label"[..]),
            ],
        )
        .unwrap();

    h.assets.delete(&ctx, a.id).unwrap();

    assert_eq!(h.file_rows(a.id), 0);
    assert!(!attached[0].full_path.exists());
    assert!(attached[1].full_path.exists());
    assert!(!attached[2].full_path.exists());
    assert!(theirs[1].full_path.exists());
    assert_eq!(h.file_rows(b.id), 2);
    assert_eq!(read_blob(&h, &theirs[0].public_path), b"shared receipt");

    h.assets.delete(&ctx, b.id).unwrap();
    assert!(h.blob_root_is_empty());
}

#[test]
fn failed_attachment_leaves_no_rows() {
    let h = Harness::new(TagAlgorithm::Nanoid);
    let ctx = OpContext::background();
    let a = h.assets.create(&ctx, Asset::new("ATT03", "Modem"), None).unwrap();

    h.store.fail_file_create.store(true, Ordering::SeqCst);
    let err = h
        .assets
        .add_files(
            &ctx,
            a.id,
            vec![Upload::new("notes.txt", "text/plain", &b"notes"[..])],
        )
        .unwrap_err();
    assert!(matches!(err.root(), Error::Io(_)));
    assert_eq!(h.file_rows(a.id), 0);
    assert!(h.blob_root_is_empty());
}
