//! Wiring of the SQLite/filesystem stack from settings

use config::Settings;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::ledger::FileLedger;
use crate::lifecycle::AssetLifecycleManager;
use crate::storage::implementations::{FsBlobStore, SqliteStorage, SqliteStore};
use crate::storage::transaction::{Database, DatabaseOptions};
use crate::tags::{TagAlgorithm, TagAllocator};

pub type Tags = TagAllocator<SqliteStore>;
pub type Files = FileLedger<SqliteStore, FsBlobStore>;
pub type Assets = AssetLifecycleManager<SqliteStorage>;

/// The three components sharing one database and blob root.
pub struct Inventory {
    pub db: Arc<Database>,
    pub tags: Arc<Tags>,
    pub files: Arc<Files>,
    pub assets: Arc<Assets>,
}

impl Inventory {
    pub fn open(settings: &Settings) -> Result<Self> {
        let algorithm: TagAlgorithm = settings.tags.algorithm.parse()?;

        let db_path = settings.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let files_dir = settings.files_dir();
        fs::create_dir_all(&files_dir)?;

        let db = Database::open(
            &db_path,
            DatabaseOptions {
                debug_sql: settings.database.debug_sql,
                busy_timeout: settings.database.busy_timeout_ms.map(Duration::from_millis),
            },
        )
        .map_err(|e| e.context(format!("opening database {}", db_path.display())))?;

        let blobs = FsBlobStore::new(&files_dir, settings.tmp_dir())
            .with_public_prefix(settings.files.public_prefix.clone());

        info!(
            db = %db_path.display(),
            files = %files_dir.display(),
            algorithm = %algorithm,
            "inventory opened"
        );
        Ok(Self::from_parts(Arc::new(db), Arc::new(blobs), algorithm))
    }

    pub fn from_parts(db: Arc<Database>, blobs: Arc<FsBlobStore>, algorithm: TagAlgorithm) -> Self {
        let store = Arc::new(SqliteStore);
        let tags = Arc::new(TagAllocator::new(db.clone(), store.clone(), algorithm));
        let files = Arc::new(FileLedger::new(db.clone(), store.clone(), blobs));
        let assets = Arc::new(AssetLifecycleManager::new(
            db.clone(),
            tags.clone(),
            files.clone(),
            store,
        ));
        Self {
            db,
            tags,
            files,
            assets,
        }
    }
}
