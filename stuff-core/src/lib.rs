//! Asset inventory core
//!
//! This crate provides:
//! - **Storage**: store traits with SQLite row stores and a content-addressed
//!   filesystem `BlobStore`, plus the reentrant transaction scope (`Database`,
//!   `OpContext`)
//! - **Tags**: `TagAllocator`, which recycles released tags before generating new ones
//! - **Files**: `FileLedger`, the dedup-aware file catalogue
//! - **Assets**: `AssetLifecycleManager`, all-or-nothing create/update/delete
//!
//! # Example
//!
//! ```ignore
//! use stuff_core::{Inventory, OpContext, Asset};
//!
//! let inventory = Inventory::open(&settings)?;
//! let ctx = OpContext::background();
//! let tag = inventory.tags.get_next(&ctx)?;
//! let asset = inventory.assets.create(&ctx, Asset::new(tag, "Drill"), None)?;
//! ```

pub mod error;
pub mod inventory;
pub mod ledger;
pub mod lifecycle;
pub mod storage;
pub mod tags;

pub use error::{DeleteStep, Error, Result};
pub use inventory::Inventory;
pub use ledger::FileLedger;
pub use lifecycle::AssetLifecycleManager;
pub use storage::types::{
    Asset, AssetStatus, AssetType, ContentHash, CustomAttr, File, GetAssetQuery,
    ListAssetsQuery, ListFilesQuery, ListPage, ListTagsQuery, MonetaryAmount, OrderDir, Part,
    Purchase, StoredAsset, StoredFile, StoredTag, Tag, Upload,
};
pub use storage::{AssetId, Database, DatabaseOptions, FileId, OpContext, TagId};
pub use tags::{TagAlgorithm, TagAllocator};
