//! Storage layer
//!
//! - `traits` - store contracts (`TagStore`, `FileStore`, `AssetStore`, `BlobStore`)
//! - `implementations` - SQLite rows and filesystem blobs
//! - `types` - rows and queries shared by both
//! - `transaction` - the `Database` connection owner and `OpContext`

pub mod helper;
pub mod ids;
pub mod implementations;
pub mod traits;
pub mod transaction;
pub mod types;

pub use ids::{AssetId, FileId, TagId};
pub use implementations::{FsBlobStore, SqliteStorage, SqliteStore};
pub use traits::{AssetStore, BlobStore, FileStore, StorageTypes, TagStore};
pub use transaction::{Database, DatabaseOptions, OpContext};
