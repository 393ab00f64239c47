//! Storage trait definitions
//!
//! All storage traits are defined here, with implementations in `implementations/`.
//! Row stores take the executor to run against; when called through the
//! components this is always the connection of the current transaction.

mod asset;
mod blob;
mod file;
mod tag;

pub use asset::AssetStore;
pub use blob::BlobStore;
pub use file::FileStore;
pub use tag::TagStore;

/// Bundles all storage type associations into a single trait.
///
/// ```ignore
/// pub struct AppStorage;
///
/// impl StorageTypes for AppStorage {
///     type Asset = SqliteStore;
///     type File = SqliteStore;
///     type Tag = SqliteStore;
///     type Blob = FsBlobStore;
/// }
///
/// type AppLifecycle = AssetLifecycleManager<AppStorage>;
/// ```
pub trait StorageTypes: Send + Sync + 'static {
    /// Asset rows with their parts and purchases
    type Asset: AssetStore;
    /// File catalogue rows
    type File: FileStore;
    /// Tag rows
    type Tag: TagStore;
    /// Content-addressed blob storage
    type Blob: BlobStore;
}
