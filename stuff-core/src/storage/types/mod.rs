//! Storage types
//!
//! Shared types used by storage traits and implementations.

pub mod asset;
pub mod file;
pub mod list;
pub mod stored;
pub mod tag;

pub use asset::{
    Asset, AssetKey, AssetStatus, AssetType, CustomAttr, GetAssetQuery, ListAssetsQuery,
    MonetaryAmount, OrderDir, Part, Purchase, StoredAsset,
};
pub use file::{ContentHash, File, ListFilesQuery, StoredFile, Upload};
pub use list::ListPage;
pub use stored::{Editable, Stored};
pub use tag::{ListTagsQuery, StoredTag, Tag};
