//! AssetStore trait

use rusqlite::Connection;

use crate::error::Result;
use crate::storage::ids::AssetId;
use crate::storage::types::asset::{Asset, GetAssetQuery, ListAssetsQuery, StoredAsset};
use crate::storage::types::list::ListPage;

/// Asset rows and the parts/purchases they own.
pub trait AssetStore: Send + Sync {
    /// Fails with `AssetNotFound` when no row matches.
    fn get(&self, exec: &Connection, query: &GetAssetQuery) -> Result<StoredAsset>;

    fn list(&self, exec: &Connection, query: &ListAssetsQuery) -> Result<ListPage<StoredAsset>>;

    /// Insert the asset with its parts and purchases. Read-side relations are ignored.
    fn create(&self, exec: &Connection, asset: &Asset) -> Result<AssetId>;

    /// Overwrite the asset row and replace its parts and purchases wholesale.
    fn update(&self, exec: &Connection, id: AssetId, asset: &Asset) -> Result<()>;

    /// Delete the row; parts and purchases go with it.
    fn delete(&self, exec: &Connection, id: AssetId) -> Result<()>;
}
