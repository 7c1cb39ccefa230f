use crate::error::Result;
use crate::types::{AccessToken, Asset, AssetChanges, NewAccessToken, NewAsset};

/// Data access for assets, bound to one unit of work.
///
/// Reads never hide tombstoned rows except through `get_all`'s flag; callers
/// decide whether a tombstoned asset is an error. Mutations of a tombstoned
/// asset fail with [`Error::Gone`](crate::error::Error::Gone).
pub trait AssetRepository {
    fn get(&self, id: i64) -> Result<Option<Asset>>;

    /// Exact, case-sensitive match.
    fn get_by_name(&self, name: &str) -> Result<Option<Asset>>;

    /// Matches either `name` or `"{name}_{suffix}"`, returning the first row
    /// found in insertion order.
    fn get_by_name_or_suffixed(&self, name: &str, suffix: &str) -> Result<Option<Asset>>;

    /// All assets in insertion order.
    fn get_all(&self, include_deleted: bool) -> Result<Vec<Asset>>;

    /// Fails with `NameConflict` if any row, tombstoned or not, holds the name.
    fn create(&self, asset: &NewAsset) -> Result<Asset>;

    fn update(&self, asset: &Asset, changes: &AssetChanges) -> Result<Asset>;

    /// Soft delete. The row stays and its name remains reserved.
    fn delete(&self, asset: &Asset) -> Result<Asset>;
}

pub trait AccessTokenRepository {
    fn get_by_identifier(&self, identifier: &str) -> Result<Option<AccessToken>>;
    fn create(&self, token: &NewAccessToken) -> Result<AccessToken>;

    /// Number of tokens that have not been revoked.
    fn count_active(&self) -> Result<i64>;
}
