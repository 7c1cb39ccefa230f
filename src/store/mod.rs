//! Asset persistence: the SQLite store, repositories over it, and the unit
//! of work that binds repository calls to a single transaction.
//!
//! ```rust,ignore
//! let asset = store.unit_of_work(|uow| {
//!     uow.assets().create(&NewAsset::new("smtp", json!({"host": "mail"})))
//! })?;
//! ```

mod repository;
mod schema;
mod sqlite;
mod unit_of_work;

pub use repository::{AccessTokenRepository, AssetRepository};
pub use sqlite::{SqliteAccessTokenRepository, SqliteAssetRepository, SqliteStore};
pub use unit_of_work::{UnitOfWork, UnitState};
