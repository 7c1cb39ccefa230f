use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::repository::{AccessTokenRepository, AssetRepository};
use super::schema::SCHEMA;
use super::unit_of_work::UnitOfWork;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Thread whose unit of work currently holds `conn`.
    holder: Mutex<Option<ThreadId>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            holder: Mutex::new(None),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a unit of work. The connection stays locked until the unit is
    /// committed, rolled back or dropped, so units never interleave.
    ///
    /// Units on other threads are waited for. Opening a second unit on the
    /// thread that already holds one fails with `NestedUnitOfWork`.
    pub fn begin(&self) -> Result<UnitOfWork<'_>> {
        let current = thread::current().id();
        if *self.holder.lock().unwrap_or_else(|e| e.into_inner()) == Some(current) {
            return Err(Error::NestedUnitOfWork);
        }

        UnitOfWork::begin(self.conn(), &self.holder)
    }

    /// Runs `f` inside a unit of work: commits when it returns `Ok`, rolls
    /// back and hands back its error unchanged when it returns `Err`.
    pub fn unit_of_work<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T>,
    {
        let uow = self.begin()?;

        match f(&uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = uow.rollback() {
                    tracing::warn!("Failed to roll back unit of work: {rollback_err}");
                }
                Err(e)
            }
        }
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let data: String = row.get(2)?;
    let data = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Asset {
        id: row.get(0)?,
        name: row.get(1)?,
        data,
        deleted: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn access_token_from_row(row: &Row<'_>) -> rusqlite::Result<AccessToken> {
    Ok(AccessToken {
        id: row.get(0)?,
        identifier: row.get(1)?,
        token_hash: row.get(2)?,
        expires_at: row.get::<_, Option<String>>(3)?.map(|s| parse_datetime(&s)),
        deleted: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

/// Asset rows on the connection of an open unit of work.
pub struct SqliteAssetRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAssetRepository<'a> {
    pub(super) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn insert(&self, asset: &NewAsset) -> Result<Asset> {
        let now = format_datetime(&Utc::now());
        let data = serde_json::to_string(&asset.data)?;

        let result = self.conn.execute(
            "INSERT INTO asset (name, data, deleted, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![asset.name, data, now],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::NameConflict(asset.name.clone()));
            }
            Err(e) => return Err(Error::from(e)),
        }

        let id = self.conn.last_insert_rowid();
        self.find_by_id(id)?.ok_or(Error::NotFound)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Asset>> {
        self.conn
            .query_row(
                "SELECT id, name, data, deleted, created_at, updated_at
                 FROM asset WHERE id = ?1",
                params![id],
                asset_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn update_fields(&self, id: i64, changes: &AssetChanges) -> Result<Asset> {
        let data = changes.data.as_ref().map(serde_json::to_string).transpose()?;

        let result = self.conn.execute(
            "UPDATE asset SET name = COALESCE(?1, name), data = COALESCE(?2, data), updated_at = ?3
             WHERE id = ?4",
            params![changes.name, data, format_datetime(&Utc::now()), id],
        );

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::NameConflict(
                    changes.name.clone().unwrap_or_default(),
                ));
            }
            Err(e) => return Err(Error::from(e)),
        };

        if rows == 0 {
            return Err(Error::NotFound);
        }
        self.find_by_id(id)?.ok_or(Error::NotFound)
    }

    fn soft_delete(&self, id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE asset SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Loads the stored row behind `asset` and rejects it if it is missing
    /// or already tombstoned.
    fn live_row(&self, asset: &Asset) -> Result<Asset> {
        match self.find_by_id(asset.id)? {
            None => Err(Error::NotFound),
            Some(stored) if stored.deleted => Err(Error::Gone),
            Some(stored) => Ok(stored),
        }
    }
}

impl AssetRepository for SqliteAssetRepository<'_> {
    fn get(&self, id: i64) -> Result<Option<Asset>> {
        self.find_by_id(id)
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Asset>> {
        self.conn
            .query_row(
                "SELECT id, name, data, deleted, created_at, updated_at
                 FROM asset WHERE name = ?1",
                params![name],
                asset_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_by_name_or_suffixed(&self, name: &str, suffix: &str) -> Result<Option<Asset>> {
        let suffixed = format!("{name}_{suffix}");

        self.conn
            .query_row(
                "SELECT id, name, data, deleted, created_at, updated_at
                 FROM asset WHERE name = ?1 OR name = ?2 ORDER BY id LIMIT 1",
                params![name, suffixed],
                asset_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_all(&self, include_deleted: bool) -> Result<Vec<Asset>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, data, deleted, created_at, updated_at
             FROM asset WHERE ?1 OR deleted = 0 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![include_deleted], asset_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn create(&self, asset: &NewAsset) -> Result<Asset> {
        let created = self.insert(asset)?;
        tracing::debug!(id = created.id, name = %created.name, "asset created");
        Ok(created)
    }

    fn update(&self, asset: &Asset, changes: &AssetChanges) -> Result<Asset> {
        let stored = self.live_row(asset)?;
        self.update_fields(stored.id, changes)
    }

    fn delete(&self, asset: &Asset) -> Result<Asset> {
        let stored = self.live_row(asset)?;
        self.soft_delete(stored.id)?;
        tracing::debug!(id = stored.id, name = %stored.name, "asset tombstoned");
        self.find_by_id(stored.id)?.ok_or(Error::NotFound)
    }
}

pub struct SqliteAccessTokenRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAccessTokenRepository<'a> {
    pub(super) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AccessTokenRepository for SqliteAccessTokenRepository<'_> {
    fn get_by_identifier(&self, identifier: &str) -> Result<Option<AccessToken>> {
        self.conn
            .query_row(
                "SELECT id, identifier, token_hash, expires_at, deleted, created_at, updated_at
                 FROM access_token WHERE identifier = ?1",
                params![identifier],
                access_token_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn create(&self, token: &NewAccessToken) -> Result<AccessToken> {
        let now = format_datetime(&Utc::now());

        let result = self.conn.execute(
            "INSERT INTO access_token (identifier, token_hash, expires_at, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![
                token.identifier,
                token.token_hash,
                token.expires_at.as_ref().map(format_datetime),
                now,
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Err(Error::TokenLookupCollision),
            Err(e) => return Err(Error::from(e)),
        }

        self.get_by_identifier(&token.identifier)?
            .ok_or(Error::NotFound)
    }

    fn count_active(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM access_token WHERE deleted = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
