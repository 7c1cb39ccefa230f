use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rusqlite::Connection;

use super::sqlite::{SqliteAccessTokenRepository, SqliteAssetRepository};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// One transaction and the repositories bound to it.
///
/// Holds the store's connection lock for its whole lifetime. `commit` and
/// `rollback` consume the unit; dropping an active unit rolls it back.
pub struct UnitOfWork<'a> {
    conn: MutexGuard<'a, Connection>,
    holder: &'a Mutex<Option<ThreadId>>,
    state: UnitState,
}

impl<'a> UnitOfWork<'a> {
    pub(super) fn begin(
        conn: MutexGuard<'a, Connection>,
        holder: &'a Mutex<Option<ThreadId>>,
    ) -> Result<Self> {
        *lock_holder(holder) = Some(thread::current().id());
        let mut uow = Self {
            conn,
            holder,
            state: UnitState::Idle,
        };

        // A unit whose ROLLBACK failed leaves its transaction open.
        if !uow.conn.is_autocommit() {
            tracing::warn!("connection still inside a transaction; rolling it back");
            uow.conn.execute_batch("ROLLBACK")?;
        }

        // Write lock is taken at BEGIN, not on the first write.
        uow.conn.execute_batch("BEGIN IMMEDIATE")?;
        uow.state = UnitState::Active;
        tracing::debug!("unit of work started");

        Ok(uow)
    }

    #[must_use]
    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn assets(&self) -> SqliteAssetRepository<'_> {
        SqliteAssetRepository::new(&self.conn)
    }

    pub fn access_tokens(&self) -> SqliteAccessTokenRepository<'_> {
        SqliteAccessTokenRepository::new(&self.conn)
    }

    pub fn commit(mut self) -> Result<()> {
        // On failure the unit stays active and Drop rolls it back.
        self.conn.execute_batch("COMMIT")?;
        self.state = UnitState::Committed;
        tracing::debug!("unit of work committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.rollback_in_place()
    }

    fn rollback_in_place(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        self.state = UnitState::RolledBack;
        tracing::debug!("unit of work rolled back");
        Ok(())
    }
}

fn lock_holder(holder: &Mutex<Option<ThreadId>>) -> MutexGuard<'_, Option<ThreadId>> {
    holder.lock().unwrap_or_else(|e| e.into_inner())
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.state == UnitState::Active {
            if let Err(e) = self.rollback_in_place() {
                tracing::warn!("Failed to roll back abandoned unit of work: {e}");
            }
        }
        *lock_holder(self.holder) = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;
    use tempfile::TempDir;

    use crate::error::Error;
    use crate::store::{AssetRepository, SqliteStore};
    use crate::types::NewAsset;

    use super::*;

    fn test_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn count_all(store: &SqliteStore) -> usize {
        store
            .unit_of_work(|uow| uow.assets().get_all(true))
            .unwrap()
            .len()
    }

    #[test]
    fn test_begin_is_active() {
        let (_temp, store) = test_store();
        let uow = store.begin().unwrap();
        assert_eq!(uow.state(), UnitState::Active);
        uow.commit().unwrap();
    }

    #[test]
    fn test_commit_persists() {
        let (_temp, store) = test_store();

        let uow = store.begin().unwrap();
        uow.assets().create(&NewAsset::new("kept", json!({}))).unwrap();
        uow.commit().unwrap();

        assert_eq!(count_all(&store), 1);
    }

    #[test]
    fn test_explicit_rollback_discards() {
        let (_temp, store) = test_store();

        let uow = store.begin().unwrap();
        uow.assets()
            .create(&NewAsset::new("discarded", json!({})))
            .unwrap();
        uow.rollback().unwrap();

        assert_eq!(count_all(&store), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_temp, store) = test_store();

        {
            let uow = store.begin().unwrap();
            uow.assets()
                .create(&NewAsset::new("abandoned", json!({})))
                .unwrap();
        }

        assert_eq!(count_all(&store), 0);
    }

    #[test]
    fn test_error_rolls_back_whole_unit_and_propagates() {
        let (_temp, store) = test_store();
        store
            .unit_of_work(|uow| uow.assets().create(&NewAsset::new("A", json!({}))))
            .unwrap();

        let result = store.unit_of_work(|uow| {
            let assets = uow.assets();
            assets.create(&NewAsset::new("B", json!({})))?;
            assets.create(&NewAsset::new("A", json!({})))
        });

        assert!(matches!(result, Err(Error::NameConflict(ref name)) if name == "A"));

        let remaining = store
            .unit_of_work(|uow| uow.assets().get_all(true))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "A");
    }

    #[test]
    fn test_caller_error_passes_through_unchanged() {
        let (_temp, store) = test_store();

        let result: crate::error::Result<()> = store.unit_of_work(|uow| {
            uow.assets().create(&NewAsset::new("temp", json!({})))?;
            Err(Error::InvalidData("rejected by caller".to_string()))
        });

        assert!(matches!(result, Err(Error::InvalidData(ref msg)) if msg == "rejected by caller"));
        assert_eq!(count_all(&store), 0);
    }

    #[test]
    fn test_panic_inside_unit_rolls_back() {
        let (_temp, store) = test_store();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: crate::error::Result<()> = store.unit_of_work(|uow| {
                uow.assets().create(&NewAsset::new("half", json!({})))?;
                panic!("handler blew up");
            });
        }));
        assert!(result.is_err());

        assert_eq!(count_all(&store), 0);
    }

    #[test]
    fn test_nested_begin_fails_instead_of_blocking() {
        let (_temp, store) = test_store();

        let created = store.unit_of_work(|uow| {
            assert!(matches!(store.begin(), Err(Error::NestedUnitOfWork)));
            assert!(matches!(
                store.unit_of_work(|inner| inner.assets().get_all(true)),
                Err(Error::NestedUnitOfWork)
            ));
            uow.assets().create(&NewAsset::new("outer", json!({})))
        });
        assert!(created.is_ok());

        // The slot is released with the outer unit.
        let uow = store.begin().unwrap();
        assert_eq!(uow.assets().get_all(true).unwrap().len(), 1);
        uow.commit().unwrap();
    }

    #[test]
    fn test_concurrent_creates_with_same_name() {
        let (_temp, store) = test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.unit_of_work(|uow| {
                        uow.assets()
                            .create(&NewAsset::new("contended", json!({ "writer": i })))
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::NameConflict(_))))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(count_all(&store), 1);
    }
}
