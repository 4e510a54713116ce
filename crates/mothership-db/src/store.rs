//! SQLite-backed implementation of the Query Store and ingestion sink.
//!
//! A single connection sits behind a mutex so the UI thread, the refresh
//! workers and the ingest pump can share one `Arc<SqliteStore>`.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mothership_core::{
    ErrorRecord, ErrorReport, ErrorSink, FilterDescriptor, Node, QueryStore, StoreError,
};

use crate::{Config, Db, DbError, ErrorRepository, NodeRepository};

#[derive(Debug)]
pub struct SqliteStore {
    db: Mutex<Db>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `cfg.path`.
    pub fn open(cfg: Config) -> Result<Self, DbError> {
        let mut db = Db::open(cfg)?;
        db.migrate_up()?;
        Ok(Self::from_db(db))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let mut db = Db::open_in_memory()?;
        db.migrate_up()?;
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: Db) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn add_error(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db)
            .add(report, received_at)
            .map_err(store_error)
    }

    pub fn remove_all_errors(&self) -> Result<usize, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db).remove_all().map_err(store_error)
    }

    pub fn add_node(&self, node: &Node) -> Result<(), StoreError> {
        let db = self.lock();
        NodeRepository::new(&db).add(node).map_err(store_error)
    }

    pub fn remove_node(&self, rack: u32, chassis: u32) -> Result<(), StoreError> {
        let db = self.lock();
        NodeRepository::new(&db)
            .remove(rack, chassis)
            .map_err(store_error)
    }

    pub fn set_node_enabled(
        &self,
        rack: u32,
        chassis: u32,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let db = self.lock();
        NodeRepository::new(&db)
            .set_enabled(rack, chassis, enabled)
            .map_err(store_error)
    }

    pub fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let db = self.lock();
        NodeRepository::new(&db).list().map_err(store_error)
    }

    /// Run `f` with exclusive access to the underlying database.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Db) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let mut db = self.lock();
        f(&mut db).map_err(store_error)
    }

    fn lock(&self) -> MutexGuard<'_, Db> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("sqlite store lock poisoned"),
        }
    }
}

fn store_error(err: DbError) -> StoreError {
    match err {
        DbError::Validation(message) => StoreError::Validation(message),
        DbError::NodeNotFound => StoreError::NodeNotFound,
        DbError::NodeAlreadyExists => StoreError::NodeExists,
        DbError::Io(err) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

impl QueryStore for SqliteStore {
    fn search(&self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db).search(filter).map_err(|err| {
            tracing::warn!(filter = %filter, error = %err, "error search failed");
            store_error(err)
        })
    }

    fn count(&self, filter: &FilterDescriptor) -> Result<u64, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db).count(filter).map_err(store_error)
    }

    fn list_racks(&self) -> Result<BTreeSet<u32>, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db).list_racks().map_err(store_error)
    }

    fn list_chassis(&self, rack: u32) -> Result<BTreeSet<u32>, StoreError> {
        let db = self.lock();
        ErrorRepository::new(&db)
            .list_chassis(rack)
            .map_err(store_error)
    }
}

impl ErrorSink for SqliteStore {
    fn persist(
        &self,
        report: &ErrorReport,
        received_at: DateTime<Utc>,
    ) -> Result<ErrorRecord, StoreError> {
        self.add_error(report, received_at)
    }
}
