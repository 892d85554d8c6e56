//! Database module for warpgen.
//!
//! A `ConfigStore` trait with an in-memory and a SQLite backend. The backend is
//! chosen once, at startup, by `open_store`.

mod memory;
mod models;
mod sqlite;

pub use memory::*;
pub use models::*;
pub use sqlite::*;

use crate::config::{ServerConfig, StorageKind};

use std::sync::Arc;
use thiserror::Error;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("store lock poisoned")]
    Poisoned,
}

/// CRUD repository over stored configurations.
///
/// Every method is a single atomic operation against the backend; in
/// particular `delete_invalid` never leaves an invalid record half-removed.
pub trait ConfigStore: Send + Sync {
    /// Assign a fresh id, apply defaults, and persist.
    fn create(&self, new: NewConfiguration) -> Result<Configuration, DbError>;

    fn get(&self, id: i64) -> Result<Option<Configuration>, DbError>;

    /// All records, newest first.
    fn list(&self) -> Result<Vec<Configuration>, DbError>;

    /// All records with `is_valid = false`, newest first.
    fn list_invalid(&self) -> Result<Vec<Configuration>, DbError>;

    /// Merge `patch` into an existing record. Fails with `DbError::NotFound`.
    fn update(&self, id: i64, patch: ConfigurationPatch) -> Result<Configuration, DbError>;

    /// Returns whether a record was removed.
    fn delete(&self, id: i64) -> Result<bool, DbError>;

    /// Remove every record with `is_valid = false`, returning the count.
    fn delete_invalid(&self) -> Result<usize, DbError>;
}

/// Open the backend selected by `cfg.storage`.
pub fn open_store(cfg: &ServerConfig) -> Result<Arc<dyn ConfigStore>, DbError> {
    match cfg.storage {
        StorageKind::Memory => {
            tracing::info!("Using in-memory configuration store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Sqlite => {
            tracing::info!("Using database at {}", cfg.db_path);
            Ok(Arc::new(SqliteStore::new(&cfg.db_path)?))
        }
    }
}

/// Newest first; ids break ties so the order is total.
pub(crate) fn sort_newest_first(configs: &mut [Configuration]) {
    configs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
