//! In-memory store, mostly for tests and throwaway instances.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::models::*;
use super::{sort_newest_first, ConfigStore, DbError};

struct Inner {
    next_id: i64,
    configs: BTreeMap<i64, Configuration>,
}

/// `ConfigStore` backed by a map and a monotonic id counter under one lock.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                configs: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, DbError> {
        self.inner.lock().map_err(|_| DbError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryStore {
    fn create(&self, new: NewConfiguration) -> Result<Configuration, DbError> {
        let mut inner = self.lock()?;
        let id = inner.next_id;
        inner.next_id += 1;

        let config = new.into_configuration(id, Utc::now());
        inner.configs.insert(id, config.clone());
        Ok(config)
    }

    fn get(&self, id: i64) -> Result<Option<Configuration>, DbError> {
        Ok(self.lock()?.configs.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<Configuration>, DbError> {
        let mut configs: Vec<_> = self.lock()?.configs.values().cloned().collect();
        sort_newest_first(&mut configs);
        Ok(configs)
    }

    fn list_invalid(&self) -> Result<Vec<Configuration>, DbError> {
        let mut configs: Vec<_> = self
            .lock()?
            .configs
            .values()
            .filter(|c| !c.is_valid)
            .cloned()
            .collect();
        sort_newest_first(&mut configs);
        Ok(configs)
    }

    fn update(&self, id: i64, patch: ConfigurationPatch) -> Result<Configuration, DbError> {
        let mut inner = self.lock()?;
        let config = inner.configs.get_mut(&id).ok_or(DbError::NotFound)?;
        patch.apply(config);
        Ok(config.clone())
    }

    fn delete(&self, id: i64) -> Result<bool, DbError> {
        Ok(self.lock()?.configs.remove(&id).is_some())
    }

    fn delete_invalid(&self) -> Result<usize, DbError> {
        let mut inner = self.lock()?;
        let before = inner.configs.len();
        inner.configs.retain(|_, c| c.is_valid);
        Ok(before - inner.configs.len())
    }
}
