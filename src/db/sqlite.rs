//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::*;
use super::{ConfigStore, DbError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const SELECT_COLUMNS: &str = "SELECT id, name, private_key, public_key, endpoint, dns, mtu, addresses, \
     warp_plus, is_valid, test_results, region, created_at FROM configurations";

/// Thread-safe SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn query(&self, sql: &str) -> Result<Vec<Configuration>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let configs = stmt
            .query_map([], row_to_config)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(configs)
    }
}

impl ConfigStore for SqliteStore {
    fn create(&self, new: NewConfiguration) -> Result<Configuration, DbError> {
        let mut config = new.into_configuration(0, Utc::now());

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO configurations (name, private_key, public_key, endpoint, dns, mtu, addresses, warp_plus, is_valid, test_results, region, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                config.name,
                config.private_key,
                config.public_key,
                config.endpoint,
                config.dns,
                config.mtu,
                join_addresses(&config.addresses),
                config.warp_plus,
                config.is_valid,
                config.test_results,
                config.region,
                config.created_at.format(TIME_FORMAT).to_string(),
            ],
        )?;
        config.id = conn.last_insert_rowid();
        Ok(config)
    }

    fn get(&self, id: i64) -> Result<Option<Configuration>, DbError> {
        let conn = self.conn()?;
        let config = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_config,
            )
            .optional()?;
        Ok(config)
    }

    fn list(&self) -> Result<Vec<Configuration>, DbError> {
        self.query(&format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS))
    }

    fn list_invalid(&self) -> Result<Vec<Configuration>, DbError> {
        self.query(&format!(
            "{} WHERE is_valid = 0 ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        ))
    }

    fn update(&self, id: i64, patch: ConfigurationPatch) -> Result<Configuration, DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut config = tx
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_config,
            )
            .optional()?
            .ok_or(DbError::NotFound)?;
        patch.apply(&mut config);

        tx.execute(
            "UPDATE configurations SET name=?1, private_key=?2, public_key=?3, endpoint=?4, dns=?5, mtu=?6, \
             addresses=?7, warp_plus=?8, is_valid=?9, test_results=?10, region=?11 WHERE id=?12",
            params![
                config.name,
                config.private_key,
                config.public_key,
                config.endpoint,
                config.dns,
                config.mtu,
                join_addresses(&config.addresses),
                config.warp_plus,
                config.is_valid,
                config.test_results,
                config.region,
                id,
            ],
        )?;
        tx.commit()?;
        Ok(config)
    }

    fn delete(&self, id: i64) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM configurations WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn delete_invalid(&self) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM configurations WHERE is_valid = 0", [])?)
    }
}

fn row_to_config(row: &Row<'_>) -> SqlResult<Configuration> {
    let addresses: String = row.get(7)?;
    let time_str: String = row.get(12)?;
    let created_at = parse_db_time(&time_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            12,
            Type::Text,
            format!("unparseable created_at: {}", time_str).into(),
        )
    })?;
    Ok(Configuration {
        id: row.get(0)?,
        name: row.get(1)?,
        private_key: row.get(2)?,
        public_key: row.get(3)?,
        endpoint: row.get(4)?,
        dns: row.get(5)?,
        mtu: row.get(6)?,
        addresses: split_addresses(&addresses),
        warp_plus: row.get(8)?,
        is_valid: row.get(9)?,
        test_results: row.get(10)?,
        region: row.get(11)?,
        created_at,
    })
}

fn join_addresses(addresses: &[String]) -> String {
    addresses.join(", ")
}

fn split_addresses(s: &str) -> Vec<String> {
    s.split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample(name: &str) -> NewConfiguration {
        NewConfiguration {
            name: name.to_string(),
            private_key: "gI6EdUSYvn8ugXOt8QQD6Yc+JyK7ubcOOWb8W/WxjOI=".to_string(),
            public_key: "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=".to_string(),
            endpoint: "engage.cloudflare.com:2408".to_string(),
            mtu: 1420,
            addresses: vec!["10.2.0.2/32".to_string(), "fd01::2/128".to_string()],
            warp_plus: true,
            region: "eu-central".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_configuration_crud() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        // Create
        let created = store.create(sample("test.conf")).unwrap();
        assert!(created.id > 0);
        assert_eq!(created.dns, DEFAULT_DNS);
        assert_eq!(created.status(), TestStatus::Untested);

        // Read
        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);

        // Update
        let updated = store
            .update(
                created.id,
                ConfigurationPatch::outcome(true, r#"{"connectionTest":true}"#.to_string()),
            )
            .unwrap();
        assert!(updated.is_valid);
        assert_eq!(store.get(created.id).unwrap().unwrap(), updated);

        // Delete
        assert!(store.delete(created.id).unwrap());
        assert!(store.get(created.id).unwrap().is_none());
        assert!(!store.delete(created.id).unwrap());
    }

    #[test]
    fn test_update_missing() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        let err = store
            .update(5, ConfigurationPatch::outcome(true, "{}".to_string()))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_order_and_delete_invalid() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        let a = store.create(sample("a")).unwrap();
        let b = store.create(sample("b")).unwrap();
        let c = store.create(sample("c")).unwrap();
        store
            .update(b.id, ConfigurationPatch::outcome(true, "{}".to_string()))
            .unwrap();

        let ids: Vec<i64> = store.list().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let invalid: Vec<i64> = store.list_invalid().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(invalid, vec![c.id, a.id]);

        assert_eq!(store.delete_invalid().unwrap(), 2);
        let remaining = store.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let tmp = NamedTempFile::new().unwrap();
        let created = {
            let store = SqliteStore::new(tmp.path()).unwrap();
            store.create(sample("persisted")).unwrap()
        };

        let store = SqliteStore::new(tmp.path()).unwrap();
        let fetched = store.get(created.id).unwrap().unwrap();
        assert_eq!(fetched.addresses, created.addresses);
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[test]
    fn test_bad_created_at_is_an_error() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO configurations (name, private_key, public_key, endpoint, created_at) \
                 VALUES ('x.conf', 'a', 'b', 'c:1', 'yesterday')",
                [],
            )
            .unwrap();

        assert!(matches!(store.get(1), Err(DbError::Sqlite(_))));
        assert!(store.list().is_err());
    }

    #[test]
    fn test_parse_db_time() {
        assert!(parse_db_time("2024-01-01 12:34:56.123456789").is_some());
        assert!(parse_db_time("2024-01-01 12:34:56").is_some());
        assert!(parse_db_time("2024-01-01T12:34:56Z").is_some());
        assert!(parse_db_time("yesterday").is_none());
    }
}
