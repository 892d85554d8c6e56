//! Configuration module for warpgen.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Warp registration bases tried in order.
pub const DEFAULT_REGISTRATION_URLS: &[&str] = &[
    "https://api.cloudflareclient.com/v0a745",
    "https://api.cloudflareclient.workers.dev/v0a745",
    "https://warp-api.fly.dev/v0a745",
];

pub const DEFAULT_SPEED_TEST_URL: &str = "https://speed.cloudflare.com/__down?bytes=1000000";

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Which prober answers `POST /api/configurations/test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberKind {
    Network,
    Simulated,
}

impl FromStr for ProberKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" | "real" => Ok(Self::Network),
            "simulated" | "fake" => Ok(Self::Simulated),
            _ => Err(()),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Store backend (default: sqlite)
    pub storage: StorageKind,
    /// Path to the SQLite database file (default: "warpgen.db")
    pub db_path: String,
    /// Probe implementation (default: network)
    pub prober: ProberKind,
    /// Registration API bases, tried in order
    pub registration_urls: Vec<String>,
    pub registration_timeout: Duration,
    /// Timeout applied to each sub-probe
    pub probe_timeout: Duration,
    pub speed_test_url: String,
    /// Seed for the simulated prober; unset means fresh entropy
    pub probe_seed: Option<u64>,
    /// Whether the simulated prober sleeps like a real probe (default: true)
    pub probe_delays: bool,
    /// JSON file of premium entries; premium requests consult it first when set
    pub bot_table_path: Option<String>,
    /// Spacing between batch iterations
    pub batch_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            storage: StorageKind::Sqlite,
            db_path: "warpgen.db".to_string(),
            prober: ProberKind::Network,
            registration_urls: DEFAULT_REGISTRATION_URLS.iter().map(|s| s.to_string()).collect(),
            registration_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            speed_test_url: DEFAULT_SPEED_TEST_URL.to_string(),
            probe_seed: None,
            probe_delays: true,
            bot_table_path: None,
            batch_delay: Duration::from_millis(100),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WARPGEN_HTTP_PORT`: HTTP port (default: 8080)
    /// - `WARPGEN_STORAGE`: `sqlite` or `memory` (default: sqlite)
    /// - `WARPGEN_DB_PATH`: Database file path (default: "warpgen.db")
    /// - `WARPGEN_PROBER`: `network` or `simulated` (default: network)
    /// - `WARPGEN_REGISTRATION_URLS`: comma-separated registration bases
    /// - `WARPGEN_REGISTRATION_TIMEOUT_SECS`: per-attempt timeout (default: 10)
    /// - `WARPGEN_PROBE_TIMEOUT_SECS`: per-probe timeout (default: 5)
    /// - `WARPGEN_SPEED_TEST_URL`: download used for throughput
    /// - `WARPGEN_PROBE_SEED`: simulated prober seed (default: unset)
    /// - `WARPGEN_PROBE_DELAYS`: `true`/`false`, simulated prober pacing (default: true)
    /// - `WARPGEN_BOT_TABLE_PATH`: premium entry table (default: unset, disabled)
    /// - `WARPGEN_BATCH_DELAY_MS`: batch spacing (default: 100)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "WARPGEN_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(storage) = parse_var(&lookup, "WARPGEN_STORAGE") {
            cfg.storage = storage;
        }

        if let Some(db_path) = lookup("WARPGEN_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(prober) = parse_var(&lookup, "WARPGEN_PROBER") {
            cfg.prober = prober;
        }

        if let Some(urls) = lookup("WARPGEN_REGISTRATION_URLS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .collect();
            if !urls.is_empty() {
                cfg.registration_urls = urls;
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "WARPGEN_REGISTRATION_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.registration_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "WARPGEN_PROBE_TIMEOUT_SECS") {
            if secs > 0 {
                cfg.probe_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(url) = lookup("WARPGEN_SPEED_TEST_URL") {
            cfg.speed_test_url = url;
        }

        if let Some(seed) = parse_var(&lookup, "WARPGEN_PROBE_SEED") {
            cfg.probe_seed = Some(seed);
        }

        if let Some(delays) = parse_var(&lookup, "WARPGEN_PROBE_DELAYS") {
            cfg.probe_delays = delays;
        }

        if let Some(path) = lookup("WARPGEN_BOT_TABLE_PATH") {
            if !path.trim().is_empty() {
                cfg.bot_table_path = Some(path);
            }
        }

        if let Some(ms) = parse_var(&lookup, "WARPGEN_BATCH_DELAY_MS") {
            cfg.batch_delay = Duration::from_millis(ms);
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "warpgen.db");
        assert_eq!(cfg.storage, StorageKind::Sqlite);
        assert_eq!(cfg.prober, ProberKind::Network);
        assert_eq!(cfg.registration_urls.len(), 3);
        assert_eq!(cfg.registration_timeout, Duration::from_secs(10));
        assert!(cfg.bot_table_path.is_none());
        assert!(cfg.probe_seed.is_none());
        assert!(cfg.probe_delays);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WARPGEN_HTTP_PORT", "9090"),
            ("WARPGEN_STORAGE", "memory"),
            ("WARPGEN_PROBER", "simulated"),
            ("WARPGEN_REGISTRATION_URLS", "https://a.example/, https://b.example"),
            ("WARPGEN_BOT_TABLE_PATH", "/etc/warpgen/bot.json"),
            ("WARPGEN_BATCH_DELAY_MS", "0"),
            ("WARPGEN_PROBE_SEED", "42"),
            ("WARPGEN_PROBE_DELAYS", "false"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.storage, StorageKind::Memory);
        assert_eq!(cfg.prober, ProberKind::Simulated);
        assert_eq!(cfg.registration_urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.bot_table_path.as_deref(), Some("/etc/warpgen/bot.json"));
        assert_eq!(cfg.batch_delay, Duration::ZERO);
        assert_eq!(cfg.probe_seed, Some(42));
        assert!(!cfg.probe_delays);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let cfg = ServerConfig::from_lookup(|k| match k {
            "WARPGEN_HTTP_PORT" => Some("not-a-port".to_string()),
            "WARPGEN_STORAGE" => Some("postgres".to_string()),
            "WARPGEN_PROBE_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.storage, StorageKind::Sqlite);
        assert_eq!(cfg.probe_timeout, Duration::from_secs(5));
    }
}
