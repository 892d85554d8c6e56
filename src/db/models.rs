//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DNS: &str = "1.1.1.1, 1.0.0.1";
pub const DEFAULT_MTU: u16 = 1280;
pub const MIN_MTU: u16 = 1200;
pub const MAX_MTU: u16 = 1500;
pub const DEFAULT_REGION: &str = "auto";
pub const DEFAULT_ADDRESS: &str = "10.2.0.2/32";

/// A stored WireGuard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: i64,
    pub name: String,
    pub private_key: String,
    pub public_key: String,
    pub endpoint: String,
    pub dns: String,
    pub mtu: u16,
    pub addresses: Vec<String>,
    pub warp_plus: bool,
    pub is_valid: bool,
    /// JSON-encoded `TestResult` of the last probe run.
    pub test_results: Option<String>,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

impl Configuration {
    pub fn status(&self) -> TestStatus {
        match (&self.test_results, self.is_valid) {
            (None, _) => TestStatus::Untested,
            (Some(_), true) => TestStatus::Valid,
            (Some(_), false) => TestStatus::Invalid,
        }
    }
}

/// Whether a configuration has been probed, and with what outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Untested,
    Valid,
    Invalid,
}

/// Fields accepted by `ConfigStore::create`.
///
/// Empty `dns`, `region` and `addresses` are replaced with defaults, and a zero
/// `mtu` with 1280. Fresh records are always untested.
#[derive(Debug, Clone, Default)]
pub struct NewConfiguration {
    pub name: String,
    pub private_key: String,
    pub public_key: String,
    pub endpoint: String,
    pub dns: String,
    pub mtu: u16,
    pub addresses: Vec<String>,
    pub warp_plus: bool,
    pub region: String,
}

impl NewConfiguration {
    /// Build the stored record, applying defaults.
    pub fn into_configuration(self, id: i64, created_at: DateTime<Utc>) -> Configuration {
        Configuration {
            id,
            name: self.name,
            private_key: self.private_key,
            public_key: self.public_key,
            endpoint: self.endpoint,
            dns: non_empty_or(self.dns, DEFAULT_DNS),
            mtu: if self.mtu == 0 { DEFAULT_MTU } else { self.mtu },
            addresses: if self.addresses.is_empty() {
                vec![DEFAULT_ADDRESS.to_string()]
            } else {
                self.addresses
            },
            warp_plus: self.warp_plus,
            is_valid: false,
            test_results: None,
            region: non_empty_or(self.region, DEFAULT_REGION),
            created_at,
        }
    }
}

/// `dns` itself, or `DEFAULT_DNS` when it is blank.
///
/// Callers that render before storing use this so the rendered text and the
/// stored record carry the same resolvers.
pub fn dns_or_default(dns: &str) -> &str {
    if dns.trim().is_empty() {
        DEFAULT_DNS
    } else {
        dns
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Result of a probe run; `is_valid` and `test_results` only travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub is_valid: bool,
    pub test_results: String,
}

/// Partial update for `ConfigStore::update`. `id` and `created_at` are not patchable.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationPatch {
    pub name: Option<String>,
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub endpoint: Option<String>,
    pub dns: Option<String>,
    pub mtu: Option<u16>,
    pub addresses: Option<Vec<String>>,
    pub warp_plus: Option<bool>,
    pub region: Option<String>,
    pub outcome: Option<TestOutcome>,
}

impl ConfigurationPatch {
    pub fn outcome(is_valid: bool, test_results: String) -> Self {
        Self {
            outcome: Some(TestOutcome { is_valid, test_results }),
            ..Default::default()
        }
    }

    /// Merge the provided fields into `config`.
    pub fn apply(self, config: &mut Configuration) {
        if let Some(v) = self.name {
            config.name = v;
        }
        if let Some(v) = self.private_key {
            config.private_key = v;
        }
        if let Some(v) = self.public_key {
            config.public_key = v;
        }
        if let Some(v) = self.endpoint {
            config.endpoint = v;
        }
        if let Some(v) = self.dns {
            config.dns = v;
        }
        if let Some(v) = self.mtu {
            config.mtu = v;
        }
        if let Some(v) = self.addresses {
            config.addresses = v;
        }
        if let Some(v) = self.warp_plus {
            config.warp_plus = v;
        }
        if let Some(v) = self.region {
            config.region = v;
        }
        if let Some(outcome) = self.outcome {
            config.is_valid = outcome.is_valid;
            config.test_results = Some(outcome.test_results);
        }
    }
}
