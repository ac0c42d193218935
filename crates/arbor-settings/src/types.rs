//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production default values. `#[serde(default)]` allows
//! partial JSON — missing fields get their default value during
//! deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for the arbor engine.
///
/// Loaded from `~/.arbor/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArborSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Connection pool settings.
    pub pool: PoolSettings,
    /// Assembled-context cache settings.
    pub cache: CacheSettings,
    /// Tree walker settings.
    pub walker: WalkerSettings,
    /// Token counting settings.
    pub tokens: TokenSettings,
    /// Store settings.
    pub store: StoreSettings,
}

impl Default for ArborSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "arbor".to_string(),
            pool: PoolSettings::default(),
            cache: CacheSettings::default(),
            walker: WalkerSettings::default(),
            tokens: TokenSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

/// Behavior when the pool is at capacity and the wait queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Queue up to the lease timeout, then fail with `PoolExhausted`.
    Queue,
    /// Fail immediately when no connection is idle.
    FailFast,
}

/// Connection pool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Maximum concurrent leases.
    pub max_size: u32,
    /// How long an acquire may queue before failing (milliseconds).
    pub lease_timeout_ms: u64,
    /// Queue or fail fast once capacity is reached.
    pub exhaustion_policy: ExhaustionPolicy,
    /// Connections idle beyond this are closed and replaced (milliseconds).
    pub idle_timeout_ms: u64,
    /// `SQLite` busy timeout applied to every connection (milliseconds).
    pub busy_timeout_ms: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 16,
            lease_timeout_ms: 5_000,
            exhaustion_policy: ExhaustionPolicy::Queue,
            idle_timeout_ms: 300_000,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Assembled-context cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Entry time-to-live (milliseconds).
    pub ttl_ms: u64,
    /// Maximum number of cached fingerprints (LRU beyond this).
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            capacity: 1_000,
        }
    }
}

/// Tree walker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalkerSettings {
    /// Hard depth bound for ancestor walks (cycle guard).
    pub max_depth: u32,
}

impl Default for WalkerSettings {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

/// Token counting settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenSettings {
    /// Bound on the per-model encoder cache (LRU beyond this).
    pub encoder_cache_size: usize,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            encoder_cache_size: 64,
        }
    }
}

/// Store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the `SQLite` database file (empty selects in-memory).
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: ArborSettings =
            serde_json::from_str(r#"{"pool": {"maxSize": 4}}"#).unwrap();
        assert_eq!(settings.pool.max_size, 4);
        // untouched fields keep defaults
        assert_eq!(settings.pool.lease_timeout_ms, 5_000);
        assert_eq!(settings.cache.capacity, 1_000);
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(ArborSettings::default()).unwrap();
        assert!(json["pool"]["maxSize"].is_number());
        assert!(json["pool"]["leaseTimeoutMs"].is_number());
        assert!(json["cache"]["ttlMs"].is_number());
        assert!(json["walker"]["maxDepth"].is_number());
    }

    #[test]
    fn exhaustion_policy_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExhaustionPolicy::FailFast).unwrap(),
            "\"fail_fast\""
        );
        let parsed: ExhaustionPolicy = serde_json::from_str("\"queue\"").unwrap();
        assert_eq!(parsed, ExhaustionPolicy::Queue);
    }

    #[test]
    fn settings_roundtrip() {
        let settings = ArborSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: ArborSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pool.max_size, settings.pool.max_size);
        assert_eq!(back.cache.ttl_ms, settings.cache.ttl_ms);
    }
}
