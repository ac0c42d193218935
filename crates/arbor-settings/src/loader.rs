//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ArborSettings::default()`]
//! 2. If `~/.arbor/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{ArborSettings, ExhaustionPolicy};

/// Resolve the path to the settings file (`~/.arbor/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".arbor").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ArborSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ArborSettings> {
    let defaults = serde_json::to_value(ArborSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ArborSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut ArborSettings) {
    // ── Pool settings ───────────────────────────────────────────────
    if let Some(v) = read_env_u32("ARBOR_POOL_MAX_SIZE", 1, 1_024) {
        settings.pool.max_size = v;
    }
    if let Some(v) = read_env_u64("ARBOR_POOL_LEASE_TIMEOUT_MS", 1, 600_000) {
        settings.pool.lease_timeout_ms = v;
    }
    if let Some(v) = read_env_string("ARBOR_POOL_EXHAUSTION_POLICY") {
        match v.as_str() {
            "queue" => settings.pool.exhaustion_policy = ExhaustionPolicy::Queue,
            "fail_fast" => settings.pool.exhaustion_policy = ExhaustionPolicy::FailFast,
            _ => tracing::warn!(value = %v, "invalid exhaustion policy env var, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("ARBOR_POOL_IDLE_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.pool.idle_timeout_ms = v;
    }

    // ── Cache settings ──────────────────────────────────────────────
    if let Some(v) = read_env_u64("ARBOR_CACHE_TTL_MS", 100, 86_400_000) {
        settings.cache.ttl_ms = v;
    }
    if let Some(v) = read_env_usize("ARBOR_CACHE_CAPACITY", 1, 1_000_000) {
        settings.cache.capacity = v;
    }

    // ── Walker settings ─────────────────────────────────────────────
    if let Some(v) = read_env_u32("ARBOR_MAX_TREE_DEPTH", 1, 100_000) {
        settings.walker.max_depth = v;
    }

    // ── Token settings ──────────────────────────────────────────────
    if let Some(v) = read_env_usize("ARBOR_ENCODER_CACHE_SIZE", 1, 10_000) {
        settings.tokens.encoder_cache_size = v;
    }

    // ── Store settings ──────────────────────────────────────────────
    if let Some(v) = read_env_string("ARBOR_DB_PATH") {
        settings.store.db_path = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
