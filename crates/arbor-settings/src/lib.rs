//! # arbor-settings
//!
//! Configuration management with layered sources for the arbor engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`ArborSettings::default()`]
//! 2. **User file** — `~/.arbor/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `ARBOR_*` overrides (highest priority)
//!
//! Every cache/pool/walker tunable the engine exposes lives here so it can
//! be changed without a code change.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
///
/// Initialized on first access via [`get_settings`]. Service objects take
/// their config by value, so tests construct [`ArborSettings`] directly and
/// never touch this global.
static SETTINGS: OnceLock<ArborSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.arbor/settings.json` with env var
/// overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
pub fn get_settings() -> &'static ArborSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ArborSettings) -> std::result::Result<(), ArborSettings> {
    SETTINGS.set(settings)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = ArborSettings::default();
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.name, "arbor");
        assert_eq!(settings.pool.max_size, 16);
        assert_eq!(settings.pool.lease_timeout_ms, 5_000);
        assert_eq!(settings.cache.ttl_ms, 300_000);
        assert_eq!(settings.cache.capacity, 1_000);
        assert_eq!(settings.walker.max_depth, 256);
        assert_eq!(settings.tokens.encoder_cache_size, 64);
    }

    #[test]
    fn deep_merge_re_exported() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"y": 2});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
