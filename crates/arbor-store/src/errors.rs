//! Error types for the node store subsystem.
//!
//! [`StoreError`] is the primary error type returned by all store
//! operations. Pool backpressure (`PoolExhausted`) is distinguished from
//! data errors so callers can retry with backoff instead of failing a
//! request outright.

use thiserror::Error;

/// Errors that can occur during node store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested node was not found.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Pool at capacity and the wait budget (if any) elapsed.
    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// Internal error (e.g. invariant violation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the caller should retry with backoff.
    ///
    /// Only backpressure is retryable; data and schema errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Pool(_))
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
