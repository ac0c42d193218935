//! Error types for context assembly.
//!
//! [`AssemblyError`] is deliberately `Clone`: single-flight builds fan the
//! same outcome out to every concurrent waiter over a watch channel, so the
//! error must be shareable. Store errors are flattened to a message plus a
//! retryability flag at the conversion boundary.

use thiserror::Error;

use arbor_store::StoreError;

/// Errors surfaced by context assembly.
///
/// Backpressure (`PoolExhausted`, `Timeout`) is retryable with backoff;
/// data errors (`NotFound`, `Ambiguous`, `CorruptTree`) are not.
#[derive(Clone, Debug, Error)]
pub enum AssemblyError {
    /// Node or reference target absent.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A suffix reference matched more than one node. Never auto-resolved.
    #[error("ambiguous reference '{reference}' matches {} nodes", .matches.len())]
    Ambiguous {
        /// The raw reference token.
        reference: String,
        /// Every node id the suffix matched.
        matches: Vec<String>,
    },

    /// Depth limit breached without reaching a root — cycle or corruption.
    /// Fatal for the request, never loops.
    #[error("corrupt tree at node {node_id}: no root within {max_depth} levels")]
    CorruptTree {
        /// Node whose ancestor walk failed.
        node_id: String,
        /// The depth bound that was hit.
        max_depth: u32,
    },

    /// Connection pool at capacity; retry with backoff.
    #[error("connection pool exhausted after {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// Caller-supplied time budget elapsed; retry with backoff.
    #[error("context assembly timed out after {waited_ms}ms")]
    Timeout {
        /// The elapsed budget in milliseconds.
        waited_ms: u64,
    },

    /// Store failure (flattened for shareability).
    #[error("store error: {message}")]
    Store {
        /// Stringified store error.
        message: String,
        /// Whether the underlying store error was retryable.
        retryable: bool,
    },

    /// The in-flight build this request was waiting on disappeared
    /// (builder task panicked or was torn down).
    #[error("shared context build abandoned: {0}")]
    BuildAbandoned(String),
}

impl AssemblyError {
    /// Whether the caller should retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PoolExhausted { .. } | Self::Timeout { .. } | Self::BuildAbandoned(_) => true,
            Self::Store { retryable, .. } => *retryable,
            Self::NotFound(_) | Self::Ambiguous { .. } | Self::CorruptTree { .. } => false,
        }
    }

    /// Machine-readable error code for request boundaries.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Ambiguous { .. } => "AMBIGUOUS_REFERENCE",
            Self::CorruptTree { .. } => "CORRUPT_TREE",
            Self::PoolExhausted { .. } => "POOL_EXHAUSTED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Store { .. } => "STORE_ERROR",
            Self::BuildAbandoned(_) => "BUILD_ABANDONED",
        }
    }
}

impl From<StoreError> for AssemblyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NodeNotFound(id) => Self::NotFound(id),
            StoreError::PoolExhausted { waited_ms } => Self::PoolExhausted { waited_ms },
            other => Self::Store {
                retryable: other.is_retryable(),
                message: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for assembly results.
pub type Result<T> = std::result::Result<T, AssemblyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
