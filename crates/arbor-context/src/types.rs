//! Assembly request and response types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use arbor_core::ContextMessage;

/// What to do when a reference fails to resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingRefPolicy {
    /// Proceed; the assembled context carries a warning annotation.
    #[default]
    Warn,
    /// Fail the request with `NotFound`.
    Fail,
}

/// Options for a context assembly request.
#[derive(Clone, Debug, Default)]
pub struct AssembleOptions {
    /// Token budget for the assembled sequence. Defaults to (and is always
    /// clamped by) the model's context limit.
    pub max_tokens: Option<u32>,
    /// Overall time budget; elapsing yields `Timeout`. Defaults to 30s.
    pub timeout: Option<Duration>,
    /// Unresolvable-reference handling. Ambiguous references always fail.
    pub missing_references: MissingRefPolicy,
}

/// An immutable assembled context — the cached product of one build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledContext {
    /// Fingerprint this context was built under (hex).
    pub fingerprint: String,
    /// The ordered message sequence to send to the model.
    pub messages: Vec<ContextMessage>,
    /// Token count of `messages`, including per-message overhead. Never
    /// exceeds the limit of the model it was built for.
    pub token_count: u32,
    /// Whether budget pressure dropped or shortened anything.
    pub truncated: bool,
    /// Non-fatal annotations (e.g. unresolved references).
    pub warnings: Vec<String>,
    /// When the build completed.
    pub built_at: DateTime<Utc>,
}

/// Response to an assembly request.
#[derive(Clone, Debug)]
pub struct ContextResponse {
    /// The assembled context (shared with the cache).
    pub context: Arc<AssembledContext>,
    /// `true` when served from a ready cache entry without any build.
    pub cache_hit: bool,
}

impl ContextResponse {
    /// The assembled message sequence.
    #[must_use]
    pub fn messages(&self) -> &[ContextMessage] {
        &self.context.messages
    }

    /// Token count of the assembled sequence.
    #[must_use]
    pub fn token_count(&self) -> u32 {
        self.context.token_count
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
