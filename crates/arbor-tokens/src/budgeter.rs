//! The token budgeter service.
//!
//! [`TokenBudgeter`] owns a bounded per-model encoder cache and provides the
//! three operations the assembly engine needs: counting raw text, counting
//! message sequences (with per-message role/format overhead), and
//! deterministic budgeted truncation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use arbor_core::ContextMessage;

use crate::encoder::{Encoder, EncodingId, ExactEncoder};
use crate::registry::{encoding_for_model, token_limit};

/// Formatting overhead charged per message beyond the role string, in chars.
const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Result of a budgeted truncation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Truncation {
    /// The (possibly truncated) text — always a prefix of the input.
    pub text: String,
    /// Token count of `text`.
    pub token_count: u32,
    /// `true` whenever `text` differs from the input.
    pub truncated: bool,
}

/// Token counting and truncation service.
///
/// Encoders are cached per model identifier for the process lifetime in a
/// bounded LRU. Exact encoders registered for an encoding apply to every
/// model mapped to that encoding; models without one use the density
/// heuristic.
pub struct TokenBudgeter {
    encoders: Mutex<LruCache<String, Encoder>>,
    exact: Mutex<HashMap<EncodingId, Arc<dyn ExactEncoder>>>,
}

impl TokenBudgeter {
    /// Create a budgeter with the given encoder cache bound.
    #[must_use]
    pub fn new(encoder_cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(encoder_cache_size.max(1)).expect("max(1) is non-zero");
        Self {
            encoders: Mutex::new(LruCache::new(cap)),
            exact: Mutex::new(HashMap::new()),
        }
    }

    /// Register an exact encoder for an encoding.
    ///
    /// Applies to encoders created after registration; already-cached
    /// heuristic encoders for the encoding are dropped so the next lookup
    /// picks up the exact counter.
    pub fn register_exact(&self, id: EncodingId, exact: Arc<dyn ExactEncoder>) {
        let _ = self.exact.lock().insert(id, exact);
        // Drop stale heuristic entries for this encoding.
        let mut cache = self.encoders.lock();
        let stale: Vec<String> = cache
            .iter()
            .filter(|(_, enc)| enc.id() == id && !enc.is_exact())
            .map(|(model, _)| model.clone())
            .collect();
        for model in stale {
            let _ = cache.pop(&model);
        }
    }

    /// Get (or build and cache) the encoder for a model.
    #[must_use]
    pub fn encoder_for(&self, model: &str) -> Encoder {
        let mut cache = self.encoders.lock();
        if let Some(enc) = cache.get(model) {
            return enc.clone();
        }
        let id = encoding_for_model(model);
        let enc = match self.exact.lock().get(&id) {
            Some(exact) => Encoder::exact(id, Arc::clone(exact)),
            None => Encoder::heuristic(id),
        };
        let _ = cache.put(model.to_owned(), enc.clone());
        enc
    }

    /// Count tokens in `text` for `model`. Never fails.
    #[must_use]
    pub fn count(&self, text: &str, model: &str) -> u32 {
        self.encoder_for(model).count(text)
    }

    /// Count tokens in a message sequence, including per-message overhead
    /// for the role tag and message framing.
    #[must_use]
    pub fn count_messages(&self, messages: &[ContextMessage], model: &str) -> u32 {
        let encoder = self.encoder_for(model);
        messages
            .iter()
            .map(|m| encoder.count(&m.content) + message_overhead_tokens(m))
            .sum()
    }

    /// Overhead tokens for a single message (role + framing, no content).
    #[must_use]
    pub fn message_overhead(&self, message: &ContextMessage) -> u32 {
        message_overhead_tokens(message)
    }

    /// Truncate `text` so its token count fits the budget.
    ///
    /// The effective limit is `max_tokens` when given, clamped to the
    /// model's context limit so the result never exceeds what the model
    /// accepts. Finds the longest character-boundary prefix that fits
    /// via binary search; deterministic for identical input.
    #[must_use]
    pub fn truncate_to_limit(
        &self,
        text: &str,
        model: &str,
        max_tokens: Option<u32>,
    ) -> Truncation {
        let model_limit = token_limit(model);
        let limit = max_tokens.unwrap_or(model_limit).min(model_limit);
        let encoder = self.encoder_for(model);

        let full = encoder.count(text);
        if full <= limit {
            return Truncation {
                text: text.to_owned(),
                token_count: full,
                truncated: false,
            };
        }

        let chars: Vec<char> = text.chars().collect();
        // Largest prefix length (in chars) whose count fits the limit.
        // The empty prefix always fits (count 0), so `lo` is a valid answer
        // at every step.
        let mut lo = 0usize;
        let mut hi = chars.len();
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let prefix: String = chars[..mid].iter().collect();
            if encoder.count(&prefix) <= limit {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let kept: String = chars[..lo].iter().collect();
        let token_count = encoder.count(&kept);
        Truncation {
            truncated: kept != text,
            token_count,
            text: kept,
        }
    }
}

impl std::fmt::Debug for TokenBudgeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgeter")
            .field("cached_encoders", &self.encoders.lock().len())
            .finish()
    }
}

/// Role string length plus framing overhead, converted at 4 chars/token.
fn message_overhead_tokens(message: &ContextMessage) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let tokens = (message.role.as_str().len() + MESSAGE_OVERHEAD_CHARS).div_ceil(4) as u32;
    tokens
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
