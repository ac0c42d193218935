//! Encoders and the density heuristic.
//!
//! An [`Encoder`] pairs an [`EncodingId`] with an optional exact counter.
//! Exact counters are process-lifetime plugins ([`ExactEncoder`]); when none
//! is registered — the common case — counting falls back to a deterministic
//! character-density heuristic. The fallback never fails.
//!
//! ## Heuristic ratios
//!
//! - CJK-dense text: ≈2.0 chars/token (ideographs tokenize short)
//! - Code-like text: ≈4.5 chars/token (identifiers and ASCII punctuation
//!   compress well)
//! - Prose: ≈3.8 chars/token

use std::sync::Arc;

/// Identifies a token-counting scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncodingId {
    /// Anthropic Claude tokenizer family.
    Claude,
    /// `OpenAI` `cl100k_base` (GPT-4 / GPT-3.5).
    Cl100kBase,
    /// `OpenAI` `o200k_base` (GPT-4o and o-series).
    O200kBase,
    /// Google Gemini tokenizer family.
    Gemini,
    /// No known tokenizer — density heuristic only.
    Heuristic,
}

/// An exact token counter plugged in at runtime.
///
/// Implementations wrap a real tokenizer. When absent the heuristic is used
/// instead; the engine never errors because a tokenizer is missing.
pub trait ExactEncoder: Send + Sync {
    /// Count tokens in `text` exactly.
    fn count(&self, text: &str) -> u32;
}

/// Detected character density class of a text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextDensity {
    /// Mostly CJK ideographs / kana / hangul.
    CjkDense,
    /// Code-like: braces, semicolons, indentation.
    CodeLike,
    /// Ordinary prose.
    Prose,
}

impl TextDensity {
    /// Approximate chars per token for this density class.
    #[must_use]
    pub fn chars_per_token(self) -> f64 {
        match self {
            Self::CjkDense => 2.0,
            Self::CodeLike => 4.5,
            Self::Prose => 3.8,
        }
    }
}

/// Classify text density for heuristic estimation.
///
/// CJK wins when ideographic characters exceed 30% of the text. Code-like
/// wins when structural characters (`{};=()<>` and newline-indent pairs)
/// exceed 8%. Everything else is prose.
#[must_use]
pub fn detect_density(text: &str) -> TextDensity {
    if text.is_empty() {
        return TextDensity::Prose;
    }

    let mut total = 0usize;
    let mut cjk = 0usize;
    let mut structural = 0usize;

    for c in text.chars() {
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        } else if matches!(c, '{' | '}' | ';' | '=' | '(' | ')' | '<' | '>' | '[' | ']') {
            structural += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let cjk_ratio = cjk as f64 / total as f64;
    #[allow(clippy::cast_precision_loss)]
    let structural_ratio = structural as f64 / total as f64;

    if cjk_ratio > 0.30 {
        TextDensity::CjkDense
    } else if structural_ratio > 0.08 {
        TextDensity::CodeLike
    } else {
        TextDensity::Prose
    }
}

/// Whether a character falls in the common CJK ranges.
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'    // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'  // CJK Extension A
        | '\u{3040}'..='\u{30FF}'  // Hiragana + Katakana
        | '\u{AC00}'..='\u{D7AF}'  // Hangul syllables
        | '\u{F900}'..='\u{FAFF}'  // CJK Compatibility Ideographs
    )
}

/// Heuristic token count: chars divided by the detected density ratio,
/// rounded up. Empty text counts as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn heuristic_count(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    let ratio = detect_density(text).chars_per_token();
    #[allow(clippy::cast_precision_loss)]
    let tokens = (chars as f64 / ratio).ceil();
    (tokens as u32).max(1)
}

/// A per-model token counter.
///
/// Cloneable handle; the exact counter (if any) is shared.
#[derive(Clone)]
pub struct Encoder {
    id: EncodingId,
    exact: Option<Arc<dyn ExactEncoder>>,
}

impl Encoder {
    /// Create an encoder with no exact counter (heuristic only).
    #[must_use]
    pub fn heuristic(id: EncodingId) -> Self {
        Self { id, exact: None }
    }

    /// Create an encoder backed by an exact counter.
    #[must_use]
    pub fn exact(id: EncodingId, exact: Arc<dyn ExactEncoder>) -> Self {
        Self {
            id,
            exact: Some(exact),
        }
    }

    /// The encoding scheme this encoder implements.
    #[must_use]
    pub fn id(&self) -> EncodingId {
        self.id
    }

    /// Whether an exact counter is available.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.exact.is_some()
    }

    /// Count tokens in `text`. Never fails.
    #[must_use]
    pub fn count(&self, text: &str) -> u32 {
        match &self.exact {
            Some(exact) => exact.count(text),
            None => heuristic_count(text),
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("id", &self.id)
            .field("exact", &self.exact.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
