//! Model registry — encoding and context-limit tables.
//!
//! Lookup is substring-based on the lowercased model identifier, so both
//! bare names (`claude-opus-4`) and provider-prefixed forms
//! (`anthropic/claude-opus-4`) resolve. Unknown models never error: they
//! get the default encoding and a conservative context limit.

use crate::encoder::EncodingId;

/// Look up the encoding for a model identifier.
///
/// Table-driven; unknown models fall back to [`EncodingId::Heuristic`].
#[must_use]
pub fn encoding_for_model(model: &str) -> EncodingId {
    let m = model.to_lowercase();
    if m.contains("claude") {
        EncodingId::Claude
    } else if m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") || m.contains("gpt-4o") {
        EncodingId::O200kBase
    } else if m.contains("gpt-4") || m.contains("gpt-3.5") {
        EncodingId::Cl100kBase
    } else if m.contains("gemini") {
        EncodingId::Gemini
    } else {
        EncodingId::Heuristic
    }
}

/// Look up the context window limit (tokens) for a model identifier.
///
/// Unknown models get a conservative 200K default.
#[must_use]
pub fn token_limit(model: &str) -> u32 {
    let m = model.to_lowercase();
    if m.contains("claude") {
        200_000
    } else if m.contains("gemini") {
        1_048_576
    } else if m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") {
        200_000
    } else if m.contains("gpt-4o") {
        128_000
    } else if m.contains("gpt-4") {
        128_000
    } else {
        200_000
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_models_use_claude_encoding() {
        assert_eq!(encoding_for_model("claude-opus-4-6"), EncodingId::Claude);
        assert_eq!(
            encoding_for_model("anthropic/claude-sonnet-4-5"),
            EncodingId::Claude
        );
    }

    #[test]
    fn openai_models_use_bpe_encodings() {
        assert_eq!(encoding_for_model("gpt-4o-mini"), EncodingId::O200kBase);
        assert_eq!(encoding_for_model("o3-mini"), EncodingId::O200kBase);
        assert_eq!(encoding_for_model("gpt-4-turbo"), EncodingId::Cl100kBase);
    }

    #[test]
    fn unknown_model_falls_back_to_heuristic() {
        assert_eq!(encoding_for_model("mystery-model-9000"), EncodingId::Heuristic);
        assert_eq!(encoding_for_model(""), EncodingId::Heuristic);
    }

    #[test]
    fn context_limit_claude() {
        assert_eq!(token_limit("claude-opus-4-6"), 200_000);
    }

    #[test]
    fn context_limit_gemini() {
        assert_eq!(token_limit("gemini-2-5-pro"), 1_048_576);
    }

    #[test]
    fn context_limit_gpt4() {
        assert_eq!(token_limit("gpt-4-turbo"), 128_000);
    }

    #[test]
    fn context_limit_unknown_is_conservative() {
        assert_eq!(token_limit("unknown"), 200_000);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(encoding_for_model("Claude-Opus-4-6"), EncodingId::Claude);
        assert_eq!(token_limit("GPT-4-TURBO"), 128_000);
    }
}
