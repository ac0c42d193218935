//! Deterministic cache fingerprints.
//!
//! A fingerprint is SHA-256 over `(node id, model id, strategy version,
//! effective token budget, sorted reference set)`, rendered as lowercase
//! hex. Two requests with identical fingerprints always yield byte-identical
//! assembled context while the underlying nodes are unchanged — the cache
//! correctness invariant.
//!
//! Fields are length-prefixed before hashing so adjacent values can never
//! alias (`"ab" + "c"` vs `"a" + "bc"`).

use sha2::{Digest, Sha256};

use arbor_core::NodeId;

/// Version of the assembly strategy. Bump when the build procedure changes
/// in a way that alters output for the same inputs; old cache entries then
/// miss instead of serving stale shapes.
pub const STRATEGY_VERSION: u32 = 1;

/// A computed context fingerprint (lowercase hex SHA-256).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextFingerprint(String);

impl ContextFingerprint {
    /// Compute the fingerprint for an assembly request.
    ///
    /// `references` is the set of raw reference tokens extracted from the
    /// target prompt; it is deduplicated and sorted here so extraction
    /// order cannot influence the key. `token_budget` is the effective
    /// budget (model limit when the caller gave none) — it shapes the
    /// output, so it shapes the key.
    #[must_use]
    pub fn compute(
        node_id: &NodeId,
        model_id: &str,
        token_budget: u32,
        references: &[String],
    ) -> Self {
        let mut refs: Vec<&str> = references.iter().map(String::as_str).collect();
        refs.sort_unstable();
        refs.dedup();

        let mut hasher = Sha256::new();
        update_field(&mut hasher, node_id.as_str());
        update_field(&mut hasher, model_id);
        hasher.update(STRATEGY_VERSION.to_le_bytes());
        hasher.update(token_budget.to_le_bytes());
        for r in refs {
            update_field(&mut hasher, r);
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// The hex digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
