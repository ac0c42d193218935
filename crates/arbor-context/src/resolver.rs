//! Cross-node reference extraction and resolution.
//!
//! Three equivalent syntaxes are recognized and union their results:
//!
//! - `@<id>` / `@node_<id>`
//! - `#<id>`
//! - `[[node:<id>]]`
//!
//! where `<id>` is a hexadecimal identifier of at least 8 characters, in
//! full or suffix form. Extraction is regex-based; resolution is strictly
//! table-driven against the store and scoped to the requesting session —
//! a reference can never reach into another session's tree.
//!
//! Suffix forms resolve by matching the trailing characters of node ids.
//! An ambiguous suffix (>1 match) is reported as [`Resolution::Ambiguous`],
//! never silently resolved to the first match. Unresolvable references are
//! reported as [`Resolution::NotFound`], never dropped — callers decide
//! whether to fail or proceed with a warning annotation.

use std::sync::OnceLock;

use regex::Regex;

use arbor_core::{Node, NodeId, SessionId};
use arbor_store::NodeStore;

use crate::errors::Result;

fn at_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(?:node_)?([0-9a-fA-F]{8,})").expect("valid regex"))
}

fn hash_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([0-9a-fA-F]{8,})").expect("valid regex"))
}

fn wiki_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[node:([0-9a-fA-F]{8,})\]\]").expect("valid regex"))
}

/// Extract candidate reference identifiers from prompt text.
///
/// Returns normalized (lowercase) identifiers in order of first appearance,
/// duplicates removed. The three syntaxes union their results.
#[must_use]
pub fn extract_references(prompt: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for re in [at_pattern(), hash_pattern(), wiki_pattern()] {
        for caps in re.captures_iter(prompt) {
            let m = caps.get(1).expect("pattern has one capture group");
            found.push((m.start(), m.as_str().to_lowercase()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = std::collections::HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, id)| seen.insert(id.clone()).then_some(id))
        .collect()
}

/// Outcome of resolving one candidate identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one node matched.
    Resolved(Node),
    /// No node in the session matched.
    NotFound,
    /// More than one node matched the suffix.
    Ambiguous {
        /// Every matching node id.
        matches: Vec<NodeId>,
    },
}

/// A reference extracted from prompt text, paired with its resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceMatch {
    /// The normalized reference token as extracted.
    pub raw_token: String,
    /// What it resolved to within the session.
    pub resolution: Resolution,
}

impl ReferenceMatch {
    /// The resolved node, if resolution succeeded.
    #[must_use]
    pub fn node(&self) -> Option<&Node> {
        match &self.resolution {
            Resolution::Resolved(node) => Some(node),
            _ => None,
        }
    }
}

/// Resolves candidate identifiers against the node store.
#[derive(Clone, Debug)]
pub struct ReferenceResolver {
    store: NodeStore,
}

impl ReferenceResolver {
    /// Create a resolver over the given store.
    #[must_use]
    pub fn new(store: NodeStore) -> Self {
        Self { store }
    }

    /// Resolve candidates within a session.
    ///
    /// Full ids match directly (when they belong to the session); suffix
    /// forms match trailing characters of the session's node ids. Results
    /// preserve candidate order.
    pub fn resolve_references(
        &self,
        candidates: &[String],
        session_id: &SessionId,
    ) -> Result<Vec<ReferenceMatch>> {
        candidates
            .iter()
            .map(|candidate| {
                let resolution = self.resolve_one(candidate, session_id)?;
                Ok(ReferenceMatch {
                    raw_token: candidate.clone(),
                    resolution,
                })
            })
            .collect()
    }

    fn resolve_one(&self, candidate: &str, session_id: &SessionId) -> Result<Resolution> {
        // Exact id match, gated on session ownership.
        if let Some(node) = self.store.get_node(&NodeId::from(candidate))? {
            if node.session_id == *session_id {
                return Ok(Resolution::Resolved(node));
            }
            // A foreign session's node is invisible here; the candidate may
            // still be a suffix of one of ours.
        }

        let matches = self
            .store
            .find_by_session_and_suffix(session_id, candidate)?;
        match matches.len() {
            0 => Ok(Resolution::NotFound),
            1 => Ok(Resolution::Resolved(
                matches.into_iter().next().expect("len checked"),
            )),
            _ => Ok(Resolution::Ambiguous {
                matches: matches.into_iter().map(|n| n.id).collect(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
