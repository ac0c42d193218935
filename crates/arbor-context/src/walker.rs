//! Ancestor chain retrieval.
//!
//! [`TreeWalker`] walks `parent_id` links upward from a target node and
//! returns the chain in root-to-target order. The walk is pure with respect
//! to store state and stops at:
//!
//! - a root (`parent_id` null),
//! - `max_depth` (the defensive cycle guard — exceeding it without finding
//!   a root surfaces [`AssemblyError::CorruptTree`] instead of looping), or
//! - the token budget — trimming from the *oldest* end so the most recent
//!   context survives. The target node itself is always kept.

use std::sync::Arc;

use arbor_core::{ContextMessage, Node, NodeId};
use arbor_store::NodeStore;
use arbor_tokens::TokenBudgeter;

use crate::errors::{AssemblyError, Result};

/// Options for one ancestor walk.
#[derive(Clone, Debug)]
pub struct WalkOptions {
    /// Hard depth bound (cycle guard).
    pub max_depth: u32,
    /// Optional token budget; `None` keeps the full chain.
    pub token_budget: Option<u32>,
    /// Model whose encoder prices the budget.
    pub model_id: String,
}

/// Walks ancestor chains against the store.
#[derive(Clone, Debug)]
pub struct TreeWalker {
    store: NodeStore,
    budgeter: Arc<TokenBudgeter>,
}

impl TreeWalker {
    /// Create a walker over the given store and budgeter.
    #[must_use]
    pub fn new(store: NodeStore, budgeter: Arc<TokenBudgeter>) -> Self {
        Self { store, budgeter }
    }

    /// Fetch the ancestor chain of `node_id` in root-to-target order.
    ///
    /// # Errors
    ///
    /// - [`AssemblyError::NotFound`] when the target does not exist
    /// - [`AssemblyError::CorruptTree`] when no root appears within
    ///   `max_depth` levels (cycle, runaway depth, or a dangling parent)
    pub fn ancestor_chain(&self, node_id: &NodeId, opts: &WalkOptions) -> Result<Vec<Node>> {
        let chain = self.store.get_ancestors(node_id, opts.max_depth)?;

        if chain.is_empty() {
            return Err(AssemblyError::NotFound(node_id.to_string()));
        }
        if !chain[0].is_root() {
            tracing::error!(
                node_id = %node_id,
                max_depth = opts.max_depth,
                "ancestor walk found no root within depth bound"
            );
            return Err(AssemblyError::CorruptTree {
                node_id: node_id.to_string(),
                max_depth: opts.max_depth,
            });
        }

        match opts.token_budget {
            Some(budget) => Ok(self.trim_to_budget(chain, budget, &opts.model_id)),
            None => Ok(chain),
        }
    }

    /// Keep the newest ancestors that fit the budget; the target (newest
    /// element) is always kept even when it alone exceeds the budget —
    /// content-level truncation is the assembler's job, not the walker's.
    fn trim_to_budget(&self, chain: Vec<Node>, budget: u32, model: &str) -> Vec<Node> {
        let mut total = 0u32;
        let mut keep_from = chain.len();

        for (i, node) in chain.iter().enumerate().rev() {
            let tokens = self
                .budgeter
                .count_messages(&[ContextMessage::from_node(node)], model);
            let is_target = i == chain.len() - 1;
            if !is_target && total.saturating_add(tokens) > budget {
                break;
            }
            total = total.saturating_add(tokens);
            keep_from = i;
        }

        if keep_from > 0 {
            tracing::debug!(
                dropped = keep_from,
                kept = chain.len() - keep_from,
                budget,
                "ancestor chain trimmed to token budget"
            );
        }
        chain[keep_from..].to_vec()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use arbor_core::{NodeRole, SessionId};
    use arbor_store::{NodePool, NodeRepo, PoolConfig};

    fn walker() -> (TreeWalker, NodeStore, SessionId) {
        let pool = Arc::new(NodePool::new_in_memory(PoolConfig::default()).unwrap());
        let store = NodeStore::open(pool).unwrap();
        let session = SessionId::from(store.create_session(None).unwrap().id);
        let budgeter = Arc::new(TokenBudgeter::new(8));
        (TreeWalker::new(store.clone(), budgeter), store, session)
    }

    fn opts(max_depth: u32, budget: Option<u32>) -> WalkOptions {
        WalkOptions {
            max_depth,
            token_budget: budget,
            model_id: "claude-opus-4-6".into(),
        }
    }

    fn raw_insert(store: &NodeStore, session: &SessionId, id: &str, parent: Option<&str>, content: &str) {
        let node = Node {
            id: NodeId::from(id),
            session_id: session.clone(),
            parent_id: parent.map(NodeId::from),
            role: NodeRole::User,
            content: content.into(),
            model: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        store
            .pool()
            .with_connection("test", |conn| NodeRepo::insert(conn, &node))
            .unwrap();
    }

    fn seed_chain(store: &NodeStore, session: &SessionId, n: usize) -> NodeId {
        let mut parent: Option<String> = None;
        for i in 0..n {
            let id = format!("chain{i:04}");
            raw_insert(store, session, &id, parent.as_deref(), &format!("message number {i}"));
            parent = Some(id);
        }
        NodeId::from(parent.unwrap())
    }

    #[test]
    fn full_chain_root_to_target() {
        let (walker, store, session) = walker();
        let leaf = seed_chain(&store, &session, 4);
        let chain = walker.ancestor_chain(&leaf, &opts(64, None)).unwrap();
        assert_eq!(chain.len(), 4);
        assert!(chain[0].is_root());
        assert_eq!(chain[3].id, leaf);
    }

    #[test]
    fn missing_target_is_not_found() {
        let (walker, _store, _session) = walker();
        let err = walker
            .ancestor_chain(&NodeId::from("ghost"), &opts(64, None))
            .unwrap_err();
        assert_matches!(err, AssemblyError::NotFound(_));
    }

    #[test]
    fn depth_breach_is_corrupt_tree() {
        let (walker, store, session) = walker();
        let leaf = seed_chain(&store, &session, 10);
        let err = walker.ancestor_chain(&leaf, &opts(5, None)).unwrap_err();
        assert_matches!(err, AssemblyError::CorruptTree { max_depth: 5, .. });
    }

    #[test]
    fn dangling_parent_is_corrupt_tree() {
        let (walker, store, session) = walker();
        raw_insert(&store, &session, "orphan00", None, "parent will dangle");
        // SQLite enforces the FK, so fabricate the dangling link directly
        // with foreign keys off for this one write.
        store
            .pool()
            .with_connection("test", |conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = OFF;
                     UPDATE nodes SET parent_id = 'missing0' WHERE id = 'orphan00';
                     PRAGMA foreign_keys = ON;",
                )?;
                Ok(())
            })
            .unwrap();
        let err = walker
            .ancestor_chain(&NodeId::from("orphan00"), &opts(64, None))
            .unwrap_err();
        assert_matches!(err, AssemblyError::CorruptTree { .. });
    }

    #[test]
    fn budget_drops_oldest_first() {
        let (walker, store, session) = walker();
        let leaf = seed_chain(&store, &session, 6);
        let full = walker.ancestor_chain(&leaf, &opts(64, None)).unwrap();
        // Budget for roughly half the chain.
        let budgeter = TokenBudgeter::new(4);
        let half: u32 = full[3..]
            .iter()
            .map(|n| budgeter.count_messages(&[ContextMessage::from_node(n)], "claude-opus-4-6"))
            .sum();

        let trimmed = walker.ancestor_chain(&leaf, &opts(64, Some(half))).unwrap();
        assert!(trimmed.len() < full.len());
        // Newest survive: trimmed is a suffix of the full chain.
        assert_eq!(trimmed.last().unwrap().id, leaf);
        let offset = full.len() - trimmed.len();
        for (i, node) in trimmed.iter().enumerate() {
            assert_eq!(node.id, full[offset + i].id);
        }
    }

    #[test]
    fn target_kept_even_when_over_budget() {
        let (walker, store, session) = walker();
        raw_insert(&store, &session, "bigroot0", None, &"x".repeat(4000));
        raw_insert(&store, &session, "bigleaf0", Some("bigroot0"), &"y".repeat(4000));
        let chain = walker
            .ancestor_chain(&NodeId::from("bigleaf0"), &opts(64, Some(1)))
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id.as_str(), "bigleaf0");
    }

    #[test]
    fn generous_budget_keeps_everything() {
        let (walker, store, session) = walker();
        let leaf = seed_chain(&store, &session, 5);
        let chain = walker
            .ancestor_chain(&leaf, &opts(64, Some(1_000_000)))
            .unwrap();
        assert_eq!(chain.len(), 5);
    }

    #[test]
    fn walk_does_not_mutate_store() {
        let (walker, store, session) = walker();
        let leaf = seed_chain(&store, &session, 3);
        let _ = walker.ancestor_chain(&leaf, &opts(64, None)).unwrap();
        assert_eq!(
            store.get_session(&session).unwrap().unwrap().node_count,
            0, // raw repo inserts bypass the facade counter
        );
        let chain = walker.ancestor_chain(&leaf, &opts(64, None)).unwrap();
        assert_eq!(chain.len(), 3);
    }
}
