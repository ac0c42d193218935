//! High-level [`NodeStore`] facade.
//!
//! Composes the pool and repositories into session-centric operations.
//! Every write method runs inside a single `SQLite` transaction — callers
//! never observe partial state. Reads are consistent-after-write within a
//! session (`SQLite` WAL readers see committed writes immediately).

use std::sync::Arc;

use chrono::Utc;

use arbor_core::{Node, NodeId, NodeRole, SessionId};

use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::pool::NodePool;
use crate::repos::node::NodeRepo;
use crate::repos::session::{SessionRepo, SessionRow};

/// High-level node store wrapping a connection pool and the repositories.
#[derive(Clone)]
pub struct NodeStore {
    pool: Arc<NodePool>,
}

impl NodeStore {
    /// Open a store over the given pool, running pending migrations.
    pub fn open(pool: Arc<NodePool>) -> Result<Self> {
        let applied = pool.with_connection("migrations", |conn| run_migrations(conn))?;
        if applied > 0 {
            tracing::info!(applied, "node store schema migrated");
        }
        Ok(Self { pool })
    }

    /// The underlying connection pool (for health/status surfaces).
    #[must_use]
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Create a new session.
    pub fn create_session(&self, title: Option<&str>) -> Result<SessionRow> {
        let id = SessionId::new();
        let created_at = Utc::now().to_rfc3339();
        self.pool.with_connection("session.create", |conn| {
            SessionRepo::create(conn, &id, title, &created_at)?;
            SessionRepo::get(conn, &id)?
                .ok_or_else(|| StoreError::Internal("session vanished after insert".into()))
        })
    }

    /// Get a session.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Option<SessionRow>> {
        self.pool
            .with_connection("session.get", |conn| SessionRepo::get(conn, session_id))
    }

    /// Delete a session and (via cascade) all of its nodes.
    pub fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        self.pool.with_connection("session.delete", |conn| {
            SessionRepo::delete(conn, session_id)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node reads
    // ─────────────────────────────────────────────────────────────────────

    /// Get a node by id.
    pub fn get_node(&self, node_id: &NodeId) -> Result<Option<Node>> {
        self.pool
            .with_connection("node.get", |conn| NodeRepo::get_by_id(conn, node_id))
    }

    /// Get a node by id, erroring if absent.
    pub fn require_node(&self, node_id: &NodeId) -> Result<Node> {
        self.get_node(node_id)?
            .ok_or_else(|| StoreError::NodeNotFound(node_id.to_string()))
    }

    /// Get direct children of a node, oldest first.
    pub fn get_children(&self, node_id: &NodeId) -> Result<Vec<Node>> {
        self.pool
            .with_connection("node.children", |conn| NodeRepo::get_children(conn, node_id))
    }

    /// Get the ancestor chain (root → target), capped at `max_depth`.
    pub fn get_ancestors(&self, node_id: &NodeId, max_depth: u32) -> Result<Vec<Node>> {
        self.pool.with_connection("node.ancestors", |conn| {
            NodeRepo::get_ancestors(conn, node_id, max_depth)
        })
    }

    /// Find nodes in a session whose id ends with `suffix`.
    pub fn find_by_session_and_suffix(
        &self,
        session_id: &SessionId,
        suffix: &str,
    ) -> Result<Vec<Node>> {
        self.pool.with_connection("node.suffix", |conn| {
            NodeRepo::find_by_session_and_suffix(conn, session_id, suffix)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node writes
    // ─────────────────────────────────────────────────────────────────────

    /// Append a node under `parent_id` (or as a root when `None`).
    ///
    /// Atomic: parent validation, insert, and the session node-count bump
    /// happen in one transaction. The parent must exist and belong to the
    /// same session.
    pub fn append_node(
        &self,
        session_id: &SessionId,
        parent_id: Option<&NodeId>,
        role: NodeRole,
        content: &str,
        model: Option<&str>,
    ) -> Result<Node> {
        let node = Node {
            id: NodeId::new(),
            session_id: session_id.clone(),
            parent_id: parent_id.cloned(),
            role,
            content: content.to_owned(),
            model: model.map(str::to_owned),
            created_at: Utc::now().to_rfc3339(),
        };

        self.pool.with_connection("node.append", |conn| {
            let tx = conn.unchecked_transaction()?;

            if !SessionRepo::exists(&tx, session_id)? {
                return Err(StoreError::SessionNotFound(session_id.to_string()));
            }
            if let Some(parent_id) = parent_id {
                let parent = NodeRepo::get_by_id(&tx, parent_id)?
                    .ok_or_else(|| StoreError::NodeNotFound(parent_id.to_string()))?;
                if parent.session_id != *session_id {
                    return Err(StoreError::Internal(format!(
                        "parent {parent_id} belongs to a different session"
                    )));
                }
            }

            NodeRepo::insert(&tx, &node)?;
            SessionRepo::adjust_node_count(&tx, session_id, 1)?;
            tx.commit()?;
            Ok(node.clone())
        })
    }

    /// Edit a node's content.
    pub fn update_content(&self, node_id: &NodeId, content: &str) -> Result<()> {
        self.pool.with_connection("node.update", |conn| {
            if NodeRepo::update_content(conn, node_id, content)? {
                Ok(())
            } else {
                Err(StoreError::NodeNotFound(node_id.to_string()))
            }
        })
    }

    /// Delete a node and (via cascade) its subtree.
    ///
    /// Returns the number of nodes removed (0 when the node was absent).
    pub fn delete_node(&self, node_id: &NodeId) -> Result<i64> {
        self.pool.with_connection("node.delete", |conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(node) = NodeRepo::get_by_id(&tx, node_id)? else {
                return Ok(0);
            };
            let before = NodeRepo::count_by_session(&tx, &node.session_id)?;
            let _ = NodeRepo::delete(&tx, node_id)?;
            let after = NodeRepo::count_by_session(&tx, &node.session_id)?;
            let removed = before - after;
            SessionRepo::adjust_node_count(&tx, &node.session_id, -removed)?;
            tx.commit()?;
            Ok(removed)
        })
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore").field("pool", &self.pool).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
