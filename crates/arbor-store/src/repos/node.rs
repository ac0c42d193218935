//! Node repository — tree storage operations.
//!
//! Nodes are rows of the `nodes` table and form a tree per session via
//! `parent_id`. Ancestor retrieval uses a recursive CTE with a hard level
//! cap so a corrupted chain (cycle or absurd depth) terminates at the cap
//! instead of spinning; the walker layer turns a capped result into a
//! typed error.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use arbor_core::{Node, NodeId, NodeRole, SessionId};

use crate::errors::Result;

const NODE_COLUMNS: &str = "id, session_id, parent_id, role, content, model, created_at";

/// Node repository — stateless, every method takes `&Connection`.
pub struct NodeRepo;

impl NodeRepo {
    /// Insert a single node.
    pub fn insert(conn: &Connection, node: &Node) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO nodes (id, session_id, parent_id, role, content, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.id.as_str(),
                node.session_id.as_str(),
                node.parent_id.as_ref().map(NodeId::as_str),
                node.role.as_str(),
                node.content,
                node.model,
                node.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a single node by ID.
    pub fn get_by_id(conn: &Connection, node_id: &NodeId) -> Result<Option<Node>> {
        let row = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![node_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get direct children of a node, oldest first.
    pub fn get_children(conn: &Connection, node_id: &NodeId) -> Result<Vec<Node>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![node_id.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get the ancestor chain from root to the given node (inclusive),
    /// using a recursive CTE capped at `max_depth` levels.
    ///
    /// If the chain is deeper than the cap (or cyclic), the result is
    /// exactly `max_depth` rows and its first row is not a root — callers
    /// detect corruption from that shape.
    pub fn get_ancestors(conn: &Connection, node_id: &NodeId, max_depth: u32) -> Result<Vec<Node>> {
        let mut stmt = conn.prepare(
            "WITH RECURSIVE ancestors(id, session_id, parent_id, role, content, model, created_at, lvl) AS (
               SELECT id, session_id, parent_id, role, content, model, created_at, 1
               FROM nodes WHERE id = ?1
               UNION ALL
               SELECT n.id, n.session_id, n.parent_id, n.role, n.content, n.model, n.created_at, a.lvl + 1
               FROM nodes n JOIN ancestors a ON n.id = a.parent_id
               WHERE a.lvl < ?2
             )
             SELECT id, session_id, parent_id, role, content, model, created_at
             FROM ancestors ORDER BY lvl DESC",
        )?;
        let rows = stmt
            .query_map(params![node_id.as_str(), max_depth], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Find nodes in a session whose id ends with `suffix`.
    ///
    /// Backs short-form reference resolution; scoping by session is what
    /// keeps references from leaking across sessions.
    pub fn find_by_session_and_suffix(
        conn: &Connection,
        session_id: &SessionId,
        suffix: &str,
    ) -> Result<Vec<Node>> {
        // Escape LIKE wildcards in the suffix; ids are hex in practice but
        // the store cannot assume that.
        let escaped = suffix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}");
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE session_id = ?1 AND id LIKE ?2 ESCAPE '\\'
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id.as_str(), pattern], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Update a node's content. Returns `true` if the node existed.
    pub fn update_content(conn: &Connection, node_id: &NodeId, content: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE nodes SET content = ?2 WHERE id = ?1",
            params![node_id.as_str(), content],
        )?;
        Ok(changed > 0)
    }

    /// Delete a single node. Returns `true` if the node existed.
    pub fn delete(conn: &Connection, node_id: &NodeId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM nodes WHERE id = ?1", params![node_id.as_str()])?;
        Ok(changed > 0)
    }

    /// Check if a node exists.
    pub fn exists(conn: &Connection, node_id: &NodeId) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            params![node_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Count nodes in a session.
    pub fn count_by_session(conn: &Connection, session_id: &SessionId) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE session_id = ?1",
            params![session_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Map a database row to a [`Node`].
    fn map_row(row: &Row<'_>) -> std::result::Result<Node, rusqlite::Error> {
        let role_str: String = row.get(3)?;
        let role = NodeRole::parse(&role_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                format!("unknown node role: {role_str}").into(),
            )
        })?;
        Ok(Node {
            id: NodeId::from_string(row.get(0)?),
            session_id: SessionId::from_string(row.get(1)?),
            parent_id: row.get::<_, Option<String>>(2)?.map(NodeId::from_string),
            role,
            content: row.get(4)?,
            model: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
