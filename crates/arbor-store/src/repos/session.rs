//! Session repository.
//!
//! Sessions are the owning scope for nodes. Deleting a session cascades to
//! its nodes via the foreign key (pragma `foreign_keys = ON` is applied by
//! the pool customizer).

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use arbor_core::SessionId;

use crate::errors::Result;

/// A session row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    /// Session id.
    pub id: String,
    /// Optional human title.
    pub title: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Denormalized node count, maintained by the store facade.
    pub node_count: i64,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Create a session.
    pub fn create(
        conn: &Connection,
        session_id: &SessionId,
        title: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, title, created_at, node_count) VALUES (?1, ?2, ?3, 0)",
            params![session_id.as_str(), title, created_at],
        )?;
        Ok(())
    }

    /// Get a session by id.
    pub fn get(conn: &Connection, session_id: &SessionId) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT id, title, created_at, node_count FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Check if a session exists.
    pub fn exists(conn: &Connection, session_id: &SessionId) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete a session (nodes cascade). Returns `true` if it existed.
    pub fn delete(conn: &Connection, session_id: &SessionId) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM sessions WHERE id = ?1",
            params![session_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Adjust the denormalized node count.
    pub fn adjust_node_count(conn: &Connection, session_id: &SessionId, delta: i64) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions SET node_count = node_count + ?2 WHERE id = ?1",
            params![session_id.as_str(), delta],
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> std::result::Result<SessionRow, rusqlite::Error> {
        Ok(SessionRow {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
            node_count: row.get(3)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
