//! Conversation nodes and assembled context messages.
//!
//! A [`Node`] is one message/turn in a branching conversation tree. Nodes
//! link upward via `parent_id`; a `None` parent marks the root. The chain is
//! acyclic by construction — children are only ever inserted under existing
//! nodes — but walkers still bound their depth defensively.
//!
//! A [`ContextMessage`] is one `{role, content}` entry of an assembled
//! context, the unit actually sent to a language model.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{NodeId, SessionId};

/// Role of a node (and of the context message derived from it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// User-authored prompt.
    User,
    /// Model-produced reply.
    Assistant,
    /// System instruction.
    System,
    /// Annotation attached to the tree (not model-produced).
    Note,
}

impl NodeRole {
    /// Stable string form used in storage and wire formats.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Note => "note",
        }
    }

    /// Parse from the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message/turn in a branching conversation tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id (lowercase hex).
    pub id: NodeId,
    /// Owning session.
    pub session_id: SessionId,
    /// Parent node; `None` marks the root of the tree.
    pub parent_id: Option<NodeId>,
    /// Role of this turn.
    pub role: NodeRole,
    /// Message text.
    pub content: String,
    /// Model that produced this node; `None` for user/system/note nodes.
    pub model: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl Node {
    /// Whether this node is the root of its tree.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One `{role, content}` entry of an assembled context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Message role.
    pub role: NodeRole,
    /// Message text.
    pub content: String,
}

impl ContextMessage {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: NodeRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: NodeRole::System,
            content: content.into(),
        }
    }

    /// Create a note message (reference annotations use this role).
    #[must_use]
    pub fn note(content: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Note,
            content: content.into(),
        }
    }

    /// Build the context message for a node.
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        Self {
            role: node.role,
            content: node.content.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
