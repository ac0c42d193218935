//! # arbor-core
//!
//! Core data model for the arbor context engine.
//!
//! - **Branded IDs**: [`NodeId`] and [`SessionId`] newtypes so a node id can
//!   never be passed where a session id is expected
//! - **Nodes**: one message/turn in a branching conversation tree, linked to
//!   its parent via `parent_id` (`None` marks the root)
//! - **Context messages**: the role-tagged `{role, content}` pairs an
//!   assembled context is made of

#![deny(unsafe_code)]

pub mod ids;
pub mod node;

pub use ids::{NodeId, SessionId};
pub use node::{ContextMessage, Node, NodeRole};
