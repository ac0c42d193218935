//! # arbor-context
//!
//! The context assembly and caching engine.
//!
//! Given a target node, build the exact message sequence sent to a language
//! model — ancestor chain plus any cross-referenced nodes — while respecting
//! a token budget, under concurrent load, without repeating expensive tree
//! walks or database round-trips.
//!
//! - **[`walker`]**: ancestor chain retrieval with depth guard and
//!   newest-first budget trimming
//! - **[`resolver`]**: cross-node reference extraction (`@id`, `#id`,
//!   `[[node:id]]`) and session-scoped resolution
//! - **[`fingerprint`]**: deterministic cache keys over
//!   `(node, model, strategy, reference set)`
//! - **[`assembler`]**: pure assembly — ordering, reference annotation,
//!   budget trimming
//! - **[`cache`]**: fingerprint-keyed cache with single-flight builds,
//!   cascading invalidation via a reverse index, TTL + LRU eviction
//! - **[`service`]**: [`ContextService`], the dependency-injected entry
//!   point owning pool, store, budgeter, and cache

#![deny(unsafe_code)]

pub mod assembler;
pub mod cache;
pub mod errors;
pub mod fingerprint;
pub mod resolver;
pub mod service;
pub mod types;
pub mod walker;

pub use cache::{CacheStats, ContextCache};
pub use errors::AssemblyError;
pub use fingerprint::{ContextFingerprint, STRATEGY_VERSION};
pub use resolver::{ReferenceMatch, ReferenceResolver, Resolution};
pub use service::ContextService;
pub use types::{AssembleOptions, AssembledContext, ContextResponse, MissingRefPolicy};
pub use walker::{TreeWalker, WalkOptions};
