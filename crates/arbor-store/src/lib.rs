//! # arbor-store
//!
//! `SQLite` node store for the arbor context engine.
//!
//! - **[`pool`]**: bounded `r2d2` connection pool wrapped with a lease
//!   registry (holder, state, last-used), configurable exhaustion behavior,
//!   and a liveness probe for health endpoints.
//! - **[`migrations`]**: version-tracked schema evolution. Migrations are
//!   embedded at compile time and run transactionally.
//! - **[`repos`]**: stateless repository structs — each method takes
//!   `&Connection` and executes SQL. No shared mutable state.
//! - **[`store`]**: the [`NodeStore`] facade composing pool and
//!   repositories into session-centric operations.

#![deny(unsafe_code)]

pub mod errors;
pub mod migrations;
pub mod pool;
pub mod repos;
pub mod store;

pub use errors::{Result, StoreError};
pub use pool::{
    ExhaustedAction, Lease, LeaseInfo, LeaseState, NodePool, PoolConfig, PoolHealth, PoolMetrics,
    PoolStatus,
};
pub use repos::{NodeRepo, SessionRepo, SessionRow};
pub use store::NodeStore;
