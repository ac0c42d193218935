//! `SQLite` connection pool with lease tracking and health probing.
//!
//! Wraps `r2d2` + `r2d2_sqlite`. The [`PragmaCustomizer`] runs on each new
//! connection to ensure WAL mode, foreign keys, and performance pragmas are
//! set. `r2d2`'s built-in reaper (`idle_timeout` / `max_lifetime`) closes and
//! replaces stale connections.
//!
//! On top of `r2d2`, [`NodePool`] maintains a lease registry: each checkout
//! occupies a numbered slot recording holder, state, and last-used time, so
//! `pool_status()` can report per-connection detail without touching the
//! pool itself. A [`Lease`] releases its slot on drop — every exit path,
//! including panics, returns the connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use arbor_settings::{ExhaustionPolicy, PoolSettings};

use crate::errors::{Result, StoreError};

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Unique suffix for in-memory databases so pools never share state.
static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Behavior when the pool is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExhaustedAction {
    /// Wait up to the lease timeout, then fail with `PoolExhausted`.
    Queue,
    /// Fail immediately if no connection is idle.
    FailFast,
}

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum concurrent leases (default: 16).
    pub max_size: u32,
    /// How long an acquire may queue before failing.
    pub lease_timeout: Duration,
    /// Queue or fail fast once capacity is reached.
    pub exhausted: ExhaustedAction,
    /// Connections idle beyond this are closed and replaced.
    pub idle_timeout: Duration,
    /// Busy timeout in milliseconds (default: 30000).
    pub busy_timeout_ms: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            lease_timeout: Duration::from_secs(5),
            exhausted: ExhaustedAction::Queue,
            idle_timeout: Duration::from_secs(300),
            busy_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    /// Build a pool config from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self {
            max_size: settings.max_size,
            lease_timeout: Duration::from_millis(settings.lease_timeout_ms),
            exhausted: match settings.exhaustion_policy {
                ExhaustionPolicy::Queue => ExhaustedAction::Queue,
                ExhaustionPolicy::FailFast => ExhaustedAction::FailFast,
            },
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            busy_timeout_ms: settings.busy_timeout_ms,
        }
    }
}

/// `SQLite` pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        Ok(())
    }
}

/// Lifecycle state of a lease slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// Slot free; its connection sits idle in the pool.
    Idle,
    /// Checked out by a holder.
    Leased,
    /// Pool has been closed.
    Closed,
}

/// One lease slot of the pool, as reported by [`NodePool::status`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    /// Slot number, stable for the pool lifetime.
    pub id: usize,
    /// Current state.
    pub state: LeaseState,
    /// When the slot last changed hands.
    pub last_used_at: DateTime<Utc>,
    /// Holder label of the current (or most recent) lease.
    pub lease_holder: Option<String>,
}

/// Counters accumulated over the pool lifetime.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    /// Successful acquisitions.
    pub acquired_total: u64,
    /// Acquisitions that failed with `PoolExhausted`.
    pub exhausted_total: u64,
}

/// Snapshot of pool state for health/debug surfaces.
///
/// Produced without acquiring a connection, so polling it never perturbs
/// pool behavior.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Configured maximum leases.
    pub max_size: u32,
    /// Connections currently checked out.
    pub in_use: u32,
    /// Connections sitting idle in the pool.
    pub idle: u32,
    /// Lifetime counters.
    pub metrics: PoolMetrics,
    /// Per-slot lease detail.
    pub connections: Vec<LeaseInfo>,
}

/// Result of a liveness probe.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHealth {
    /// Whether the probe query succeeded.
    pub reachable: bool,
    /// Probe round-trip latency in milliseconds.
    pub latency_ms: u64,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
    /// Failure detail when unreachable.
    pub error: Option<String>,
}

/// Bounded connection pool with lease tracking.
pub struct NodePool {
    inner: Pool<SqliteConnectionManager>,
    config: PoolConfig,
    slots: Mutex<Vec<LeaseInfo>>,
    acquired_total: AtomicU64,
    exhausted_total: AtomicU64,
}

impl NodePool {
    /// Create a pool over a shared in-memory database (for testing and
    /// ephemeral deployments). Each pool gets its own database.
    pub fn new_in_memory(config: PoolConfig) -> Result<Self> {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:arbor_mem_{seq}?mode=memory&cache=shared");
        let manager = SqliteConnectionManager::file(uri).with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        Self::build(manager, config)
    }

    /// Create a pool over a file-backed database.
    pub fn new_file(path: &str, config: PoolConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        Self::build(manager, config)
    }

    fn build(manager: SqliteConnectionManager, config: PoolConfig) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.lease_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)?;
        Ok(Self {
            inner: pool,
            config,
            slots: Mutex::new(Vec::new()),
            acquired_total: AtomicU64::new(0),
            exhausted_total: AtomicU64::new(0),
        })
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire a connection lease.
    ///
    /// Under `Queue` policy, waits up to the lease timeout; under
    /// `FailFast`, returns `PoolExhausted` immediately when nothing is
    /// idle. `holder` labels the lease for diagnostics.
    pub fn acquire(&self, holder: &str) -> Result<Lease<'_>> {
        let started = Instant::now();
        let conn = match self.config.exhausted {
            ExhaustedAction::Queue => {
                self.inner
                    .get_timeout(self.config.lease_timeout)
                    .map_err(|_| {
                        let _ = self.exhausted_total.fetch_add(1, Ordering::Relaxed);
                        #[allow(clippy::cast_possible_truncation)]
                        let waited_ms = started.elapsed().as_millis() as u64;
                        tracing::warn!(holder, waited_ms, "pool exhausted");
                        StoreError::PoolExhausted { waited_ms }
                    })?
            }
            ExhaustedAction::FailFast => self.inner.try_get().ok_or_else(|| {
                let _ = self.exhausted_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(holder, "pool exhausted (fail-fast)");
                StoreError::PoolExhausted { waited_ms: 0 }
            })?,
        };

        let _ = self.acquired_total.fetch_add(1, Ordering::Relaxed);
        let slot = self.claim_slot(holder);
        Ok(Lease {
            pool: self,
            slot,
            conn: Some(conn),
        })
    }

    /// Acquire a connection, run `f`, and release on every exit path.
    pub fn with_connection<T>(
        &self,
        holder: &str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let lease = self.acquire(holder)?;
        f(&lease)
    }

    /// Run a liveness probe (`SELECT 1`) and report latency.
    ///
    /// Never returns an error — an unreachable pool reports
    /// `reachable: false` with the failure message instead.
    pub fn health_check(&self) -> PoolHealth {
        let started = Instant::now();
        let outcome = self
            .acquire("health-probe")
            .and_then(|lease| {
                lease
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(StoreError::from)
            });
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(_) => PoolHealth {
                reachable: true,
                latency_ms,
                checked_at: Utc::now(),
                error: None,
            },
            Err(e) => PoolHealth {
                reachable: false,
                latency_ms,
                checked_at: Utc::now(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Snapshot pool state without acquiring a connection.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state();
        PoolStatus {
            max_size: self.config.max_size,
            in_use: state.connections - state.idle_connections,
            idle: state.idle_connections,
            metrics: PoolMetrics {
                acquired_total: self.acquired_total.load(Ordering::Relaxed),
                exhausted_total: self.exhausted_total.load(Ordering::Relaxed),
            },
            connections: self.slots.lock().clone(),
        }
    }

    /// Mark every slot closed. Called by service teardown; subsequent
    /// status snapshots reflect the shutdown. Outstanding leases still
    /// release normally when dropped.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            slot.state = LeaseState::Closed;
        }
        tracing::info!("node pool closed");
    }

    /// Claim the lowest free slot, growing the registry up to `max_size`.
    fn claim_slot(&self, holder: &str) -> usize {
        let mut slots = self.slots.lock();
        let now = Utc::now();
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| s.state == LeaseState::Idle)
        {
            slot.state = LeaseState::Leased;
            slot.last_used_at = now;
            slot.lease_holder = Some(holder.to_owned());
            return slot.id;
        }
        let id = slots.len();
        slots.push(LeaseInfo {
            id,
            state: LeaseState::Leased,
            last_used_at: now,
            lease_holder: Some(holder.to_owned()),
        });
        id
    }

    /// Return a slot to idle. Closed slots stay closed.
    fn release_slot(&self, id: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
            if slot.state == LeaseState::Leased {
                slot.state = LeaseState::Idle;
            }
            slot.last_used_at = Utc::now();
        }
    }
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("max_size", &self.config.max_size)
            .field("state", &self.inner.state())
            .finish()
    }
}

/// A scoped, exclusive borrow of a pooled connection.
///
/// Dereferences to [`rusqlite::Connection`]. Dropping the lease returns the
/// connection to the pool and frees its registry slot — release is
/// guaranteed on all exit paths.
pub struct Lease<'a> {
    pool: &'a NodePool,
    slot: usize,
    conn: Option<PooledConnection>,
}

impl std::fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("slot", &self.slot).finish()
    }
}

impl std::ops::Deref for Lease<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        drop(self.conn.take());
        self.pool.release_slot(self.slot);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
