//! Fingerprint-keyed cache of assembled contexts.
//!
//! Per-fingerprint state machine: `Absent → Building → Ready →
//! (Invalidated → Absent)`.
//!
//! - **Single-flight**: concurrent requests for a fingerprint that is
//!   `Building` receive a watch receiver for the in-flight build instead of
//!   triggering duplicate tree walks. The slot is cleared on completion or
//!   failure; a builder that dies without publishing closes the channel and
//!   waiters see `BuildAbandoned`.
//! - **Invalidation**: a reverse index `node id → dependent fingerprints`
//!   lets any node write cascade to every context that included the node.
//!   An invalidation that lands while a build is in flight marks the slot
//!   stale, so the build's result is delivered to waiters but never stored —
//!   a stale `Ready` entry cannot survive a write.
//! - **Eviction**: TTL on read plus capacity-bounded LRU. Eviction is O(1)
//!   and never blocks reads of other fingerprints beyond the map lock.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use arbor_core::NodeId;
use arbor_settings::CacheSettings;

use crate::errors::AssemblyError;
use crate::fingerprint::ContextFingerprint;
use crate::types::AssembledContext;

/// Result delivered to every waiter of a shared build.
pub type BuildOutcome = Result<Arc<AssembledContext>, AssemblyError>;

/// Cache configuration.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Maximum ready entries (LRU beyond this).
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 1_000,
        }
    }
}

impl CacheConfig {
    /// Build a cache config from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            ttl: Duration::from_millis(settings.ttl_ms),
            capacity: settings.capacity,
        }
    }
}

/// A ready cache entry.
struct CacheEntry {
    context: Arc<AssembledContext>,
    dependencies: Vec<NodeId>,
    expires_at: Instant,
    size_bytes: u64,
}

/// An in-flight build slot.
struct BuildSlot {
    rx: watch::Receiver<Option<BuildOutcome>>,
    stale: Arc<AtomicBool>,
}

/// Exclusive right to run the build for one fingerprint.
///
/// Obtained from [`ContextCache::begin`]; finished with
/// [`ContextCache::publish`]. Dropping an unpublished permit closes the
/// channel; the next `begin` for the fingerprint reclaims the slot.
pub struct BuildPermit {
    fingerprint: ContextFingerprint,
    tx: watch::Sender<Option<BuildOutcome>>,
    stale: Arc<AtomicBool>,
    started: Instant,
    start_epoch: u64,
    published: bool,
}

impl BuildPermit {
    /// Receiver for this build's outcome (the builder awaits it too, so
    /// its own cancellation cannot cancel the shared build).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<BuildOutcome>> {
        self.tx.subscribe()
    }
}

/// Outcome of [`ContextCache::begin`].
pub enum Begin {
    /// Served from a ready entry.
    Ready(Arc<AssembledContext>),
    /// Another request is building this fingerprint; await the receiver.
    Wait(watch::Receiver<Option<BuildOutcome>>),
    /// This request builds; publish through the permit.
    Build(Box<BuildPermit>),
}

/// Cache statistics for health/debug surfaces.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Ready entries currently held.
    pub entries: usize,
    /// Requests served from a ready entry.
    pub hits: u64,
    /// Requests that had to build or wait on a build.
    pub misses: u64,
    /// hits / (hits + misses), 0 when no requests yet.
    pub hit_rate: f64,
    /// Builds completed (success or failure).
    pub builds: u64,
    /// Node-write invalidation events processed.
    pub invalidations: u64,
    /// Entries evicted by TTL or capacity.
    pub evictions: u64,
    /// Approximate resident size of cached contexts.
    pub size_estimate_bytes: u64,
    /// Mean build latency in milliseconds, 0 when no builds yet.
    pub avg_build_latency_ms: f64,
}

/// The assembled-context cache.
pub struct ContextCache {
    config: CacheConfig,
    ready: Mutex<LruCache<ContextFingerprint, CacheEntry>>,
    building: DashMap<String, BuildSlot>,
    reverse: Mutex<HashMap<String, HashSet<ContextFingerprint>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    size_bytes: AtomicU64,
    build_latency_total_ms: AtomicU64,
    /// Bumped on every invalidation. A build that overlaps any write is
    /// delivered to its waiters but not cached — the reverse index cannot
    /// cover a first build whose dependencies aren't recorded yet, so the
    /// epoch closes that window.
    write_epoch: AtomicU64,
}

impl ContextCache {
    /// Create a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.capacity.max(1)).expect("max(1) is non-zero");
        Self {
            config,
            ready: Mutex::new(LruCache::new(cap)),
            building: DashMap::new(),
            reverse: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            size_bytes: AtomicU64::new(0),
            build_latency_total_ms: AtomicU64::new(0),
            write_epoch: AtomicU64::new(0),
        }
    }

    /// Look up a fingerprint or claim the right to build it.
    pub fn begin(&self, fingerprint: &ContextFingerprint) -> Begin {
        if let Some(context) = self.lookup_ready(fingerprint) {
            let _ = self.hits.fetch_add(1, Ordering::Relaxed);
            return Begin::Ready(context);
        }
        let _ = self.misses.fetch_add(1, Ordering::Relaxed);

        match self.building.entry(fingerprint.as_str().to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                // A closed channel means the builder died without
                // publishing; take over the slot instead of waiting on a
                // build that will never finish.
                if slot.get().rx.has_changed().is_err() {
                    let (permit, fresh) = self.new_slot(fingerprint);
                    let _ = slot.insert(fresh);
                    return Begin::Build(permit);
                }
                Begin::Wait(slot.get().rx.clone())
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (permit, slot) = self.new_slot(fingerprint);
                let _ = vacant.insert(slot);
                Begin::Build(permit)
            }
        }
    }

    fn new_slot(&self, fingerprint: &ContextFingerprint) -> (Box<BuildPermit>, BuildSlot) {
        let (tx, rx) = watch::channel(None);
        let stale = Arc::new(AtomicBool::new(false));
        let slot = BuildSlot {
            rx,
            stale: Arc::clone(&stale),
        };
        let permit = Box::new(BuildPermit {
            fingerprint: fingerprint.clone(),
            tx,
            stale,
            started: Instant::now(),
            start_epoch: self.write_epoch.load(Ordering::Acquire),
            published: false,
        });
        (permit, slot)
    }

    /// Publish a build outcome: deliver it to every waiter, clear the
    /// building slot, and (for an un-invalidated success) store the entry.
    pub fn publish(&self, mut permit: Box<BuildPermit>, outcome: BuildOutcome, dependencies: Vec<NodeId>) {
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = permit.started.elapsed().as_millis() as u64;
        let _ = self.builds.fetch_add(1, Ordering::Relaxed);
        let _ = self.build_latency_total_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let _ = self.building.remove(permit.fingerprint.as_str());

        if let Ok(context) = &outcome {
            let raced_a_write = permit.stale.load(Ordering::Acquire)
                || self.write_epoch.load(Ordering::Acquire) != permit.start_epoch;
            if raced_a_write {
                tracing::debug!(
                    fingerprint = permit.fingerprint.as_str(),
                    "build overlapped a write; result delivered but not cached"
                );
            } else {
                self.insert_ready(&permit.fingerprint, Arc::clone(context), dependencies);
            }
        }

        permit.published = true;
        let _ = permit.tx.send(Some(outcome));
    }

    /// Invalidate every fingerprint whose dependency set includes the node.
    ///
    /// Ready entries are removed; in-flight builds are marked stale so
    /// their results are never stored. Returns the number of fingerprints
    /// touched.
    pub fn invalidate_node(&self, node_id: &NodeId) -> usize {
        let _ = self.write_epoch.fetch_add(1, Ordering::AcqRel);
        let Some(fingerprints) = self.reverse.lock().remove(node_id.as_str()) else {
            let _ = self.invalidations.fetch_add(1, Ordering::Relaxed);
            return 0;
        };
        let _ = self.invalidations.fetch_add(1, Ordering::Relaxed);

        let mut touched = 0;
        for fingerprint in fingerprints {
            touched += 1;
            if let Some(entry) = self.ready.lock().pop(&fingerprint) {
                self.detach(&fingerprint, &entry, Some(node_id));
                let _ = self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Relaxed);
            }
            if let Some(slot) = self.building.get(fingerprint.as_str()) {
                slot.stale.store(true, Ordering::Release);
            }
        }
        tracing::debug!(node_id = node_id.as_str(), touched, "cascading invalidation");
        touched
    }

    /// Drop every entry and mark every in-flight build stale.
    ///
    /// Recovery hammer for internal invariant violations: rebuild rather
    /// than risk serving stale data.
    pub fn invalidate_all(&self) {
        let mut ready = self.ready.lock();
        let count = ready.len();
        ready.clear();
        drop(ready);
        self.reverse.lock().clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        for slot in self.building.iter() {
            slot.stale.store(true, Ordering::Release);
        }
        let _ = self.write_epoch.fetch_add(1, Ordering::AcqRel);
        let _ = self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(dropped = count, "full cache invalidation");
    }

    /// Cache statistics. Read-only; safe to poll frequently.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let builds = self.builds.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        #[allow(clippy::cast_precision_loss)]
        let avg_build_latency_ms = if builds == 0 {
            0.0
        } else {
            self.build_latency_total_ms.load(Ordering::Relaxed) as f64 / builds as f64
        };
        CacheStats {
            entries: self.ready.lock().len(),
            hits,
            misses,
            hit_rate,
            builds,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size_estimate_bytes: self.size_bytes.load(Ordering::Relaxed),
            avg_build_latency_ms,
        }
    }

    // ── internals ───────────────────────────────────────────────────────

    /// Ready lookup with TTL enforcement.
    fn lookup_ready(&self, fingerprint: &ContextFingerprint) -> Option<Arc<AssembledContext>> {
        let mut ready = self.ready.lock();
        let expired = match ready.get(fingerprint) {
            None => return None,
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(Arc::clone(&entry.context));
            }
            Some(_) => true,
        };
        if expired {
            if let Some(entry) = ready.pop(fingerprint) {
                drop(ready);
                let _ = self.evictions.fetch_add(1, Ordering::Relaxed);
                let _ = self.size_bytes.fetch_sub(entry.size_bytes, Ordering::Relaxed);
                self.detach(fingerprint, &entry, None);
            }
        }
        None
    }

    fn insert_ready(
        &self,
        fingerprint: &ContextFingerprint,
        context: Arc<AssembledContext>,
        dependencies: Vec<NodeId>,
    ) {
        let size_bytes = entry_size(&context);
        let entry = CacheEntry {
            context,
            dependencies: dependencies.clone(),
            expires_at: Instant::now() + self.config.ttl,
            size_bytes,
        };

        {
            let mut reverse = self.reverse.lock();
            for dep in &dependencies {
                let _ = reverse
                    .entry(dep.as_str().to_owned())
                    .or_default()
                    .insert(fingerprint.clone());
            }
        }

        let _ = self.size_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        let evicted = self.ready.lock().push(fingerprint.clone(), entry);
        if let Some((old_fp, old_entry)) = evicted {
            if old_fp != *fingerprint {
                let _ = self.evictions.fetch_add(1, Ordering::Relaxed);
                let _ = self.size_bytes.fetch_sub(old_entry.size_bytes, Ordering::Relaxed);
                self.detach(&old_fp, &old_entry, None);
            }
        }
    }

    /// Remove a fingerprint from the reverse sets of its dependencies.
    ///
    /// `skip` is the node already removed by the caller (its set is gone).
    fn detach(&self, fingerprint: &ContextFingerprint, entry: &CacheEntry, skip: Option<&NodeId>) {
        let mut reverse = self.reverse.lock();
        for dep in &entry.dependencies {
            if skip.is_some_and(|s| s == dep) {
                continue;
            }
            if let Some(set) = reverse.get_mut(dep.as_str()) {
                let _ = set.remove(fingerprint);
                if set.is_empty() {
                    let _ = reverse.remove(dep.as_str());
                }
            }
        }
    }
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("entries", &self.ready.lock().len())
            .field("building", &self.building.len())
            .finish()
    }
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        if !self.published {
            // Builder died before publishing; clear the slot so the next
            // request can build, and let the closed channel tell waiters.
            tracing::warn!(
                fingerprint = self.fingerprint.as_str(),
                "build permit dropped without publish"
            );
        }
    }
}

/// Approximate resident size of a cached context.
fn entry_size(context: &AssembledContext) -> u64 {
    let content: usize = context.messages.iter().map(|m| m.content.len()).sum();
    (content + context.fingerprint.len() + 128) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use arbor_core::ContextMessage;

    fn fp(n: u32) -> ContextFingerprint {
        ContextFingerprint::compute(&NodeId::from(format!("node{n}")), "m", 1000, &[])
    }

    fn ctx(fingerprint: &ContextFingerprint, text: &str) -> Arc<AssembledContext> {
        Arc::new(AssembledContext {
            fingerprint: fingerprint.as_str().to_owned(),
            messages: vec![ContextMessage::user(text)],
            token_count: 5,
            truncated: false,
            warnings: Vec::new(),
            built_at: Utc::now(),
        })
    }

    fn cache() -> ContextCache {
        ContextCache::new(CacheConfig::default())
    }

    /// Drive a fingerprint to Ready through the normal protocol.
    fn make_ready(cache: &ContextCache, fingerprint: &ContextFingerprint, deps: &[&str]) {
        let Begin::Build(permit) = cache.begin(fingerprint) else {
            panic!("expected build");
        };
        cache.publish(
            permit,
            Ok(ctx(fingerprint, "cached content")),
            deps.iter().map(|d| NodeId::from(*d)).collect(),
        );
    }

    // ── state machine ────────────────────────────────────────────────

    #[test]
    fn absent_becomes_build() {
        let cache = cache();
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[test]
    fn building_becomes_wait() {
        let cache = cache();
        let _permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        assert!(matches!(cache.begin(&fp(1)), Begin::Wait(_)));
    }

    #[test]
    fn published_becomes_ready() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        match cache.begin(&fp(1)) {
            Begin::Ready(context) => assert_eq!(context.messages[0].content, "cached content"),
            _ => panic!("expected ready"),
        }
    }

    #[test]
    fn distinct_fingerprints_are_independent() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        assert!(matches!(cache.begin(&fp(2)), Begin::Build(_)));
    }

    #[test]
    fn failed_build_clears_slot() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        cache.publish(
            permit,
            Err(AssemblyError::NotFound("gone".into())),
            Vec::new(),
        );
        // Failure is not cached; the next request builds again.
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[tokio::test]
    async fn waiters_receive_published_outcome() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        let mut rx = match cache.begin(&fp(1)) {
            Begin::Wait(rx) => rx,
            _ => panic!("expected wait"),
        };

        cache.publish(permit, Ok(ctx(&fp(1), "built")), vec![NodeId::from("n1")]);

        let outcome = loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                break outcome;
            }
            rx.changed().await.unwrap();
        };
        assert_eq!(outcome.unwrap().messages[0].content, "built");
    }

    #[test]
    fn dropped_permit_slot_is_reclaimed() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        drop(permit);
        // The dead slot is taken over, not waited on.
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[tokio::test]
    async fn dropped_permit_closes_channel() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        let mut rx = permit.subscribe();
        drop(permit);
        assert!(rx.changed().await.is_err());
    }

    // ── invalidation ─────────────────────────────────────────────────

    #[test]
    fn node_write_invalidates_dependents() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1", "n2"]);
        make_ready(&cache, &fp(2), &["n2", "n3"]);

        let touched = cache.invalidate_node(&NodeId::from("n2"));
        assert_eq!(touched, 2);
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
        assert!(matches!(cache.begin(&fp(2)), Begin::Build(_)));
    }

    #[test]
    fn invalidation_spares_unrelated_fingerprints() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        make_ready(&cache, &fp(2), &["n2"]);

        let touched = cache.invalidate_node(&NodeId::from("n1"));
        assert_eq!(touched, 1);
        assert!(matches!(cache.begin(&fp(2)), Begin::Ready(_)));
    }

    #[test]
    fn invalidating_unknown_node_touches_nothing() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        assert_eq!(cache.invalidate_node(&NodeId::from("ghost")), 0);
        assert!(matches!(cache.begin(&fp(1)), Begin::Ready(_)));
    }

    #[test]
    fn write_during_first_build_is_not_cached() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        // The write lands while the build is in flight. The reverse index
        // doesn't know the build's dependencies yet; the epoch guard keeps
        // the overlapping result out of the cache.
        let _ = cache.invalidate_node(&NodeId::from("n1"));
        cache.publish(permit, Ok(ctx(&fp(1), "stale")), vec![NodeId::from("n1")]);
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[test]
    fn stale_slot_flag_prevents_caching_rebuilds() {
        let cache = cache();
        let permit = match cache.begin(&fp(1)) {
            Begin::Build(p) => p,
            _ => panic!("expected build"),
        };
        permit.stale.store(true, Ordering::Release);
        cache.publish(permit, Ok(ctx(&fp(1), "stale")), vec![NodeId::from("n1")]);
        // The stale result was delivered but never cached.
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        make_ready(&cache, &fp(2), &["n2"]);
        cache.invalidate_all();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().size_estimate_bytes, 0);
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
    }

    #[test]
    fn repeated_invalidation_is_idempotent() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        assert_eq!(cache.invalidate_node(&NodeId::from("n1")), 1);
        assert_eq!(cache.invalidate_node(&NodeId::from("n1")), 0);
    }

    // ── eviction ─────────────────────────────────────────────────────

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = ContextCache::new(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        make_ready(&cache, &fp(1), &["n1"]);
        make_ready(&cache, &fp(2), &["n2"]);
        // Touch fp1 so fp2 is the LRU victim.
        assert!(matches!(cache.begin(&fp(1)), Begin::Ready(_)));
        make_ready(&cache, &fp(3), &["n3"]);

        assert!(matches!(cache.begin(&fp(1)), Begin::Ready(_)));
        assert!(matches!(cache.begin(&fp(2)), Begin::Build(_)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn eviction_cleans_reverse_index() {
        let cache = ContextCache::new(CacheConfig {
            capacity: 1,
            ..CacheConfig::default()
        });
        make_ready(&cache, &fp(1), &["n1"]);
        make_ready(&cache, &fp(2), &["n2"]); // evicts fp1
        // n1's reverse entry must be gone: invalidating touches nothing.
        assert_eq!(cache.invalidate_node(&NodeId::from("n1")), 0);
    }

    #[test]
    fn ttl_expiry_evicts_on_read() {
        let cache = ContextCache::new(CacheConfig {
            ttl: Duration::from_millis(0),
            capacity: 10,
        });
        make_ready(&cache, &fp(1), &["n1"]);
        // Entry born expired: the next read evicts and rebuilds.
        assert!(matches!(cache.begin(&fp(1)), Begin::Build(_)));
        assert!(cache.stats().evictions >= 1);
    }

    // ── stats ────────────────────────────────────────────────────────

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]); // one miss (the build)
        let _ = cache.begin(&fp(1)); // hit
        let _ = cache.begin(&fp(1)); // hit

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.size_estimate_bytes > 0);
    }

    #[test]
    fn stats_polling_does_not_perturb() {
        let cache = cache();
        make_ready(&cache, &fp(1), &["n1"]);
        let before = cache.stats();
        for _ in 0..10 {
            let _ = cache.stats();
        }
        let after = cache.stats();
        assert_eq!(before.hits, after.hits);
        assert_eq!(before.misses, after.misses);
        assert_eq!(before.entries, after.entries);
    }

    #[test]
    fn empty_cache_stats() {
        let stats = cache().stats();
        assert_eq!(stats.entries, 0);
        assert!((stats.hit_rate - 0.0).abs() < f64::EPSILON);
        assert!((stats.avg_build_latency_ms - 0.0).abs() < f64::EPSILON);
    }
}
