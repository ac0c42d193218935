//! The context assembly service.
//!
//! [`ContextService`] is the explicit service object constructed once at
//! process startup and passed by reference to callers — no module-level
//! singletons. It owns the connection pool (via the store), the token
//! budgeter, the reference resolver, the tree walker, and the assembled-
//! context cache; [`ContextService::shutdown`] tears them down.
//!
//! Node writes go through the service so every write cascades into cache
//! invalidation; writing to the store behind the service's back leaves the
//! cache stale until TTL expiry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use arbor_core::{Node, NodeId, NodeRole, SessionId};
use arbor_settings::ArborSettings;
use arbor_store::{NodePool, NodeStore, PoolConfig, PoolHealth, PoolStatus, SessionRow};
use arbor_tokens::{TokenBudgeter, token_limit};

use crate::assembler::{self, AssemblyInput};
use crate::cache::{Begin, BuildOutcome, CacheConfig, CacheStats, ContextCache};
use crate::errors::{AssemblyError, Result};
use crate::fingerprint::ContextFingerprint;
use crate::resolver::{ReferenceResolver, Resolution, extract_references};
use crate::types::{AssembleOptions, AssembledContext, ContextResponse, MissingRefPolicy};
use crate::walker::{TreeWalker, WalkOptions};

/// Default overall time budget for one assembly request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The context assembly and caching engine.
pub struct ContextService {
    settings: ArborSettings,
    store: NodeStore,
    budgeter: Arc<TokenBudgeter>,
    resolver: ReferenceResolver,
    walker: TreeWalker,
    cache: ContextCache,
    /// Completed tree-walk builds, observable so callers can verify
    /// single-flight behavior.
    build_count: AtomicU64,
}

impl ContextService {
    /// Construct the service from settings, opening the store.
    ///
    /// An empty `store.dbPath` selects an in-memory database.
    pub fn new(settings: ArborSettings) -> arbor_store::Result<Arc<Self>> {
        let pool_config = PoolConfig::from_settings(&settings.pool);
        let pool = if settings.store.db_path.is_empty() {
            NodePool::new_in_memory(pool_config)?
        } else {
            NodePool::new_file(&settings.store.db_path, pool_config)?
        };
        let store = NodeStore::open(Arc::new(pool))?;
        Ok(Self::with_store(store, settings))
    }

    /// Construct the service over an already-open store.
    #[must_use]
    pub fn with_store(store: NodeStore, settings: ArborSettings) -> Arc<Self> {
        let budgeter = Arc::new(TokenBudgeter::new(settings.tokens.encoder_cache_size));
        let resolver = ReferenceResolver::new(store.clone());
        let walker = TreeWalker::new(store.clone(), Arc::clone(&budgeter));
        let cache = ContextCache::new(CacheConfig::from_settings(&settings.cache));
        Arc::new(Self {
            settings,
            store,
            budgeter,
            resolver,
            walker,
            cache,
            build_count: AtomicU64::new(0),
        })
    }

    /// The node store (for read-only callers).
    #[must_use]
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// The token budgeter.
    #[must_use]
    pub fn budgeter(&self) -> &Arc<TokenBudgeter> {
        &self.budgeter
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assembly
    // ─────────────────────────────────────────────────────────────────────

    /// Assemble the context for a target node.
    ///
    /// On a cache hit the stored context is returned directly. On a miss,
    /// at most one build per fingerprint runs; concurrent requesters await
    /// the shared build. A caller abandoning its wait (dropping this
    /// future) never cancels the build for other waiters — the build runs
    /// in its own task.
    pub async fn assemble_context(
        self: &Arc<Self>,
        node_id: &NodeId,
        model_id: &str,
        options: AssembleOptions,
    ) -> Result<ContextResponse> {
        let time_budget = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        match tokio::time::timeout(time_budget, self.assemble_inner(node_id, model_id, options))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let waited_ms = time_budget.as_millis() as u64;
                Err(AssemblyError::Timeout { waited_ms })
            }
        }
    }

    async fn assemble_inner(
        self: &Arc<Self>,
        node_id: &NodeId,
        model_id: &str,
        options: AssembleOptions,
    ) -> Result<ContextResponse> {
        let model_limit = token_limit(model_id);
        let budget = options.max_tokens.unwrap_or(model_limit).min(model_limit);

        // Target fetch feeds the fingerprint; the build re-reads the tree.
        let target = {
            let store = self.store.clone();
            let id = node_id.clone();
            run_blocking(move || store.get_node(&id)).await??
        }
        .ok_or_else(|| AssemblyError::NotFound(node_id.to_string()))?;

        let candidates = extract_references(&target.content);
        let fingerprint = ContextFingerprint::compute(node_id, model_id, budget, &candidates);

        match self.cache.begin(&fingerprint) {
            Begin::Ready(context) => {
                tracing::debug!(fingerprint = %fingerprint, "context cache hit");
                Ok(ContextResponse {
                    context,
                    cache_hit: true,
                })
            }
            Begin::Wait(rx) => {
                let context = await_outcome(rx).await?;
                Ok(ContextResponse {
                    context,
                    cache_hit: false,
                })
            }
            Begin::Build(permit) => {
                let rx = permit.subscribe();
                let service = Arc::clone(self);
                let fp = fingerprint.clone();
                let model = model_id.to_owned();
                let missing = options.missing_references;
                let _build_task = tokio::spawn(async move {
                    let outcome = service
                        .run_build(&target, &fp, &model, budget, missing)
                        .await;
                    match outcome {
                        Ok((context, dependencies)) => {
                            service.cache.publish(permit, Ok(context), dependencies);
                        }
                        Err(err) => service.cache.publish(permit, Err(err), Vec::new()),
                    }
                });
                let context = await_outcome(rx).await?;
                Ok(ContextResponse {
                    context,
                    cache_hit: false,
                })
            }
        }
    }

    /// One full build: walk, resolve, assemble.
    async fn run_build(
        self: &Arc<Self>,
        target: &Node,
        fingerprint: &ContextFingerprint,
        model: &str,
        budget: u32,
        missing: MissingRefPolicy,
    ) -> Result<(Arc<AssembledContext>, Vec<NodeId>)> {
        let _ = self.build_count.fetch_add(1, Ordering::Relaxed);

        let chain = {
            let walker = self.walker.clone();
            let id = target.id.clone();
            let opts = WalkOptions {
                max_depth: self.settings.walker.max_depth,
                token_budget: None,
                model_id: model.to_owned(),
            };
            run_blocking(move || walker.ancestor_chain(&id, &opts)).await??
        };

        // Union of candidates across the chain, first appearance wins.
        let mut seen = std::collections::HashSet::new();
        let mut candidates: Vec<String> = Vec::new();
        for node in &chain {
            for candidate in extract_references(&node.content) {
                if seen.insert(candidate.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        let references = {
            let resolver = self.resolver.clone();
            let session = target.session_id.clone();
            run_blocking(move || resolver.resolve_references(&candidates, &session)).await??
        };

        for reference in &references {
            match &reference.resolution {
                Resolution::Ambiguous { matches } => {
                    return Err(AssemblyError::Ambiguous {
                        reference: reference.raw_token.clone(),
                        matches: matches.iter().map(ToString::to_string).collect(),
                    });
                }
                Resolution::NotFound if missing == MissingRefPolicy::Fail => {
                    return Err(AssemblyError::NotFound(reference.raw_token.clone()));
                }
                _ => {}
            }
        }

        let output = assembler::assemble(
            &AssemblyInput {
                chain: &chain,
                references: &references,
                model,
                token_budget: budget,
            },
            &self.budgeter,
        );

        let mut dependencies: Vec<NodeId> = chain.iter().map(|n| n.id.clone()).collect();
        for reference in &references {
            if let Some(node) = reference.node() {
                if !dependencies.contains(&node.id) {
                    dependencies.push(node.id.clone());
                }
            }
        }

        let context = Arc::new(AssembledContext {
            fingerprint: fingerprint.as_str().to_owned(),
            messages: output.messages,
            token_count: output.token_count,
            truncated: output.truncated,
            warnings: output.warnings,
            built_at: Utc::now(),
        });
        tracing::debug!(
            fingerprint = %fingerprint,
            messages = context.messages.len(),
            tokens = context.token_count,
            "context built"
        );
        Ok((context, dependencies))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes (cache-coherent)
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session.
    pub fn create_session(&self, title: Option<&str>) -> arbor_store::Result<SessionRow> {
        self.store.create_session(title)
    }

    /// Delete a session and its nodes.
    ///
    /// The per-node dependency sets of the session's contexts are not
    /// enumerated; the whole cache is dropped instead. Session deletion is
    /// rare enough that a cold cache beats tracking session membership.
    pub fn delete_session(&self, session_id: &SessionId) -> arbor_store::Result<bool> {
        let deleted = self.store.delete_session(session_id)?;
        if deleted {
            self.cache.invalidate_all();
        }
        Ok(deleted)
    }

    /// Append a node. The new child invalidates contexts that depended on
    /// its parent.
    pub fn append_node(
        &self,
        session_id: &SessionId,
        parent_id: Option<&NodeId>,
        role: NodeRole,
        content: &str,
        model: Option<&str>,
    ) -> arbor_store::Result<Node> {
        let node = self
            .store
            .append_node(session_id, parent_id, role, content, model)?;
        if let Some(parent_id) = parent_id {
            let _ = self.cache.invalidate_node(parent_id);
        }
        Ok(node)
    }

    /// Edit a node's content, invalidating every dependent context.
    pub fn edit_node(&self, node_id: &NodeId, content: &str) -> arbor_store::Result<()> {
        self.store.update_content(node_id, content)?;
        let _ = self.cache.invalidate_node(node_id);
        Ok(())
    }

    /// Delete a node and its subtree, invalidating every dependent context.
    ///
    /// Descendants' contexts all depended on the deleted node (it sat on
    /// their ancestor chains), so one reverse-index sweep covers the whole
    /// subtree.
    pub fn delete_node(&self, node_id: &NodeId) -> arbor_store::Result<i64> {
        let removed = self.store.delete_node(node_id)?;
        if removed > 0 {
            let _ = self.cache.invalidate_node(node_id);
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostics & teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Pool snapshot. Read-only; safe to poll frequently.
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.store.pool().status()
    }

    /// Pool liveness probe with latency.
    #[must_use]
    pub fn pool_health(&self) -> PoolHealth {
        self.store.pool().health_check()
    }

    /// Cache statistics. Read-only; safe to poll frequently.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Completed builds (tree walks). Single-flight makes this grow by one
    /// per distinct fingerprint, no matter how many concurrent requesters.
    #[must_use]
    pub fn build_count(&self) -> u64 {
        self.build_count.load(Ordering::Relaxed)
    }

    /// Tear down: drop all cache state and close the pool.
    pub fn shutdown(&self) {
        self.cache.invalidate_all();
        self.store.pool().close();
        tracing::info!("context service shut down");
    }
}

impl std::fmt::Debug for ContextService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextService")
            .field("cache", &self.cache)
            .field("builds", &self.build_count.load(Ordering::Relaxed))
            .finish()
    }
}

/// Await a shared build outcome on a watch channel.
async fn await_outcome(
    mut rx: watch::Receiver<Option<BuildOutcome>>,
) -> Result<Arc<AssembledContext>> {
    loop {
        if let Some(outcome) = rx.borrow_and_update().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return Err(AssemblyError::BuildAbandoned(
                "builder terminated before publishing".into(),
            ));
        }
    }
}

/// Run blocking store I/O off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AssemblyError::BuildAbandoned(format!("blocking task failed: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
