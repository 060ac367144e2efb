// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution node with a type-state–enforced lifecycle.
//!
//! ```text
//! ExecNode<Stopped>
//!     │  .start()        root allocator created, start-up controls installed
//!     ▼
//! ExecNode<Running>
//!     │  .run(&workload) per query: query allocator → fragment allocators
//!     │  .shutdown()     root closed, leaks reported
//!     ▼
//!   AllocationStats
//! ```
//!
//! # Query lifecycle
//! 1. Snapshot the installed injection rules; the whole query evaluates
//!    against that snapshot.
//! 2. Open a query allocator under the root and one fragment allocator per
//!    fragment under the query.
//! 3. Run fragments concurrently on blocking worker threads. Every
//!    reservation goes through an [`AllocationBoundary`].
//! 4. The first failure cancels the remaining fragments. Reservations are
//!    released on every exit path and all allocators are closed, so the root
//!    is left exactly as it was before the query.

use crate::{
    AllocationBoundary, FragmentMetrics, FragmentSpec, QueryError, QueryMetrics, RuntimeConfig,
    UserError, WireError, Workload,
};
use injection::{Endpoint, InjectionRegistry};
use memory_manager::{AllocationContext, AllocationStats, Allocator, CloseError, MemoryBudget};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Semaphore;

// ── Type-state markers ─────────────────────────────────────────

/// Node is configured but holds no allocator.
#[derive(Debug)]
pub struct Stopped;

/// Node owns its root allocator and accepts queries.
#[derive(Debug)]
pub struct Running;

/// Sealed trait for node states.
pub trait NodeState: std::fmt::Debug {}
impl NodeState for Stopped {}
impl NodeState for Running {}

// ── Query outcome ──────────────────────────────────────────────

/// The result of a query that ran to completion.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Name of the query allocator.
    pub query: String,
    /// Timing and per-fragment metrics.
    pub metrics: QueryMetrics,
    /// Final statistics of the query allocator's subtree.
    pub stats: AllocationStats,
}

// ── Node ───────────────────────────────────────────────────────

/// One execution node.
///
/// # Example
/// ```no_run
/// use query_runtime::{ExecNode, RuntimeConfig, Workload};
///
/// # async fn example() -> Result<(), query_runtime::QueryError> {
/// let node = ExecNode::new(RuntimeConfig::default()).start()?;
/// let outcome = node.run(&Workload::uniform("scan", 4, 100, 64 * 1024)).await?;
/// println!("{}", outcome.metrics.summary());
/// node.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct ExecNode<S: NodeState = Stopped> {
    config: RuntimeConfig,
    registry: Arc<InjectionRegistry>,
    _state: PhantomData<S>,
    // Populated on start:
    root: Option<Allocator>,
    query_budget: Option<MemoryBudget>,
    fragment_budget: Option<MemoryBudget>,
    workers: Option<Arc<Semaphore>>,
    next_query: AtomicU64,
}

// ── Stopped → Running ──────────────────────────────────────────

impl ExecNode<Stopped> {
    /// Creates a node with its own empty injection registry.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_registry(config, Arc::new(InjectionRegistry::new()))
    }

    /// Creates a node sharing an existing injection registry.
    pub fn with_registry(config: RuntimeConfig, registry: Arc<InjectionRegistry>) -> Self {
        Self {
            config,
            registry,
            _state: PhantomData,
            root: None,
            query_budget: None,
            fragment_budget: None,
            workers: None,
            next_query: AtomicU64::new(1),
        }
    }

    /// Validates the configuration, installs start-up controls and creates
    /// the root allocator. Transitions to the `Running` state.
    pub fn start(self) -> Result<ExecNode<Running>, QueryError> {
        let budget = self.config.parse_budget()?;
        let query_budget = self.config.parse_query_budget()?;
        let fragment_budget = self.config.parse_fragment_budget()?;

        if let Some(controls) = &self.config.controls {
            self.registry.install_controls(controls)?;
        }

        let endpoint = self.config.endpoint();
        let context = AllocationContext::new(endpoint.clone(), self.registry.clone());
        let root = Allocator::root(format!("node@{endpoint}"), budget, context);
        let threads = self.config.resolve_threads();

        tracing::info!(
            %endpoint,
            %budget,
            %query_budget,
            %fragment_budget,
            threads,
            rules = self.registry.rule_snapshots().len(),
            "execution node started"
        );

        Ok(ExecNode {
            config: self.config,
            registry: self.registry,
            _state: PhantomData,
            root: Some(root),
            query_budget: Some(query_budget),
            fragment_budget: Some(fragment_budget),
            workers: Some(Arc::new(Semaphore::new(threads.max(1)))),
            next_query: self.next_query,
        })
    }
}

// ── Running: execute queries ───────────────────────────────────

impl ExecNode<Running> {
    /// Replaces the installed injection rules. Queries already running keep
    /// their snapshot. Returns the number of rules installed.
    pub fn set_controls(&self, json: &str) -> Result<usize, QueryError> {
        self.registry.install_controls(json)?;
        Ok(self.registry.rule_snapshots().len())
    }

    /// Removes every injection rule.
    pub fn clear_controls(&self) {
        self.registry.clear();
    }

    pub fn endpoint(&self) -> Endpoint {
        self.config.endpoint()
    }

    pub fn registry(&self) -> &Arc<InjectionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The node's root allocator.
    pub fn root(&self) -> &Allocator {
        self.root.as_ref().expect("root exists in Running state")
    }

    /// Renders `error` for the wire, honouring `verbose_errors`.
    pub fn render(&self, error: &UserError) -> WireError {
        error.to_wire(self.config.verbose_errors)
    }

    /// Runs `workload` as one query.
    ///
    /// Any reservation failure ends the query with a `RESOURCE`
    /// [`UserError`]; other fragments are cancelled at their next batch.
    ///
    /// # Panics
    /// Panics if a fragment or the query allocator still holds memory at
    /// teardown. That is a broken invariant, not a query failure.
    pub async fn run(&self, workload: &Workload) -> Result<QueryOutcome, QueryError> {
        workload.validate()?;
        let run_start = Instant::now();
        let query_id = self.next_query.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.registry.snapshot();
        let context = self.root().context().with_injector(snapshot);
        let query = self.root().new_child_in(
            format!("query-{query_id}:{}", workload.name),
            self.query_budget.expect("query budget exists in Running state"),
            context,
        );
        let fragment_budget = self
            .fragment_budget
            .expect("fragment budget exists in Running state");
        let workers = self.workers.as_ref().expect("workers exist in Running state");

        tracing::debug!(
            query = %query.name(),
            fragments = workload.fragments.len(),
            "query started"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let first_error = Arc::new(OnceLock::new());
        let mut handles = Vec::with_capacity(workload.fragments.len());

        for spec in &workload.fragments {
            let permit = Arc::clone(workers)
                .acquire_owned()
                .await
                .expect("worker semaphore is never closed");
            let fragment = query.new_child(spec.name.clone(), fragment_budget);
            let spec = spec.clone();
            let cancel = Arc::clone(&cancel);
            let first_error = Arc::clone(&first_error);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                run_fragment(fragment, spec, &cancel, &first_error)
            }));
        }

        let mut metrics = QueryMetrics::new();
        for handle in handles {
            match handle.await {
                Ok(fragment) => metrics.record_fragment(fragment),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => panic!("fragment task did not complete: {e}"),
            }
        }

        let stats = query.stats();
        let name = query.name().to_string();
        if let Err(CloseError { error, .. }) = query.close() {
            panic!("query '{name}' leaked at teardown: {error}");
        }

        if let Some(error) = first_error.get() {
            tracing::info!(query = %name, error_id = %error.error_id(), "query failed");
            return Err(QueryError::User(error.clone()));
        }

        metrics.finalise(run_start.elapsed(), stats.peak_reserved_bytes);
        tracing::info!(query = %name, "{}", metrics.summary());
        Ok(QueryOutcome {
            query: name,
            metrics,
            stats,
        })
    }

    /// Stops the node, closing the root allocator.
    ///
    /// Fails with [`QueryError::Memory`] if anything is still reserved
    /// under the root.
    pub fn shutdown(mut self) -> Result<AllocationStats, QueryError> {
        let root = self.root.take().expect("root exists in Running state");
        let stats = root.stats();
        root.close().map_err(|e| QueryError::Memory(e.error))?;
        tracing::info!(endpoint = %self.config.endpoint(), "{}", stats.summary());
        Ok(stats)
    }
}

/// Processes one fragment's batches on the current thread, then closes its
/// allocator.
fn run_fragment(
    fragment: Allocator,
    spec: FragmentSpec,
    cancel: &AtomicBool,
    first_error: &OnceLock<UserError>,
) -> FragmentMetrics {
    let start = Instant::now();
    let mut window = VecDeque::with_capacity(spec.retained_batches.min(spec.batches));
    let mut batches = 0;

    {
        let boundary = AllocationBoundary::labeled(&fragment, &spec.name);
        for _ in 0..spec.batches {
            if cancel.load(Ordering::Acquire) {
                tracing::debug!(fragment = %spec.name, batches, "fragment cancelled");
                break;
            }
            match boundary.reserve(spec.batch_bytes) {
                Ok(reservation) => {
                    if window.len() == spec.retained_batches {
                        window.pop_front();
                    }
                    window.push_back(reservation);
                    batches += 1;
                }
                Err(error) => {
                    if let Err(later) = first_error.set(error) {
                        tracing::debug!(
                            fragment = %spec.name,
                            error_id = %later.error_id(),
                            "fragment failed after the query already failed: {}",
                            later.cause().unwrap_or_else(|| later.message())
                        );
                    }
                    cancel.store(true, Ordering::Release);
                    break;
                }
            }
        }
    }

    window.clear();
    let peak_reserved_bytes = fragment.stats().peak_reserved_bytes;
    if let Err(CloseError { error, .. }) = fragment.close() {
        panic!("fragment '{}' leaked at teardown: {error}", spec.name);
    }

    FragmentMetrics {
        fragment_name: spec.name,
        batches,
        peak_reserved_bytes,
        duration: start.elapsed(),
    }
}

impl<S: NodeState> std::fmt::Debug for ExecNode<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecNode")
            .field("state", &std::any::type_name::<S>())
            .field("endpoint", &self.config.endpoint())
            .field("has_root", &self.root.is_some())
            .field("rules", &self.registry.rule_snapshots().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use injection::{DefectKind, InjectionRule};
    use memory_manager::CHILD_BUFFER_SITE;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            memory_budget: "64M".into(),
            query_budget: "16M".into(),
            fragment_budget: "4M".into(),
            num_threads: Some(4),
            ..Default::default()
        }
    }

    #[test]
    fn test_start() {
        let node = ExecNode::new(config()).start().unwrap();
        assert_eq!(node.root().limit(), MemoryBudget::from_mb(64));
        assert_eq!(node.root().reserved(), 0);
        node.shutdown().unwrap();
    }

    #[test]
    fn test_start_rejects_bad_budget() {
        let c = RuntimeConfig {
            query_budget: "lots".into(),
            ..config()
        };
        assert!(matches!(ExecNode::new(c).start(), Err(QueryError::Config(_))));
    }

    #[test]
    fn test_start_installs_controls() {
        let c = RuntimeConfig {
            controls: Some(
                r#"{"injections":[{"type":"exception","siteClass":"memory_manager::Allocator",
                    "desc":"child-buffer","nSkip":3,"nFire":1,"exceptionClass":"oom"}]}"#
                    .into(),
            ),
            ..config()
        };
        let node = ExecNode::new(c).start().unwrap();
        assert_eq!(node.registry().rule_snapshots().len(), 1);
    }

    #[tokio::test]
    async fn test_run_completes() {
        let node = ExecNode::new(config()).start().unwrap();
        let workload = Workload::uniform("scan", 3, 20, 1024);

        let outcome = node.run(&workload).await.unwrap();
        assert_eq!(outcome.metrics.fragment_metrics.len(), 3);
        assert_eq!(outcome.metrics.total_batches(), 60);
        assert_eq!(outcome.stats.total_reservations, 60);
        assert_eq!(outcome.stats.total_releases, 60);
        assert!(outcome.query.ends_with(":scan"));

        assert_eq!(node.root().reserved(), 0);
        assert_eq!(node.root().child_count(), 0);
        node.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_retained_window_bounds_peak() {
        let node = ExecNode::new(config()).start().unwrap();
        let workload = Workload::new("w", vec![FragmentSpec::new("f", 50, 1000).retaining(3)]);

        let outcome = node.run(&workload).await.unwrap();
        assert_eq!(outcome.metrics.fragment_metrics[0].peak_reserved_bytes, 3000);
    }

    #[tokio::test]
    async fn test_huge_retained_window_runs() {
        let node = ExecNode::new(config()).start().unwrap();
        let workload = Workload::new(
            "w",
            vec![FragmentSpec::new("f", 2, 8).retaining(usize::MAX / 2)],
        );
        workload.validate().unwrap();

        let outcome = node.run(&workload).await.unwrap();
        assert_eq!(outcome.metrics.total_batches(), 2);
        assert_eq!(outcome.metrics.fragment_metrics[0].peak_reserved_bytes, 16);
        node.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_fragment_limit_fails_query() {
        let node = ExecNode::new(config()).start().unwrap();
        let workload = Workload::new(
            "big",
            vec![FragmentSpec::new("hog", 10, 1024 * 1024).retaining(10)],
        );

        let err = node.run(&workload).await.unwrap_err();
        let user = err.user_error().unwrap();
        assert!(user.is_memory_error());
        assert_eq!(user.endpoint(), Some(&node.endpoint()));
        assert_eq!(node.root().reserved(), 0);
        assert_eq!(node.root().child_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failures_report_one_error() {
        let node = ExecNode::new(config()).start().unwrap();
        let always = InjectionRule::new(CHILD_BUFFER_SITE, DefectKind::OutOfMemory).fire(u64::MAX);
        node.registry().install(vec![always]).unwrap();

        // Every fragment that reaches its first batch fails; only one error surfaces.
        let err = node.run(&Workload::uniform("q", 4, 10, 8)).await.unwrap_err();
        let user = err.user_error().unwrap();
        assert!(user.is_memory_error());
        assert_eq!(user.context().len(), 1);
        assert!(node.registry().rule_snapshots()[0].calls >= 1);
        assert_eq!(node.root().reserved(), 0);
        assert_eq!(node.root().child_count(), 0);
        node.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_set_and_clear_controls() {
        let node = ExecNode::new(config()).start().unwrap();
        node.registry()
            .install(vec![InjectionRule::new(CHILD_BUFFER_SITE, DefectKind::IoError)])
            .unwrap();
        assert!(node.run(&Workload::uniform("q", 1, 1, 8)).await.is_err());

        node.clear_controls();
        assert!(node.run(&Workload::uniform("q", 1, 1, 8)).await.is_ok());

        let installed = node
            .set_controls(r#"{"injections":[{"type":"exception","siteClass":"memory_manager::Allocator","desc":"child-buffer","nSkip":0,"nFire":1,"exceptionClass":"io-error"}]}"#)
            .unwrap();
        assert_eq!(installed, 1);
        assert!(node.run(&Workload::uniform("q", 1, 1, 8)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_workload_is_not_classified() {
        let node = ExecNode::new(config()).start().unwrap();
        let err = node.run(&Workload::new("empty", vec![])).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidWorkload(_)));
        assert!(err.user_error().is_none());
    }

    #[test]
    fn test_shutdown_reports_leak() {
        let node = ExecNode::new(config()).start().unwrap();
        let held = node.root().reserve(10).unwrap();
        let err = node.shutdown().unwrap_err();
        assert!(matches!(err, QueryError::Memory(ref e) if e.is_programming_defect()));
        drop(held);
    }

    #[test]
    fn test_render_honours_verbosity() {
        let node = ExecNode::new(RuntimeConfig {
            verbose_errors: true,
            ..config()
        })
        .start()
        .unwrap();
        let error = UserError::memory_error().with_cause("injected io-error");
        assert!(node.render(&error).cause.is_some());
    }

    #[test]
    fn test_debug_format() {
        let node = ExecNode::new(config());
        let debug = format!("{node:?}");
        assert!(debug.contains("ExecNode"));
        assert!(debug.contains("Stopped"));
    }
}
