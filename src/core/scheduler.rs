//! Level-ordered pipeline executor.
//!
//! A run decomposes the graph into dependency levels (Kahn) and walks them
//! strictly in order; nodes inside a level execute concurrently on the
//! worker pool. A level must fully settle — success, failure or timeout for
//! every dispatched node — before the next one starts.
//!
//! Failure containment: a failing node is marked `error` and its forward
//! closure `blocked` immediately; siblings in the same level and independent
//! branches are untouched, and partial completion is a valid terminal
//! outcome of the run.
//!
//! Cancellation is cooperative and coarse: the cancel flag is read at level
//! boundaries, so in-flight adapter calls of the current level complete (and
//! charge) while later levels never start. The run epoch additionally
//! invalidates pool jobs still queued from an abandoned run.
//!
//! All run state lives in explicit values (`RunContext`, locals) — no
//! ambient globals — so independent graphs can run against separate
//! scheduler instances in one process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CAPTURE_TIMEOUT, IMAGE_TIMEOUT, VIDEO_TIMEOUT};
use crate::entities::cache_key::{KeyEngine, compute_cache_key, should_skip};
use crate::entities::{
    AdapterRequest, AdapterSet, Artifact, ArtifactKind, CaptureSource, Graph, NodeId,
    NodeResult, NodeStatus, NodeType,
};
use crate::error::{EngineError, Result};

use super::credits::CreditLedger;
use super::event_bus::{RunEvent, TelemetrySender};
use super::workers::Workers;

/// Per-type execution deadlines. Defaults come from `config`; tests and
/// embedders override per run.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub image: Duration,
    pub video: Duration,
    pub capture: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { image: IMAGE_TIMEOUT, video: VIDEO_TIMEOUT, capture: CAPTURE_TIMEOUT }
    }
}

impl Timeouts {
    fn for_kind(&self, kind: NodeType) -> Duration {
        match kind {
            NodeType::Source => self.capture,
            NodeType::Video => self.video,
            _ => self.image,
        }
    }
}

/// Everything one run needs from the outside world, passed by value so
/// nothing about a run is ambient state.
pub struct RunContext {
    pub adapters: AdapterSet,
    pub capture: Arc<dyn CaptureSource>,
    pub timeouts: Timeouts,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(adapters: AdapterSet, capture: Arc<dyn CaptureSource>) -> Self {
        Self { adapters, capture, timeouts: Timeouts::default(), cancel: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Handle a UI thread can use to stop the run at the next level
    /// boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a run did, node by node. Partial completion (some done, some
/// error/blocked) is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub levels: usize,
    pub completed: Vec<NodeId>,
    pub skipped: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub blocked: Vec<NodeId>,
    pub cancelled: Vec<NodeId>,
    pub charged: u32,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            levels: 0,
            completed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            blocked: Vec::new(),
            cancelled: Vec::new(),
            charged: 0,
        }
    }

    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.cancelled.is_empty()
    }
}

enum JobOutcome {
    Success(Artifact),
    Failure(String),
}

type OutcomeMsg = (NodeId, JobOutcome);

/// The executor. One scheduler owns one worker pool; at most one run may be
/// active on it at a time (a second `execute` is rejected, not queued).
pub struct Scheduler {
    workers: Workers,
    telemetry: TelemetrySender,
    epoch: Arc<AtomicU64>,
    run_active: Arc<AtomicBool>,
}

/// Clears the single-run flag on every exit path.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Scheduler {
    pub fn new(num_threads: usize, telemetry: TelemetrySender) -> Self {
        let epoch = Arc::new(AtomicU64::new(0));
        let workers = Workers::new(num_threads.max(1), Arc::clone(&epoch));
        Self { workers, telemetry, epoch, run_active: Arc::new(AtomicBool::new(false)) }
    }

    /// Execute every dirty node of `graph`, level by level.
    ///
    /// Rejections (`RunInProgress`, `NothingToRun`, `InsufficientCredit`)
    /// leave every node status untouched. Node-level failures do not reject
    /// the run; they land in the report.
    pub fn execute(
        &self,
        graph: &mut Graph,
        ledger: &mut CreditLedger,
        ctx: &RunContext,
    ) -> Result<RunReport> {
        if self.run_active.swap(true, Ordering::SeqCst) {
            return Err(EngineError::RunInProgress);
        }
        let _guard = RunGuard(Arc::clone(&self.run_active));

        if !graph.is_dirty() {
            return Err(EngineError::NothingToRun);
        }

        let estimate = CreditLedger::estimate(graph);
        if estimate > ledger.balance() {
            return Err(EngineError::InsufficientCredit {
                required: estimate,
                available: ledger.balance(),
            });
        }

        let run_id = Uuid::new_v4();
        // New run generation: pool jobs queued by an abandoned run expire.
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.telemetry.emit(RunEvent::RunStarted { run: run_id, estimated_cost: estimate });
        info!(
            "Run {} started: {} dirty nodes, estimated cost {} (balance {})",
            run_id,
            graph.dirty_nodes().len(),
            estimate,
            ledger.balance()
        );

        let mut report = RunReport::new(run_id);

        // Every dirty node is queued; blocked is recomputed from scratch
        // within this run, so last run's error/blocked nodes retry.
        for id in graph.dirty_nodes() {
            if let Some(node) = graph.node_mut(id) {
                node.last_error = None;
            }
            self.set_status(graph, id, NodeStatus::Queued);
        }

        let levels = graph.levels();
        let mut keys = KeyEngine::new();
        let (tx, rx) = unbounded::<OutcomeMsg>();

        for (level_idx, level) in levels.iter().enumerate() {
            if ctx.cancelled() {
                info!("Run {} cancelled before level {}", run_id, level_idx);
                break;
            }

            let runnable: Vec<NodeId> = level
                .iter()
                .copied()
                .filter(|&id| {
                    graph.node(id).map(|n| n.status == NodeStatus::Queued).unwrap_or(false)
                })
                .collect();
            if runnable.is_empty() {
                continue;
            }

            report.levels += 1;
            self.telemetry.emit(RunEvent::LevelStarted {
                run: run_id,
                level: level_idx,
                nodes: runnable.clone(),
            });
            debug!("Level {}: {} node(s)", level_idx, runnable.len());

            let mut pending: HashMap<NodeId, Instant> = HashMap::new();
            for id in runnable {
                self.dispatch(graph, &mut keys, &mut report, ctx, epoch, id, &tx, &mut pending)?;
            }
            self.collect_level(graph, ledger, &mut report, ctx, &rx, &mut pending);

            self.telemetry.emit(RunEvent::LevelSettled { run: run_id, level: level_idx });
        }

        // Whatever is still queued was stopped by a cancel; it stays dirty
        // for the next run.
        for id in graph.node_ids() {
            if graph.node(id).map(|n| n.status == NodeStatus::Queued).unwrap_or(false) {
                self.set_status(graph, id, NodeStatus::Cancelled);
                report.cancelled.push(id);
            }
        }

        self.telemetry.emit(RunEvent::RunFinished {
            run: run_id,
            completed: report.completed.len(),
            failed: report.failed.len(),
        });
        info!(
            "Run {} finished: {} done, {} cached, {} failed, {} blocked, {} cancelled, {} credits charged",
            run_id,
            report.completed.len(),
            report.skipped.len(),
            report.failed.len(),
            report.blocked.len(),
            report.cancelled.len(),
            report.charged
        );
        Ok(report)
    }

    /// Skip-or-dispatch one queued node of the current level.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        graph: &mut Graph,
        keys: &mut KeyEngine,
        report: &mut RunReport,
        ctx: &RunContext,
        epoch: u64,
        id: NodeId,
        tx: &Sender<OutcomeMsg>,
        pending: &mut HashMap<NodeId, Instant>,
    ) -> Result<()> {
        let fresh = keys.key_for(graph, id)?;

        let Some(node) = graph.node(id) else {
            return Ok(());
        };
        let kind = node.kind;
        let params = node.params.clone();

        if should_skip(node, &fresh) {
            if let Some(node) = graph.node_mut(id) {
                node.dirty = false;
            }
            self.set_status(graph, id, NodeStatus::Done);
            report.skipped.push(id);
            self.telemetry.emit(RunEvent::NodeCompleted { node: id, cached: true, charged: 0 });
            debug!("Node {} skipped (cache hit {})", id, fresh);
            return Ok(());
        }

        // The key that the execution about to happen will be attributed to.
        if let Some(node) = graph.node_mut(id) {
            node.cache_key = Some(fresh.clone());
        }

        // Resolve inputs while the graph is quiet; jobs only ever see
        // cloned params and Arc'd artifacts, never the graph itself.
        let input: Option<Arc<Artifact>> = graph
            .incoming(id)
            .and_then(|up| graph.node(up))
            .and_then(|n| n.artifact())
            .cloned()
            .map(Arc::new);

        let tx = tx.clone();
        match kind {
            NodeType::Source => {
                let capture = Arc::clone(&ctx.capture);
                self.workers.execute_with_epoch(epoch, move || {
                    let outcome = match capture.capture() {
                        // A host with nothing to offer still resolves the
                        // node; the placeholder keeps the branch alive.
                        Ok(c) => JobOutcome::Success(c.image.unwrap_or_else(Artifact::placeholder)),
                        Err(e) => JobOutcome::Failure(format!("capture failed: {e}")),
                    };
                    let _ = tx.send((id, outcome));
                });
            }
            NodeType::Compare => {
                let (a, b) = match params.as_compare() {
                    Some(p) => (p.input_a, p.input_b),
                    None => (None, None),
                };
                let art_a = a.and_then(|s| graph.node(s)).and_then(|n| n.artifact()).cloned();
                let art_b = b.and_then(|s| graph.node(s)).and_then(|n| n.artifact()).cloned();
                self.workers.execute_with_epoch(epoch, move || {
                    let outcome = match (art_a, art_b) {
                        (Some(a), Some(b)) => {
                            let mut artifact =
                                Artifact::image(format!("compare://{}|{}", a.id, b.id));
                            artifact.kind = ArtifactKind::Comparison;
                            JobOutcome::Success(artifact)
                        }
                        _ => JobOutcome::Failure(
                            "compare requires both A and B inputs".to_string(),
                        ),
                    };
                    let _ = tx.send((id, outcome));
                });
            }
            NodeType::Renderer | NodeType::Modifier | NodeType::Upscale | NodeType::Video => {
                // Renderer can synthesize from nothing; the edit/upscale/
                // animate families transform an upstream image.
                if kind != NodeType::Renderer && input.is_none() {
                    self.fail(graph, report, id, "no upstream image to process".to_string());
                    return Ok(());
                }
                let Some(adapter) = ctx.adapters.for_kind(kind).cloned() else {
                    self.fail(graph, report, id, format!("no adapter for {kind}"));
                    return Ok(());
                };
                let req = AdapterRequest { node: id, params, input };
                self.workers.execute_with_epoch(epoch, move || {
                    let outcome = match adapter.generate(&req) {
                        Ok(resp) => JobOutcome::Success(resp.artifact),
                        Err(e) => JobOutcome::Failure(e.to_string()),
                    };
                    let _ = tx.send((id, outcome));
                });
            }
        }

        self.set_status(graph, id, NodeStatus::Running);
        pending.insert(id, Instant::now() + ctx.timeouts.for_kind(kind));
        Ok(())
    }

    /// Wait for every dispatched node of the level, honoring per-node
    /// deadlines. Late results for already-expired nodes are discarded.
    fn collect_level(
        &self,
        graph: &mut Graph,
        ledger: &mut CreditLedger,
        report: &mut RunReport,
        ctx: &RunContext,
        rx: &crossbeam_channel::Receiver<OutcomeMsg>,
        pending: &mut HashMap<NodeId, Instant>,
    ) {
        while !pending.is_empty() {
            let next_deadline = match pending.values().min() {
                Some(d) => *d,
                None => break,
            };
            match rx.recv_deadline(next_deadline) {
                Ok((id, outcome)) => {
                    if pending.remove(&id).is_none() {
                        // Result of a node that already timed out.
                        debug!("Discarding late outcome for {}", id);
                        continue;
                    }
                    match outcome {
                        JobOutcome::Success(artifact) => {
                            self.complete(graph, ledger, report, id, artifact);
                        }
                        JobOutcome::Failure(msg) => {
                            self.fail(graph, report, id, msg);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<NodeId> = pending
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(&id, _)| id)
                        .collect();
                    for id in expired {
                        pending.remove(&id);
                        let kind = graph.node(id).map(|n| n.kind);
                        if kind == Some(NodeType::Source) {
                            // Capture deadline: resolve with no image
                            // rather than failing the branch.
                            debug!("Capture deadline for {}, using placeholder", id);
                            self.complete(graph, ledger, report, id, Artifact::placeholder());
                        } else {
                            let limit = kind
                                .map(|k| ctx.timeouts.for_kind(k))
                                .unwrap_or(ctx.timeouts.image);
                            self.fail(graph, report, id, format!("timed out after {limit:?}"));
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Pool gone; fail whatever is left so the run settles.
                    let left: Vec<NodeId> = pending.keys().copied().collect();
                    pending.clear();
                    for id in left {
                        self.fail(graph, report, id, "worker pool unavailable".to_string());
                    }
                }
            }
        }
    }

    /// Real (non-cached) success: store result + key, clear dirty, charge.
    fn complete(
        &self,
        graph: &mut Graph,
        ledger: &mut CreditLedger,
        report: &mut RunReport,
        id: NodeId,
        artifact: Artifact,
    ) {
        let key = match graph.node(id).and_then(|n| n.cache_key.clone()) {
            Some(k) => k,
            None => match compute_cache_key(graph, id) {
                Ok(k) => k,
                Err(_) => return,
            },
        };
        {
            let Some(node) = graph.node_mut(id) else { return };
            node.result = Some(NodeResult::new(artifact, key));
            node.dirty = false;
            node.last_error = None;
        }
        self.set_status(graph, id, NodeStatus::Done);

        let charged = match graph.node(id) {
            Some(node) => ledger.charge(node),
            None => 0,
        };
        report.completed.push(id);
        report.charged += charged;
        self.telemetry.emit(RunEvent::NodeCompleted { node: id, cached: false, charged });
        self.telemetry.emit(RunEvent::CreditsChanged { balance: ledger.balance() });
    }

    /// Adapter failure or timeout: the node errors (still dirty, no charge)
    /// and its forward closure is blocked before it is ever reached.
    fn fail(&self, graph: &mut Graph, report: &mut RunReport, id: NodeId, message: String) {
        warn!("Node {} failed: {}", id, message);
        if let Some(node) = graph.node_mut(id) {
            node.last_error = Some(message.clone());
        }
        self.set_status(graph, id, NodeStatus::Error);
        self.telemetry.emit(RunEvent::NodeFailed { node: id, message });
        report.failed.push(id);

        for descendant in graph.descendants(id) {
            let queued = graph
                .node(descendant)
                .map(|n| n.status == NodeStatus::Queued)
                .unwrap_or(false);
            if queued {
                self.set_status(graph, descendant, NodeStatus::Blocked);
                report.blocked.push(descendant);
            }
        }
    }

    fn set_status(&self, graph: &mut Graph, id: NodeId, to: NodeStatus) {
        if let Some(node) = graph.node_mut(id) {
            let from = node.status;
            if from != to {
                node.status = to;
                self.telemetry.emit(RunEvent::NodeStatus { node: id, from, to });
            }
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.thread_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::core::event_bus::TelemetryBus;
    use crate::entities::{CompareSlot, NodeParams, RenderParams};
    use crate::test_support::{SlowCapture, StaticCapture, StubBackends};

    fn scheduler() -> Scheduler {
        Scheduler::new(2, TelemetrySender::disconnected())
    }

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            image: Duration::from_secs(5),
            video: Duration::from_secs(5),
            capture: Duration::from_secs(5),
        }
    }

    fn context(backends: &StubBackends) -> RunContext {
        RunContext::new(backends.adapter_set(), StaticCapture::with_image())
            .with_timeouts(fast_timeouts())
    }

    fn status_of(g: &Graph, id: NodeId) -> NodeStatus {
        g.node(id).unwrap().status
    }

    #[test]
    fn test_linear_chain_completes_in_order() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (1.0, 0.0));
        let m = g.add_node(NodeType::Modifier, (2.0, 0.0));
        let u = g.add_node(NodeType::Upscale, (3.0, 0.0));
        g.connect(s, r).unwrap();
        g.connect(r, m).unwrap();
        g.connect(m, u).unwrap();

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert!(report.fully_succeeded());
        assert_eq!(report.completed.len(), 4);
        for id in [s, r, m, u] {
            assert_eq!(status_of(&g, id), NodeStatus::Done);
            assert!(!g.node(id).unwrap().dirty);
            assert!(g.node(id).unwrap().result.is_some());
        }
        // Level ordering: every upstream executed before its downstream.
        let order = backends.invocation_order();
        let pos = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(r) < pos(m));
        assert!(pos(m) < pos(u));
        // Source is captured, not generated: it never reaches an adapter.
        assert!(!order.contains(&s));

        assert_eq!(
            report.charged,
            config::COST_SOURCE + config::COST_RENDER + config::COST_MODIFY
                + config::COST_UPSCALE_STANDARD
        );
        assert_eq!(ledger.balance(), 100 - report.charged);
    }

    #[test]
    fn test_failure_containment() {
        // Source(1) -> Renderer(2) -> Upscale(3), independent
        // Source(4) -> Renderer(5); node 2 fails.
        let mut g = Graph::new();
        let n1 = g.add_node(NodeType::Source, (0.0, 0.0));
        let n2 = g.add_node(NodeType::Renderer, (1.0, 0.0));
        let n3 = g.add_node(NodeType::Upscale, (2.0, 0.0));
        let n4 = g.add_node(NodeType::Source, (0.0, 1.0));
        let n5 = g.add_node(NodeType::Renderer, (1.0, 1.0));
        g.connect(n1, n2).unwrap();
        g.connect(n2, n3).unwrap();
        g.connect(n4, n5).unwrap();

        let backends = StubBackends::new();
        backends.render.set_fail(n2, true);
        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert_eq!(status_of(&g, n2), NodeStatus::Error);
        assert_eq!(status_of(&g, n3), NodeStatus::Blocked);
        assert_eq!(status_of(&g, n1), NodeStatus::Done);
        assert_eq!(status_of(&g, n4), NodeStatus::Done);
        assert_eq!(status_of(&g, n5), NodeStatus::Done);

        // Blocked node was never invoked.
        assert_eq!(backends.upscale.invocation_count(), 0);

        // 1, 4, 5 charged; 2 failed and 3 skipped: not charged.
        assert_eq!(
            report.charged,
            config::COST_SOURCE * 2 + config::COST_RENDER
        );
        assert_eq!(report.failed, vec![n2]);
        assert_eq!(report.blocked, vec![n3]);

        // Failed and blocked nodes stay dirty for the next run.
        assert!(g.node(n2).unwrap().dirty);
        assert!(g.node(n3).unwrap().dirty);
        assert!(!report.fully_succeeded());
    }

    #[test]
    fn test_credit_guard_refuses_without_touching_state() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (1.0, 0.0));
        let m = g.add_node(NodeType::Modifier, (2.0, 0.0));
        g.connect(s, r).unwrap();
        g.connect(r, m).unwrap();
        // Cost: 1 + 2 + 2 = 5; balance 3.
        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(3);

        let err = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientCredit { required: 5, available: 3 }
        ));
        for id in [s, r, m] {
            assert_eq!(status_of(&g, id), NodeStatus::Idle);
            assert!(g.node(id).unwrap().dirty);
        }
        assert_eq!(ledger.balance(), 3);
        assert_eq!(backends.total_invocations(), 0);
    }

    #[test]
    fn test_clean_graph_rejected_and_cache_skips_reverted_edit() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (1.0, 0.0));
        g.connect(s, r).unwrap();

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        let sched = scheduler();
        sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();
        let invocations_after_first = backends.total_invocations();
        let balance_after_first = ledger.balance();

        // A clean graph is rejected outright: zero invocations, no charge.
        let err = sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap_err();
        assert!(matches!(err, EngineError::NothingToRun));
        assert_eq!(backends.total_invocations(), invocations_after_first);
        assert_eq!(ledger.balance(), balance_after_first);

        // Re-apply identical params: everything dirties, keys still match,
        // so the whole graph resolves from cache. Ledger untouched.
        let params = g.node(r).unwrap().params.clone();
        g.set_params(r, params).unwrap();
        assert!(g.is_dirty());

        let report = sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();
        assert_eq!(backends.total_invocations(), invocations_after_first);
        assert_eq!(ledger.balance(), balance_after_first);
        assert_eq!(report.completed.len(), 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(status_of(&g, r), NodeStatus::Done);
        assert!(!g.is_dirty());
    }

    #[test]
    fn test_param_change_reruns_only_affected_branch() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (1.0, 0.0));
        let u = g.add_node(NodeType::Upscale, (2.0, 0.0));
        g.connect(s, r).unwrap();
        g.connect(r, u).unwrap();

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        let sched = scheduler();
        sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        // New prompt on the renderer: s stays clean, r and u re-run.
        g.set_params(
            r,
            NodeParams::Render(RenderParams { prompt: "new".into(), ..RenderParams::default() }),
        )
        .unwrap();
        let report = sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.charged, config::COST_RENDER + config::COST_UPSCALE_STANDARD);
        assert_eq!(backends.render.invocation_count(), 2);
        assert_eq!(backends.upscale.invocation_count(), 2);
    }

    #[test]
    fn test_error_and_blocked_retry_on_next_run() {
        let mut g = Graph::new();
        let r = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let u = g.add_node(NodeType::Upscale, (1.0, 0.0));
        g.connect(r, u).unwrap();

        let backends = StubBackends::new();
        backends.render.set_fail(r, true);
        let mut ledger = CreditLedger::new(100);
        let sched = scheduler();
        sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();
        assert_eq!(status_of(&g, r), NodeStatus::Error);
        assert_eq!(status_of(&g, u), NodeStatus::Blocked);

        backends.render.set_fail(r, false);
        let report = sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap();
        assert!(report.fully_succeeded());
        assert_eq!(status_of(&g, r), NodeStatus::Done);
        assert_eq!(status_of(&g, u), NodeStatus::Done);
    }

    #[test]
    fn test_compare_runs_after_both_branches() {
        let mut g = Graph::new();
        let r1 = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let r2 = g.add_node(NodeType::Renderer, (0.0, 1.0));
        let cmp = g.add_node(NodeType::Compare, (1.0, 0.5));
        g.set_compare_input(cmp, CompareSlot::A, Some(r1)).unwrap();
        g.set_compare_input(cmp, CompareSlot::B, Some(r2)).unwrap();

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert!(report.fully_succeeded());
        assert_eq!(status_of(&g, cmp), NodeStatus::Done);
        let artifact = g.node(cmp).unwrap().artifact().unwrap().clone();
        assert_eq!(artifact.kind, ArtifactKind::Comparison);
        // Compare composes locally: free, and never hits an adapter.
        assert_eq!(report.charged, config::COST_RENDER * 2);
    }

    #[test]
    fn test_compare_with_unassigned_slot_fails() {
        let mut g = Graph::new();
        let r1 = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let cmp = g.add_node(NodeType::Compare, (1.0, 0.0));
        g.set_compare_input(cmp, CompareSlot::A, Some(r1)).unwrap();

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert_eq!(status_of(&g, cmp), NodeStatus::Error);
        assert_eq!(report.failed, vec![cmp]);
    }

    #[test]
    fn test_modifier_without_input_fails_fast() {
        let mut g = Graph::new();
        let m = g.add_node(NodeType::Modifier, (0.0, 0.0));

        let backends = StubBackends::new();
        let mut ledger = CreditLedger::new(100);
        scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert_eq!(status_of(&g, m), NodeStatus::Error);
        assert_eq!(backends.modify.invocation_count(), 0);
        assert_eq!(ledger.balance(), 100);
    }

    #[test]
    fn test_adapter_timeout_marks_error_and_blocks() {
        let mut g = Graph::new();
        let r = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let u = g.add_node(NodeType::Upscale, (1.0, 0.0));
        g.connect(r, u).unwrap();

        let backends = StubBackends::new();
        backends.render.set_delay(Duration::from_millis(300));
        let mut timeouts = fast_timeouts();
        timeouts.image = Duration::from_millis(40);
        let ctx = RunContext::new(backends.adapter_set(), StaticCapture::with_image())
            .with_timeouts(timeouts);

        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &ctx).unwrap();

        assert_eq!(status_of(&g, r), NodeStatus::Error);
        assert_eq!(status_of(&g, u), NodeStatus::Blocked);
        assert!(g.node(r).unwrap().last_error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.charged, 0);
        assert_eq!(ledger.balance(), 100);
    }

    #[test]
    fn test_capture_deadline_resolves_with_placeholder() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));

        let backends = StubBackends::new();
        let mut timeouts = fast_timeouts();
        timeouts.capture = Duration::from_millis(40);
        let ctx = RunContext::new(
            backends.adapter_set(),
            SlowCapture::new(Duration::from_millis(400)),
        )
        .with_timeouts(timeouts);

        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &ctx).unwrap();

        assert!(report.fully_succeeded());
        assert_eq!(status_of(&g, s), NodeStatus::Done);
        assert!(g.node(s).unwrap().artifact().unwrap().is_placeholder());
        assert_eq!(report.charged, config::COST_SOURCE);
    }

    #[test]
    fn test_cancel_stops_subsequent_levels() {
        let mut g = Graph::new();
        let r = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let u = g.add_node(NodeType::Upscale, (1.0, 0.0));
        g.connect(r, u).unwrap();

        let backends = StubBackends::new();
        let bus = TelemetryBus::new();
        let ctx = context(&backends);
        let handle = ctx.cancel_handle();
        // Cancel as soon as the first level starts: the renderer (already
        // in flight) completes, the upscale level never begins.
        bus.subscribe(move |event| {
            if matches!(event, RunEvent::LevelStarted { level: 0, .. }) {
                handle.cancel();
            }
        });
        let sched = Scheduler::new(2, bus.sender());

        let mut ledger = CreditLedger::new(100);
        let report = sched.execute(&mut g, &mut ledger, &ctx).unwrap();

        assert_eq!(status_of(&g, r), NodeStatus::Done);
        assert_eq!(status_of(&g, u), NodeStatus::Cancelled);
        assert!(g.node(u).unwrap().dirty);
        assert_eq!(report.cancelled, vec![u]);
        assert_eq!(report.charged, config::COST_RENDER);
        assert_eq!(backends.upscale.invocation_count(), 0);
    }

    #[test]
    fn test_second_execute_rejected_while_running() {
        let backends = StubBackends::new();
        backends.render.set_delay(Duration::from_millis(150));
        let sched = Arc::new(scheduler());

        std::thread::scope(|scope| {
            let backends_ref = &backends;
            let sched1 = Arc::clone(&sched);
            scope.spawn(move || {
                let mut g = Graph::new();
                g.add_node(NodeType::Renderer, (0.0, 0.0));
                let mut ledger = CreditLedger::new(100);
                sched1.execute(&mut g, &mut ledger, &context(backends_ref)).unwrap();
            });

            std::thread::sleep(Duration::from_millis(50));
            let mut g = Graph::new();
            g.add_node(NodeType::Renderer, (0.0, 0.0));
            let mut ledger = CreditLedger::new(100);
            let err = sched.execute(&mut g, &mut ledger, &context(&backends)).unwrap_err();
            assert!(matches!(err, EngineError::RunInProgress));
        });

        // The guard clears once the first run finishes.
        let mut g = Graph::new();
        g.add_node(NodeType::Renderer, (0.0, 0.0));
        let mut ledger = CreditLedger::new(100);
        assert!(sched.execute(&mut g, &mut ledger, &context(&backends)).is_ok());
    }

    #[test]
    fn test_sibling_failure_does_not_abort_level() {
        let mut g = Graph::new();
        let ok = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let bad = g.add_node(NodeType::Renderer, (0.0, 1.0));

        let backends = StubBackends::new();
        backends.render.set_fail(bad, true);
        let mut ledger = CreditLedger::new(100);
        let report = scheduler().execute(&mut g, &mut ledger, &context(&backends)).unwrap();

        assert_eq!(status_of(&g, ok), NodeStatus::Done);
        assert_eq!(status_of(&g, bad), NodeStatus::Error);
        assert_eq!(report.completed, vec![ok]);
        assert_eq!(report.failed, vec![bad]);
    }
}
