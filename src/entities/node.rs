//! Node: a typed unit of work in the pipeline graph.
//!
//! A node holds its parameter set, an optional produced result and the
//! bookkeeping the scheduler needs: status, dirty flag, version stamp and
//! the last computed cache key. The graph owns every node; snapshots are the
//! only other copies in the system.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::cache_key::CacheKey;
use super::params::{NodeParams, NodeType};

/// Graph-scoped node identifier, assigned by the graph's monotonic counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Per-node lifecycle within and across runs.
///
/// `Blocked` is absorbing for the rest of the run that assigned it: a node
/// downstream of a failure is never invoked in that run. A fresh run
/// recomputes reachability from scratch, so error/blocked/cancelled nodes
/// (which stay dirty) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Idle,
    Queued,
    Running,
    Done,
    Error,
    Blocked,
    Cancelled,
}

impl NodeStatus {
    /// Terminal for the current run: the scheduler will not touch the node
    /// again until the next run.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            NodeStatus::Done | NodeStatus::Error | NodeStatus::Blocked | NodeStatus::Cancelled
        )
    }

    /// Transient statuses that must not survive a save/load cycle.
    pub fn is_in_flight(self) -> bool {
        matches!(self, NodeStatus::Queued | NodeStatus::Running)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Queued => "queued",
            NodeStatus::Running => "running",
            NodeStatus::Done => "done",
            NodeStatus::Error => "error",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A produced artifact together with the key that produced it. The key is
/// what makes memoization honest: a result is reusable only for the exact
/// (type, params, lineage) tuple it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub artifact: Artifact,
    pub produced_at: SystemTime,
    pub cache_key: CacheKey,
}

impl NodeResult {
    pub fn new(artifact: Artifact, cache_key: CacheKey) -> Self {
        Self { artifact, produced_at: SystemTime::now(), cache_key }
    }
}

/// A single processing step on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeType,
    /// Canvas position; layout only, never part of execution or hashing.
    pub pos: (f32, f32),
    pub params: NodeParams,
    pub status: NodeStatus,
    /// Stale result marker: set on creation and on any upstream or parameter
    /// change, cleared only by a successful (or cache-skipped) execution.
    pub dirty: bool,
    /// Bumped on every parameter edit; cheap change detection for hosts.
    pub version: u64,
    pub result: Option<NodeResult>,
    /// Key from the most recent key computation that led to an execution.
    pub cache_key: Option<CacheKey>,
    /// Failure message from the last run, for display. Not persisted.
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeType, pos: (f32, f32)) -> Self {
        Self {
            id,
            kind,
            pos,
            params: NodeParams::defaults_for(kind),
            status: NodeStatus::Idle,
            dirty: true,
            version: 0,
            result: None,
            cache_key: None,
            last_error: None,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The artifact this node feeds downstream, if it has one.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.result.as_ref().map(|r| &r.artifact)
    }
}
