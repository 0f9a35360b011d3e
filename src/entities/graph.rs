//! Graph: the canonical node/edge collection and its structural invariants.
//!
//! Invariants enforced here, at mutation time:
//! - no directed cycle can ever exist (`connect` rejects closing edges);
//! - each node has at most one incoming edge; connecting onto an occupied
//!   input silently replaces the prior edge;
//! - Source nodes accept no incoming edge; Video and Compare nodes have no
//!   output to connect from;
//! - Compare inputs live in its parameter slots (`set_compare_input`), never
//!   in the edge table.
//!
//! All mutations are synchronous and in-place; none perform I/O. The graph
//! is not safe for concurrent mutation — hosts drive it from one control
//! thread, and the scheduler borrows it exclusively for the span of a run.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::node::{Node, NodeId, NodeStatus};
use super::params::{CompareSlot, NodeParams, NodeType};

/// Directed dependency link. Carries no data; at execution time data flows
/// by reference to the upstream node's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

/// Lightweight canvas state carried with the graph. Layout only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub zoom: f32,
    pub pan: (f32, f32),
}

impl Default for ViewState {
    fn default() -> Self {
        Self { zoom: 1.0, pan: (0.0, 0.0) }
    }
}

/// The full pipeline: nodes, edges, the id counter and view state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) next_id: u64,
    pub view: ViewState,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Access ==========

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Current value of the monotonic id counter.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Any node needing recomputation?
    pub fn is_dirty(&self) -> bool {
        self.nodes.values().any(|n| n.dirty)
    }

    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.nodes.values().filter(|n| n.dirty).map(|n| n.id).collect()
    }

    // ========== Structural mutation ==========

    /// Add a node of `kind` at `pos` with default parameters.
    /// New nodes start idle and dirty.
    pub fn add_node(&mut self, kind: NodeType, pos: (f32, f32)) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind, pos));
        debug!("Added {} node {}", kind, id);
        id
    }

    /// Connect `from`'s output to `to`'s input.
    ///
    /// Rejects output-less sources, input-less targets and cycle-closing
    /// edges; silently replaces an occupied input. On success `to` and its
    /// descendants are marked dirty.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let from_kind = self.node(from).ok_or(EngineError::UnknownNode(from))?.kind;
        let to_kind = self.node(to).ok_or(EngineError::UnknownNode(to))?.kind;

        if !from_kind.has_output() {
            return Err(EngineError::InvalidConnection(format!(
                "{} ({}) has no output port",
                from, from_kind
            )));
        }
        if to_kind == NodeType::Source {
            return Err(EngineError::InvalidConnection(format!(
                "{} is a source and accepts no input",
                to
            )));
        }
        if to_kind == NodeType::Compare {
            return Err(EngineError::InvalidConnection(format!(
                "{} takes inputs through its A/B slots, not edges",
                to
            )));
        }
        // An edge from -> to closes a cycle iff `from` is already reachable
        // from `to` (self-loops included).
        if from == to || self.reaches(to, from) {
            return Err(EngineError::CycleRejected { from, to });
        }

        if let Some(pos) = self.edges.iter().position(|e| e.to == to) {
            let old = self.edges.remove(pos);
            debug!("Replaced input of {}: {} -> {}", to, old.from, from);
        }
        self.edges.push(Edge { from, to });
        self.mark_downstream_dirty(to);
        debug!("Connected {} -> {}", from, to);
        Ok(())
    }

    /// Remove the incoming edge of `to`, if any. Returns whether one existed.
    pub fn disconnect_input(&mut self, to: NodeId) -> Result<bool> {
        if !self.contains(to) {
            return Err(EngineError::UnknownNode(to));
        }
        match self.edges.iter().position(|e| e.to == to) {
            Some(pos) => {
                let old = self.edges.remove(pos);
                self.mark_downstream_dirty(to);
                debug!("Disconnected {} -> {}", old.from, to);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Assign a Compare node's A or B slot ("use as A" / "use as B").
    /// Passing `None` clears the slot. Compare has no output, so slot
    /// assignments can never close a cycle.
    pub fn set_compare_input(
        &mut self,
        id: NodeId,
        slot: CompareSlot,
        source: Option<NodeId>,
    ) -> Result<()> {
        if let Some(src) = source {
            let src_kind = self.node(src).ok_or(EngineError::UnknownNode(src))?.kind;
            if src == id {
                return Err(EngineError::InvalidConnection(format!(
                    "{} cannot compare against itself",
                    id
                )));
            }
            if !src_kind.has_output() {
                return Err(EngineError::InvalidConnection(format!(
                    "{} ({}) has no output port",
                    src, src_kind
                )));
            }
        }

        let node = self.node_mut(id).ok_or(EngineError::UnknownNode(id))?;
        let params = node.params.as_compare_mut().ok_or_else(|| {
            EngineError::InvalidConnection(format!("{} is not a compare node", id))
        })?;
        match slot {
            CompareSlot::A => params.input_a = source,
            CompareSlot::B => params.input_b = source,
        }
        node.version += 1;
        node.mark_dirty();
        debug!("Compare {} slot {:?} <- {:?}", id, slot, source);
        Ok(())
    }

    /// Remove a node, every edge touching it, and any Compare slot
    /// referencing it. Downstream nodes lose their input and become dirty.
    pub fn delete_node(&mut self, id: NodeId) -> Result<Node> {
        if !self.contains(id) {
            return Err(EngineError::UnknownNode(id));
        }
        // Dirty the soon-to-be-orphaned descendants while they are still
        // reachable through the edges we are about to drop.
        for dep in self.dependents(id) {
            self.mark_downstream_dirty(dep);
        }
        self.edges.retain(|e| e.from != id && e.to != id);
        let referencing: Vec<NodeId> = self
            .nodes
            .values()
            .filter_map(|n| {
                let p = n.params.as_compare()?;
                (p.input_a == Some(id) || p.input_b == Some(id)).then_some(n.id)
            })
            .collect();
        for cmp in referencing {
            if let Some(node) = self.node_mut(cmp) {
                if let Some(p) = node.params.as_compare_mut() {
                    if p.input_a == Some(id) {
                        p.input_a = None;
                    }
                    if p.input_b == Some(id) {
                        p.input_b = None;
                    }
                }
                node.version += 1;
                node.mark_dirty();
            }
        }
        // IndexMap::shift_remove keeps insertion order for the survivors.
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(EngineError::UnknownNode(id))?;
        debug!("Deleted {} node {}", node.kind, id);
        Ok(node)
    }

    /// Copy a node's structural parameters into a fresh node. The copy never
    /// inherits the result; it lands dirty, idle and offset on the canvas.
    pub fn duplicate_node(&mut self, id: NodeId) -> Result<NodeId> {
        let source = self.node(id).ok_or(EngineError::UnknownNode(id))?;
        let kind = source.kind;
        let params = source.params.structural_clone();
        let pos = (source.pos.0 + 40.0, source.pos.1 + 40.0);

        let copy = self.add_node(kind, pos);
        if let Some(node) = self.node_mut(copy) {
            node.params = params;
        }
        debug!("Duplicated {} as {}", id, copy);
        Ok(copy)
    }

    /// Replace a node's parameter set. The new set must be of the node's
    /// type. Bumps the version stamp and dirties the node and descendants.
    pub fn set_params(&mut self, id: NodeId, params: NodeParams) -> Result<()> {
        let node = self.node_mut(id).ok_or(EngineError::UnknownNode(id))?;
        if params.kind() != node.kind {
            return Err(EngineError::ParamsMismatch { node: id, expected: node.kind.tag() });
        }
        node.params = params;
        node.version += 1;
        self.mark_downstream_dirty(id);
        Ok(())
    }

    /// Drag: layout only, no dirtying, no version bump.
    pub fn move_node(&mut self, id: NodeId, pos: (f32, f32)) {
        if let Some(node) = self.node_mut(id) {
            node.pos = pos;
        }
    }

    // ========== Derived structure ==========

    /// The node feeding `id` through the edge table, if any.
    pub fn incoming(&self, id: NodeId) -> Option<NodeId> {
        self.edges.iter().find(|e| e.to == id).map(|e| e.from)
    }

    /// Execution dependencies: the edge input plus, for Compare, the
    /// assigned A/B slots in that order. Deduplicated — a Compare holding
    /// the same source in both slots depends on it once.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut deps = Vec::new();
        if let Some(up) = self.incoming(id) {
            deps.push(up);
        }
        if let Some(p) = self.node(id).and_then(|n| n.params.as_compare()) {
            for slot in [p.input_a, p.input_b].into_iter().flatten() {
                if !deps.contains(&slot) {
                    deps.push(slot);
                }
            }
        }
        deps
    }

    /// Nodes that depend on `id`: edge fan-out plus Compare nodes holding it
    /// in a slot.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> =
            self.edges.iter().filter(|e| e.from == id).map(|e| e.to).collect();
        for node in self.nodes.values() {
            if let Some(p) = node.params.as_compare() {
                if (p.input_a == Some(id) || p.input_b == Some(id)) && !out.contains(&node.id) {
                    out.push(node.id);
                }
            }
        }
        out
    }

    /// Is `target` forward-reachable from `from`?
    pub fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        self.descendants(from).contains(&target)
    }

    /// Forward closure of `id`, excluding `id` itself. BFS order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.dependents(id).into();
        let mut out = Vec::new();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                out.push(next);
                queue.extend(self.dependents(next));
            }
        }
        out
    }

    /// Mark `id` and its forward closure dirty.
    pub fn mark_downstream_dirty(&mut self, id: NodeId) {
        let targets = {
            let mut t = self.descendants(id);
            t.push(id);
            t
        };
        for target in targets {
            if let Some(node) = self.node_mut(target) {
                node.mark_dirty();
            }
        }
    }

    /// Dependency levels via Kahn's algorithm: level 0 holds nodes with no
    /// dependencies; level k holds nodes whose dependencies all resolved by
    /// level k-1. Covers every node; the scheduler filters eligibility.
    pub fn levels(&self) -> Vec<Vec<NodeId>> {
        let mut indegree: IndexMap<NodeId, usize> = self
            .nodes
            .keys()
            .map(|&id| (id, self.dependencies(id).len()))
            .collect();

        let mut levels = Vec::new();
        let mut frontier: Vec<NodeId> = indegree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &id in &frontier {
                for dep in self.dependents(id) {
                    if let Some(deg) = indegree.get_mut(&dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            next.push(dep);
                        }
                    }
                }
            }
            levels.push(std::mem::replace(&mut frontier, next));
        }

        // The connect-time cycle check makes leftovers impossible.
        debug_assert_eq!(levels.iter().map(Vec::len).sum::<usize>(), self.nodes.len());
        levels
    }

    /// Reset transient statuses after deserialization. Queued/running nodes
    /// from an interrupted session come back idle; done/error survive.
    pub fn clear_in_flight(&mut self) {
        for node in self.nodes.values_mut() {
            if node.status.is_in_flight() {
                node.status = NodeStatus::Idle;
            }
        }
    }
}
