//! Bounded undo/redo stacks over structural graph snapshots.
//!
//! Every structural mutation captures the pre-state; a successful mutation
//! pushes it here and clears the redo stack. `undo` moves the current state
//! onto the redo stack and restores the most recent snapshot exactly (node
//! set, edge set, id counter). Result artifacts never enter the stacks —
//! snapshots are structural only, so depth is cheap.

use log::debug;

use crate::config::MAX_UNDO_DEPTH;
use crate::entities::{Graph, GraphSnapshot};

pub struct UndoHistory {
    undo: Vec<GraphSnapshot>,
    redo: Vec<GraphSnapshot>,
    depth: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::with_depth(MAX_UNDO_DEPTH)
    }
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(depth: usize) -> Self {
        Self { undo: Vec::new(), redo: Vec::new(), depth: depth.max(1) }
    }

    /// Record the pre-mutation state. Evicts the oldest entry beyond the
    /// depth bound and invalidates any redo branch.
    pub fn push(&mut self, snapshot: GraphSnapshot) {
        if self.undo.len() >= self.depth {
            self.undo.remove(0);
        }
        self.undo.push(snapshot);
        self.redo.clear();
    }

    /// Restore the most recent snapshot into `graph`; the pre-undo state
    /// moves to the redo stack. Returns false when there is nothing to undo.
    pub fn undo(&mut self, graph: &mut Graph) -> bool {
        let Some(snapshot) = self.undo.pop() else {
            return false;
        };
        self.redo.push(GraphSnapshot::capture(graph));
        snapshot.restore(graph);
        debug!("Undo: restored {} nodes", snapshot.node_count());
        true
    }

    /// Mirror of `undo`.
    pub fn redo(&mut self, graph: &mut Graph) -> bool {
        let Some(snapshot) = self.redo.pop() else {
            return false;
        };
        self.undo.push(GraphSnapshot::capture(graph));
        snapshot.restore(graph);
        debug!("Redo: restored {} nodes", snapshot.node_count());
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NodeType;

    #[test]
    fn test_undo_restores_exactly() {
        let mut g = Graph::new();
        let mut history = UndoHistory::new();

        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (100.0, 0.0));
        g.connect(s, r).unwrap();
        let id_counter = g.next_id();

        history.push(GraphSnapshot::capture(&g));
        g.delete_node(r).unwrap();
        assert_eq!(g.node_count(), 1);

        assert!(history.undo(&mut g));
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.next_id(), id_counter);
        assert_eq!(g.edges().len(), 1);
        assert!(g.contains(r));
    }

    #[test]
    fn test_redo_mirrors_undo() {
        let mut g = Graph::new();
        let mut history = UndoHistory::new();

        g.add_node(NodeType::Source, (0.0, 0.0));
        history.push(GraphSnapshot::capture(&g));
        let extra = g.add_node(NodeType::Renderer, (0.0, 0.0));

        history.undo(&mut g);
        assert!(!g.contains(extra));
        assert!(history.can_redo());

        history.redo(&mut g);
        assert!(g.contains(extra));
        assert!(history.can_undo());
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let mut g = Graph::new();
        let mut history = UndoHistory::new();

        history.push(GraphSnapshot::capture(&g));
        g.add_node(NodeType::Source, (0.0, 0.0));
        history.undo(&mut g);
        assert!(history.can_redo());

        // A fresh mutation invalidates the redo branch.
        history.push(GraphSnapshot::capture(&g));
        g.add_node(NodeType::Video, (0.0, 0.0));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut g = Graph::new();
        let mut history = UndoHistory::with_depth(3);

        for _ in 0..5 {
            history.push(GraphSnapshot::capture(&g));
            g.add_node(NodeType::Source, (0.0, 0.0));
        }
        assert_eq!(history.undo_len(), 3);

        while history.undo(&mut g) {}
        // Oldest two snapshots were evicted; two nodes remain.
        assert_eq!(g.node_count(), 2);
    }
}
