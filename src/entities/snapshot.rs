//! Structural graph snapshots for undo/redo.
//!
//! A snapshot captures exactly what a structural edit can change — node
//! identity, type, position, parameters, dirty flags, the edge table and the
//! id counter — and nothing that execution produces. Result artifacts and
//! mask pixel payloads stay out to bound memory; restored nodes rebuild as
//! idle with no result, so the next run recomputes them.

use serde::{Deserialize, Serialize};

use super::graph::{Edge, Graph};
use super::node::{Node, NodeId, NodeStatus};
use super::params::{NodeParams, NodeType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeType,
    pub pos: (f32, f32),
    pub params: NodeParams,
    pub dirty: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    nodes: Vec<NodeSnapshot>,
    edges: Vec<Edge>,
    next_id: u64,
}

impl GraphSnapshot {
    /// Serialize the structural state of `graph`.
    pub fn capture(graph: &Graph) -> Self {
        Self {
            nodes: graph
                .nodes()
                .map(|n| NodeSnapshot {
                    id: n.id,
                    kind: n.kind,
                    pos: n.pos,
                    params: n.params.structural_clone(),
                    dirty: n.dirty,
                    version: n.version,
                })
                .collect(),
            edges: graph.edges().to_vec(),
            next_id: graph.next_id(),
        }
    }

    /// Rebuild `graph`'s node/edge collections and id counter exactly as
    /// captured. View state is left alone — zoom and pan are not undoable.
    pub fn restore(&self, graph: &mut Graph) {
        graph.nodes.clear();
        for snap in &self.nodes {
            let mut node = Node::new(snap.id, snap.kind, snap.pos);
            node.params = snap.params.clone();
            node.dirty = snap.dirty;
            node.version = snap.version;
            node.status = NodeStatus::Idle;
            graph.nodes.insert(snap.id, node);
        }
        graph.edges = self.edges.clone();
        graph.next_id = self.next_id;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::params::RenderParams;

    #[test]
    fn test_capture_restore_round_trip() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (120.0, 0.0));
        g.connect(s, r).unwrap();
        g.set_params(
            r,
            NodeParams::Render(RenderParams { prompt: "harbor".into(), ..Default::default() }),
        )
        .unwrap();

        let snap = GraphSnapshot::capture(&g);

        g.delete_node(r).unwrap();
        g.add_node(NodeType::Video, (300.0, 0.0));
        assert_ne!(g.node_count(), 2);

        snap.restore(&mut g);

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.next_id(), 2);
        assert_eq!(g.edges(), &[Edge { from: s, to: r }]);
        match &g.node(r).unwrap().params {
            NodeParams::Render(p) => assert_eq!(p.prompt, "harbor"),
            _ => panic!("wrong params"),
        }
    }

    #[test]
    fn test_restore_drops_results() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let key = crate::entities::cache_key::compute_cache_key(&g, s).unwrap();
        {
            let node = g.node_mut(s).unwrap();
            node.dirty = false;
            node.status = NodeStatus::Done;
            node.result = Some(crate::entities::node::NodeResult::new(
                crate::entities::artifact::Artifact::image("gen://cap/1"),
                key,
            ));
        }

        let snap = GraphSnapshot::capture(&g);
        snap.restore(&mut g);

        let node = g.node(s).unwrap();
        assert!(node.result.is_none());
        assert_eq!(node.status, NodeStatus::Idle);
        assert!(!node.dirty); // dirty flag itself is structural and kept
    }

    #[test]
    fn test_id_counter_restored_exactly() {
        let mut g = Graph::new();
        g.add_node(NodeType::Source, (0.0, 0.0));
        let snap = GraphSnapshot::capture(&g);

        g.add_node(NodeType::Renderer, (0.0, 0.0));
        g.add_node(NodeType::Renderer, (0.0, 0.0));
        assert_eq!(g.next_id(), 3);

        snap.restore(&mut g);
        assert_eq!(g.next_id(), 1);
        // New ids continue from the restored counter.
        let next = g.add_node(NodeType::Renderer, (0.0, 0.0));
        assert_eq!(next, NodeId(1));
    }
}
