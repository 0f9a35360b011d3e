//! Deterministic content keys for memoizing node execution.
//!
//! A node's key folds together its type tag, its sorted parameter entries
//! and the keys of its dependencies (edge upstream; for Compare, slot A then
//! slot B), so identical (type, params, lineage) tuples always collide and
//! anything else never does. Keys are computed from structure alone — never
//! from results — which keeps them valid before, during and after a run.
//!
//! Hashing notes:
//! - parameter entries arrive pre-sorted from `NodeParams::hash_entries`;
//! - floats are hashed via their bit patterns (see `params.rs`);
//! - the hasher is seed-stable, so keys survive process restarts and can be
//!   persisted alongside results.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::graph::Graph;
use super::node::{Node, NodeId};

/// Opaque content fingerprint of a node's (type, params, lineage) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recursive key computation with per-call memoization. One engine is built
/// per run (or per query); the memo keeps shared ancestors from being
/// re-hashed once per descendant.
#[derive(Default)]
pub struct KeyEngine {
    memo: HashMap<NodeId, CacheKey>,
}

impl KeyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `id`, resolving upstream lineage as needed.
    /// Termination is guaranteed by the graph's acyclicity invariant.
    pub fn key_for(&mut self, graph: &Graph, id: NodeId) -> Result<CacheKey> {
        if let Some(key) = self.memo.get(&id) {
            return Ok(key.clone());
        }

        let node = graph.node(id).ok_or(EngineError::UnknownNode(id))?;

        let mut upstream = Vec::new();
        for dep in graph.dependencies(id) {
            upstream.push(self.key_for(graph, dep)?);
        }

        let mut hasher = DefaultHasher::new();
        node.kind.tag().hash(&mut hasher);
        for (k, v) in node.params.hash_entries() {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        for key in &upstream {
            key.as_str().hash(&mut hasher);
        }

        let key = CacheKey(format!("{:016x}", hasher.finish()));
        self.memo.insert(id, key.clone());
        Ok(key)
    }
}

/// One-shot key computation for a single node.
pub fn compute_cache_key(graph: &Graph, id: NodeId) -> Result<CacheKey> {
    KeyEngine::new().key_for(graph, id)
}

/// Whether execution can be skipped for this run: the freshly computed key
/// matches the stored one and a result produced under it is still held.
/// Skipped nodes are treated as done without touching the credit ledger.
pub fn should_skip(node: &Node, fresh: &CacheKey) -> bool {
    node.result.is_some() && node.cache_key.as_ref() == Some(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::artifact::Artifact;
    use crate::entities::node::NodeResult;
    use crate::entities::params::{NodeParams, NodeType, RenderParams};

    fn graph_with_chain() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let src = g.add_node(NodeType::Source, (0.0, 0.0));
        let render = g.add_node(NodeType::Renderer, (100.0, 0.0));
        g.connect(src, render).unwrap();
        (g, src, render)
    }

    #[test]
    fn test_key_deterministic() {
        let (g, _, render) = graph_with_chain();
        let a = compute_cache_key(&g, render).unwrap();
        let b = compute_cache_key(&g, render).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_lineage_identical_key() {
        let (mut g, src, render) = graph_with_chain();
        let render2 = g.add_node(NodeType::Renderer, (100.0, 80.0));
        g.connect(src, render2).unwrap();
        // Same type, same default params, same upstream: same key.
        assert_eq!(
            compute_cache_key(&g, render).unwrap(),
            compute_cache_key(&g, render2).unwrap()
        );
    }

    #[test]
    fn test_param_change_changes_key() {
        let (mut g, _, render) = graph_with_chain();
        let before = compute_cache_key(&g, render).unwrap();
        g.set_params(
            render,
            NodeParams::Render(RenderParams { seed: 99, ..RenderParams::default() }),
        )
        .unwrap();
        let after = compute_cache_key(&g, render).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_upstream_change_propagates_into_key() {
        let (mut g, src, render) = graph_with_chain();
        let before = compute_cache_key(&g, render).unwrap();
        g.set_params(
            src,
            NodeParams::Source(crate::entities::params::SourceParams {
                label: "Other capture".into(),
            }),
        )
        .unwrap();
        let after = compute_cache_key(&g, render).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_position_does_not_affect_key() {
        let (mut g, _, render) = graph_with_chain();
        let before = compute_cache_key(&g, render).unwrap();
        g.move_node(render, (500.0, 500.0));
        assert_eq!(before, compute_cache_key(&g, render).unwrap());
    }

    #[test]
    fn test_compare_key_covers_both_slots() {
        let mut g = Graph::new();
        let a = g.add_node(NodeType::Renderer, (0.0, 0.0));
        let b = g.add_node(NodeType::Renderer, (0.0, 100.0));
        let cmp = g.add_node(NodeType::Compare, (200.0, 50.0));
        g.set_compare_input(cmp, crate::entities::params::CompareSlot::A, Some(a)).unwrap();
        let one = compute_cache_key(&g, cmp).unwrap();
        g.set_compare_input(cmp, crate::entities::params::CompareSlot::B, Some(b)).unwrap();
        let two = compute_cache_key(&g, cmp).unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn test_should_skip_requires_result_and_match() {
        let (g, _, render) = graph_with_chain();
        let fresh = compute_cache_key(&g, render).unwrap();

        let mut node = g.node(render).unwrap().clone();
        assert!(!should_skip(&node, &fresh)); // no result yet

        node.cache_key = Some(fresh.clone());
        node.result = Some(NodeResult::new(Artifact::image("gen://img/1"), fresh.clone()));
        assert!(should_skip(&node, &fresh));

        let other = CacheKey("0000000000000000".to_string());
        assert!(!should_skip(&node, &other));
    }
}
