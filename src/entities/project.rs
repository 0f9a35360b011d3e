//! Project: top-level container for a pipeline session.
//!
//! Owns the graph, the undo/redo history, the artifact gallery and the
//! selection, and is the unit of persistence: sessions are saved and loaded
//! via `Project::save` / `Project::load`.
//!
//! Every structural mutation goes through the wrappers here, which capture
//! the pre-state for undo. A rejected mutation (cycle, invalid port) leaves
//! both the graph and the undo stack untouched.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::credits::CreditLedger;
use crate::core::gallery::{Gallery, GalleryEntry};
use crate::core::scheduler::{RunContext, RunReport, Scheduler};
use crate::core::undo::UndoHistory;
use crate::error::Result;

use super::graph::Graph;
use super::node::NodeId;
use super::params::{CompareSlot, NodeParams, NodeType};
use super::snapshot::GraphSnapshot;

#[derive(Default, Serialize, Deserialize)]
pub struct Project {
    pub graph: Graph,
    pub gallery: Gallery,
    /// Selected nodes, most recent last. Cleared by undo/redo.
    pub selection: Vec<NodeId>,

    /// Undo/redo stacks are session state, never persisted.
    #[serde(skip)]
    pub history: UndoHistory,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Undoable structural edits ==========

    pub fn add_node(&mut self, kind: NodeType, pos: (f32, f32)) -> NodeId {
        let snapshot = GraphSnapshot::capture(&self.graph);
        let id = self.graph.add_node(kind, pos);
        self.history.push(snapshot);
        id
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.undoable(|g| g.connect(from, to))
    }

    pub fn disconnect_input(&mut self, to: NodeId) -> Result<bool> {
        let snapshot = GraphSnapshot::capture(&self.graph);
        let removed = self.graph.disconnect_input(to)?;
        if removed {
            self.history.push(snapshot);
        }
        Ok(removed)
    }

    pub fn set_compare_input(
        &mut self,
        id: NodeId,
        slot: CompareSlot,
        source: Option<NodeId>,
    ) -> Result<()> {
        self.undoable(|g| g.set_compare_input(id, slot, source))
    }

    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.undoable(|g| g.delete_node(id).map(|_| ()))?;
        self.selection.retain(|&s| s != id);
        Ok(())
    }

    pub fn duplicate_node(&mut self, id: NodeId) -> Result<NodeId> {
        self.undoable(|g| g.duplicate_node(id))
    }

    pub fn set_params(&mut self, id: NodeId, params: NodeParams) -> Result<()> {
        self.undoable(|g| g.set_params(id, params))
    }

    /// Drag gesture end. Undoable like any structural edit, but it never
    /// dirties anything — position is layout only.
    pub fn move_node(&mut self, id: NodeId, pos: (f32, f32)) {
        if !self.graph.contains(id) {
            return;
        }
        let snapshot = GraphSnapshot::capture(&self.graph);
        self.graph.move_node(id, pos);
        self.history.push(snapshot);
    }

    fn undoable<T>(&mut self, op: impl FnOnce(&mut Graph) -> Result<T>) -> Result<T> {
        let snapshot = GraphSnapshot::capture(&self.graph);
        let result = op(&mut self.graph);
        if result.is_ok() {
            self.history.push(snapshot);
        }
        result
    }

    // ========== Undo / redo ==========

    pub fn undo(&mut self) -> bool {
        let restored = self.history.undo(&mut self.graph);
        if restored {
            self.selection.clear();
        }
        restored
    }

    pub fn redo(&mut self) -> bool {
        let restored = self.history.redo(&mut self.graph);
        if restored {
            self.selection.clear();
        }
        restored
    }

    // ========== Selection ==========

    pub fn select(&mut self, ids: Vec<NodeId>) {
        self.selection = ids.into_iter().filter(|&id| self.graph.contains(id)).collect();
    }

    // ========== Execution ==========

    /// Run the graph and record every freshly produced artifact in the
    /// gallery. The report is the scheduler's, untouched.
    pub fn run(
        &mut self,
        scheduler: &Scheduler,
        ledger: &mut CreditLedger,
        ctx: &RunContext,
    ) -> Result<RunReport> {
        let report = scheduler.execute(&mut self.graph, ledger, ctx)?;
        for &id in &report.completed {
            let Some(node) = self.graph.node(id) else { continue };
            let Some(result) = &node.result else { continue };
            self.gallery.record(GalleryEntry {
                node: id,
                kind: node.kind,
                artifact: result.artifact.clone(),
                produced_at: result.produced_at,
                cache_key: result.cache_key.clone(),
            });
        }
        Ok(report)
    }

    // ========== Persistence ==========

    /// Save as pretty JSON. Appends the `.json` extension when missing.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize project")?;

        let path = path.as_ref();
        let path = if path.extension().and_then(|s| s.to_str()) != Some("json") {
            path.with_extension("json")
        } else {
            path.to_path_buf()
        };
        fs::write(&path, json).with_context(|| format!("write project {}", path.display()))?;
        log::info!("Project saved: {}", path.display());
        Ok(())
    }

    /// Load from JSON and rebuild runtime state: in-flight statuses reset
    /// to idle, undo stacks start empty. Structure (ids, edges, params)
    /// reconstructs exactly; nothing is re-executed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("read project {}", path.display()))?;
        let mut project: Project = serde_json::from_str(&json).context("parse project")?;
        project.rebuild_runtime();
        log::info!(
            "Project loaded: {} ({} nodes)",
            path.display(),
            project.graph.node_count()
        );
        Ok(project)
    }

    /// Reset state that must not survive deserialization.
    pub fn rebuild_runtime(&mut self) {
        self.graph.clear_in_flight();
        self.history.clear();
        self.selection.retain(|&id| self.graph.contains(id));
    }
}
