//! Abstract interfaces to the host environment.
//!
//! The engine never talks to a generation backend or the host application
//! directly; it goes through these traits. Implementations live with the
//! embedder (or in `test_support` for the demo binary and tests), which
//! keeps the scheduler free of transport and provider details.
//!
//! Adapter calls are blocking by design: the scheduler dispatches them onto
//! the worker pool and collects outcomes with per-node deadlines, so a slow
//! backend stalls one node, never the engine.

use std::sync::Arc;

use super::artifact::{Artifact, Capture};
use super::node::NodeId;
use super::params::{NodeParams, NodeType};

/// What an adapter gets: the node's typed parameters plus the resolved
/// upstream artifact reference (absent for Renderer nodes fed by nothing).
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub node: NodeId,
    pub params: NodeParams,
    pub input: Option<Arc<Artifact>>,
}

#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub artifact: Artifact,
}

/// One generation backend family (render, modify, upscale, video).
pub trait GenerationAdapter: Send + Sync {
    fn generate(&self, req: &AdapterRequest) -> anyhow::Result<AdapterResponse>;
}

/// Host-side scene capture. May legitimately return no image; the scheduler
/// also applies its own capture deadline and substitutes a placeholder
/// rather than letting a silent host hang the run.
pub trait CaptureSource: Send + Sync {
    fn capture(&self) -> anyhow::Result<Capture>;
}

/// The four backend families a run needs, bundled for the `RunContext`.
#[derive(Clone)]
pub struct AdapterSet {
    pub render: Arc<dyn GenerationAdapter>,
    pub modify: Arc<dyn GenerationAdapter>,
    pub upscale: Arc<dyn GenerationAdapter>,
    pub video: Arc<dyn GenerationAdapter>,
}

impl AdapterSet {
    /// Adapter for an externally-executed node type. Source captures from
    /// the host and Compare composes locally, so neither has one.
    pub fn for_kind(&self, kind: NodeType) -> Option<&Arc<dyn GenerationAdapter>> {
        match kind {
            NodeType::Renderer => Some(&self.render),
            NodeType::Modifier => Some(&self.modify),
            NodeType::Upscale => Some(&self.upscale),
            NodeType::Video => Some(&self.video),
            NodeType::Source | NodeType::Compare => None,
        }
    }
}

impl<T: GenerationAdapter + ?Sized> GenerationAdapter for Arc<T> {
    fn generate(&self, req: &AdapterRequest) -> anyhow::Result<AdapterResponse> {
        (**self).generate(req)
    }
}

impl<T: CaptureSource + ?Sized> CaptureSource for Arc<T> {
    fn capture(&self) -> anyhow::Result<Capture> {
        (**self).capture()
    }
}
