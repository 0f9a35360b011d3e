//! Entities: the pipeline data model.
//!
//! Pure, synchronous state — nodes, the graph and its invariants, cache
//! keys, artifacts, snapshots — plus the trait seams (`traits`) through
//! which the engine reaches generation backends and the host. Execution
//! machinery lives in `core`.

pub mod artifact;
pub mod cache_key;
pub mod graph;
pub mod node;
pub mod params;
pub mod project;
pub mod snapshot;
pub mod traits;

pub use artifact::{Artifact, ArtifactKind, Capture, SceneMeta};
pub use cache_key::{CacheKey, KeyEngine, compute_cache_key, should_skip};
pub use graph::{Edge, Graph, ViewState};
pub use node::{Node, NodeId, NodeResult, NodeStatus};
pub use params::{
    CompareMode, CompareParams, CompareSlot, Mask, ModifyParams, NodeParams, NodeType,
    RenderParams, SourceParams, UpscaleParams, VideoParams,
};
pub use project::Project;
pub use snapshot::GraphSnapshot;
pub use traits::{AdapterRequest, AdapterResponse, AdapterSet, CaptureSource, GenerationAdapter};
