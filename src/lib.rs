//! FABRIKA - node-graph pipeline engine for generative image/video workflows
//!
//! A host application puts typed processing nodes (capture, synthesize,
//! edit, upscale, animate, compare) on a canvas, wires them into a DAG and
//! asks the engine to run it. The engine handles what the host should not
//! have to: dependency-level scheduling with in-level parallelism,
//! content-hash memoization of unchanged work, failure containment per
//! branch, credit metering, and undo/redo over the live graph.
//!
//! Generation backends and scene capture stay behind the traits in
//! [`entities::traits`]; the engine never learns a provider protocol.

// Engine (scheduler, workers, credits, undo, gallery, telemetry)
pub mod core;

// Data model (graph, nodes, params, artifacts, snapshots, adapter seams)
pub mod entities;

// App modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod test_support;

// Re-export commonly used types from core
pub use crate::core::credits::CreditLedger;
pub use crate::core::event_bus::{RunEvent, TelemetryBus, TelemetrySender};
pub use crate::core::gallery::{Gallery, GalleryEntry};
pub use crate::core::scheduler::{CancelHandle, RunContext, RunReport, Scheduler, Timeouts};
pub use crate::core::undo::UndoHistory;

// Re-export entities
pub use crate::entities::{
    AdapterSet, Artifact, ArtifactKind, CacheKey, Graph, Node, NodeId, NodeParams, NodeStatus,
    NodeType, Project,
};
pub use crate::error::EngineError;
