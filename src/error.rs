//! Typed errors surfaced by the engine.
//!
//! Structural rejections (`CycleRejected`, `InvalidConnection`) and run
//! refusals (`InsufficientCredit`, `RunInProgress`, `NothingToRun`) are
//! returned synchronously and never mutate state. Adapter failures and
//! timeouts are not errors of the run itself; they are recorded per node
//! (status `error`, message in `last_error`) and the run continues on
//! unaffected branches.

use thiserror::Error;

use crate::entities::NodeId;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Connecting `from -> to` would close a directed cycle.
    #[error("connecting {from} -> {to} would create a cycle")]
    CycleRejected { from: NodeId, to: NodeId },

    /// Edge attempted on an output-less, input-less or mismatched port.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    /// Run refused before any node started; no status was touched.
    #[error("insufficient credits: run needs {required}, balance is {available}")]
    InsufficientCredit { required: u32, available: u32 },

    /// Only one run may be active per scheduler.
    #[error("a run is already in progress")]
    RunInProgress,

    /// The graph holds no dirty node; there is nothing to execute.
    #[error("graph is clean, nothing to run")]
    NothingToRun,

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Parameter set of a different type than the node was given.
    #[error("parameter type mismatch for {node}: expected {expected}")]
    ParamsMismatch { node: NodeId, expected: &'static str },
}

pub type Result<T> = std::result::Result<T, EngineError>;
