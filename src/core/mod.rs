//! Core engine modules - scheduler, workers, credits, undo, gallery, telemetry.
//!
//! Everything here operates on the `entities` data model; nothing here knows
//! about a concrete backend or a UI.

pub mod credits;
pub mod event_bus;
pub mod gallery;
pub mod scheduler;
pub mod undo;
pub mod workers;

// Re-exports for convenience
pub use credits::CreditLedger;
pub use event_bus::{RunEvent, TelemetryBus, TelemetrySender};
pub use gallery::{Gallery, GalleryEntry};
pub use scheduler::{CancelHandle, RunContext, RunReport, Scheduler, Timeouts};
pub use undo::UndoHistory;
pub use workers::Workers;
