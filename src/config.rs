//! Engine-wide constants and tunables.
//!
//! Everything here is a compile-time default; the runner binary can override
//! worker count and credit balance from the command line, and embedders can
//! override timeouts per run via `Timeouts` in the scheduler.

use std::time::Duration;

/// Deadline for image-producing adapter calls (Renderer, Modifier, Upscale).
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for video-producing adapter calls.
pub const VIDEO_TIMEOUT: Duration = Duration::from_secs(180);

/// Deadline for the host scene capture. Expiry resolves the Source node with
/// a placeholder artifact instead of failing the branch.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum undo snapshots retained; oldest entries are evicted beyond this.
pub const MAX_UNDO_DEPTH: usize = 50;

/// Maximum artifacts retained in the gallery ring.
pub const MAX_GALLERY_SIZE: usize = 200;

/// Maximum telemetry events queued before oldest are evicted.
pub const MAX_EVENT_QUEUE: usize = 1000;

/// Credit balance used when no external authority has set one.
pub const DEFAULT_CREDITS: u32 = 100;

// Per-type execution costs, charged on real success only.
pub const COST_SOURCE: u32 = 1;
pub const COST_RENDER: u32 = 2;
pub const COST_MODIFY: u32 = 2;
pub const COST_UPSCALE_STANDARD: u32 = 2;
pub const COST_UPSCALE_HEAVY: u32 = 4;
pub const COST_VIDEO_SHORT: u32 = 10;
pub const COST_VIDEO_LONG: u32 = 20;
pub const COST_COMPARE: u32 = 0;

/// Upscale factors above this use the heavy cost tier.
pub const UPSCALE_HEAVY_FACTOR: f32 = 2.0;

/// Video durations above this (seconds) use the long cost tier.
pub const VIDEO_LONG_SECS: f32 = 5.0;

/// Default worker thread count: leave headroom for the host UI thread.
pub fn default_worker_threads() -> usize {
    (num_cpus::get() * 3 / 4).max(2)
}
