//! Deterministic in-process backends for tests and the demo binary.
//!
//! `RecordingAdapter` answers instantly (or after a configured delay),
//! fails on request for scripted nodes, and logs every invocation — which
//! is what the scheduler tests assert ordering and cache behavior against.
//! Nothing here talks to a real generation service.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::entities::{
    AdapterRequest, AdapterResponse, AdapterSet, Artifact, Capture, CaptureSource,
    GenerationAdapter, NodeId, NodeParams, SceneMeta,
};

/// Scriptable stub for one backend family.
pub struct RecordingAdapter {
    label: &'static str,
    delay: Mutex<Duration>,
    fail: Mutex<HashSet<NodeId>>,
    own: Mutex<Vec<NodeId>>,
    shared: Arc<Mutex<Vec<NodeId>>>,
}

impl RecordingAdapter {
    fn new(label: &'static str, shared: Arc<Mutex<Vec<NodeId>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            delay: Mutex::new(Duration::ZERO),
            fail: Mutex::new(HashSet::new()),
            own: Mutex::new(Vec::new()),
            shared,
        })
    }

    /// Script `node` to fail (or succeed again) on future invocations.
    pub fn set_fail(&self, node: NodeId, fail: bool) {
        let mut set = self.fail.lock().unwrap_or_else(|e| e.into_inner());
        if fail {
            set.insert(node);
        } else {
            set.remove(&node);
        }
    }

    /// Delay every invocation; used by timeout and cancellation tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn invocation_count(&self) -> usize {
        self.own.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn invocations(&self) -> Vec<NodeId> {
        self.own.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl GenerationAdapter for RecordingAdapter {
    fn generate(&self, req: &AdapterRequest) -> anyhow::Result<AdapterResponse> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.own.lock().unwrap_or_else(|e| e.into_inner()).push(req.node);
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).push(req.node);

        if self.fail.lock().unwrap_or_else(|e| e.into_inner()).contains(&req.node) {
            anyhow::bail!("scripted failure for {}", req.node);
        }

        let locator = format!("stub://{}/{}", self.label, req.node);
        let artifact = match &req.params {
            NodeParams::Video(p) => Artifact::video(locator, p.duration_secs),
            _ => Artifact::image(locator),
        };
        Ok(AdapterResponse { artifact })
    }
}

/// The four stub families plus a shared cross-family invocation log for
/// ordering assertions.
pub struct StubBackends {
    pub render: Arc<RecordingAdapter>,
    pub modify: Arc<RecordingAdapter>,
    pub upscale: Arc<RecordingAdapter>,
    pub video: Arc<RecordingAdapter>,
    order: Arc<Mutex<Vec<NodeId>>>,
}

impl Default for StubBackends {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackends {
    pub fn new() -> Self {
        let order: Arc<Mutex<Vec<NodeId>>> = Arc::new(Mutex::new(Vec::new()));
        Self {
            render: RecordingAdapter::new("render", Arc::clone(&order)),
            modify: RecordingAdapter::new("modify", Arc::clone(&order)),
            upscale: RecordingAdapter::new("upscale", Arc::clone(&order)),
            video: RecordingAdapter::new("video", Arc::clone(&order)),
            order,
        }
    }

    pub fn adapter_set(&self) -> AdapterSet {
        AdapterSet {
            render: self.render.clone(),
            modify: self.modify.clone(),
            upscale: self.upscale.clone(),
            video: self.video.clone(),
        }
    }

    /// Every adapter invocation across all families, in execution order.
    pub fn invocation_order(&self) -> Vec<NodeId> {
        self.order.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn total_invocations(&self) -> usize {
        self.order.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Capture source answering immediately with a fixed payload.
pub struct StaticCapture {
    image: Option<Artifact>,
    meta: SceneMeta,
}

impl StaticCapture {
    /// A capture that always has a snapshot to offer.
    pub fn with_image() -> Arc<Self> {
        Arc::new(Self {
            image: Some(Artifact::image("capture://scene/current")),
            meta: SceneMeta { scene: "demo scene".into(), camera: Some("main".into()), tags: vec![] },
        })
    }

    /// A capture with nothing to offer; the node resolves to a placeholder.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self { image: None, meta: SceneMeta::default() })
    }
}

impl CaptureSource for StaticCapture {
    fn capture(&self) -> anyhow::Result<Capture> {
        Ok(Capture { image: self.image.clone(), meta: self.meta.clone() })
    }
}

/// Capture source that answers only after `delay`; pairs with a short
/// capture deadline to exercise the placeholder fallback.
pub struct SlowCapture {
    delay: Duration,
}

impl SlowCapture {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay })
    }
}

impl CaptureSource for SlowCapture {
    fn capture(&self) -> anyhow::Result<Capture> {
        std::thread::sleep(self.delay);
        Ok(Capture { image: Some(Artifact::image("capture://late")), meta: SceneMeta::default() })
    }
}
