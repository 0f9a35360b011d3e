//! Telemetry bus: node/run status events for display surfaces.
//!
//! Architecture:
//! - the scheduler emits through a cloneable `TelemetrySender`
//! - emit() invokes subscriber callbacks immediately AND queues the event
//! - poll() returns queued events for batch processing in the host's loop
//!
//! Emission is fire-and-forget and must never block scheduling: the queue is
//! bounded (oldest half evicted when full) and subscribers are expected to
//! be cheap — anything heavy belongs behind poll().

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use log::warn;
use uuid::Uuid;

use crate::config::MAX_EVENT_QUEUE;
use crate::entities::{NodeId, NodeStatus};

/// Everything the engine reports while editing and running.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted { run: Uuid, estimated_cost: u32 },
    RunFinished { run: Uuid, completed: usize, failed: usize },
    LevelStarted { run: Uuid, level: usize, nodes: Vec<NodeId> },
    LevelSettled { run: Uuid, level: usize },
    NodeStatus { node: NodeId, from: NodeStatus, to: NodeStatus },
    /// A node finished successfully; `cached` marks cache hits (never
    /// charged), `charged` the credits deducted otherwise.
    NodeCompleted { node: NodeId, cached: bool, charged: u32 },
    NodeFailed { node: NodeId, message: String },
    CreditsChanged { balance: u32 },
}

type Callback = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// Pub/sub bus with deferred processing support.
#[derive(Clone, Default)]
pub struct TelemetryBus {
    subscribers: Arc<RwLock<Vec<Callback>>>,
    queue: Arc<Mutex<VecDeque<RunEvent>>>,
}

impl TelemetryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a callback invoked inline on every emit. Keep it cheap;
    /// it runs on the scheduler thread.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    pub fn emit(&self, event: RunEvent) {
        emit_inner(&self.subscribers, &self.queue, event);
    }

    /// Drain all queued events since the last poll.
    pub fn poll(&self) -> Vec<RunEvent> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Cloneable emitter handle for the scheduler.
    pub fn sender(&self) -> TelemetrySender {
        TelemetrySender {
            subscribers: Arc::clone(&self.subscribers),
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Lightweight emitter handle; clones share the bus.
#[derive(Clone)]
pub struct TelemetrySender {
    subscribers: Arc<RwLock<Vec<Callback>>>,
    queue: Arc<Mutex<VecDeque<RunEvent>>>,
}

impl TelemetrySender {
    pub fn emit(&self, event: RunEvent) {
        emit_inner(&self.subscribers, &self.queue, event);
    }

    /// A sender wired to nothing; events vanish. For embedders that do not
    /// care about telemetry.
    pub fn disconnected() -> Self {
        TelemetryBus::new().sender()
    }
}

fn emit_inner(
    subscribers: &Arc<RwLock<Vec<Callback>>>,
    queue: &Arc<Mutex<VecDeque<RunEvent>>>,
    event: RunEvent,
) {
    for cb in subscribers.read().unwrap_or_else(|e| e.into_inner()).iter() {
        cb(&event);
    }

    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_EVENT_QUEUE {
        let evict = queue.len() / 2;
        warn!("Telemetry queue full ({} events), evicting oldest {}", queue.len(), evict);
        queue.drain(0..evict);
    }
    queue.push_back(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_queues_for_poll() {
        let bus = TelemetryBus::new();
        bus.emit(RunEvent::CreditsChanged { balance: 10 });
        bus.emit(RunEvent::CreditsChanged { balance: 8 });

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], RunEvent::CreditsChanged { balance: 8 });
        assert!(bus.poll().is_empty());
    }

    #[test]
    fn test_subscribers_fire_immediately() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let sender = bus.sender();
        sender.emit(RunEvent::CreditsChanged { balance: 1 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Also queued.
        assert_eq!(bus.poll().len(), 1);
    }

    #[test]
    fn test_queue_eviction() {
        let bus = TelemetryBus::new();
        for i in 0..(MAX_EVENT_QUEUE + 10) {
            bus.emit(RunEvent::CreditsChanged { balance: i as u32 });
        }
        assert!(bus.queue_len() <= MAX_EVENT_QUEUE);
        // Newest event survived eviction.
        let events = bus.poll();
        assert_eq!(
            events.last(),
            Some(&RunEvent::CreditsChanged { balance: (MAX_EVENT_QUEUE + 9) as u32 })
        );
    }
}
