//! Event bridge between cluster adapters and the owning job.
//!
//! Adapters raise topology fault signals (leader changed, endpoint
//! unreachable). Delivering them synchronously from inside an adapter call
//! would re-enter the job's own call stack, so the bridge turns delivery
//! into a bounded channel: adapters publish without blocking, and the job
//! drains the signal at well-defined checkpoints before retrying.

use crate::adapter::ClusterEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which end of the replication pair raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSide {
    /// The source cluster.
    Source,
    /// The destination cluster.
    Dest,
}

/// An event routed to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgedEvent {
    /// Which adapter raised the event.
    pub side: ClusterSide,
    /// The fault signal.
    pub event: ClusterEvent,
}

/// Publishing half handed to an adapter.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<BridgedEvent>,
    side: ClusterSide,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Publish an event. Never blocks the adapter; if the channel is full
    /// the event is dropped and counted. The signal is level-like, so a
    /// pending one already forces re-resolution.
    pub fn publish(&self, event: ClusterEvent) {
        let bridged = BridgedEvent { side: self.side, event };
        if self.tx.try_send(bridged).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped due to a full channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consuming half owned by the job.
pub struct EventBridge {
    rx: mpsc::Receiver<BridgedEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBridge {
    /// Create a bridge with publishers for both cluster sides.
    pub fn new(capacity: usize) -> (Self, EventPublisher, EventPublisher) {
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let bridge = Self { rx, dropped: dropped.clone() };
        let source = EventPublisher {
            tx: tx.clone(),
            side: ClusterSide::Source,
            dropped: dropped.clone(),
        };
        let dest = EventPublisher { tx, side: ClusterSide::Dest, dropped };
        (bridge, source, dest)
    }

    /// Drain all pending events, returning the sides that need their
    /// adapter target re-resolved. Non-blocking.
    pub fn drain_pending(&mut self) -> Vec<ClusterSide> {
        let mut sides = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            if !sides.contains(&ev.side) {
                sides.push(ev.side);
            }
        }
        sides
    }

    /// Events that were dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_drain() {
        let (mut bridge, source, dest) = EventBridge::new(16);
        source.publish(ClusterEvent::LeaderChanged);
        dest.publish(ClusterEvent::EndpointUnreachable);

        let sides = bridge.drain_pending();
        assert_eq!(sides, vec![ClusterSide::Source, ClusterSide::Dest]);
        assert!(bridge.drain_pending().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_events_collapse_to_one_side() {
        let (mut bridge, source, _dest) = EventBridge::new(16);
        source.publish(ClusterEvent::LeaderChanged);
        source.publish(ClusterEvent::LeaderChanged);
        source.publish(ClusterEvent::EndpointUnreachable);

        let sides = bridge.drain_pending();
        assert_eq!(sides, vec![ClusterSide::Source]);
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (bridge, source, _dest) = EventBridge::new(1);
        source.publish(ClusterEvent::LeaderChanged);
        source.publish(ClusterEvent::LeaderChanged);
        source.publish(ClusterEvent::LeaderChanged);
        assert_eq!(bridge.dropped(), 2);
    }

    #[tokio::test]
    async fn test_publish_from_concurrent_tasks() {
        let (mut bridge, source, dest) = EventBridge::new(64);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = source.clone();
            let d = dest.clone();
            handles.push(tokio::spawn(async move {
                s.publish(ClusterEvent::LeaderChanged);
                d.publish(ClusterEvent::EndpointUnreachable);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let sides = bridge.drain_pending();
        assert!(sides.contains(&ClusterSide::Source));
        assert!(sides.contains(&ClusterSide::Dest));
    }
}
