//! In-process change notification bus.
//!
//! One bounded channel per connected SSE session. Publishing is synchronous
//! best-effort: `try_send` never blocks a mutation, and a channel that is
//! full or closed is pruned on the spot. Delivery is at-most-once; clients
//! treat `agent_update` as an invalidation hint and re-fetch.

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Channel capacity per subscriber. A session that falls this far behind is
/// dropped rather than backpressuring mutations.
const SESSION_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentUpdate {
        #[serde(rename = "agentId")]
        agent_id: i64,
        #[serde(rename = "occurredAt")]
        occurred_at: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn agent_update(agent_id: i64) -> Self {
        Self::AgentUpdate {
            agent_id,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct EventBus {
    sessions: Mutex<Vec<mpsc::Sender<AgentEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session channel; the receiver feeds one SSE stream.
    pub fn subscribe(&self) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let mut sessions = self.lock();
        sessions.push(tx);
        debug!("sse session subscribed, {} connected", sessions.len());
        rx
    }

    /// Fan-out to every live session. Returns the delivery count; zero
    /// subscribers is a normal no-op.
    pub fn publish(&self, event: AgentEvent) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        let mut delivered = 0;
        sessions.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!("pruned {} stale sse sessions", pruned);
        }
        trace!("published {:?} to {} sessions", event, delivered);
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<AgentEvent>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_util::setup;

    #[tokio::test]
    async fn publish_with_zero_subscribers_is_a_no_op() {
        setup();
        let bus = EventBus::new();
        assert_eq!(bus.publish(AgentEvent::agent_update(1)), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        setup();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(AgentEvent::agent_update(1)), 1);
        assert_eq!(bus.publish(AgentEvent::agent_update(2)), 1);

        let AgentEvent::AgentUpdate { agent_id, .. } = rx.recv().await.unwrap();
        assert_eq!(agent_id, 1);
        let AgentEvent::AgentUpdate { agent_id, .. } = rx.recv().await.unwrap();
        assert_eq!(agent_id, 2);
    }

    #[tokio::test]
    async fn closed_sessions_are_pruned_on_publish() {
        setup();
        let bus = EventBus::new();
        let rx_keep = bus.subscribe();
        let rx_drop = bus.subscribe();
        drop(rx_drop);
        assert_eq!(bus.session_count(), 2);

        assert_eq!(bus.publish(AgentEvent::agent_update(7)), 1);
        assert_eq!(bus.session_count(), 1);
        drop(rx_keep);
    }

    #[tokio::test]
    async fn a_stalled_session_is_dropped_without_blocking() {
        setup();
        let bus = EventBus::new();
        let _rx = bus.subscribe();

        // fill the session channel, then overflow it
        for n in 0..SESSION_CHANNEL_CAPACITY as i64 {
            assert_eq!(bus.publish(AgentEvent::agent_update(n)), 1);
        }
        assert_eq!(bus.publish(AgentEvent::agent_update(99)), 0);
        assert_eq!(bus.session_count(), 0);
    }

    #[test]
    fn event_payload_shape() {
        setup();
        let json = serde_json::to_value(AgentEvent::agent_update(42)).unwrap();
        assert_eq!(json["type"], "agent_update");
        assert_eq!(json["agentId"], 42);
        assert!(json["occurredAt"].is_string());
    }
}
