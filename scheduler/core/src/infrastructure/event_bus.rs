// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Claim Events
//
// In-memory event streaming using tokio broadcast channels. Lets the CLI,
// audit sinks and tests observe claim outcomes without coupling them to the
// coordinator. Events are lost on restart; the store is the source of truth.

use crate::domain::activity::ActivityId;
use crate::domain::events::ClaimEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Claim(ClaimEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_claim_event(&self, event: ClaimEvent) {
        self.publish(DomainEvent::Claim(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe to claim events for a single activity
    pub fn subscribe_activity(&self, activity_id: ActivityId) -> ActivityEventReceiver {
        let receiver = self.sender.subscribe();
        ActivityEventReceiver {
            receiver,
            activity_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one activity
pub struct ActivityEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    activity_id: ActivityId,
}

impl ActivityEventReceiver {
    /// Receive the next claim event for the subscribed activity, skipping
    /// events for every other activity
    pub async fn recv(&mut self) -> Result<ClaimEvent, EventBusError> {
        loop {
            let DomainEvent::Claim(event) = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.activity_id() == self.activity_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::claim::ClaimStatus;
    use chrono::Utc;

    fn claimed(activity_id: ActivityId) -> ClaimEvent {
        ClaimEvent::SlotClaimed {
            activity_id,
            agent_id: AgentId::new(),
            remaining_slots: 4,
            claimed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let activity_id = ActivityId::new();

        event_bus.publish_claim_event(claimed(activity_id));

        match receiver.recv().await.unwrap() {
            DomainEvent::Claim(ClaimEvent::SlotClaimed { activity_id: id, remaining_slots, .. }) => {
                assert_eq!(id, activity_id);
                assert_eq!(remaining_slots, 4);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activity_event_filtering() {
        let event_bus = EventBus::new(10);
        let activity_id = ActivityId::new();
        let mut receiver = event_bus.subscribe_activity(activity_id);

        event_bus.publish_claim_event(claimed(ActivityId::new()));
        event_bus.publish_claim_event(ClaimEvent::ClaimRejected {
            activity_id,
            agent_id: AgentId::new(),
            status: ClaimStatus::FullyBooked,
            rejected_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            ClaimEvent::ClaimRejected { activity_id: id, status, .. } => {
                assert_eq!(id, activity_id);
                assert_eq!(status, ClaimStatus::FullyBooked);
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_claim_event(claimed(ActivityId::new()));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let event_bus = EventBus::default();
        event_bus.publish_claim_event(claimed(ActivityId::new()));
        assert_eq!(event_bus.subscriber_count(), 0);
    }
}
