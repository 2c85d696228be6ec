// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Lifecycle Events
//
// In-memory event streaming over tokio broadcast channels. Member events
// enter the bus through `EventBusInterceptor`; assembly events are published
// by the assembly engine.
//
// Events are not persisted: a subscriber only sees what is published after it
// subscribed, and a slow subscriber may lag and lose events.

use crate::domain::events::{AssemblyId, AssemblyLifecycleEvent, MemberLifecycleEvent};
use crate::domain::lifecycle::LifecycleInterceptor;
use crate::domain::member::Member;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Member(MemberLifecycleEvent),
    Assembly(AssemblyLifecycleEvent),
}

impl DomainEvent {
    pub fn assembly_id(&self) -> AssemblyId {
        match self {
            Self::Member(event) => event.assembly_id(),
            Self::Assembly(event) => event.assembly_id(),
        }
    }
}

/// Event bus for publishing and subscribing to lifecycle events
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

    pub fn publish_member_event(&self, event: MemberLifecycleEvent) {
        self.publish(DomainEvent::Member(event));
    }

    pub fn publish_assembly_event(&self, event: AssemblyLifecycleEvent) {
        self.publish(DomainEvent::Assembly(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is listening
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all lifecycle events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single assembly
    pub fn subscribe_assembly(&self, assembly_id: AssemblyId) -> AssemblyEventReceiver {
        AssemblyEventReceiver {
            receiver: self.sender.subscribe(),
            assembly_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
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

/// Receiver for all lifecycle events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
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

/// Receiver for the assembly and member events of one assembly (filtered)
pub struct AssemblyEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    assembly_id: AssemblyId,
}

impl AssemblyEventReceiver {
    /// Receive the next event for the assembly, skipping everything else
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.assembly_id() == self.assembly_id {
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

/// Bridges member lifecycle notifications onto an [`EventBus`], tagged with
/// the assembly the members belong to.
pub struct EventBusInterceptor {
    bus: EventBus,
    assembly_id: AssemblyId,
}

impl EventBusInterceptor {
    pub fn new(bus: EventBus, assembly_id: AssemblyId) -> Self {
        Self { bus, assembly_id }
    }
}

#[async_trait]
impl LifecycleInterceptor for EventBusInterceptor {
    fn name(&self) -> &str {
        "event-bus"
    }

    async fn on_realized(&self, member: &Member) -> anyhow::Result<()> {
        self.bus.publish_member_event(MemberLifecycleEvent::MemberRealized {
            assembly_id: self.assembly_id,
            member_id: member.id(),
            member: member.name().to_string(),
            ordinal: member.ordinal(),
            pid: member.pid(),
            realized_at: member.realized_at(),
        });
        Ok(())
    }

    async fn on_closing(&self, member: &Member) -> anyhow::Result<()> {
        self.bus.publish_member_event(MemberLifecycleEvent::MemberClosing {
            assembly_id: self.assembly_id,
            member_id: member.id(),
            member: member.name().to_string(),
            closing_at: Utc::now(),
        });
        Ok(())
    }

    async fn on_closed(&self, member: &Member) -> anyhow::Result<()> {
        self.bus.publish_member_event(MemberLifecycleEvent::MemberClosed {
            assembly_id: self.assembly_id,
            member_id: member.id(),
            member: member.name().to_string(),
            closed_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let assembly_id = AssemblyId::new();
        event_bus.publish_assembly_event(AssemblyLifecycleEvent::AssemblyBuilding {
            assembly_id,
            members: 3,
            started_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Assembly(AssemblyLifecycleEvent::AssemblyBuilding { assembly_id: id, members, .. }) => {
                assert_eq!(id, assembly_id);
                assert_eq!(members, 3);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_assembly_event_filtering() {
        let event_bus = EventBus::new(10);
        let assembly_id = AssemblyId::new();
        let mut receiver = event_bus.subscribe_assembly(assembly_id);

        // Other assembly, filtered out
        event_bus.publish_assembly_event(AssemblyLifecycleEvent::AssemblyClosed {
            assembly_id: AssemblyId::new(),
            closed_at: Utc::now(),
        });
        event_bus.publish_member_event(MemberLifecycleEvent::MemberClosed {
            assembly_id: AssemblyId::new(),
            member_id: crate::domain::member::MemberId::new(),
            member: "server-1".to_string(),
            closed_at: Utc::now(),
        });
        event_bus.publish_member_event(MemberLifecycleEvent::MemberClosed {
            assembly_id,
            member_id: crate::domain::member::MemberId::new(),
            member: "server-2".to_string(),
            closed_at: Utc::now(),
        });
        event_bus.publish_assembly_event(AssemblyLifecycleEvent::AssemblyClosed {
            assembly_id,
            closed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Member(event) => {
                assert_eq!(event.member(), "server-2");
                assert_eq!(event.assembly_id(), assembly_id);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
        match receiver.recv().await.unwrap() {
            DomainEvent::Assembly(event) => assert_eq!(event.assembly_id(), assembly_id),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_assembly_event(AssemblyLifecycleEvent::AssemblyFailed {
            assembly_id: AssemblyId::new(),
            reason: "member failed".to_string(),
            failed_at: Utc::now(),
        });

        // Both receivers should get the event
        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_domain_event_serializes_with_type_tag() {
        let event = DomainEvent::Assembly(AssemblyLifecycleEvent::AssemblyClosed {
            assembly_id: AssemblyId::new(),
            closed_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "assembly");
    }
}
