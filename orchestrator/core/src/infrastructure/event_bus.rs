// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Kernel Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Observers (tracers, dashboards, tests) subscribe without the kernel
// knowing about them. Events are not persisted.

use crate::domain::events::{BroadcastEvent, ChainEvent, GraphEvent, SubAgentEvent};
use crate::domain::run::RunId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified kernel event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelEvent {
    Chain(ChainEvent),
    Graph(GraphEvent),
    Broadcast(BroadcastEvent),
    SubAgent(SubAgentEvent),
}

impl KernelEvent {
    /// Run this event belongs to, for pipeline and graph events
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::Chain(event) => Some(event.run_id()),
            Self::Graph(event) => Some(event.run_id()),
            Self::Broadcast(_) | Self::SubAgent(_) => None,
        }
    }
}

/// Event bus for publishing and subscribing to kernel events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<KernelEvent>>,
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

    pub fn publish_chain_event(&self, event: ChainEvent) {
        self.publish(KernelEvent::Chain(event));
    }

    pub fn publish_graph_event(&self, event: GraphEvent) {
        self.publish(KernelEvent::Graph(event));
    }

    pub fn publish_broadcast_event(&self, event: BroadcastEvent) {
        self.publish(KernelEvent::Broadcast(event));
    }

    pub fn publish_subagent_event(&self, event: SubAgentEvent) {
        self.publish(KernelEvent::SubAgent(event));
    }

    /// Publish a kernel event to all subscribers. Never blocks; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: KernelEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all kernel events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single pipeline or graph run
    pub fn subscribe_run(&self, run_id: RunId) -> RunEventReceiver {
        RunEventReceiver {
            receiver: self.sender.subscribe(),
            run_id,
        }
    }

    /// Get the number of active subscribers
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

/// Receiver for all kernel events
pub struct EventReceiver {
    receiver: broadcast::Receiver<KernelEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<KernelEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<KernelEvent, EventBusError> {
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

/// Receiver for run-specific events (filtered)
pub struct RunEventReceiver {
    receiver: broadcast::Receiver<KernelEvent>,
    run_id: RunId,
}

impl RunEventReceiver {
    /// Receive the next event for the subscribed run, skipping all others
    pub async fn recv(&mut self) -> Result<KernelEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.run_id() == Some(self.run_id) {
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
