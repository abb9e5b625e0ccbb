// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus for the transport layer.
//!
//! A single broadcast channel carries every [`HearthEvent`]. Each
//! subscriber owns a bounded ring (capacity from `SUBSCRIBER_QUEUE`);
//! a slow subscriber loses the oldest events rather than stalling the
//! producer. Per-server log/status streams come from the server record's
//! own channels, not from here.

use hearth_core::{HearthEvent, ServerId};
use tokio::sync::broadcast;
use tracing::trace;

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HearthEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Delivery is best-effort: no subscribers is not
    /// an error, and lagging subscribers drop their oldest entries.
    pub fn publish(&self, event: HearthEvent) {
        trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<HearthEvent> {
        self.tx.subscribe()
    }

    /// Subscribe filtered to one server. The filter runs on the consumer
    /// side; the producer never blocks on it.
    pub fn subscribe_server(&self, server_id: ServerId) -> ServerEvents {
        ServerEvents { rx: self.tx.subscribe(), server_id }
    }

    /// Number of live subscribers, for shutdown diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A per-server filtered view of the bus.
pub struct ServerEvents {
    rx: broadcast::Receiver<HearthEvent>,
    server_id: ServerId,
}

impl ServerEvents {
    /// Next event for this server. `None` when the bus is gone. Lagged
    /// gaps are skipped silently; the stream resumes at the oldest
    /// retained event.
    pub async fn recv(&mut self) -> Option<HearthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.server_id() == &self.server_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
