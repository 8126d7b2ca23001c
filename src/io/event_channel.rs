//! Typed channel for domain events
//!
//! Domain modules emit events through an `EventSender`; the engine drains
//! the receiving end after every mutation and fans frames out to clients.
//! Uses a bounded mpsc channel to prevent unbounded memory growth.

use crate::domain::events::{
    CustomerEvent, DomainEvent, InventoryEvent, LayoutEvent, SecurityEvent,
};
use tokio::sync::mpsc;

/// Sender handle for domain events
///
/// Clone this to share across domain modules.
/// Non-blocking - if the channel is full, events are dropped (best-effort
/// delivery, matching the fan-out contract).
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<DomainEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<DomainEvent>) -> Self {
        Self { tx }
    }

    pub fn send_security(&self, event: SecurityEvent) {
        // Use try_send to avoid blocking - drop if channel full
        let _ = self.tx.try_send(DomainEvent::Security(event));
    }

    pub fn send_inventory(&self, event: InventoryEvent) {
        let _ = self.tx.try_send(DomainEvent::Inventory(event));
    }

    pub fn send_customer(&self, event: CustomerEvent) {
        let _ = self.tx.try_send(DomainEvent::Customer(event));
    }

    pub fn send_layout(&self, event: LayoutEvent) {
        let _ = self.tx.try_send(DomainEvent::Layout(event));
    }
}

/// Create a new event channel pair
///
/// Returns (sender, receiver) where the sender can be cloned and handed to
/// each domain module. Buffer size determines how many events can be queued
/// between engine drains.
pub fn create_event_channel(buffer_size: usize) -> (EventSender, mpsc::Receiver<DomainEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventSender::new(tx), rx)
}
