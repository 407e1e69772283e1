//! Best-effort fan-out of order, payment and catalog changes to WebSocket clients.
//!
//! Events are serialized once and pushed through a `tokio::sync::broadcast`
//! channel. Nothing is persisted: a client that is not connected when an event
//! is emitted never sees it, and a client that falls behind the channel
//! capacity silently skips the events it missed.

pub mod client;
pub mod ws;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    dto::orders::OrderWithItems,
    models::Product,
    status::{OrderStatus, PaymentStatus},
};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderStatusChange {
    pub id: Uuid,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentStatusChange {
    pub order_id: Uuid,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CatalogAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductChange {
    pub action: CatalogAction,
    pub id: Uuid,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "newOrder")]
    NewOrder(OrderWithItems),
    #[serde(rename = "orderStatusUpdated")]
    OrderStatusUpdated(OrderStatusChange),
    #[serde(rename = "paymentUpdated")]
    PaymentUpdated(PaymentStatusChange),
    #[serde(rename = "productsUpdate")]
    ProductsUpdate(ProductChange),
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::NewOrder(_) => "newOrder",
            RealtimeEvent::OrderStatusUpdated(_) => "orderStatusUpdated",
            RealtimeEvent::PaymentUpdated(_) => "paymentUpdated",
            RealtimeEvent::ProductsUpdate(_) => "productsUpdate",
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<String>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `event` to every connected client. Never fails: having no
    /// listeners is the normal state of a freshly started server.
    pub fn emit(&self, event: RealtimeEvent) {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(
                    event = event.name(),
                    error = %err,
                    "failed to encode realtime event"
                );
                return;
            }
        };
        let delivered = self.tx.send(frame).unwrap_or(0);
        tracing::debug!(event = event.name(), delivered, "realtime event emitted");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
