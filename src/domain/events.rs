//! Typed domain events
//!
//! Replaces the string-keyed emitter pattern of the original system with
//! one tagged union per domain. Events travel through a bounded channel
//! the engine drains after every mutation, so fan-out order always equals
//! emission order.

use crate::domain::types::{Alert, LayoutObject};
use serde::Serialize;
use serde_json::Value;

/// Payload for a motion detection in a zone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionDetectedPayload {
    pub zone: String,
    pub timestamp: u64,
    pub camera: String,
    pub sensor: String,
}

/// Payload for a stock level change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdatedPayload {
    pub product_id: String,
    pub old_stock: i64,
    pub new_stock: i64,
    pub change: i64,
    pub cause: String,
}

/// Payload emitted when stock falls to or below the reorder point
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderNeededPayload {
    pub product_id: String,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub suggested_order: i64,
}

/// Payload for a usage-trend prediction.
///
/// Only emitted when the trailing window yields a non-zero daily usage, so
/// `days_until_reorder` is always a finite number.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPredictionPayload {
    pub product_id: String,
    pub current_stock: i64,
    pub avg_daily_usage: f64,
    pub days_until_reorder: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEnteredPayload {
    pub customer_id: String,
    pub pattern: String,
    pub entry_time: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMovedPayload {
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_zone: Option<String>,
    pub to_zone: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInteractionPayload {
    pub customer_id: String,
    pub zone: String,
    pub timestamp: u64,
    pub interaction_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPurchasePayload {
    pub customer_id: String,
    pub zone: String,
    pub timestamp: u64,
    pub purchase_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLeftPayload {
    pub customer_id: String,
    pub time_in_store_ms: u64,
    pub visited_zones: Vec<String>,
    pub interactions: u32,
    pub purchases: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAddedPayload {
    pub zone_id: String,
    pub object_id: String,
    pub object: LayoutObject,
}

/// Security domain events
#[derive(Debug, Clone)]
pub enum SecurityEvent {
    MotionDetected(MotionDetectedPayload),
    NewAlert(Alert),
    AlertUpdated(Alert),
}

/// Inventory domain events
#[derive(Debug, Clone)]
pub enum InventoryEvent {
    StockUpdated(StockUpdatedPayload),
    ReorderNeeded(ReorderNeededPayload),
    StockPrediction(StockPredictionPayload),
}

/// Customer domain events
#[derive(Debug, Clone)]
pub enum CustomerEvent {
    Entered(CustomerEnteredPayload),
    Moved(CustomerMovedPayload),
    Interaction(CustomerInteractionPayload),
    Purchase(CustomerPurchasePayload),
    Left(CustomerLeftPayload),
}

/// Layout domain events
#[derive(Debug, Clone)]
pub enum LayoutEvent {
    ObjectAdded(ObjectAddedPayload),
}

/// Any event emitted by a domain module
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Security(SecurityEvent),
    Inventory(InventoryEvent),
    Customer(CustomerEvent),
    Layout(LayoutEvent),
}

impl DomainEvent {
    /// Envelope `type` discriminator on the wire
    pub fn frame_type(&self) -> &'static str {
        match self {
            DomainEvent::Security(_) => "security_event",
            DomainEvent::Inventory(_) => "inventory_event",
            DomainEvent::Customer(_) => "customer_event",
            DomainEvent::Layout(_) => "layout_event",
        }
    }

    /// Envelope `event` name on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::Security(e) => match e {
                SecurityEvent::MotionDetected(_) => "motion_detected",
                SecurityEvent::NewAlert(_) => "new_alert",
                SecurityEvent::AlertUpdated(_) => "alert_updated",
            },
            DomainEvent::Inventory(e) => match e {
                InventoryEvent::StockUpdated(_) => "stock_updated",
                InventoryEvent::ReorderNeeded(_) => "reorder_needed",
                InventoryEvent::StockPrediction(_) => "stock_prediction",
            },
            DomainEvent::Customer(e) => match e {
                CustomerEvent::Entered(_) => "customer_entered",
                CustomerEvent::Moved(_) => "customer_moved",
                CustomerEvent::Interaction(_) => "customer_interaction",
                CustomerEvent::Purchase(_) => "customer_purchase",
                CustomerEvent::Left(_) => "customer_left",
            },
            DomainEvent::Layout(e) => match e {
                LayoutEvent::ObjectAdded(_) => "object_added",
            },
        }
    }

    /// Serialized `data` payload of the envelope
    pub fn data(&self) -> Value {
        let result = match self {
            DomainEvent::Security(e) => match e {
                SecurityEvent::MotionDetected(p) => serde_json::to_value(p),
                SecurityEvent::NewAlert(a) => serde_json::to_value(a),
                SecurityEvent::AlertUpdated(a) => serde_json::to_value(a),
            },
            DomainEvent::Inventory(e) => match e {
                InventoryEvent::StockUpdated(p) => serde_json::to_value(p),
                InventoryEvent::ReorderNeeded(p) => serde_json::to_value(p),
                InventoryEvent::StockPrediction(p) => serde_json::to_value(p),
            },
            DomainEvent::Customer(e) => match e {
                CustomerEvent::Entered(p) => serde_json::to_value(p),
                CustomerEvent::Moved(p) => serde_json::to_value(p),
                CustomerEvent::Interaction(p) => serde_json::to_value(p),
                CustomerEvent::Purchase(p) => serde_json::to_value(p),
                CustomerEvent::Left(p) => serde_json::to_value(p),
            },
            DomainEvent::Layout(e) => match e {
                LayoutEvent::ObjectAdded(p) => serde_json::to_value(p),
            },
        };
        result.unwrap_or(Value::Null)
    }
}
