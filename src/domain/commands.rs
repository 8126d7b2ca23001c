//! Inbound command envelopes
//!
//! Clients send JSON frames with a `type` discriminator selecting a command
//! family and a `command` discriminator selecting the operation. Field names
//! on the wire are camelCase.

use crate::domain::types::Position;
use serde::Deserialize;

/// Product registration payload for `add_product`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    #[serde(default)]
    pub name: Option<String>,
    pub initial_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub zone: String,
    pub reorder_point: i64,
}

/// Placement request payload for `add_object`
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectSpec {
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub position: Position,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InventoryCommand {
    AddProduct { product_id: String, product_data: ProductData },
    UpdateStock {
        product_id: String,
        quantity: i64,
        #[serde(default)]
        cause: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CustomerCommand {
    CreateCustomer,
    MoveCustomer { customer_id: String, new_zone: String },
    RemoveCustomer { customer_id: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LayoutCommand {
    AddObject { zone_id: String, object: ObjectSpec },
    ValidateZone { zone_id: String },
    OptimizeZone { zone_id: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SecurityCommand {
    AcknowledgeAlert { alert_id: String },
}
