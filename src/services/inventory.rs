//! Per-product stock ledger, thresholds, and usage-trend prediction
//!
//! Stock never goes negative: updates clamp at zero and the clamp absorbs
//! any overdraw (rejecting oversized decrements belongs to the REST
//! validation layer, not here). Every update appends to an append-only
//! history used by the trailing-window usage prediction.

use crate::domain::commands::ProductData;
use crate::domain::events::{
    InventoryEvent, ReorderNeededPayload, StockPredictionPayload, StockUpdatedPayload,
};
use crate::domain::types::{StockHistoryEntry, StockRecord};
use crate::io::event_channel::EventSender;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Trailing history entries considered by the usage prediction
const PREDICTION_WINDOW: usize = 30;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

pub struct InventorySystem {
    products: HashMap<String, StockRecord>,
    /// Append-only per-product history, insertion order = product order
    history: HashMap<String, Vec<StockHistoryEntry>>,
    /// Product ids in registration order, for stable iteration
    product_order: Vec<String>,
    events: EventSender,
}

impl InventorySystem {
    pub fn new(events: EventSender) -> Self {
        Self {
            products: HashMap::new(),
            history: HashMap::new(),
            product_order: Vec::new(),
            events,
        }
    }

    /// Register a product and seed its history with one `initial` entry.
    ///
    /// Re-registering an existing id replaces the record and restarts its
    /// history.
    pub fn add_product(&mut self, product_id: &str, data: ProductData, ts: u64) {
        let record = StockRecord {
            id: product_id.to_string(),
            name: data.name,
            current_stock: data.initial_stock,
            min_stock: data.min_stock,
            max_stock: data.max_stock,
            reorder_point: data.reorder_point,
            zone: data.zone,
            last_updated: ts,
        };

        info!(product_id = %product_id, stock = %record.current_stock, zone = %record.zone, "product_registered");

        if !self.products.contains_key(product_id) {
            self.product_order.push(product_id.to_string());
        }
        self.history.insert(
            product_id.to_string(),
            vec![StockHistoryEntry {
                ts,
                stock: record.current_stock,
                delta: 0,
                cause: "initial".to_string(),
            }],
        );
        self.products.insert(product_id.to_string(), record);
    }

    /// Apply a stock delta, clamped so the result never goes below zero.
    ///
    /// Emits `stock_updated`, then `reorder_needed` when the new level is at
    /// or below the reorder point. Returns the new stock level, or `None`
    /// for an unknown product id (explicit no-op).
    pub fn update_stock(
        &mut self,
        product_id: &str,
        delta: i64,
        cause: &str,
        ts: u64,
    ) -> Option<i64> {
        let product = self.products.get_mut(product_id)?;

        let old_stock = product.current_stock;
        product.current_stock = (old_stock + delta).max(0);
        product.last_updated = ts;
        let new_stock = product.current_stock;
        let reorder_point = product.reorder_point;
        let max_stock = product.max_stock;

        self.history.entry(product_id.to_string()).or_default().push(StockHistoryEntry {
            ts,
            stock: new_stock,
            delta,
            cause: cause.to_string(),
        });

        debug!(product_id = %product_id, old = %old_stock, new = %new_stock, cause = %cause, "stock_updated");

        self.events.send_inventory(InventoryEvent::StockUpdated(StockUpdatedPayload {
            product_id: product_id.to_string(),
            old_stock,
            new_stock,
            change: delta,
            cause: cause.to_string(),
        }));

        if new_stock <= reorder_point {
            self.events.send_inventory(InventoryEvent::ReorderNeeded(ReorderNeededPayload {
                product_id: product_id.to_string(),
                current_stock: new_stock,
                reorder_point,
                suggested_order: max_stock - new_stock,
            }));
        }

        Some(new_stock)
    }

    /// Emit a usage prediction for every product with a usable history.
    ///
    /// Average daily usage counts only consumption (stock decreases) over
    /// the trailing window. Products whose window spans zero time, has
    /// fewer than two entries, or shows no consumption emit nothing - a
    /// days-until-reorder figure is meaningless without usage.
    pub fn predict_stock_needs(&mut self) {
        for product_id in &self.product_order {
            let Some(product) = self.products.get(product_id) else { continue };
            let Some(history) = self.history.get(product_id) else { continue };

            let window_start = history.len().saturating_sub(PREDICTION_WINDOW);
            let window = &history[window_start..];

            let Some(avg_daily_usage) = average_daily_usage(window) else { continue };
            if avg_daily_usage == 0.0 {
                continue;
            }

            let days_until_reorder =
                ((product.current_stock - product.reorder_point) as f64 / avg_daily_usage).floor()
                    as i64;

            self.events.send_inventory(InventoryEvent::StockPrediction(StockPredictionPayload {
                product_id: product_id.clone(),
                current_stock: product.current_stock,
                avg_daily_usage,
                days_until_reorder,
            }));
        }
    }

    pub fn product(&self, product_id: &str) -> Option<&StockRecord> {
        self.products.get(product_id)
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    #[cfg(test)]
    pub fn history_len(&self, product_id: &str) -> usize {
        self.history.get(product_id).map(Vec::len).unwrap_or(0)
    }

    /// Products plus their current usage estimate for the status snapshot
    pub fn snapshot(&self) -> Value {
        let products: serde_json::Map<String, Value> = self
            .product_order
            .iter()
            .filter_map(|id| self.products.get(id))
            .map(|p| (p.id.clone(), serde_json::to_value(p).unwrap_or(Value::Null)))
            .collect();

        let predictions: Vec<Value> = self
            .product_order
            .iter()
            .map(|id| {
                let usage = self
                    .history
                    .get(id)
                    .and_then(|h| {
                        let start = h.len().saturating_sub(PREDICTION_WINDOW);
                        average_daily_usage(&h[start..])
                    })
                    .unwrap_or(0.0);
                json!({ "productId": id, "avgDailyUsage": usage })
            })
            .collect();

        json!({
            "products": products,
            "predictions": predictions,
        })
    }
}

/// Average daily consumption over a history window.
///
/// Only decreases count as usage; restocking is ignored. Returns `None`
/// when the window is too short or spans zero time.
fn average_daily_usage(window: &[StockHistoryEntry]) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }

    let span_ms = window[window.len() - 1].ts.saturating_sub(window[0].ts);
    if span_ms == 0 {
        return None;
    }

    let consumed: i64 = window
        .windows(2)
        .map(|pair| (pair[0].stock - pair[1].stock).max(0))
        .sum();

    Some(consumed as f64 / (span_ms as f64 / MS_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;
    use crate::io::event_channel::create_event_channel;
    use tokio::sync::mpsc;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn test_system() -> (InventorySystem, mpsc::Receiver<DomainEvent>) {
        let (sender, rx) = create_event_channel(256);
        (InventorySystem::new(sender), rx)
    }

    fn product_data(initial: i64) -> ProductData {
        ProductData {
            name: Some("Widget".into()),
            initial_stock: initial,
            min_stock: 10,
            max_stock: 100,
            zone: "A1".into(),
            reorder_point: 20,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<DomainEvent>) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn test_add_product_seeds_initial_history() {
        let (mut inventory, _rx) = test_system();

        inventory.add_product("P1", product_data(50), 1000);

        let record = inventory.product("P1").unwrap();
        assert_eq!(record.current_stock, 50);
        assert_eq!(record.reorder_point, 20);
        assert_eq!(inventory.history_len("P1"), 1);
    }

    #[test]
    fn test_sale_hits_reorder_point() {
        // Scenario: 50 - 35 => 15, stock_updated {old:50,new:15},
        // reorder_needed {suggestedOrder:85}
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(50), 1000);

        let new_stock = inventory.update_stock("P1", -35, "sale", 2000).unwrap();
        assert_eq!(new_stock, 15);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);

        match &events[0] {
            DomainEvent::Inventory(InventoryEvent::StockUpdated(p)) => {
                assert_eq!(p.old_stock, 50);
                assert_eq!(p.new_stock, 15);
                assert_eq!(p.change, -35);
                assert_eq!(p.cause, "sale");
            }
            other => panic!("expected stock_updated, got {other:?}"),
        }
        match &events[1] {
            DomainEvent::Inventory(InventoryEvent::ReorderNeeded(p)) => {
                assert_eq!(p.current_stock, 15);
                assert_eq!(p.reorder_point, 20);
                assert_eq!(p.suggested_order, 85);
            }
            other => panic!("expected reorder_needed, got {other:?}"),
        }
    }

    #[test]
    fn test_no_reorder_above_threshold() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(50), 1000);

        inventory.update_stock("P1", -29, "sale", 2000); // 21 > 20
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name(), "stock_updated");

        inventory.update_stock("P1", -1, "sale", 3000); // exactly 20
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_name(), "reorder_needed");
    }

    #[test]
    fn test_stock_clamps_at_zero() {
        let (mut inventory, _rx) = test_system();
        inventory.add_product("P1", product_data(10), 1000);

        // Overdraw is absorbed, not rejected
        assert_eq!(inventory.update_stock("P1", -25, "sale", 2000), Some(0));
        assert_eq!(inventory.product("P1").unwrap().current_stock, 0);

        // Arbitrary sequences keep the invariant
        for (i, delta) in [-5i64, 3, -100, 7, -7, -1].iter().enumerate() {
            inventory.update_stock("P1", *delta, "manual", 3000 + i as u64);
            assert!(inventory.product("P1").unwrap().current_stock >= 0);
        }
    }

    #[test]
    fn test_update_unknown_product_is_noop() {
        let (mut inventory, mut rx) = test_system();

        assert!(inventory.update_stock("ghost", -5, "sale", 1000).is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_prediction_counts_only_consumption() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(100), 0);

        // Two sale days and one restock across a 4 day span
        inventory.update_stock("P1", -20, "sale", DAY_MS);
        inventory.update_stock("P1", -20, "sale", 2 * DAY_MS);
        inventory.update_stock("P1", 40, "restock", 3 * DAY_MS);
        inventory.update_stock("P1", -10, "sale", 4 * DAY_MS);
        drain(&mut rx);

        inventory.predict_stock_needs();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);

        match &events[0] {
            DomainEvent::Inventory(InventoryEvent::StockPrediction(p)) => {
                // 50 units consumed over 4 days, restock ignored
                assert!((p.avg_daily_usage - 12.5).abs() < 1e-9);
                assert_eq!(p.current_stock, 90);
                // floor((90 - 20) / 12.5) = 5
                assert_eq!(p.days_until_reorder, 5);
            }
            other => panic!("expected stock_prediction, got {other:?}"),
        }
    }

    #[test]
    fn test_prediction_silent_without_consumption() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(10), 0);

        // Strictly increasing stock: no usage, no prediction
        inventory.update_stock("P1", 5, "restock", DAY_MS);
        inventory.update_stock("P1", 5, "restock", 2 * DAY_MS);
        drain(&mut rx);

        inventory.predict_stock_needs();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_prediction_silent_on_zero_span() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(50), 1000);
        // Same-timestamp entry: span is zero
        inventory.update_stock("P1", -10, "sale", 1000);
        drain(&mut rx);

        inventory.predict_stock_needs();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_prediction_silent_with_short_history() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(50), 1000);
        drain(&mut rx);

        inventory.predict_stock_needs();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_prediction_uses_trailing_window_only() {
        let (mut inventory, mut rx) = test_system();
        inventory.add_product("P1", product_data(10_000), 0);

        // Old heavy consumption that must fall out of the 30-entry window
        inventory.update_stock("P1", -1000, "sale", DAY_MS);
        // 30 light entries, one per day, push the heavy one out
        for day in 2..32u64 {
            inventory.update_stock("P1", -1, "sale", day * DAY_MS);
        }
        drain(&mut rx);

        inventory.predict_stock_needs();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);

        match &events[0] {
            DomainEvent::Inventory(InventoryEvent::StockPrediction(p)) => {
                // 29 consumption steps inside the window over 29 days
                assert!((p.avg_daily_usage - 1.0).abs() < 1e-9);
            }
            other => panic!("expected stock_prediction, got {other:?}"),
        }
    }

    #[test]
    fn test_average_daily_usage_edge_cases() {
        assert!(average_daily_usage(&[]).is_none());
        let single =
            [StockHistoryEntry { ts: 0, stock: 10, delta: 0, cause: "initial".into() }];
        assert!(average_daily_usage(&single).is_none());
    }
}
