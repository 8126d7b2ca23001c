//! Central engine: command dispatch, simulation ticks, and fan-out
//!
//! The engine task owns the world and the connection registry. Connection
//! reader tasks feed it `SessionMsg`s; domain modules feed it typed events
//! through the event channel. Four independent tick intervals drive the
//! simulation. Everything the engine does is synchronous and in-memory, so
//! a tick or command can never block the loop.
//!
//! Delivery contract: frames reach a given connection in emission order
//! (single fan-out path per connection); delivery is best-effort and
//! at-most-once - a full connection queue drops frames.

use crate::domain::commands::{
    CustomerCommand, InventoryCommand, LayoutCommand, SecurityCommand,
};
use crate::domain::events::DomainEvent;
use crate::domain::types::epoch_ms;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::world::World;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Messages from connection tasks to the engine
#[derive(Debug)]
pub enum SessionMsg {
    Connected { conn_id: u64, tx: mpsc::Sender<String> },
    Line { conn_id: u64, line: String },
    Disconnected { conn_id: u64 },
}

pub struct Engine {
    world: World,
    event_rx: mpsc::Receiver<DomainEvent>,
    /// Open connections and their outbound frame queues
    conns: HashMap<u64, mpsc::Sender<String>>,
    config: Config,
    metrics: Arc<Metrics>,
    /// Rate limit for frame-drop warnings
    last_drop_warn: Instant,
}

impl Engine {
    pub fn new(
        config: Config,
        world: World,
        event_rx: mpsc::Receiver<DomainEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            world,
            event_rx,
            conns: HashMap::new(),
            config,
            metrics,
            last_drop_warn: Instant::now() - Duration::from_secs(2),
        }
    }

    /// Run until the session channel closes or shutdown is signalled
    pub async fn run(
        &mut self,
        mut session_rx: mpsc::Receiver<SessionMsg>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut sensor_tick = interval(Duration::from_millis(self.config.update_interval_ms()));
        let mut customer_tick =
            interval(Duration::from_millis(self.config.customer_interval_ms()));
        let mut prediction_tick =
            interval(Duration::from_millis(self.config.prediction_interval_ms()));
        let mut layout_tick = interval(Duration::from_millis(self.config.layout_interval_ms()));

        info!(
            sensor_ms = %self.config.update_interval_ms(),
            customer_ms = %self.config.customer_interval_ms(),
            prediction_ms = %self.config.prediction_interval_ms(),
            layout_ms = %self.config.layout_interval_ms(),
            "engine_started"
        );

        loop {
            tokio::select! {
                msg = session_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_session(msg),
                        None => break, // all listeners gone
                    }
                }
                _ = sensor_tick.tick() => {
                    self.world.sensor_tick(epoch_ms());
                    self.metrics.record_tick();
                    self.metrics.set_world_gauges(
                        self.world.customers.active_count(),
                        self.world.security.active_alert_count(),
                    );
                    self.drain_events();
                    self.broadcast_status(epoch_ms());
                }
                _ = customer_tick.tick() => {
                    self.world.customer_tick(epoch_ms());
                    self.metrics.record_tick();
                    self.drain_events();
                }
                _ = prediction_tick.tick() => {
                    self.world.inventory.predict_stock_needs();
                    self.metrics.record_tick();
                    self.drain_events();
                }
                _ = layout_tick.tick() => {
                    self.validate_layouts();
                    self.metrics.record_tick();
                    self.drain_events();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("engine_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Process one session message. Connections always receive their
    /// `initial_data` frame before any event frame.
    pub(crate) fn handle_session(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Connected { conn_id, tx } => {
                self.metrics.record_connection_opened();
                let frame =
                    json!({ "type": "initial_data", "data": self.world.snapshot() }).to_string();
                if tx.try_send(frame).is_ok() {
                    self.metrics.record_frame_sent();
                }
                self.conns.insert(conn_id, tx);
                info!(conn_id = %conn_id, connections = %self.conns.len(), "conn_opened");
            }
            SessionMsg::Line { conn_id, line } => {
                let started = Instant::now();
                self.handle_line(conn_id, &line);
                self.drain_events();
                self.metrics.record_command(started.elapsed().as_micros() as u64);
            }
            SessionMsg::Disconnected { conn_id } => {
                if self.conns.remove(&conn_id).is_some() {
                    self.metrics.record_connection_closed();
                    info!(conn_id = %conn_id, connections = %self.conns.len(), "conn_closed");
                }
            }
        }
    }

    /// Parse one inbound frame and dispatch it to a command family
    fn handle_line(&mut self, conn_id: u64, line: &str) {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "malformed_frame");
                self.reject(conn_id, "invalid JSON frame");
                return;
            }
        };

        let frame_type = value.get("type").and_then(Value::as_str).unwrap_or("").to_string();
        match frame_type.as_str() {
            "inventory_command" => match serde_json::from_value::<InventoryCommand>(value) {
                Ok(cmd) => self.handle_inventory_command(cmd),
                Err(e) => self.reject(conn_id, &format!("invalid inventory_command: {e}")),
            },
            "customer_command" => match serde_json::from_value::<CustomerCommand>(value) {
                Ok(cmd) => self.handle_customer_command(cmd),
                Err(e) => self.reject(conn_id, &format!("invalid customer_command: {e}")),
            },
            "layout_command" => match serde_json::from_value::<LayoutCommand>(value) {
                Ok(cmd) => self.handle_layout_command(conn_id, cmd),
                Err(e) => self.reject(conn_id, &format!("invalid layout_command: {e}")),
            },
            "security_command" => match serde_json::from_value::<SecurityCommand>(value) {
                Ok(cmd) => self.handle_security_command(cmd),
                Err(e) => self.reject(conn_id, &format!("invalid security_command: {e}")),
            },
            other => {
                // Unrecognized types are acknowledged, not rejected
                debug!(conn_id = %conn_id, frame_type = %other, "unrecognized_frame_type");
                let frame = json!({
                    "type": "response",
                    "status": "ok",
                    "message": "message received",
                })
                .to_string();
                self.send_to(conn_id, frame);
            }
        }
    }

    fn handle_inventory_command(&mut self, cmd: InventoryCommand) {
        let ts = epoch_ms();
        match cmd {
            InventoryCommand::AddProduct { product_id, product_data } => {
                self.world.inventory.add_product(&product_id, product_data, ts);
            }
            InventoryCommand::UpdateStock { product_id, quantity, cause } => {
                // Unknown product id is a documented no-op
                self.world.inventory.update_stock(
                    &product_id,
                    quantity,
                    cause.as_deref().unwrap_or("manual"),
                    ts,
                );
            }
        }
    }

    fn handle_customer_command(&mut self, cmd: CustomerCommand) {
        let ts = epoch_ms();
        match cmd {
            CustomerCommand::CreateCustomer => {
                self.world.customer_spawn(ts);
            }
            CustomerCommand::MoveCustomer { customer_id, new_zone } => {
                self.world.customers.move_to(&customer_id, &new_zone, ts);
            }
            CustomerCommand::RemoveCustomer { customer_id } => {
                self.world.customers.depart(&customer_id, ts);
            }
        }
    }

    fn handle_layout_command(&mut self, conn_id: u64, cmd: LayoutCommand) {
        let ts = epoch_ms();
        match cmd {
            LayoutCommand::AddObject { zone_id, object } => {
                match self.world.layout.add_object(&zone_id, object, ts) {
                    Ok(object_id) => {
                        let frame = json!({
                            "type": "command_result",
                            "command": "add_object",
                            "status": "ok",
                            "objectId": object_id,
                        })
                        .to_string();
                        self.send_to(conn_id, frame);
                    }
                    Err(e) => self.reject(conn_id, &e.to_string()),
                }
            }
            LayoutCommand::ValidateZone { zone_id } => {
                match self.world.layout.validate_evacuation_routes(&zone_id) {
                    Some(report) => {
                        let frame = json!({
                            "type": "command_result",
                            "command": "validate_zone",
                            "status": "ok",
                            "zoneId": zone_id,
                            "validation": report,
                        })
                        .to_string();
                        self.send_to(conn_id, frame);
                    }
                    None => self.reject(conn_id, &format!("zone {zone_id} not found")),
                }
            }
            LayoutCommand::OptimizeZone { zone_id } => {
                match self.world.layout.optimize_layout(&zone_id) {
                    Some(report) => {
                        let frame = json!({
                            "type": "command_result",
                            "command": "optimize_zone",
                            "status": "ok",
                            "zoneId": zone_id,
                            "optimization": report,
                        })
                        .to_string();
                        self.send_to(conn_id, frame);
                    }
                    None => self.reject(conn_id, &format!("zone {zone_id} not found")),
                }
            }
        }
    }

    fn handle_security_command(&mut self, cmd: SecurityCommand) {
        match cmd {
            SecurityCommand::AcknowledgeAlert { alert_id } => {
                // Unknown alert id is a documented no-op
                self.world.security.acknowledge_alert(&alert_id, epoch_ms());
            }
        }
    }

    /// Run evacuation validation for every zone, broadcasting a warning for
    /// each failing one
    fn validate_layouts(&mut self) {
        for zone_id in self.world.layout.zone_ids().to_vec() {
            let Some(report) = self.world.layout.validate_evacuation_routes(&zone_id) else {
                continue;
            };
            if !report.has_valid_routes {
                warn!(zone = %zone_id, ratio = %report.accessible_ratio, "evacuation_validation_failed");
                let frame = json!({
                    "type": "layout_warning",
                    "zoneId": zone_id,
                    "validation": report,
                })
                .to_string();
                self.broadcast(&frame);
            }
        }
    }

    /// Forward every queued domain event to all open connections
    pub(crate) fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.metrics.record_event_emitted();
            let frame = json!({
                "type": event.frame_type(),
                "event": event.event_name(),
                "data": event.data(),
            })
            .to_string();
            self.broadcast(&frame);
        }
    }

    fn broadcast_status(&mut self, ts: u64) {
        let frame = json!({
            "type": "status_update",
            "timestamp": ts,
            "data": self.world.snapshot(),
        })
        .to_string();
        self.broadcast(&frame);
    }

    /// Fan one frame out to every open connection, dropping on full queues
    fn broadcast(&mut self, frame: &str) {
        let mut closed = Vec::new();
        for (conn_id, tx) in &self.conns {
            match tx.try_send(frame.to_string()) {
                Ok(()) => self.metrics.record_frame_sent(),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.metrics.record_frame_dropped();
                    if self.last_drop_warn.elapsed() > Duration::from_secs(1) {
                        warn!(conn_id = %conn_id, "frame_dropped: connection queue full");
                        self.last_drop_warn = Instant::now();
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*conn_id),
            }
        }
        for conn_id in closed {
            self.conns.remove(&conn_id);
            self.metrics.record_connection_closed();
        }
    }

    /// Send a frame to one connection only (command results and errors)
    fn send_to(&mut self, conn_id: u64, frame: String) {
        let Some(tx) = self.conns.get(&conn_id) else { return };
        match tx.try_send(frame) {
            Ok(()) => self.metrics.record_frame_sent(),
            Err(mpsc::error::TrySendError::Full(_)) => self.metrics.record_frame_dropped(),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.conns.remove(&conn_id);
                self.metrics.record_connection_closed();
            }
        }
    }

    fn reject(&mut self, conn_id: u64, message: &str) {
        self.metrics.record_command_rejected();
        let frame = json!({ "type": "error", "message": message }).to_string();
        self.send_to(conn_id, frame);
    }
}
