//! Per-zone security state machine and alert registry
//!
//! Cameras start recording on any positive motion reading and stop only
//! after a quiet window. The stop is level-triggered: a zero reading arms a
//! per-zone clear deadline, and any new motion cancels it, so overlapping
//! quiet windows can never clear a recording that has since restarted.
//!
//! Key behaviors:
//! - Motion > 0 stamps camera/sensor timestamps, records, alerts
//! - Motion == 0 arms (or re-arms) a 30s recording-clear deadline
//! - `expire_recordings` is called every sensor tick with the current time
//! - Acknowledging an unknown alert id is an explicit `None` no-op

use crate::domain::events::{MotionDetectedPayload, SecurityEvent};
use crate::domain::types::{Alert, AlertStatus, Camera, MotionSensor, Severity, ZoneRegistry};
use crate::io::event_channel::EventSender;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Quiet window after which a camera stops recording
pub const RECORDING_CLEAR_DELAY_MS: u64 = 30_000;

pub struct SecuritySystem {
    /// Cameras keyed by zone id
    cameras: HashMap<String, Camera>,
    /// Motion sensors keyed by zone id
    motion_sensors: HashMap<String, MotionSensor>,
    /// All alerts ever created, keyed by alert id (append-only)
    alerts: HashMap<String, Alert>,
    /// Alert ids in creation order, for stable snapshots
    alert_order: Vec<String>,
    /// Pending recording-clear deadline per zone (epoch ms)
    clear_deadlines: HashMap<String, u64>,
    events: EventSender,
}

impl SecuritySystem {
    pub fn new(zones: &ZoneRegistry, events: EventSender) -> Self {
        let mut cameras = HashMap::new();
        let mut motion_sensors = HashMap::new();

        for zone in zones.iter() {
            cameras.insert(
                zone.id.clone(),
                Camera {
                    id: format!("cam_{}", zone.id),
                    zone: zone.id.clone(),
                    active: true,
                    recording: false,
                    last_motion: None,
                },
            );
            motion_sensors.insert(
                zone.id.clone(),
                MotionSensor {
                    id: format!("motion_{}", zone.id),
                    zone: zone.id.clone(),
                    active: true,
                    last_trigger: None,
                },
            );
        }

        Self {
            cameras,
            motion_sensors,
            alerts: HashMap::new(),
            alert_order: Vec::new(),
            clear_deadlines: HashMap::new(),
            events,
        }
    }

    /// Process one motion reading for a zone.
    ///
    /// Positive values start recording, emit `motion_detected`, and create a
    /// medium-severity alert. Zero values arm the recording-clear deadline.
    pub fn report_motion(&mut self, zone: &str, value: f64, ts: u64) {
        let (Some(camera), Some(sensor)) =
            (self.cameras.get_mut(zone), self.motion_sensors.get_mut(zone))
        else {
            debug!(zone = %zone, "motion_for_unknown_zone");
            return;
        };

        if value > 0.0 {
            camera.last_motion = Some(ts);
            camera.recording = true;
            sensor.last_trigger = Some(ts);
            // Motion cancels any pending clear for this zone
            self.clear_deadlines.remove(zone);

            let payload = MotionDetectedPayload {
                zone: zone.to_string(),
                timestamp: ts,
                camera: camera.id.clone(),
                sensor: sensor.id.clone(),
            };
            self.events.send_security(SecurityEvent::MotionDetected(payload));

            self.create_alert(
                zone,
                "motion",
                Severity::Medium,
                &format!("Motion detected in zone {}", zone),
                ts,
            );
        } else {
            // Level-triggered stop: re-arm the quiet window on every zero
            self.clear_deadlines.insert(zone.to_string(), ts + RECORDING_CLEAR_DELAY_MS);
        }
    }

    /// Clear recordings whose quiet window has fully elapsed.
    ///
    /// Called on every sensor tick with the current time.
    pub fn expire_recordings(&mut self, now_ts: u64) {
        let expired: Vec<String> = self
            .clear_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now_ts)
            .map(|(zone, _)| zone.clone())
            .collect();

        for zone in expired {
            self.clear_deadlines.remove(&zone);
            if let Some(camera) = self.cameras.get_mut(&zone) {
                if camera.recording {
                    camera.recording = false;
                    debug!(zone = %zone, "recording_stopped");
                }
            }
        }
    }

    fn create_alert(
        &mut self,
        zone: &str,
        kind: &str,
        severity: Severity,
        message: &str,
        ts: u64,
    ) -> &Alert {
        let alert = Alert {
            id: crate::domain::types::new_id("alert"),
            kind: kind.to_string(),
            zone: zone.to_string(),
            severity,
            message: message.to_string(),
            status: AlertStatus::Active,
            created_at: ts,
            acknowledged_at: None,
        };

        info!(alert_id = %alert.id, zone = %zone, kind = %kind, "alert_created");
        self.events.send_security(SecurityEvent::NewAlert(alert.clone()));

        let id = alert.id.clone();
        self.alert_order.push(id.clone());
        self.alerts.insert(id.clone(), alert);
        &self.alerts[&id]
    }

    /// Transition an alert from active to acknowledged.
    ///
    /// Returns `None` for an unknown id so callers can distinguish applied
    /// from ignored.
    pub fn acknowledge_alert(&mut self, alert_id: &str, ts: u64) -> Option<&Alert> {
        let alert = self.alerts.get_mut(alert_id)?;
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(ts);

        info!(alert_id = %alert_id, "alert_acknowledged");
        self.events.send_security(SecurityEvent::AlertUpdated(alert.clone()));
        Some(&self.alerts[alert_id])
    }

    /// Alerts still in `active` status, in creation order
    pub fn active_alerts(&self) -> Vec<&Alert> {
        self.alert_order
            .iter()
            .filter_map(|id| self.alerts.get(id))
            .filter(|a| a.status == AlertStatus::Active)
            .collect()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn active_alert_count(&self) -> usize {
        self.alerts.values().filter(|a| a.status == AlertStatus::Active).count()
    }

    #[cfg(test)]
    pub fn camera(&self, zone: &str) -> Option<&Camera> {
        self.cameras.get(zone)
    }

    /// Cameras, motion sensors, and active alerts for the status snapshot
    pub fn snapshot(&self) -> Value {
        let cameras: serde_json::Map<String, Value> = self
            .cameras
            .values()
            .map(|c| (c.id.clone(), serde_json::to_value(c).unwrap_or(Value::Null)))
            .collect();
        let sensors: serde_json::Map<String, Value> = self
            .motion_sensors
            .values()
            .map(|s| (s.id.clone(), serde_json::to_value(s).unwrap_or(Value::Null)))
            .collect();
        let active: Vec<Value> = self
            .active_alerts()
            .into_iter()
            .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
            .collect();

        json!({
            "cameras": cameras,
            "motionSensors": sensors,
            "activeAlerts": active,
        })
    }
}
