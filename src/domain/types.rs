//! Shared types for the floor twin

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7-based id with a readable prefix (time-sortable)
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::now_v7())
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Metric kinds produced by the synthetic sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Pressure,
    Motion,
    StockProxy,
}

impl SensorKind {
    pub const ALL: [SensorKind; 5] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Pressure,
        SensorKind::Motion,
        SensorKind::StockProxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Pressure => "pressure",
            SensorKind::Motion => "motion",
            SensorKind::StockProxy => "stock",
        }
    }

    /// Short prefix used to build reading ids like `temp_A1`
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temp",
            SensorKind::Humidity => "hum",
            SensorKind::Pressure => "pres",
            SensorKind::Motion => "mov",
            SensorKind::StockProxy => "stock",
        }
    }
}

/// One synthetic sensor reading, owned by the sensor manager
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub zone: String,
    pub value: f64,
    pub last_updated: u64,
}

/// A fixed exit fixture of a zone (static configuration, never derived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub position: Position,
    pub width: f64,
}

impl Default for Exit {
    fn default() -> Self {
        Self { position: Position { x: 0.0, y: 0.0 }, width: 1.5 }
    }
}

pub(crate) fn default_exits() -> Vec<Exit> {
    vec![Exit::default()]
}

/// A named spatial region of the floor with fixed dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    #[serde(default = "default_exits")]
    pub exits: Vec<Exit>,
}

impl Zone {
    pub fn total_area(&self) -> f64 {
        self.width * self.length
    }
}

/// Canonical set of zones shared by every domain module.
///
/// Built once from configuration at startup; zones are never added or
/// removed at runtime.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.zones.iter().map(|z| z.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Per-product stock ledger entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub reorder_point: i64,
    pub zone: String,
    pub last_updated: u64,
}

/// Append-only stock history record used for trailing-window prediction
#[derive(Debug, Clone)]
pub struct StockHistoryEntry {
    pub ts: u64,
    pub stock: i64,
    pub delta: i64,
    pub cause: String,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
}

/// A security alert. Created by the security domain, mutated only by the
/// acknowledge operation, never deleted during process lifetime.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub kind: String,
    pub zone: String,
    pub severity: Severity,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<u64>,
}

/// Per-zone camera state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: String,
    pub zone: String,
    pub active: bool,
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_motion: Option<u64>,
}

/// Per-zone motion sensor state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSensor {
    pub id: String,
    pub zone: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<u64>,
}

/// Static customer behavior pattern, read-only at runtime
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorPattern {
    pub name: String,
    pub avg_dwell_ms: u64,
    pub interaction_probability: f64,
    pub purchase_probability: f64,
}

/// A virtual customer currently on the floor
#[derive(Debug, Clone)]
pub struct CustomerAgent {
    pub id: String,
    pub pattern: String,
    pub entry_time: u64,
    pub current_zone: Option<String>,
    pub visited_zones: SmallVec<[String; 4]>,
    pub interactions: u32,
    pub purchases: u32,
}

impl CustomerAgent {
    pub fn new(id: String, pattern: &str, entry_time: u64) -> Self {
        Self {
            id,
            pattern: pattern.to_string(),
            entry_time,
            current_zone: None,
            visited_zones: SmallVec::new(),
            interactions: 0,
            purchases: 0,
        }
    }
}

/// Per-zone customer aggregate. Counters are monotonically non-decreasing
/// for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatMapEntry {
    pub visits: u64,
    pub total_time_ms: f64,
    pub interactions: u64,
    pub purchases: u64,
}

/// 2D position inside a zone, in length units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A placed layout object. Immutable once placed; there is no move or
/// remove operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutObject {
    pub id: String,
    pub zone: String,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub position: Position,
}

impl LayoutObject {
    pub fn footprint_area(&self) -> f64 {
        self.width * self.length
    }
}
