//! Spatial layout: placement validation, collision grid, evacuation analysis
//!
//! Each zone carries a fixed-resolution occupancy grid (0.5-unit cells).
//! A cell is either empty or owned by exactly one object id; that is the
//! collision invariant. Placement is a one-way commitment - there is no
//! move, resize, or remove operation for placed objects.

use crate::domain::commands::ObjectSpec;
use crate::domain::events::{LayoutEvent, ObjectAddedPayload};
use crate::domain::types::{new_id, Exit, LayoutObject, Zone, ZoneRegistry};
use crate::io::event_channel::EventSender;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Collision grid resolution in length units
pub const GRID_CELL_SIZE: f64 = 0.5;
/// Largest accepted object footprint edge
pub const MAX_OBJECT_EDGE: f64 = 10.0;
/// Tallest accepted object
pub const MAX_OBJECT_HEIGHT: f64 = 3.0;
/// Minimum share of a zone that must stay accessible for evacuation
pub const MIN_ACCESSIBLE_RATIO: f64 = 0.30;
/// Occupancy ratio above which the optimizer raises a density warning
pub const MAX_OCCUPANCY_RATIO: f64 = 0.70;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("zone {0} not found")]
    UnknownZone(String),
    #[error("object dimensions out of range")]
    InvalidDimensions,
    #[error("object collides with an existing placement")]
    Collision,
}

/// Evacuation-route validation result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvacuationReport {
    pub has_valid_routes: bool,
    pub accessible_ratio: f64,
    pub exits: Vec<Exit>,
}

/// Advisory finding produced by the layout optimizer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LayoutSuggestion {
    DensityWarning { message: String, current_value: f64, recommended_max: f64 },
    EvacuationWarning { message: String, current_ratio: f64, recommended_min: f64 },
}

/// Occupancy and evacuation metrics plus advisory suggestions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub occupied_space: f64,
    pub accessible_area: f64,
    pub evacuation_routes: EvacuationReport,
    pub suggestions: Vec<LayoutSuggestion>,
}

/// Per-zone placement state
struct ZoneLayout {
    zone: Zone,
    /// Placed object ids in placement order
    objects: Vec<String>,
    occupied_area: f64,
    /// (grid_x, grid_y) -> owning object id
    grid: FxHashMap<(i64, i64), String>,
    last_modified: u64,
}

pub struct LayoutPlanner {
    zones: HashMap<String, ZoneLayout>,
    /// Zone ids in configuration order, for stable snapshots and ticks
    zone_order: Vec<String>,
    objects: HashMap<String, LayoutObject>,
    events: EventSender,
}

impl LayoutPlanner {
    pub fn new(zones: &ZoneRegistry, events: EventSender, ts: u64) -> Self {
        let mut by_id = HashMap::new();
        let mut zone_order = Vec::new();
        for zone in zones.iter() {
            zone_order.push(zone.id.clone());
            by_id.insert(
                zone.id.clone(),
                ZoneLayout {
                    zone: zone.clone(),
                    objects: Vec::new(),
                    occupied_area: 0.0,
                    grid: FxHashMap::default(),
                    last_modified: ts,
                },
            );
        }
        Self { zones: by_id, zone_order, objects: HashMap::new(), events }
    }

    /// Validate and place an object, marking its footprint in the grid.
    ///
    /// Rejection leaves all state untouched. Returns the new object id.
    pub fn add_object(
        &mut self,
        zone_id: &str,
        spec: ObjectSpec,
        ts: u64,
    ) -> Result<String, LayoutError> {
        let layout = self
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| LayoutError::UnknownZone(zone_id.to_string()))?;

        if !dimensions_valid(&spec) {
            return Err(LayoutError::InvalidDimensions);
        }

        let cells = footprint_cells(&spec);
        if cells.iter().any(|cell| layout.grid.contains_key(cell)) {
            return Err(LayoutError::Collision);
        }

        let object = LayoutObject {
            id: new_id("obj"),
            zone: zone_id.to_string(),
            width: spec.width,
            length: spec.length,
            height: spec.height,
            position: spec.position,
        };
        let object_id = object.id.clone();

        for cell in cells {
            layout.grid.insert(cell, object_id.clone());
        }
        layout.objects.push(object_id.clone());
        layout.occupied_area += object.footprint_area();
        layout.last_modified = ts;

        info!(zone = %zone_id, object_id = %object_id, area = %object.footprint_area(), "object_placed");
        self.events.send_layout(LayoutEvent::ObjectAdded(ObjectAddedPayload {
            zone_id: zone_id.to_string(),
            object_id: object_id.clone(),
            object: object.clone(),
        }));

        self.objects.insert(object_id.clone(), object);
        Ok(object_id)
    }

    /// Check that a zone keeps enough accessible area and at least one exit
    pub fn validate_evacuation_routes(&self, zone_id: &str) -> Option<EvacuationReport> {
        let layout = self.zones.get(zone_id)?;
        let total_area = layout.zone.total_area();
        let accessible_area = total_area - layout.occupied_area;
        let accessible_ratio =
            if total_area > 0.0 { accessible_area / total_area } else { 0.0 };

        Some(EvacuationReport {
            has_valid_routes: !layout.zone.exits.is_empty()
                && accessible_ratio >= MIN_ACCESSIBLE_RATIO,
            accessible_ratio,
            exits: layout.zone.exits.clone(),
        })
    }

    /// Occupancy metrics and advisory findings. Never mutates state.
    pub fn optimize_layout(&self, zone_id: &str) -> Option<OptimizationReport> {
        let layout = self.zones.get(zone_id)?;
        let evacuation = self.validate_evacuation_routes(zone_id)?;
        let total_area = layout.zone.total_area();
        let occupancy_ratio =
            if total_area > 0.0 { layout.occupied_area / total_area } else { 0.0 };

        let mut suggestions = Vec::new();
        if occupancy_ratio > MAX_OCCUPANCY_RATIO {
            suggestions.push(LayoutSuggestion::DensityWarning {
                message: "Zone occupancy density is too high".to_string(),
                current_value: occupancy_ratio,
                recommended_max: MAX_OCCUPANCY_RATIO,
            });
        }
        if !evacuation.has_valid_routes {
            suggestions.push(LayoutSuggestion::EvacuationWarning {
                message: "Evacuation routes are below the accessible-area minimum".to_string(),
                current_ratio: evacuation.accessible_ratio,
                recommended_min: MIN_ACCESSIBLE_RATIO,
            });
        }

        Some(OptimizationReport {
            occupied_space: layout.occupied_area,
            accessible_area: total_area - layout.occupied_area,
            evacuation_routes: evacuation,
            suggestions,
        })
    }

    pub fn zone_ids(&self) -> &[String] {
        &self.zone_order
    }

    pub fn object(&self, object_id: &str) -> Option<&LayoutObject> {
        self.objects.get(object_id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    fn occupied_area(&self, zone_id: &str) -> f64 {
        self.zones.get(zone_id).map(|z| z.occupied_area).unwrap_or(0.0)
    }

    /// Zones, objects, and per-zone metrics for the status snapshot
    pub fn snapshot(&self) -> Value {
        let zones: serde_json::Map<String, Value> = self
            .zone_order
            .iter()
            .filter_map(|id| self.zones.get(id))
            .map(|layout| {
                (
                    layout.zone.id.clone(),
                    json!({
                        "id": layout.zone.id,
                        "dimensions": {
                            "width": layout.zone.width,
                            "length": layout.zone.length,
                            "height": layout.zone.height,
                        },
                        "objects": layout.objects,
                        "occupiedSpace": layout.occupied_area,
                        "lastModified": layout.last_modified,
                    }),
                )
            })
            .collect();

        let objects: serde_json::Map<String, Value> = self
            .objects
            .iter()
            .map(|(id, obj)| (id.clone(), serde_json::to_value(obj).unwrap_or(Value::Null)))
            .collect();

        let metrics: Vec<Value> = self
            .zone_order
            .iter()
            .filter_map(|id| {
                let report = self.optimize_layout(id)?;
                let mut value = serde_json::to_value(&report).ok()?;
                if let Some(map) = value.as_object_mut() {
                    map.insert("zoneId".to_string(), json!(id));
                }
                Some(value)
            })
            .collect();

        json!({
            "zones": zones,
            "objects": objects,
            "metrics": metrics,
        })
    }
}

fn dimensions_valid(spec: &ObjectSpec) -> bool {
    spec.width > 0.0
        && spec.length > 0.0
        && spec.height > 0.0
        && spec.width <= MAX_OBJECT_EDGE
        && spec.length <= MAX_OBJECT_EDGE
        && spec.height <= MAX_OBJECT_HEIGHT
}

/// Rectangular cell range covered by an object footprint
fn footprint_cells(spec: &ObjectSpec) -> Vec<(i64, i64)> {
    let grid_x = (spec.position.x / GRID_CELL_SIZE).floor() as i64;
    let grid_y = (spec.position.y / GRID_CELL_SIZE).floor() as i64;
    let cells_wide = (spec.width / GRID_CELL_SIZE).ceil() as i64;
    let cells_long = (spec.length / GRID_CELL_SIZE).ceil() as i64;

    let mut cells = Vec::with_capacity((cells_wide * cells_long) as usize);
    for x in grid_x..grid_x + cells_wide {
        for y in grid_y..grid_y + cells_long {
            cells.push((x, y));
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;
    use crate::domain::types::Position;
    use crate::io::event_channel::create_event_channel;
    use tokio::sync::mpsc;

    fn test_zones() -> ZoneRegistry {
        ZoneRegistry::new(vec![
            Zone {
                id: "A1".into(),
                width: 10.0,
                length: 10.0,
                height: 3.0,
                exits: vec![Exit::default()],
            },
            Zone { id: "A2".into(), width: 10.0, length: 10.0, height: 3.0, exits: vec![] },
        ])
    }

    fn test_planner() -> (LayoutPlanner, mpsc::Receiver<DomainEvent>) {
        let (sender, rx) = create_event_channel(64);
        (LayoutPlanner::new(&test_zones(), sender, 0), rx)
    }

    fn spec(width: f64, length: f64, height: f64, x: f64, y: f64) -> ObjectSpec {
        ObjectSpec { width, length, height, position: Position { x, y } }
    }

    #[test]
    fn test_add_object_success_emits_and_accounts() {
        let (mut planner, mut rx) = test_planner();

        let id = planner.add_object("A1", spec(2.0, 2.0, 1.0, 1.0, 1.0), 100).unwrap();

        assert_eq!(planner.object_count(), 1);
        assert_eq!(planner.occupied_area("A1"), 4.0);
        let object = planner.object(&id).unwrap();
        assert_eq!(object.zone, "A1");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.frame_type(), "layout_event");
        assert_eq!(event.event_name(), "object_added");
    }

    #[test]
    fn test_identical_placement_collides() {
        // Scenario: same position twice - first accepted, second rejected
        let (mut planner, _rx) = test_planner();

        planner.add_object("A1", spec(2.0, 2.0, 1.0, 1.0, 1.0), 100).unwrap();
        let second = planner.add_object("A1", spec(2.0, 2.0, 1.0, 1.0, 1.0), 101);

        assert_eq!(second, Err(LayoutError::Collision));
    }

    #[test]
    fn test_rejected_placement_leaves_state_unchanged() {
        let (mut planner, mut rx) = test_planner();
        planner.add_object("A1", spec(2.0, 2.0, 1.0, 1.0, 1.0), 100).unwrap();
        while rx.try_recv().is_ok() {}

        let before_area = planner.occupied_area("A1");
        let before_count = planner.object_count();

        // Overlaps the existing footprint partially
        assert!(planner.add_object("A1", spec(2.0, 2.0, 1.0, 2.0, 2.0), 101).is_err());

        assert_eq!(planner.occupied_area("A1"), before_area);
        assert_eq!(planner.object_count(), before_count);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_adjacent_objects_do_not_collide() {
        let (mut planner, _rx) = test_planner();

        planner.add_object("A1", spec(2.0, 2.0, 1.0, 0.0, 0.0), 100).unwrap();
        // Starts exactly where the previous footprint ends
        planner.add_object("A1", spec(2.0, 2.0, 1.0, 2.0, 0.0), 101).unwrap();

        assert_eq!(planner.object_count(), 2);
    }

    #[test]
    fn test_same_position_different_zone_is_fine() {
        let (mut planner, _rx) = test_planner();

        planner.add_object("A1", spec(2.0, 2.0, 1.0, 1.0, 1.0), 100).unwrap();
        planner.add_object("A2", spec(2.0, 2.0, 1.0, 1.0, 1.0), 101).unwrap();

        assert_eq!(planner.object_count(), 2);
    }

    #[test]
    fn test_dimension_bounds() {
        let (mut planner, _rx) = test_planner();

        for bad in [
            spec(0.0, 2.0, 1.0, 0.0, 0.0),
            spec(2.0, 0.0, 1.0, 0.0, 0.0),
            spec(2.0, 2.0, 0.0, 0.0, 0.0),
            spec(10.5, 2.0, 1.0, 0.0, 0.0),
            spec(2.0, 10.5, 1.0, 0.0, 0.0),
            spec(2.0, 2.0, 3.5, 0.0, 0.0),
        ] {
            assert_eq!(
                planner.add_object("A1", bad, 100),
                Err(LayoutError::InvalidDimensions)
            );
        }

        // Boundary values are accepted
        planner.add_object("A1", spec(10.0, 10.0, 3.0, 0.0, 0.0), 100).unwrap();
    }

    #[test]
    fn test_unknown_zone_rejected() {
        let (mut planner, _rx) = test_planner();
        assert_eq!(
            planner.add_object("Z9", spec(1.0, 1.0, 1.0, 0.0, 0.0), 100),
            Err(LayoutError::UnknownZone("Z9".into()))
        );
    }

    #[test]
    fn test_fractional_footprint_rounds_up_to_cells() {
        let (mut planner, _rx) = test_planner();

        // 1.2 x 1.2 at origin covers ceil(1.2/0.5) = 3 cells each way
        planner.add_object("A1", spec(1.2, 1.2, 1.0, 0.0, 0.0), 100).unwrap();
        // Cell (2,2) is still covered, so placing at 1.0 collides
        assert_eq!(
            planner.add_object("A1", spec(1.0, 1.0, 1.0, 1.0, 1.0), 101),
            Err(LayoutError::Collision)
        );
        // 1.5 is outside the rounded footprint
        planner.add_object("A1", spec(1.0, 1.0, 1.0, 1.5, 1.5), 102).unwrap();
    }

    #[test]
    fn test_evacuation_passes_when_open() {
        let (planner, _rx) = test_planner();

        let report = planner.validate_evacuation_routes("A1").unwrap();
        assert!(report.has_valid_routes);
        assert!((report.accessible_ratio - 1.0).abs() < 1e-9);
        assert_eq!(report.exits.len(), 1);
    }

    #[test]
    fn test_evacuation_fails_without_exits() {
        let (planner, _rx) = test_planner();

        // A2 is configured with no exits
        let report = planner.validate_evacuation_routes("A2").unwrap();
        assert!(!report.has_valid_routes);
    }

    #[test]
    fn test_evacuation_fails_when_too_occupied() {
        let (mut planner, _rx) = test_planner();

        // Fill 80 of 100 area units: accessible ratio 0.2 < 0.3
        planner.add_object("A1", spec(10.0, 4.0, 1.0, 0.0, 0.0), 100).unwrap();
        planner.add_object("A1", spec(10.0, 4.0, 1.0, 0.0, 4.0), 101).unwrap();

        let report = planner.validate_evacuation_routes("A1").unwrap();
        assert!(!report.has_valid_routes);
        assert!((report.accessible_ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_reports_density_and_evacuation() {
        let (mut planner, _rx) = test_planner();

        let report = planner.optimize_layout("A1").unwrap();
        assert!(report.suggestions.is_empty());

        planner.add_object("A1", spec(10.0, 4.0, 1.0, 0.0, 0.0), 100).unwrap();
        planner.add_object("A1", spec(10.0, 4.0, 1.0, 0.0, 4.0), 101).unwrap();

        let report = planner.optimize_layout("A1").unwrap();
        assert_eq!(report.occupied_space, 80.0);
        assert_eq!(report.accessible_area, 20.0);
        assert_eq!(report.suggestions.len(), 2);
        assert!(matches!(report.suggestions[0], LayoutSuggestion::DensityWarning { .. }));
        assert!(matches!(report.suggestions[1], LayoutSuggestion::EvacuationWarning { .. }));
    }

    #[test]
    fn test_suggestion_wire_format() {
        let suggestion = LayoutSuggestion::DensityWarning {
            message: "too dense".into(),
            current_value: 0.8,
            recommended_max: 0.7,
        };
        let value = serde_json::to_value(&suggestion).unwrap();
        assert_eq!(value["type"], serde_json::json!("density_warning"));
        assert_eq!(value["currentValue"], serde_json::json!(0.8));
    }
}
