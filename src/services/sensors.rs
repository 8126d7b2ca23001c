//! Synthetic per-zone sensor readings
//!
//! Every sensor tick perturbs each reading by a small bounded delta whose
//! span depends on the metric kind. Motion is resampled as a Bernoulli draw
//! rather than perturbed. This component never fails, it only produces
//! values; motion readings are handed back to the caller so the engine can
//! forward them to the security domain.

use crate::domain::types::{SensorKind, SensorReading, ZoneRegistry};
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-tick perturbation spans
const TEMPERATURE_DELTA: f64 = 0.25;
const HUMIDITY_DELTA: f64 = 1.0;
const PRESSURE_DELTA: f64 = 0.5;
/// Probability that a motion resample comes up positive
const MOTION_PROBABILITY: f64 = 0.3;
/// Probability that a stock-proxy reading shifts by one unit
const STOCK_SHIFT_PROBABILITY: f64 = 0.1;

/// Owner of all synthetic sensor state
pub struct SensorManager {
    /// readings[kind][reading_id] = reading, ids like `temp_A1`
    readings: HashMap<SensorKind, HashMap<String, SensorReading>>,
}

impl SensorManager {
    /// Seed every zone with a plausible base value per metric kind
    pub fn new<R: Rng>(zones: &ZoneRegistry, rng: &mut R, ts: u64) -> Self {
        let mut readings: HashMap<SensorKind, HashMap<String, SensorReading>> = HashMap::new();

        for kind in SensorKind::ALL {
            let per_zone = readings.entry(kind).or_default();
            for zone in zones.iter() {
                let value = match kind {
                    SensorKind::Temperature => 20.0 + rng.gen::<f64>() * 5.0,
                    SensorKind::Humidity => 50.0 + rng.gen::<f64>() * 20.0,
                    SensorKind::Pressure => 1013.0 + rng.gen::<f64>() * 10.0,
                    SensorKind::Motion => {
                        if rng.gen_bool(0.5) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    SensorKind::StockProxy => (rng.gen::<f64>() * 100.0).floor(),
                };
                per_zone.insert(
                    format!("{}_{}", kind.id_prefix(), zone.id),
                    SensorReading { zone: zone.id.clone(), value, last_updated: ts },
                );
            }
        }

        Self { readings }
    }

    /// Perturb every reading once.
    ///
    /// Returns the post-tick motion value per zone for forwarding to the
    /// security domain.
    pub fn tick<R: Rng>(&mut self, rng: &mut R, ts: u64) -> Vec<(String, f64)> {
        for kind in SensorKind::ALL {
            let Some(per_zone) = self.readings.get_mut(&kind) else { continue };
            for reading in per_zone.values_mut() {
                match kind {
                    SensorKind::Temperature => {
                        reading.value += rng.gen_range(-TEMPERATURE_DELTA..=TEMPERATURE_DELTA);
                    }
                    SensorKind::Humidity => {
                        reading.value += rng.gen_range(-HUMIDITY_DELTA..=HUMIDITY_DELTA);
                    }
                    SensorKind::Pressure => {
                        reading.value += rng.gen_range(-PRESSURE_DELTA..=PRESSURE_DELTA);
                    }
                    SensorKind::Motion => {
                        reading.value = if rng.gen_bool(MOTION_PROBABILITY) { 1.0 } else { 0.0 };
                    }
                    SensorKind::StockProxy => {
                        if rng.gen_bool(STOCK_SHIFT_PROBABILITY) {
                            reading.value += if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                        }
                    }
                }
                reading.last_updated = ts;
            }
        }

        self.motion_values()
    }

    /// Current motion value per zone
    pub fn motion_values(&self) -> Vec<(String, f64)> {
        self.readings
            .get(&SensorKind::Motion)
            .map(|per_zone| {
                per_zone.values().map(|r| (r.zone.clone(), r.value)).collect()
            })
            .unwrap_or_default()
    }

    /// Full reading set grouped by metric kind, keyed by reading id
    pub fn snapshot(&self) -> Value {
        let mut out = Map::new();
        for kind in SensorKind::ALL {
            let per_zone = self.readings.get(&kind);
            let entries: Map<String, Value> = per_zone
                .map(|m| {
                    m.iter()
                        .map(|(id, reading)| {
                            (id.clone(), serde_json::to_value(reading).unwrap_or(Value::Null))
                        })
                        .collect()
                })
                .unwrap_or_default();
            out.insert(kind.as_str().to_string(), Value::Object(entries));
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Zone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_zones() -> ZoneRegistry {
        ZoneRegistry::new(
            ["A1", "A2"]
                .iter()
                .map(|id| Zone {
                    id: id.to_string(),
                    width: 10.0,
                    length: 10.0,
                    height: 3.0,
                    exits: vec![],
                })
                .collect(),
        )
    }

    #[test]
    fn test_all_kinds_initialized_per_zone() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let sensors = SensorManager::new(&test_zones(), &mut rng, 100);

        let snapshot = sensors.snapshot();
        for kind in ["temperature", "humidity", "pressure", "motion", "stock"] {
            let group = snapshot.get(kind).and_then(|v| v.as_object()).unwrap();
            assert_eq!(group.len(), 2, "kind {kind} should cover both zones");
        }
        assert!(snapshot["temperature"]["temp_A1"]["value"].as_f64().unwrap() >= 20.0);
    }

    #[test]
    fn test_tick_perturbations_are_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sensors = SensorManager::new(&test_zones(), &mut rng, 100);

        for tick in 0..200 {
            let before = sensors.snapshot();
            sensors.tick(&mut rng, 101 + tick);
            let after = sensors.snapshot();

            for (kind, bound) in
                [("temperature", TEMPERATURE_DELTA), ("humidity", HUMIDITY_DELTA), ("pressure", PRESSURE_DELTA)]
            {
                for id in after[kind].as_object().unwrap().keys() {
                    let prev = before[kind][id]["value"].as_f64().unwrap();
                    let next = after[kind][id]["value"].as_f64().unwrap();
                    assert!(
                        (next - prev).abs() <= bound + 1e-9,
                        "{kind} moved {} in one tick",
                        (next - prev).abs()
                    );
                }
            }
        }
    }

    #[test]
    fn test_motion_values_cover_all_zones_with_binary_values() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut sensors = SensorManager::new(&test_zones(), &mut rng, 100);

        let motions = sensors.tick(&mut rng, 101);
        assert_eq!(motions.len(), 2);
        let mut zones: Vec<&str> = motions.iter().map(|(z, _)| z.as_str()).collect();
        zones.sort();
        assert_eq!(zones, vec!["A1", "A2"]);
        assert!(motions.iter().all(|(_, v)| *v == 0.0 || *v == 1.0));
    }

    #[test]
    fn test_tick_stamps_last_updated() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut sensors = SensorManager::new(&test_zones(), &mut rng, 100);
        sensors.tick(&mut rng, 250);

        let snapshot = sensors.snapshot();
        assert_eq!(snapshot["pressure"]["pres_A2"]["lastUpdated"], serde_json::json!(250));
    }
}
