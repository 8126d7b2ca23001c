//! The simulation world
//!
//! One struct owns every domain registry - sensors, security, inventory,
//! customers, layout - plus the RNG driving the stochastic parts. It is
//! constructed once at startup and mutated only by the engine task, so no
//! domain state ever needs a lock.

use crate::domain::types::ZoneRegistry;
use crate::infra::config::Config;
use crate::io::event_channel::EventSender;
use crate::services::customers::CustomerSimulation;
use crate::services::inventory::InventorySystem;
use crate::services::layout::LayoutPlanner;
use crate::services::security::SecuritySystem;
use crate::services::sensors::SensorManager;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

/// Probability that the behavior tick spawns a new customer
const SPAWN_PROBABILITY: f64 = 0.3;
/// Probability that an active customer wanders to another zone per tick
const WANDER_PROBABILITY: f64 = 0.2;
/// Probability that an active customer departs per tick
const DEPART_PROBABILITY: f64 = 0.1;

pub struct World {
    pub zones: ZoneRegistry,
    pub sensors: SensorManager,
    pub security: SecuritySystem,
    pub inventory: InventorySystem,
    pub customers: CustomerSimulation,
    pub layout: LayoutPlanner,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(config: &Config, events: EventSender, ts: u64) -> Self {
        let mut rng = match config.seed() {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let zones = ZoneRegistry::new(config.zones().to_vec());
        let sensors = SensorManager::new(&zones, &mut rng, ts);
        let security = SecuritySystem::new(&zones, events.clone());
        let inventory = InventorySystem::new(events.clone());
        let customers =
            CustomerSimulation::new(&zones, config.patterns().to_vec(), events.clone());
        let layout = LayoutPlanner::new(&zones, events, ts);

        Self { zones, sensors, security, inventory, customers, layout, rng }
    }

    /// One sensor tick: perturb readings, feed motion into security, expire
    /// recording quiet windows.
    pub fn sensor_tick(&mut self, ts: u64) {
        let motions = self.sensors.tick(&mut self.rng, ts);
        for (zone, value) in motions {
            self.security.report_motion(&zone, value, ts);
        }
        self.security.expire_recordings(ts);
    }

    /// One autonomous customer behavior tick: occasional spawns, interaction
    /// and purchase trials for everyone, wandering, departures.
    pub fn customer_tick(&mut self, ts: u64) {
        if self.rng.gen_bool(SPAWN_PROBABILITY) {
            let id = self.customers.spawn(&mut self.rng, ts);
            if let Some(zone) = self.random_zone() {
                self.customers.move_to(&id, &zone, ts);
            }
        }

        for id in self.customers.active_ids() {
            self.customers.interact(&id, &mut self.rng, ts);
            self.customers.purchase(&id, &mut self.rng, ts);

            if self.rng.gen_bool(WANDER_PROBABILITY) {
                let current = self
                    .customers
                    .agent(&id)
                    .and_then(|a| a.current_zone.clone());
                if let Some(zone) = self.random_zone() {
                    if current.as_deref() != Some(zone.as_str()) {
                        self.customers.move_to(&id, &zone, ts);
                    }
                }
            }

            if self.rng.gen_bool(DEPART_PROBABILITY) {
                self.customers.depart(&id, ts);
            }
        }
    }

    /// Spawn one customer on behalf of a client command
    pub fn customer_spawn(&mut self, ts: u64) -> String {
        self.customers.spawn(&mut self.rng, ts)
    }

    fn random_zone(&mut self) -> Option<String> {
        if self.zones.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.zones.len());
        self.zones.iter().nth(index).map(|z| z.id.clone())
    }

    /// Full world snapshot: sensor groups at the top level plus one key per
    /// domain. Used for both `initial_data` and `status_update` frames.
    pub fn snapshot(&self) -> Value {
        let mut data = match self.sensors.snapshot() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        data.insert("security".to_string(), self.security.snapshot());
        data.insert("inventory".to_string(), self.inventory.snapshot());
        data.insert("customers".to_string(), self.customers.snapshot());
        data.insert("layout".to_string(), self.layout.snapshot());
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::event_channel::create_event_channel;

    fn test_world() -> World {
        let (sender, _rx) = create_event_channel(1024);
        let config = Config::default().with_seed(42);
        World::new(&config, sender, 1000)
    }

    #[test]
    fn test_snapshot_merges_all_domains() {
        let world = test_world();
        let snapshot = world.snapshot();

        for key in
            ["temperature", "humidity", "pressure", "motion", "stock", "security", "inventory", "customers", "layout"]
        {
            assert!(snapshot.get(key).is_some(), "snapshot missing {key}");
        }
        assert_eq!(snapshot["customers"]["totalCustomers"], serde_json::json!(0));
    }

    #[test]
    fn test_sensor_tick_feeds_security() {
        let mut world = test_world();

        // With p=0.3 per zone per tick, 50 ticks make motion all but certain
        for tick in 0..50u64 {
            world.sensor_tick(2000 + tick * 1000);
        }
        assert!(world.security.alert_count() > 0);
    }

    #[test]
    fn test_customer_tick_spawns_and_departs() {
        let mut world = test_world();

        for tick in 0..100u64 {
            world.customer_tick(2000 + tick * 5000);
        }
        // Population changed at some point; heat map accumulated visits
        let total_visits: u64 = world
            .zones
            .ids()
            .iter()
            .filter_map(|z| world.customers.heat_map_entry(z))
            .map(|e| e.visits)
            .sum();
        assert!(total_visits > 0);
    }

    #[test]
    fn test_seeded_worlds_agree() {
        let (sender_a, _rx_a) = create_event_channel(1024);
        let (sender_b, _rx_b) = create_event_channel(1024);
        let config = Config::default().with_seed(7);

        let mut a = World::new(&config, sender_a, 1000);
        let mut b = World::new(&config, sender_b, 1000);
        for tick in 0..10u64 {
            a.sensor_tick(2000 + tick * 1000);
            b.sensor_tick(2000 + tick * 1000);
        }

        assert_eq!(a.snapshot()["temperature"], b.snapshot()["temperature"]);
    }
}
