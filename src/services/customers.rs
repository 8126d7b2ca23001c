//! Virtual customer population and zone heat-map aggregation
//!
//! Agents are spawned with a behavior pattern drawn uniformly from the
//! configured set. Interactions and purchases are Bernoulli trials on the
//! pattern's probabilities. When an agent departs, its dwell time is split
//! evenly across the zones it visited and folded into the heat map; the
//! heat map itself only ever grows.

use crate::domain::events::{
    CustomerEnteredPayload, CustomerEvent, CustomerInteractionPayload, CustomerLeftPayload,
    CustomerMovedPayload, CustomerPurchasePayload,
};
use crate::domain::types::{new_id, BehaviorPattern, CustomerAgent, HeatMapEntry, ZoneRegistry};
use crate::io::event_channel::EventSender;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

pub struct CustomerSimulation {
    agents: HashMap<String, CustomerAgent>,
    patterns: Vec<BehaviorPattern>,
    /// Cumulative per-zone aggregates, never reset
    heat_map: HashMap<String, HeatMapEntry>,
    events: EventSender,
}

impl CustomerSimulation {
    pub fn new(zones: &ZoneRegistry, patterns: Vec<BehaviorPattern>, events: EventSender) -> Self {
        let heat_map =
            zones.iter().map(|z| (z.id.clone(), HeatMapEntry::default())).collect();
        Self { agents: HashMap::new(), patterns, heat_map, events }
    }

    /// Create a new agent with a uniformly sampled behavior pattern.
    ///
    /// Returns the new agent id.
    pub fn spawn<R: Rng>(&mut self, rng: &mut R, ts: u64) -> String {
        let pattern = &self.patterns[rng.gen_range(0..self.patterns.len())];
        let agent = CustomerAgent::new(new_id("customer"), &pattern.name, ts);
        let id = agent.id.clone();

        debug!(customer_id = %id, pattern = %agent.pattern, "customer_entered");
        self.events.send_customer(CustomerEvent::Entered(CustomerEnteredPayload {
            customer_id: id.clone(),
            pattern: agent.pattern.clone(),
            entry_time: ts,
        }));

        self.agents.insert(id.clone(), agent);
        id
    }

    /// Move an agent into a zone, counting the visit in the heat map.
    ///
    /// Unknown agent or unknown zone is a `None` no-op.
    pub fn move_to(&mut self, customer_id: &str, zone: &str, ts: u64) -> Option<()> {
        if !self.heat_map.contains_key(zone) {
            debug!(customer_id = %customer_id, zone = %zone, "move_to_unknown_zone");
            return None;
        }
        let agent = self.agents.get_mut(customer_id)?;

        let from_zone = agent.current_zone.replace(zone.to_string());
        if !agent.visited_zones.iter().any(|z| z == zone) {
            agent.visited_zones.push(zone.to_string());
        }

        if let Some(entry) = self.heat_map.get_mut(zone) {
            entry.visits += 1;
        }

        self.events.send_customer(CustomerEvent::Moved(CustomerMovedPayload {
            customer_id: customer_id.to_string(),
            from_zone,
            to_zone: zone.to_string(),
            timestamp: ts,
        }));
        Some(())
    }

    /// Run one interaction trial for an agent.
    ///
    /// Returns `Some(true)` when the trial succeeded, `Some(false)` when it
    /// came up empty, `None` for an unknown agent or one not in a zone.
    pub fn interact<R: Rng>(&mut self, customer_id: &str, rng: &mut R, ts: u64) -> Option<bool> {
        let agent = self.agents.get_mut(customer_id)?;
        let zone = agent.current_zone.clone()?;
        let probability = self
            .patterns
            .iter()
            .find(|p| p.name == agent.pattern)
            .map(|p| p.interaction_probability)?;

        if !rng.gen_bool(probability) {
            return Some(false);
        }

        agent.interactions += 1;
        let count = agent.interactions;
        if let Some(entry) = self.heat_map.get_mut(&zone) {
            entry.interactions += 1;
        }

        self.events.send_customer(CustomerEvent::Interaction(CustomerInteractionPayload {
            customer_id: customer_id.to_string(),
            zone,
            timestamp: ts,
            interaction_count: count,
        }));
        Some(true)
    }

    /// Run one purchase trial for an agent. Same contract as `interact`.
    pub fn purchase<R: Rng>(&mut self, customer_id: &str, rng: &mut R, ts: u64) -> Option<bool> {
        let agent = self.agents.get_mut(customer_id)?;
        let zone = agent.current_zone.clone()?;
        let probability = self
            .patterns
            .iter()
            .find(|p| p.name == agent.pattern)
            .map(|p| p.purchase_probability)?;

        if !rng.gen_bool(probability) {
            return Some(false);
        }

        agent.purchases += 1;
        let count = agent.purchases;
        if let Some(entry) = self.heat_map.get_mut(&zone) {
            entry.purchases += 1;
        }

        self.events.send_customer(CustomerEvent::Purchase(CustomerPurchasePayload {
            customer_id: customer_id.to_string(),
            zone,
            timestamp: ts,
            purchase_count: count,
        }));
        Some(true)
    }

    /// Remove an agent, folding its lifetime stats into the heat map.
    ///
    /// Dwell time is distributed evenly across all visited zones. Unknown
    /// agent is a `None` no-op.
    pub fn depart(&mut self, customer_id: &str, ts: u64) -> Option<CustomerLeftPayload> {
        let agent = self.agents.remove(customer_id)?;
        let time_in_store_ms = ts.saturating_sub(agent.entry_time);

        if !agent.visited_zones.is_empty() {
            let share = time_in_store_ms as f64 / agent.visited_zones.len() as f64;
            for zone in &agent.visited_zones {
                if let Some(entry) = self.heat_map.get_mut(zone) {
                    entry.total_time_ms += share;
                }
            }
        }

        let payload = CustomerLeftPayload {
            customer_id: customer_id.to_string(),
            time_in_store_ms,
            visited_zones: agent.visited_zones.iter().cloned().collect(),
            interactions: agent.interactions,
            purchases: agent.purchases,
        };

        debug!(customer_id = %customer_id, dwell_ms = %time_in_store_ms, "customer_left");
        self.events.send_customer(CustomerEvent::Left(payload.clone()));
        Some(payload)
    }

    pub fn agent(&self, customer_id: &str) -> Option<&CustomerAgent> {
        self.agents.get(customer_id)
    }

    pub fn active_count(&self) -> usize {
        self.agents.len()
    }

    /// Ids of all active agents, for the autonomous behavior tick
    pub fn active_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn heat_map_entry(&self, zone: &str) -> Option<&HeatMapEntry> {
        self.heat_map.get(zone)
    }

    /// Population, heat map, and pattern distribution for the snapshot
    pub fn snapshot(&self) -> Value {
        let heat_map: serde_json::Map<String, Value> = self
            .heat_map
            .iter()
            .map(|(zone, entry)| {
                (zone.clone(), serde_json::to_value(entry).unwrap_or(Value::Null))
            })
            .collect();

        let distribution: Vec<Value> = self
            .patterns
            .iter()
            .map(|pattern| {
                let count =
                    self.agents.values().filter(|a| a.pattern == pattern.name).count();
                json!({ "pattern": pattern.name, "count": count })
            })
            .collect();

        json!({
            "totalCustomers": self.agents.len(),
            "heatMap": heat_map,
            "patternDistribution": distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;
    use crate::domain::types::Zone;
    use crate::io::event_channel::create_event_channel;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tokio::sync::mpsc;

    fn test_zones() -> ZoneRegistry {
        ZoneRegistry::new(
            ["A1", "A2", "B1"]
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

    fn pattern(name: &str, interaction: f64, purchase: f64) -> BehaviorPattern {
        BehaviorPattern {
            name: name.into(),
            avg_dwell_ms: 600_000,
            interaction_probability: interaction,
            purchase_probability: purchase,
        }
    }

    fn test_sim(patterns: Vec<BehaviorPattern>) -> (CustomerSimulation, mpsc::Receiver<DomainEvent>)
    {
        let (sender, rx) = create_event_channel(256);
        (CustomerSimulation::new(&test_zones(), patterns, sender), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<DomainEvent>) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn test_spawn_registers_agent_and_emits() {
        let (mut sim, mut rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let id = sim.spawn(&mut rng, 1000);

        assert_eq!(sim.active_count(), 1);
        let agent = sim.agent(&id).unwrap();
        assert_eq!(agent.pattern, "browser");
        assert_eq!(agent.entry_time, 1000);
        assert!(agent.current_zone.is_none());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name(), "customer_entered");
    }

    #[test]
    fn test_move_counts_visits_and_tracks_zones() {
        let (mut sim, mut rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 1000);
        drain(&mut rx);

        sim.move_to(&id, "A1", 2000).unwrap();
        sim.move_to(&id, "A2", 3000).unwrap();
        sim.move_to(&id, "A1", 4000).unwrap();

        let agent = sim.agent(&id).unwrap();
        assert_eq!(agent.current_zone.as_deref(), Some("A1"));
        // Re-entering a zone does not duplicate it in the visited set
        assert_eq!(agent.visited_zones.len(), 2);
        // ... but every move counts as a visit in the heat map
        assert_eq!(sim.heat_map_entry("A1").unwrap().visits, 2);
        assert_eq!(sim.heat_map_entry("A2").unwrap().visits, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        match &events[2] {
            DomainEvent::Customer(CustomerEvent::Moved(p)) => {
                assert_eq!(p.from_zone.as_deref(), Some("A2"));
                assert_eq!(p.to_zone, "A1");
            }
            other => panic!("expected customer_moved, got {other:?}"),
        }
    }

    #[test]
    fn test_interact_and_purchase_certain_probabilities() {
        let (mut sim, mut rx) = test_sim(vec![pattern("determined", 1.0, 1.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 1000);
        sim.move_to(&id, "B1", 1500).unwrap();
        drain(&mut rx);

        assert_eq!(sim.interact(&id, &mut rng, 2000), Some(true));
        assert_eq!(sim.purchase(&id, &mut rng, 2500), Some(true));

        let agent = sim.agent(&id).unwrap();
        assert_eq!(agent.interactions, 1);
        assert_eq!(agent.purchases, 1);
        let entry = sim.heat_map_entry("B1").unwrap();
        assert_eq!(entry.interactions, 1);
        assert_eq!(entry.purchases, 1);

        let events = drain(&mut rx);
        assert_eq!(events[0].event_name(), "customer_interaction");
        assert_eq!(events[1].event_name(), "customer_purchase");
    }

    #[test]
    fn test_zero_probability_trials_never_succeed() {
        let (mut sim, mut rx) = test_sim(vec![pattern("ghost", 0.0, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let id = sim.spawn(&mut rng, 1000);
        sim.move_to(&id, "A1", 1500).unwrap();
        drain(&mut rx);

        for _ in 0..50 {
            assert_eq!(sim.interact(&id, &mut rng, 2000), Some(false));
            assert_eq!(sim.purchase(&id, &mut rng, 2000), Some(false));
        }
        assert_eq!(sim.heat_map_entry("A1").unwrap().interactions, 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_trials_require_a_zone() {
        let (mut sim, _rx) = test_sim(vec![pattern("browser", 1.0, 1.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 1000);

        // Agent has not entered any zone yet
        assert!(sim.interact(&id, &mut rng, 2000).is_none());
        assert!(sim.purchase(&id, &mut rng, 2000).is_none());
    }

    #[test]
    fn test_depart_single_zone_gets_full_dwell() {
        // Scenario: spawn -> move A1 -> depart; A1 gets one visit and the
        // full elapsed dwell, no split
        let (mut sim, mut rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 1000);
        sim.move_to(&id, "A1", 1000).unwrap();
        drain(&mut rx);

        let summary = sim.depart(&id, 61_000).unwrap();
        assert_eq!(summary.time_in_store_ms, 60_000);
        assert_eq!(summary.visited_zones, vec!["A1"]);

        let entry = sim.heat_map_entry("A1").unwrap();
        assert_eq!(entry.visits, 1);
        assert!((entry.total_time_ms - 60_000.0).abs() < 1e-9);
        assert_eq!(sim.active_count(), 0);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name(), "customer_left");
    }

    #[test]
    fn test_depart_splits_dwell_across_visited_zones() {
        let (mut sim, _rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 0);
        sim.move_to(&id, "A1", 0).unwrap();
        sim.move_to(&id, "A2", 0).unwrap();
        sim.move_to(&id, "B1", 0).unwrap();

        sim.depart(&id, 90_000).unwrap();

        for zone in ["A1", "A2", "B1"] {
            let entry = sim.heat_map_entry(zone).unwrap();
            assert!((entry.total_time_ms - 30_000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_agent_operations_are_noops() {
        let (mut sim, mut rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert!(sim.move_to("ghost", "A1", 1000).is_none());
        assert!(sim.interact("ghost", &mut rng, 1000).is_none());
        assert!(sim.purchase("ghost", &mut rng, 1000).is_none());
        assert!(sim.depart("ghost", 1000).is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_move_to_unknown_zone_is_noop() {
        let (mut sim, mut rx) = test_sim(vec![pattern("browser", 0.3, 0.2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = sim.spawn(&mut rng, 1000);
        drain(&mut rx);

        assert!(sim.move_to(&id, "Z9", 2000).is_none());
        assert!(sim.agent(&id).unwrap().current_zone.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_heat_map_counters_never_decrease() {
        let (mut sim, _rx) = test_sim(vec![pattern("determined", 1.0, 1.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let mut last_visits = 0;
        let mut last_time = 0.0;
        for round in 0..20u64 {
            let id = sim.spawn(&mut rng, round * 1000);
            sim.move_to(&id, "A1", round * 1000).unwrap();
            sim.interact(&id, &mut rng, round * 1000);
            sim.depart(&id, round * 1000 + 500);

            let entry = sim.heat_map_entry("A1").unwrap();
            assert!(entry.visits >= last_visits);
            assert!(entry.total_time_ms >= last_time);
            last_visits = entry.visits;
            last_time = entry.total_time_ms;
        }
        assert_eq!(sim.heat_map_entry("A1").unwrap().visits, 20);
    }

    #[test]
    fn test_snapshot_shape() {
        let (mut sim, _rx) =
            test_sim(vec![pattern("browser", 0.3, 0.2), pattern("rusher", 0.9, 0.5)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        sim.spawn(&mut rng, 1000);

        let snapshot = sim.snapshot();
        assert_eq!(snapshot["totalCustomers"], serde_json::json!(1));
        assert!(snapshot["heatMap"]["A1"]["visits"].is_u64());
        assert_eq!(snapshot["patternDistribution"].as_array().unwrap().len(), 2);
    }
}
