//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method swaps the per-interval counters for a consistent
/// rate snapshot; totals and histograms are cumulative.
pub struct Metrics {
    /// Total commands ever processed (monotonic)
    commands_total: AtomicU64,
    /// Commands since last report (reset on report)
    commands_since_report: AtomicU64,
    /// Commands rejected with an error envelope (monotonic)
    commands_rejected: AtomicU64,
    /// Sum of command handling latencies in microseconds (monotonic)
    command_latency_sum_us: AtomicU64,
    /// Max command handling latency in microseconds (monotonic)
    command_latency_max_us: AtomicU64,
    /// Command handling latency histogram (cumulative)
    command_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Domain events drained from the event channel (monotonic)
    events_emitted: AtomicU64,
    /// Frames delivered to connection queues (monotonic)
    frames_sent: AtomicU64,
    /// Frames dropped because a connection queue was full (monotonic)
    frames_dropped: AtomicU64,
    /// Connections ever opened (monotonic)
    connections_opened: AtomicU64,
    /// Connections closed (monotonic)
    connections_closed: AtomicU64,
    /// Simulation ticks run, all domains (monotonic)
    ticks_total: AtomicU64,
    /// Virtual customers currently on the floor (gauge, set by the engine)
    active_customers: AtomicU64,
    /// Alerts currently in active status (gauge, set by the engine)
    active_alerts: AtomicU64,
    /// Last report instant for rate calculation
    last_report: std::sync::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            commands_total: AtomicU64::new(0),
            commands_since_report: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            command_latency_sum_us: AtomicU64::new(0),
            command_latency_max_us: AtomicU64::new(0),
            command_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            events_emitted: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            ticks_total: AtomicU64::new(0),
            active_customers: AtomicU64::new(0),
            active_alerts: AtomicU64::new(0),
            last_report: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Record one handled command and its processing latency
    pub fn record_command(&self, latency_us: u64) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
        self.commands_since_report.fetch_add(1, Ordering::Relaxed);
        self.command_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.command_latency_max_us, latency_us);
        self.command_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish world population gauges for reporting (engine only)
    pub fn set_world_gauges(&self, active_customers: usize, active_alerts: usize) {
        self.active_customers.store(active_customers as u64, Ordering::Relaxed);
        self.active_alerts.store(active_alerts as u64, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .load(Ordering::Relaxed)
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }

    /// Produce a consistent snapshot and reset the per-interval counters
    pub fn report(&self) -> MetricsSummary {
        let commands_interval = self.commands_since_report.swap(0, Ordering::Relaxed);
        let elapsed = {
            let mut last = self.last_report.lock().unwrap_or_else(|e| e.into_inner());
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        let commands_per_sec =
            if elapsed > 0.0 { commands_interval as f64 / elapsed } else { 0.0 };

        let commands_total = self.commands_total.load(Ordering::Relaxed);
        let latency_sum = self.command_latency_sum_us.load(Ordering::Relaxed);
        let avg_command_latency_us =
            if commands_total > 0 { latency_sum / commands_total } else { 0 };
        let lat_buckets = load_buckets(&self.command_latency_buckets);

        MetricsSummary {
            commands_total,
            commands_per_sec,
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            avg_command_latency_us,
            max_command_latency_us: self.command_latency_max_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            active_customers: self.active_customers.load(Ordering::Relaxed) as usize,
            active_alerts: self.active_alerts.load(Ordering::Relaxed) as usize,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub commands_total: u64,
    pub commands_per_sec: f64,
    pub commands_rejected: u64,
    pub avg_command_latency_us: u64,
    pub max_command_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub events_emitted: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub ticks_total: u64,
    pub active_customers: usize,
    pub active_alerts: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            commands_total = %self.commands_total,
            commands_per_sec = format!("{:.2}", self.commands_per_sec),
            commands_rejected = %self.commands_rejected,
            avg_latency_us = %self.avg_command_latency_us,
            p99_latency_us = %self.lat_p99_us,
            events_emitted = %self.events_emitted,
            frames_sent = %self.frames_sent,
            frames_dropped = %self.frames_dropped,
            connections = %self.active_connections,
            ticks = %self.ticks_total,
            customers = %self.active_customers,
            alerts = %self.active_alerts,
            "metrics_report"
        );
    }
}
