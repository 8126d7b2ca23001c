//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{BehaviorPattern, Zone};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr(), port: default_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Sensor tick and status_update broadcast interval (ms)
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Autonomous customer behavior tick interval (ms)
    #[serde(default = "default_customer_interval_ms")]
    pub customer_interval_ms: u64,
    /// Stock usage prediction tick interval (ms)
    #[serde(default = "default_prediction_interval_ms")]
    pub prediction_interval_ms: u64,
    /// Evacuation-route validation tick interval (ms)
    #[serde(default = "default_layout_interval_ms")]
    pub layout_interval_ms: u64,
    /// Fixed RNG seed for reproducible simulation runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_customer_interval_ms() -> u64 {
    5000
}

fn default_prediction_interval_ms() -> u64 {
    3_600_000
}

fn default_layout_interval_ms() -> u64 {
    300_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            customer_interval_ms: default_customer_interval_ms(),
            prediction_interval_ms: default_prediction_interval_ms(),
            layout_interval_ms: default_layout_interval_ms(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9464
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier carried as a label in metrics output
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "floor-twin".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_zones")]
    pub zones: Vec<Zone>,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<BehaviorPattern>,
}

fn default_zones() -> Vec<Zone> {
    ["A1", "A2", "B1", "B2"]
        .iter()
        .map(|id| Zone {
            id: id.to_string(),
            width: 10.0,
            length: 10.0,
            height: 3.0,
            exits: crate::domain::types::default_exits(),
        })
        .collect()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            server: ServerConfig::default(),
            simulation: SimulationConfig::default(),
            metrics: MetricsConfig::default(),
            zones: default_zones(),
            patterns: default_patterns(),
        }
    }
}

fn default_patterns() -> Vec<BehaviorPattern> {
    vec![
        BehaviorPattern {
            name: "browser".to_string(),
            avg_dwell_ms: 1_800_000,
            interaction_probability: 0.3,
            purchase_probability: 0.2,
        },
        BehaviorPattern {
            name: "determined".to_string(),
            avg_dwell_ms: 600_000,
            interaction_probability: 0.8,
            purchase_probability: 0.7,
        },
        BehaviorPattern {
            name: "rusher".to_string(),
            avg_dwell_ms: 300_000,
            interaction_probability: 0.9,
            purchase_probability: 0.5,
        },
    ]
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    listen_addr: String,
    port: u16,
    update_interval_ms: u64,
    customer_interval_ms: u64,
    prediction_interval_ms: u64,
    layout_interval_ms: u64,
    seed: Option<u64>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    zones: Vec<Zone>,
    patterns: Vec<BehaviorPattern>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            listen_addr: toml_config.server.listen_addr,
            port: toml_config.server.port,
            update_interval_ms: toml_config.simulation.update_interval_ms,
            customer_interval_ms: toml_config.simulation.customer_interval_ms,
            prediction_interval_ms: toml_config.simulation.prediction_interval_ms,
            layout_interval_ms: toml_config.simulation.layout_interval_ms,
            seed: toml_config.simulation.seed,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            zones: toml_config.zones,
            patterns: toml_config.patterns,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // An empty zone list makes every command unroutable
        anyhow::ensure!(!toml_config.zones.is_empty(), "config must define at least one zone");
        anyhow::ensure!(
            !toml_config.patterns.is_empty(),
            "config must define at least one behavior pattern"
        );

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path - falls back to defaults on failure
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        let config_path = Self::resolve_config_path(args);
        Self::load_from_path(&config_path)
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Socket address the frame listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval_ms
    }

    pub fn customer_interval_ms(&self) -> u64 {
        self.customer_interval_ms
    }

    pub fn prediction_interval_ms(&self) -> u64 {
        self.prediction_interval_ms
    }

    pub fn layout_interval_ms(&self) -> u64 {
        self.layout_interval_ms
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn patterns(&self) -> &[BehaviorPattern] {
        &self.patterns
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to pin the RNG seed
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
