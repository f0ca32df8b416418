//! Experiment configuration loaded from TOML.
//!
//! Every key is optional; a missing file section falls back to the defaults
//! of the highway scenario (40 vehicles, 10 s, 1500 x 300 m random waypoint).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::simulation::mobility::RandomWaypointParameters;
use crate::simulation::sink_traffic::{EPHEMERAL_PORT_BASE, MAX_SINK_FLOWS};
use crate::simulation::transport::TransportParameters;

/// Error type for configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulationSection {
    /// Simulated run length (s).
    pub total_time: f64,
    /// Seed for mobility, start jitter, sink start times and transport loss.
    pub seed: u64,
    /// Number of transmitters (ignored with a scene file).
    pub nodes: u32,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            total_time: 10.0,
            seed: 1,
            nodes: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BeaconSection {
    pub payload_size: u32,
    /// Beacon period (s).
    pub interval: f64,
    /// Beacons per transmitter. Derived from the run length when unset.
    pub count: Option<u32>,
    /// Safety range (m).
    pub safety_range: f64,
    /// Earliest generator start (s).
    pub start_time: f64,
    /// Upper bound of the per-generator start offset (µs).
    pub start_jitter_max_us: u64,
    pub port: u16,
}

impl Default for BeaconSection {
    fn default() -> Self {
        Self {
            payload_size: 200,
            interval: 0.1,
            count: None,
            safety_range: 145.0,
            start_time: 1.0,
            start_jitter_max_us: 10_000,
            port: 9080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransportSection {
    /// Radio range of the delivery stand-in (m).
    pub radio_range: f64,
    pub loss_probability: f64,
    pub latency_us: u64,
    pub latency_jitter_us: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            radio_range: 250.0,
            loss_probability: 0.0,
            latency_us: 100,
            latency_jitter_us: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RandomWaypointSection {
    pub width: f64,
    pub height: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub max_speed: f64,
    pub pause: f64,
}

impl Default for RandomWaypointSection {
    fn default() -> Self {
        let p = RandomWaypointParameters::default();
        Self {
            width: p.width,
            height: p.height,
            min_z: p.min_z,
            max_z: p.max_z,
            max_speed: p.max_speed,
            pause: p.pause,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SceneSection {
    /// Scene JSON, relative to the working directory.
    pub path: PathBuf,
}

/// Where node motion comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum MobilitySection {
    RandomWaypoint(RandomWaypointSection),
    Scene(SceneSection),
}

impl Default for MobilitySection {
    fn default() -> Self {
        MobilitySection::RandomWaypoint(RandomWaypointSection::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrafficSection {
    /// Run the constant-bit-rate sink flows alongside the beacons. Off by
    /// default, matching the `NONE` routing protocol label.
    pub enabled: bool,
    pub sinks: u32,
    pub rate_bps: u64,
    pub packet_size: u32,
    pub port: u16,
    /// When the flows stop (s). Defaults to the end of the run.
    pub stop_time: Option<f64>,
}

impl Default for TrafficSection {
    fn default() -> Self {
        Self {
            enabled: false,
            sinks: 10,
            rate_bps: 2048,
            packet_size: 64,
            port: 9,
            stop_time: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputSection {
    pub interval_csv: PathBuf,
    pub summary_csv: PathBuf,
    /// Written verbatim into the `RoutingProtocol` column.
    pub protocol_label: String,
    /// Written verbatim into the `TransmissionPower` column (dBm).
    pub tx_power: f64,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            interval_csv: PathBuf::from("vanet-routing.output.csv"),
            summary_csv: PathBuf::from("vanet-routing.output2.csv"),
            protocol_label: "NONE".to_string(),
            tx_power: 7.5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExperimentConfig {
    pub simulation: SimulationSection,
    pub beacon: BeaconSection,
    pub transport: TransportSection,
    pub mobility: MobilitySection,
    pub traffic: TrafficSection,
    pub output: OutputSection,
}

impl ExperimentConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::FileReadError(format!("{}: {}", config_path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExperimentConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check().map_err(ConfigError::ValidationError)
    }

    fn check(&self) -> Result<(), String> {
        let sim = &self.simulation;
        if !positive(sim.total_time) {
            return Err(format!("total-time must be positive, got {}", sim.total_time));
        }
        if sim.nodes == 0 && !matches!(self.mobility, MobilitySection::Scene(_)) {
            return Err("nodes must be at least 1".to_string());
        }

        let beacon = &self.beacon;
        if !positive(beacon.interval) {
            return Err(format!("beacon interval must be positive, got {}", beacon.interval));
        }
        if !non_negative(beacon.safety_range) {
            return Err(format!("safety-range must be non-negative, got {}", beacon.safety_range));
        }
        if !non_negative(beacon.start_time) {
            return Err(format!("beacon start-time must be non-negative, got {}", beacon.start_time));
        }

        let transport = &self.transport;
        if !(0.0..=1.0).contains(&transport.loss_probability) {
            return Err(format!("loss-probability must be within [0, 1], got {}", transport.loss_probability));
        }
        if !non_negative(transport.radio_range) {
            return Err(format!("radio-range must be non-negative, got {}", transport.radio_range));
        }

        if let MobilitySection::RandomWaypoint(rwp) = &self.mobility {
            if !non_negative(rwp.width) || !non_negative(rwp.height) {
                return Err(format!("random-waypoint box {} x {} must not be negative", rwp.width, rwp.height));
            }
            if rwp.min_z > rwp.max_z {
                return Err(format!("random-waypoint min-z {} exceeds max-z {}", rwp.min_z, rwp.max_z));
            }
            if !non_negative(rwp.max_speed) || !non_negative(rwp.pause) {
                return Err("random-waypoint max-speed and pause must be non-negative".to_string());
            }
        }

        let traffic = &self.traffic;
        if traffic.enabled {
            if traffic.rate_bps == 0 || traffic.packet_size == 0 {
                return Err("traffic rate-bps and packet-size must be positive".to_string());
            }
            if let Some(stop) = traffic.stop_time.filter(|&t| !positive(t)) {
                return Err(format!("traffic stop-time must be positive, got {}", stop));
            }
            if traffic.sinks > MAX_SINK_FLOWS {
                return Err(format!("at most {} sinks are supported, got {}", MAX_SINK_FLOWS, traffic.sinks));
            }
            // Beacon sockets are bound on every node, sinks and sources included.
            if traffic.port == beacon.port {
                return Err(format!("traffic port {} collides with the beacon port", traffic.port));
            }
            let source_ports = EPHEMERAL_PORT_BASE as u32..EPHEMERAL_PORT_BASE as u32 + traffic.sinks;
            if source_ports.contains(&(beacon.port as u32)) {
                return Err(format!(
                    "beacon port {} falls within the sink source ports {}..{}",
                    beacon.port, source_ports.start, source_ports.end
                ));
            }
            // Scene files bring their own node count; that case is checked at setup.
            if !matches!(self.mobility, MobilitySection::Scene(_)) && sim.nodes < 2 * traffic.sinks {
                return Err(format!("{} sinks need at least {} nodes, got {}", traffic.sinks, 2 * traffic.sinks, sim.nodes));
            }
        }

        Ok(())
    }

    pub fn total_time(&self) -> Duration {
        Duration::from_secs_f64(self.simulation.total_time)
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs_f64(self.beacon.interval)
    }

    pub fn beacon_start(&self) -> Duration {
        Duration::from_secs_f64(self.beacon.start_time)
    }

    /// Beacons per transmitter: the configured count, or as many intervals
    /// as fit between the start time and the end of the run.
    pub fn beacon_budget(&self) -> u32 {
        match self.beacon.count {
            Some(count) => count,
            None => {
                let span = (self.simulation.total_time - self.beacon.start_time).max(0.0);
                (span / self.beacon.interval).floor() as u32
            }
        }
    }

    pub fn sink_stop_time(&self) -> Duration {
        Duration::from_secs_f64(self.traffic.stop_time.unwrap_or(self.simulation.total_time))
    }

    pub fn transport_parameters(&self) -> TransportParameters {
        TransportParameters {
            radio_range: self.transport.radio_range,
            loss_probability: self.transport.loss_probability,
            latency: Duration::from_micros(self.transport.latency_us),
            latency_jitter: Duration::from_micros(self.transport.latency_jitter_us),
        }
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

impl From<&RandomWaypointSection> for RandomWaypointParameters {
    fn from(s: &RandomWaypointSection) -> Self {
        Self {
            width: s.width,
            height: s.height,
            min_z: s.min_z,
            max_z: s.max_z,
            max_speed: s.max_speed,
            pause: s.pause,
        }
    }
}
