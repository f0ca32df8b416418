use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::PathBuf;

use crate::common::config::{ExperimentConfig, MobilitySection, SceneSection};
use crate::common::scene::load_scene;
use crate::simulation::mobility::random_waypoint;
use crate::simulation::{NodeId, Simulation, TrajectoryMobility};

mod common;
mod simulation;

#[derive(Parser, Debug)]
#[command(version, about = "Periodic beacon delivery accounting for vehicular ad-hoc network experiments", long_about = None)]
struct Cli {
    /// Experiment configuration (TOML)
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Scene file (JSON); replaces the random-waypoint mobility model
    #[clap(long, value_name = "PATH")]
    scene: Option<PathBuf>,

    /// Simulated run length in seconds
    #[clap(long, value_name = "SECONDS")]
    total_time: Option<f64>,

    /// Number of vehicles for the random-waypoint model
    #[clap(long)]
    nodes: Option<u32>,

    #[clap(long)]
    seed: Option<u64>,

    #[clap(long, value_name = "PATH")]
    interval_csv: Option<PathBuf>,

    #[clap(long, value_name = "PATH")]
    summary_csv: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ExperimentConfig) {
        if let Some(path) = &self.scene {
            config.mobility = MobilitySection::Scene(SceneSection { path: path.clone() });
        }
        if let Some(total_time) = self.total_time {
            config.simulation.total_time = total_time;
        }
        if let Some(nodes) = self.nodes {
            config.simulation.nodes = nodes;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(path) = &self.interval_csv {
            config.output.interval_csv = path.clone();
        }
        if let Some(path) = &self.summary_csv {
            config.output.summary_csv = path.clone();
        }
    }
}

/// Transmitter ids (in transmitter order) and their trajectories.
fn build_mobility(config: &ExperimentConfig) -> anyhow::Result<(Vec<NodeId>, TrajectoryMobility)> {
    match &config.mobility {
        MobilitySection::RandomWaypoint(rwp) => {
            let nodes = config.simulation.nodes;
            let mobility = random_waypoint(nodes, &rwp.into(), config.total_time(), config.simulation.seed);
            Ok(((0..nodes).collect(), mobility))
        }
        MobilitySection::Scene(scene) => {
            let loaded = load_scene(&scene.path).with_context(|| format!("Failed to load scene {}", scene.path.display()))?;
            info!("Loaded scene {} with {} nodes", scene.path.display(), loaded.nodes.len());
            Ok((loaded.node_ids(), loaded.to_mobility()))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging setup; RUST_LOG overrides the defaults below.
    let crate_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("bsm_pdr_simulator"), crate_level)
        .parse_default_env()
        .init();

    info!("Starting up");

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration after command-line overrides")?;

    let (transmitters, mobility) = build_mobility(&config)?;
    let report = Simulation::new(&config, transmitters, mobility)
        .context("Failed to set up simulation")?
        .run()?;

    info!(
        "Done: {} samples, {} events, {} beacons sent, BSM PDR {} (interval CSV {}, summary CSV {})",
        report.samples,
        report.events_processed,
        report.accounting.total_beacons_sent(),
        report.summary.bsm_pdr,
        config.output.interval_csv.display(),
        config.output.summary_csv.display()
    );
    log::debug!(
        "Transport: {} sent, {} delivered, {} out of range, {} lost, {} at closed sockets; {} beacons from unknown senders",
        report.transport.datagrams_sent,
        report.transport.copies_delivered,
        report.transport.copies_out_of_range,
        report.transport.copies_lost,
        report.transport.arrivals_at_closed_socket,
        report.unresolved_senders
    );

    Ok(())
}
