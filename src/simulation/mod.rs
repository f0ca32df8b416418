//! Beacon delivery simulation core module.
//!
//! This module runs one periodic-beacon experiment on a deterministic
//! discrete-event timeline. It integrates:
//! - Piecewise constant-velocity mobility (scene file or random waypoint)
//! - A one-hop broadcast/unicast datagram transport stand-in
//! - Per-transmitter beacon generators with expected-coverage accounting
//! - Receive-side accounting of beacons actually delivered in coverage
//! - Once-per-second throughput sampling into CSV rows
//! - Constant-bit-rate sink flows with a per-flow monitor
//!
//! ## Module Organization
//!
//! - `types`: Shared data structures (vectors, datagrams, events, errors)
//! - `geometry`: Planar distance, motion test, safety range
//! - `scheduler`: Event queue ordered by time then insertion
//! - `mobility`: Mobility oracle trait and trajectory model
//! - `transport`: Sockets, addresses and datagram delivery
//! - `accounting`: Send/receive/coverage counters
//! - `beacon`: Beacon generator state machine
//! - `reception`: Beacon reception accountant
//! - `sampler`: Throughput sampler
//! - `sink_traffic`: Sink flows
//! - `flow_monitor`: Per-flow statistics and the run summary
//! - `report`: CSV output
//! - `network`: Simulation runner tying everything together
//!
//! ## Public API
//!
//! The main entry point is [`Simulation`]: build it from a configuration, the
//! transmitter ids and a mobility oracle, then call `run`.

pub mod accounting;
pub mod beacon;
pub mod flow_monitor;
pub mod geometry;
pub mod mobility;
pub mod network;
pub mod reception;
pub mod report;
pub mod sampler;
pub mod scheduler;
pub mod sink_traffic;
pub mod transport;
pub mod types;

pub use mobility::TrajectoryMobility;
pub use network::Simulation;
pub use types::NodeId;
