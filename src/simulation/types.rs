//! Type definitions for the simulation.
//!
//! Contains the data structures shared across the simulation:
//! - Node identity and 3D motion vectors
//! - Datagrams exchanged over the simulated transport
//! - Scheduled event payloads
//! - The simulation error type

use serde::Deserialize;
use std::net::SocketAddrV4;
use std::time::Duration;

/// Scene-level node identifier (as written in the scene file).
pub type NodeId = u32;

/// Position of a node inside the transmitter set. Stable for the whole run.
pub type NodeIndex = usize;

/// Index of a socket in the transport's socket table.
pub type SocketId = usize;

/// Identifier of a sink traffic flow (index into the flow list).
pub type FlowId = usize;

/// Bytes of IPv4 (20) + UDP (8) header carried by every datagram on the wire.
pub const UDP_IP_HEADER_BYTES: u64 = 28;

/// Simple 3D vector used for both positions (m) and velocities (m/s).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// `self + v * secs`, the position reached after travelling at `v` for `secs`.
    pub fn advanced(&self, v: &Vector3, secs: f64) -> Vector3 {
        Vector3 {
            x: self.x + v.x * secs,
            y: self.y + v.y * secs,
            z: self.z + v.z * secs,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A datagram in flight or queued at a receiving socket.
///
/// The sender identity is not part of the payload: it travels as address
/// metadata (`source`), the same way a UDP socket reports the peer address.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Application payload size (bytes).
    pub payload_size: u32,
    /// Address of the sending socket.
    pub source: SocketAddrV4,
    /// Simulated time at which the sender handed the datagram to the transport.
    pub sent_at: Duration,
    /// Sink flow this datagram belongs to, if any. Beacons carry `None`.
    pub flow: Option<FlowId>,
}

/// Events carried by the discrete-event scheduler.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Beacon generator tick for one transmitter.
    GenerateBeacon(NodeIndex),
    /// Arrival of a datagram at a receiving socket.
    Deliver { socket: SocketId, datagram: Datagram },
    /// Once-per-second throughput sample.
    SampleThroughput,
    /// Constant-bit-rate send for one sink flow.
    SendSinkPacket(FlowId),
    /// End of a sink flow's active period.
    StopSinkFlow(FlowId),
}

/// Errors that abort a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// The mobility oracle has no position/velocity for this node.
    MissingMobility(NodeId),
    /// A socket id that the transport never handed out.
    UnknownSocket(SocketId),
    /// A node index outside the transmitter set.
    UnknownNode(NodeIndex),
    /// Sink flows need two distinct nodes each.
    TooFewNodes { nodes: usize, sinks: u32 },
    /// The node already has a socket bound on this port.
    PortInUse { node: NodeId, port: u16 },
    /// No local port left for the source of this flow.
    PortsExhausted(FlowId),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::MissingMobility(node) => write!(f, "No mobility data for node {}", node),
            SimulationError::UnknownSocket(id) => write!(f, "Unknown socket {}", id),
            SimulationError::UnknownNode(index) => write!(f, "Unknown node index {}", index),
            SimulationError::TooFewNodes { nodes, sinks } => write!(f, "{} sinks need at least {} nodes, got {}", sinks, 2 * sinks, nodes),
            SimulationError::PortInUse { node, port } => write!(f, "Port {} is already bound on node {}", port, node),
            SimulationError::PortsExhausted(flow) => write!(f, "No source port left for sink flow {}", flow),
        }
    }
}

impl std::error::Error for SimulationError {}
