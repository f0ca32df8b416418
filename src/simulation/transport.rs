//! Simulated datagram transport between node endpoints.
//!
//! Each node gets one IPv4 address from `10.1.0.0/16` and may bind one socket
//! per port. Sending a datagram fans it out to every node whose socket on the
//! destination port is open and which lies within the radio range of the
//! sender (planar distance, evaluated at send time). An optional Bernoulli
//! loss and a latency with uniform jitter are applied per receiver.
//!
//! This is a delivery stand-in, not a propagation model: there is no path
//! loss, no interference, and no multi-hop forwarding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use super::geometry::distance2;
use super::mobility::MobilityOracle;
use super::types::{Datagram, FlowId, NodeId, NodeIndex, SimulationError, SocketId};

/// Base of the address block handed out to nodes (host numbers start at 1).
pub const NETWORK_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);

/// Delivery parameters for the transport.
#[derive(Debug, Clone)]
pub struct TransportParameters {
    /// Maximum planar distance (m) at which a datagram can be received.
    pub radio_range: f64,
    /// Probability in `[0, 1]` that an otherwise deliverable copy is dropped.
    pub loss_probability: f64,
    /// Fixed one-hop latency.
    pub latency: Duration,
    /// Extra latency drawn uniformly from `[0, latency_jitter]` per copy.
    pub latency_jitter: Duration,
}

impl Default for TransportParameters {
    fn default() -> Self {
        Self {
            radio_range: 250.0,
            loss_probability: 0.0,
            latency: Duration::from_micros(100),
            latency_jitter: Duration::ZERO,
        }
    }
}

/// Which handler consumes datagrams queued at a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveHandler {
    /// Nothing registered; arrivals stay queued.
    None,
    /// Beacon reception accounting.
    Beacon,
    /// Sink traffic accounting.
    Sink,
}

#[derive(Debug)]
pub struct Socket {
    pub node_index: NodeIndex,
    pub node_id: NodeId,
    pub local: SocketAddrV4,
    pub peer: Option<SocketAddrV4>,
    pub open: bool,
    pub handler: ReceiveHandler,
    rx_queue: VecDeque<Datagram>,
}

impl Socket {
    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.rx_queue.len()
    }
}

/// A copy of a datagram accepted for delivery to `socket` after `delay`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub socket: SocketId,
    pub delay: Duration,
    pub datagram: Datagram,
}

#[derive(Debug, Default, Clone)]
pub struct TransportStats {
    pub datagrams_sent: u64,
    pub copies_delivered: u64,
    pub copies_out_of_range: u64,
    pub copies_lost: u64,
    pub arrivals_at_closed_socket: u64,
}

pub struct BroadcastTransport {
    params: TransportParameters,
    /// Node id for each node index.
    nodes: Vec<NodeId>,
    /// Address -> node index, built once at setup.
    interfaces: HashMap<Ipv4Addr, NodeIndex>,
    sockets: Vec<Socket>,
    bindings: HashMap<(NodeIndex, u16), SocketId>,
    rng: StdRng,
    stats: TransportStats,
}

impl BroadcastTransport {
    pub fn new(nodes: &[NodeId], params: TransportParameters, seed: u64) -> Self {
        let interfaces = (0..nodes.len()).map(|idx| (host_address(idx), idx)).collect();
        Self {
            params,
            nodes: nodes.to_vec(),
            interfaces,
            sockets: Vec::new(),
            bindings: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            stats: TransportStats::default(),
        }
    }

    pub fn address_of(&self, index: NodeIndex) -> Ipv4Addr {
        host_address(index)
    }

    /// Map a source address back to the transmitter that owns it.
    pub fn resolve(&self, addr: Ipv4Addr) -> Option<NodeIndex> {
        self.interfaces.get(&addr).copied()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Open and bind a socket on `port` for the node at `index`.
    ///
    /// Each (node, port) pair can be bound once.
    pub fn open(&mut self, index: NodeIndex, port: u16) -> Result<SocketId, SimulationError> {
        let node_id = *self.nodes.get(index).ok_or(SimulationError::UnknownNode(index))?;
        if self.bindings.contains_key(&(index, port)) {
            return Err(SimulationError::PortInUse { node: node_id, port });
        }
        let id = self.sockets.len();
        self.sockets.push(Socket {
            node_index: index,
            node_id,
            local: SocketAddrV4::new(host_address(index), port),
            peer: None,
            open: true,
            handler: ReceiveHandler::None,
            rx_queue: VecDeque::new(),
        });
        self.bindings.insert((index, port), id);
        Ok(id)
    }

    /// Set the default destination used by [`send`](Self::send).
    pub fn connect(&mut self, socket: SocketId, remote: SocketAddrV4) -> Result<(), SimulationError> {
        self.socket_mut(socket)?.peer = Some(remote);
        Ok(())
    }

    pub fn set_receive_handler(&mut self, socket: SocketId, handler: ReceiveHandler) -> Result<(), SimulationError> {
        self.socket_mut(socket)?.handler = handler;
        Ok(())
    }

    /// Close a socket: it neither sends nor receives afterwards.
    pub fn close(&mut self, socket: SocketId) -> Result<(), SimulationError> {
        let s = self.socket_mut(socket)?;
        if s.open {
            s.open = false;
            s.rx_queue.clear();
            log::debug!("[{}] closed socket {} ({})", s.node_id, socket, s.local);
        }
        Ok(())
    }

    pub fn socket(&self, socket: SocketId) -> Result<&Socket, SimulationError> {
        self.sockets.get(socket).ok_or(SimulationError::UnknownSocket(socket))
    }

    fn socket_mut(&mut self, socket: SocketId) -> Result<&mut Socket, SimulationError> {
        self.sockets.get_mut(socket).ok_or(SimulationError::UnknownSocket(socket))
    }

    /// Send `payload_size` bytes to the socket's connected peer.
    pub fn send(
        &mut self,
        socket: SocketId,
        payload_size: u32,
        now: Duration,
        mobility: &dyn MobilityOracle,
        flow: Option<FlowId>,
    ) -> Result<Vec<Delivery>, SimulationError> {
        let Some(peer) = self.socket(socket)?.peer else {
            log::warn!("send on unconnected socket {}, dropping", socket);
            return Ok(Vec::new());
        };
        self.send_to(socket, payload_size, peer, now, mobility, flow)
    }

    /// Send `payload_size` bytes to `destination` (broadcast or unicast).
    ///
    /// Returns one [`Delivery`] per receiving socket; the caller schedules them.
    pub fn send_to(
        &mut self,
        socket: SocketId,
        payload_size: u32,
        destination: SocketAddrV4,
        now: Duration,
        mobility: &dyn MobilityOracle,
        flow: Option<FlowId>,
    ) -> Result<Vec<Delivery>, SimulationError> {
        let (sender_index, sender_id, source, open) = {
            let s = self.socket(socket)?;
            (s.node_index, s.node_id, s.local, s.open)
        };
        if !open {
            log::debug!("[{}] send on closed socket {}, dropping", sender_id, socket);
            return Ok(Vec::new());
        }
        self.stats.datagrams_sent += 1;

        let sender_position = mobility.position_of(sender_id, now).ok_or(SimulationError::MissingMobility(sender_id))?;
        let range2 = self.params.radio_range * self.params.radio_range;
        let datagram = Datagram {
            payload_size,
            source,
            sent_at: now,
            flow,
        };

        let candidates: Vec<NodeIndex> = if destination.ip().is_broadcast() {
            (0..self.nodes.len()).filter(|&idx| idx != sender_index).collect()
        } else {
            self.resolve(*destination.ip()).into_iter().collect()
        };

        let mut deliveries = Vec::new();
        for target_index in candidates {
            let Some(&target_socket) = self.bindings.get(&(target_index, destination.port())) else {
                continue;
            };
            if !self.sockets[target_socket].open {
                continue;
            }

            let target_id = self.nodes[target_index];
            let target_position = mobility.position_of(target_id, now).ok_or(SimulationError::MissingMobility(target_id))?;
            if distance2(&sender_position, &target_position) > range2 {
                self.stats.copies_out_of_range += 1;
                continue;
            }
            if self.params.loss_probability > 0.0 && self.rng.gen_bool(self.params.loss_probability) {
                self.stats.copies_lost += 1;
                continue;
            }

            deliveries.push(Delivery {
                socket: target_socket,
                delay: self.draw_latency(),
                datagram: datagram.clone(),
            });
        }

        log::trace!("[{}] sent {} bytes to {}, {} copies", sender_id, payload_size, destination, deliveries.len());
        Ok(deliveries)
    }

    fn draw_latency(&mut self) -> Duration {
        let jitter_ns = self.params.latency_jitter.as_nanos() as u64;
        if jitter_ns == 0 {
            self.params.latency
        } else {
            self.params.latency + Duration::from_nanos(self.rng.gen_range(0..=jitter_ns))
        }
    }

    /// Queue an arriving datagram at `socket`.
    ///
    /// Returns the socket's handler if the datagram was accepted, `None` if the
    /// socket was closed in the meantime.
    pub fn enqueue(&mut self, socket: SocketId, datagram: Datagram) -> Result<Option<ReceiveHandler>, SimulationError> {
        let s = self.socket_mut(socket)?;
        if !s.open {
            self.stats.arrivals_at_closed_socket += 1;
            return Ok(None);
        }
        s.rx_queue.push_back(datagram);
        let handler = s.handler;
        self.stats.copies_delivered += 1;
        Ok(Some(handler))
    }

    /// Take the oldest queued datagram, if any.
    pub fn recv(&mut self, socket: SocketId) -> Result<Option<Datagram>, SimulationError> {
        Ok(self.socket_mut(socket)?.rx_queue.pop_front())
    }
}

/// Address of the node at `index`: host number `index + 1` in `10.1.0.0/16`.
fn host_address(index: NodeIndex) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(NETWORK_BASE) + index as u32 + 1)
}
