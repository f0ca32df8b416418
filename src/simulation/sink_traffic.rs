//! Constant-bit-rate unicast flows towards sink nodes.
//!
//! Flow `i` sends from node `i + sinks` to node `i`. Packets leave every
//! `packet_size * 8 / rate_bps` seconds from a start time drawn uniformly
//! from `[1, 2)` s until the flow is stopped.

use std::time::Duration;

use super::accounting::DeliveryAccounting;
use super::flow_monitor::FlowMonitor;
use super::mobility::MobilityOracle;
use super::scheduler::{EventKey, Scheduler};
use super::transport::{BroadcastTransport, Delivery};
use super::types::{FlowId, NodeIndex, SimEvent, SimulationError, SocketId};

/// First local port handed to flow sources; flow `i` uses `base + i`.
pub const EPHEMERAL_PORT_BASE: u16 = 49153;

/// Most flows one run can host before source ports run out.
pub const MAX_SINK_FLOWS: u32 = (u16::MAX - EPHEMERAL_PORT_BASE) as u32 + 1;

/// Local port of the source socket of flow `id`.
pub fn source_port(id: FlowId) -> Option<u16> {
    u16::try_from(id).ok().and_then(|offset| EPHEMERAL_PORT_BASE.checked_add(offset))
}

/// Time between packets of a flow sending `packet_size` bytes at `rate_bps`.
pub fn cbr_interval(packet_size: u32, rate_bps: u64) -> Duration {
    Duration::from_secs_f64(packet_size as f64 * 8.0 / rate_bps as f64)
}

/// `(source, sink)` node indices for `sinks` flows.
pub fn flow_endpoints(sinks: u32) -> impl Iterator<Item = (NodeIndex, NodeIndex)> {
    (0..sinks as usize).map(move |i| (i + sinks as usize, i))
}

#[derive(Debug)]
pub struct SinkFlow {
    pub id: FlowId,
    pub source: NodeIndex,
    pub sink: NodeIndex,
    /// Sending socket on the source node, connected to the sink.
    pub socket: SocketId,
    pub packet_size: u32,
    pub interval: Duration,
    active: bool,
    pending: Option<EventKey>,
}

impl SinkFlow {
    pub fn new(id: FlowId, source: NodeIndex, sink: NodeIndex, socket: SocketId, packet_size: u32, interval: Duration) -> Self {
        Self {
            id,
            source,
            sink,
            socket,
            packet_size,
            interval,
            active: true,
            pending: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remember the scheduled next send so [`stop`](Self::stop) can cancel it.
    pub fn set_pending(&mut self, key: EventKey) {
        self.pending = Some(key);
    }

    /// Send one packet. Does nothing once the flow is stopped.
    pub fn send(
        &mut self,
        now: Duration,
        transport: &mut BroadcastTransport,
        mobility: &dyn MobilityOracle,
        monitor: &mut FlowMonitor,
    ) -> Result<Vec<Delivery>, SimulationError> {
        self.pending = None;
        if !self.active {
            return Ok(Vec::new());
        }
        monitor.record_tx(self.id, self.packet_size);
        transport.send(self.socket, self.packet_size, now, mobility, Some(self.id))
    }

    /// Stop the flow, cancelling its pending send if there is one.
    pub fn stop(&mut self, scheduler: &mut Scheduler<SimEvent>) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(key) = self.pending.take() {
            scheduler.cancel(key);
        }
        log::debug!("Stopped sink flow {} ({} -> {})", self.id, self.source, self.sink);
    }
}

/// Drain every packet queued at a sink socket into the accounting and the
/// flow monitor. Returns how many were drained.
pub fn drain_sink(
    socket: SocketId,
    now: Duration,
    transport: &mut BroadcastTransport,
    accounting: &mut DeliveryAccounting,
    monitor: &mut FlowMonitor,
) -> Result<u64, SimulationError> {
    let mut drained = 0;
    while let Some(packet) = transport.recv(socket)? {
        drained += 1;
        accounting.record_sink_packet(packet.payload_size as u64);
        match packet.flow {
            Some(flow) => monitor.record_rx(flow, packet.payload_size, now.saturating_sub(packet.sent_at)),
            None => log::debug!("sink socket {} got a packet outside any flow from {}", socket, packet.source),
        }
    }
    Ok(drained)
}
