//! Receive-side beacon accounting.
//!
//! Invoked whenever beacons are queued at a receiver's socket; drains every
//! queued beacon in one call. Each beacon counts as received. Only a moving
//! receiver goes on to judge coverage: it resolves the sender from the
//! datagram's source address and counts an in-coverage reception when the
//! sender is within the safety range at receipt time.

use std::time::Duration;

use super::accounting::DeliveryAccounting;
use super::geometry::{SafetyRange, is_moving};
use super::mobility::MobilityOracle;
use super::transport::BroadcastTransport;
use super::types::{NodeId, SimulationError, SocketId};

pub struct ReceptionContext<'a> {
    pub now: Duration,
    pub transmitters: &'a [NodeId],
    pub mobility: &'a dyn MobilityOracle,
    pub transport: &'a mut BroadcastTransport,
    pub accounting: &'a mut DeliveryAccounting,
    pub safety_range: SafetyRange,
}

#[derive(Debug, Default)]
pub struct ReceptionAccountant {
    /// Beacons whose source address matched no transmitter.
    unresolved_senders: u64,
}

impl ReceptionAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unresolved_senders(&self) -> u64 {
        self.unresolved_senders
    }

    /// Drain all beacons queued at `socket`. Returns how many were drained.
    pub fn on_receive(&mut self, socket: SocketId, ctx: &mut ReceptionContext<'_>) -> Result<u64, SimulationError> {
        let receiver_id = ctx.transport.socket(socket)?.node_id;
        let mut drained = 0;

        while let Some(beacon) = ctx.transport.recv(socket)? {
            drained += 1;
            ctx.accounting.record_beacon_received();

            let receiver_velocity = ctx.mobility.velocity_of(receiver_id, ctx.now).ok_or(SimulationError::MissingMobility(receiver_id))?;
            if !is_moving(&receiver_velocity) {
                continue;
            }

            let sender_id = match ctx.transport.resolve(*beacon.source.ip()).and_then(|index| ctx.transmitters.get(index)) {
                Some(&id) => id,
                None => {
                    self.unresolved_senders += 1;
                    log::debug!("[{}] beacon from unknown address {}, not judged for coverage", receiver_id, beacon.source);
                    continue;
                }
            };

            let receiver_position = ctx.mobility.position_of(receiver_id, ctx.now).ok_or(SimulationError::MissingMobility(receiver_id))?;
            let sender_position = ctx.mobility.position_of(sender_id, ctx.now).ok_or(SimulationError::MissingMobility(sender_id))?;
            if ctx.safety_range.covers_pair(&receiver_position, &sender_position) {
                ctx.accounting.record_actual_in_coverage();
            }
        }

        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mobility::{Trajectory, TrajectoryMobility};
    use crate::simulation::transport::TransportParameters;
    use crate::simulation::types::{Datagram, Vector3};
    use std::net::{Ipv4Addr, SocketAddrV4};

    const PORT: u16 = 9080;
    const MOVING: Vector3 = Vector3 { x: 0.0, y: 3.0, z: 0.0 };

    struct Fixture {
        ids: Vec<NodeId>,
        mobility: TrajectoryMobility,
        transport: BroadcastTransport,
        accounting: DeliveryAccounting,
        receiver: SocketId,
    }

    /// Node 0 is the receiver; the others are potential senders.
    fn fixture(nodes: &[(f64, Vector3)]) -> Fixture {
        let ids: Vec<NodeId> = (0..nodes.len() as u32).collect();
        let mut mobility = TrajectoryMobility::new();
        for (id, &(x, v)) in ids.iter().zip(nodes) {
            mobility.insert(*id, Trajectory::constant(Vector3::new(x, 0.0, 0.0), v));
        }
        let mut transport = BroadcastTransport::new(&ids, TransportParameters::default(), 1);
        let receiver = transport.open(0, PORT).unwrap();
        Fixture {
            ids,
            mobility,
            transport,
            accounting: DeliveryAccounting::new(),
            receiver,
        }
    }

    fn beacon_from(source: Ipv4Addr) -> Datagram {
        Datagram {
            payload_size: 200,
            source: SocketAddrV4::new(source, PORT),
            sent_at: Duration::ZERO,
            flow: None,
        }
    }

    fn receive(fx: &mut Fixture, range: f64) -> (ReceptionAccountant, u64) {
        let mut accountant = ReceptionAccountant::new();
        let mut ctx = ReceptionContext {
            now: Duration::ZERO,
            transmitters: &fx.ids,
            mobility: &fx.mobility,
            transport: &mut fx.transport,
            accounting: &mut fx.accounting,
            safety_range: SafetyRange::from_distance(range),
        };
        let drained = accountant.on_receive(fx.receiver, &mut ctx).unwrap();
        (accountant, drained)
    }

    #[test]
    fn drains_every_queued_beacon_and_judges_coverage() {
        let mut fx = fixture(&[(0.0, MOVING), (100.0, MOVING), (150.0, MOVING)]);
        let near = fx.transport.address_of(1);
        let far = fx.transport.address_of(2);
        fx.transport.enqueue(fx.receiver, beacon_from(near)).unwrap();
        fx.transport.enqueue(fx.receiver, beacon_from(far)).unwrap();
        fx.transport.enqueue(fx.receiver, beacon_from(near)).unwrap();

        let (_, drained) = receive(&mut fx, 145.0);
        assert_eq!(drained, 3);
        assert_eq!(fx.accounting.received(), 3);
        assert_eq!(fx.accounting.actual_in_coverage(), 2);
        assert_eq!(fx.transport.socket(fx.receiver).unwrap().queued(), 0);
    }

    #[test]
    fn stationary_receiver_counts_received_but_not_coverage() {
        let mut fx = fixture(&[(0.0, Vector3::ZERO), (10.0, MOVING)]);
        let sender = fx.transport.address_of(1);
        fx.transport.enqueue(fx.receiver, beacon_from(sender)).unwrap();

        receive(&mut fx, 145.0);
        assert_eq!(fx.accounting.received(), 1);
        assert_eq!(fx.accounting.actual_in_coverage(), 0);
    }

    #[test]
    fn stationary_sender_still_counts_when_in_range() {
        // Only the receiver's motion matters on the receive side.
        let mut fx = fixture(&[(0.0, MOVING), (10.0, Vector3::ZERO)]);
        let sender = fx.transport.address_of(1);
        fx.transport.enqueue(fx.receiver, beacon_from(sender)).unwrap();

        receive(&mut fx, 145.0);
        assert_eq!(fx.accounting.actual_in_coverage(), 1);
    }

    #[test]
    fn boundary_sender_is_in_coverage() {
        let mut fx = fixture(&[(0.0, MOVING), (100.0, MOVING)]);
        let sender = fx.transport.address_of(1);
        fx.transport.enqueue(fx.receiver, beacon_from(sender)).unwrap();

        receive(&mut fx, 100.0);
        assert_eq!(fx.accounting.actual_in_coverage(), 1);
    }

    #[test]
    fn unresolvable_sender_is_received_but_excluded() {
        let mut fx = fixture(&[(0.0, MOVING), (10.0, MOVING)]);
        fx.transport.enqueue(fx.receiver, beacon_from(Ipv4Addr::new(192, 168, 1, 1))).unwrap();

        let (accountant, drained) = receive(&mut fx, 145.0);
        assert_eq!(drained, 1);
        assert_eq!(fx.accounting.received(), 1);
        assert_eq!(fx.accounting.actual_in_coverage(), 0);
        assert_eq!(accountant.unresolved_senders(), 1);
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let mut fx = fixture(&[(0.0, MOVING)]);
        let (_, drained) = receive(&mut fx, 145.0);
        assert_eq!(drained, 0);
        assert_eq!(fx.accounting.received(), 0);
    }
}
