//! Periodic beacon generation for one transmitter.
//!
//! Each transmitter owns a [`BeaconGenerator`]. The scheduler fires a tick
//! every `interval`; on each tick a moving transmitter broadcasts one beacon
//! and counts, for every other moving transmitter within the safety range,
//! one expected in-coverage reception. A stationary transmitter skips the
//! send but still consumes one unit of its budget.
//!
//! The generator is a two-state machine driven by the scheduler:
//! `Active(n) -> Active(n - 1)` for `n > 1`, `Active(1) -> Terminated`.
//! Termination closes the transmitter's socket.

use std::time::Duration;

use super::accounting::DeliveryAccounting;
use super::geometry::{SafetyRange, is_moving};
use super::mobility::MobilityOracle;
use super::transport::{BroadcastTransport, Delivery};
use super::types::{NodeId, NodeIndex, SimulationError, SocketId};

/// Log a progress line every this many beacons sent.
const PROGRESS_LOG_EVERY: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Active { remaining: u32 },
    Terminated,
}

/// Everything a tick reads or mutates besides the generator itself.
pub struct BeaconContext<'a> {
    pub now: Duration,
    /// The full transmitter set, indexed by [`NodeIndex`].
    pub transmitters: &'a [NodeId],
    pub mobility: &'a dyn MobilityOracle,
    pub transport: &'a mut BroadcastTransport,
    pub accounting: &'a mut DeliveryAccounting,
    pub safety_range: SafetyRange,
}

/// Result of one tick.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Copies of the beacon accepted by the transport, to be scheduled.
    pub deliveries: Vec<Delivery>,
    /// Delay until the next tick, or `None` once terminated.
    pub next_tick: Option<Duration>,
}

#[derive(Debug)]
pub struct BeaconGenerator {
    transmitter: NodeIndex,
    socket: SocketId,
    payload_size: u32,
    interval: Duration,
    state: GeneratorState,
}

impl BeaconGenerator {
    /// `socket` must already be bound and connected to the broadcast address.
    pub fn new(transmitter: NodeIndex, socket: SocketId, payload_size: u32, budget: u32, interval: Duration) -> Self {
        Self {
            transmitter,
            socket,
            payload_size,
            interval,
            state: GeneratorState::Active { remaining: budget },
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Run one scheduled tick.
    ///
    /// A tick delivered after termination is stale and does nothing.
    pub fn tick(&mut self, ctx: &mut BeaconContext<'_>) -> Result<TickOutcome, SimulationError> {
        let remaining = match self.state {
            GeneratorState::Terminated => return Ok(TickOutcome::default()),
            GeneratorState::Active { remaining } => remaining,
        };
        if remaining == 0 {
            self.terminate(ctx.transport)?;
            return Ok(TickOutcome::default());
        }

        let deliveries = self.send_step(ctx)?;

        let next_tick = if remaining > 1 {
            self.state = GeneratorState::Active { remaining: remaining - 1 };
            Some(self.interval)
        } else {
            self.terminate(ctx.transport)?;
            None
        };
        Ok(TickOutcome { deliveries, next_tick })
    }

    fn send_step(&self, ctx: &mut BeaconContext<'_>) -> Result<Vec<Delivery>, SimulationError> {
        let sender_id = ctx.transmitters[self.transmitter];
        let sender_velocity = ctx.mobility.velocity_of(sender_id, ctx.now).ok_or(SimulationError::MissingMobility(sender_id))?;
        if !is_moving(&sender_velocity) {
            log::trace!("[{}] stationary, skipping beacon", sender_id);
            return Ok(Vec::new());
        }

        let deliveries = ctx.transport.send(self.socket, self.payload_size, ctx.now, ctx.mobility, None)?;
        let total = ctx.accounting.record_beacon_sent();
        if total % PROGRESS_LOG_EVERY == 0 {
            log::info!("Sending beacon #{}", total);
        }

        let sender_position = ctx.mobility.position_of(sender_id, ctx.now).ok_or(SimulationError::MissingMobility(sender_id))?;
        for (index, &other_id) in ctx.transmitters.iter().enumerate() {
            if index == self.transmitter {
                continue;
            }
            let other_velocity = ctx.mobility.velocity_of(other_id, ctx.now).ok_or(SimulationError::MissingMobility(other_id))?;
            if !is_moving(&other_velocity) {
                continue;
            }
            let other_position = ctx.mobility.position_of(other_id, ctx.now).ok_or(SimulationError::MissingMobility(other_id))?;
            if ctx.safety_range.covers_pair(&sender_position, &other_position) {
                ctx.accounting.record_expected_in_coverage();
            }
        }

        Ok(deliveries)
    }

    fn terminate(&mut self, transport: &mut BroadcastTransport) -> Result<(), SimulationError> {
        self.state = GeneratorState::Terminated;
        transport.close(self.socket)
    }
}
