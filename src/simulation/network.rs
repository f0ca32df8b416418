//! Simulation runner driving the event timeline for one experiment.
//!
//! High-level flow of a run:
//! 1) Write both CSV headers, schedule the first throughput sample at t=0.
//! 2) Schedule one beacon generator per transmitter at the start time plus a
//!    small random offset, and the sink flows at a random time in `[1, 2)` s.
//! 3) Pop events in time order until the stop time, dispatching each one to
//!    the generator, the reception accountant, the sampler or a sink flow.
//! 4) Stop the remaining flows, append the summary row and tear down.

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::common::config::ExperimentConfig;

use super::accounting::DeliveryAccounting;
use super::beacon::{BeaconContext, BeaconGenerator};
use super::flow_monitor::FlowMonitor;
use super::geometry::SafetyRange;
use super::mobility::MobilityOracle;
use super::reception::{ReceptionAccountant, ReceptionContext};
use super::report::{CsvReport, RunSummary};
use super::sampler::ThroughputSampler;
use super::scheduler::{ScheduledEvent, Scheduler};
use super::sink_traffic::{SinkFlow, cbr_interval, drain_sink, flow_endpoints, source_port};
use super::transport::{BroadcastTransport, Delivery, ReceiveHandler, TransportStats};
use super::types::{FlowId, NodeId, NodeIndex, SimEvent, SimulationError, SocketId};

/// Final state of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub accounting: DeliveryAccounting,
    pub summary: RunSummary,
    pub samples: u64,
    pub events_processed: u64,
    pub unresolved_senders: u64,
    pub transport: TransportStats,
}

pub struct Simulation<M: MobilityOracle> {
    scheduler: Scheduler<SimEvent>,
    mobility: M,
    transmitters: Vec<NodeId>,
    transport: BroadcastTransport,
    accounting: DeliveryAccounting,
    generators: Vec<BeaconGenerator>,
    reception: ReceptionAccountant,
    sampler: ThroughputSampler,
    flows: Vec<SinkFlow>,
    monitor: FlowMonitor,
    safety_range: SafetyRange,
    total_time: Duration,
    beacon_start: Duration,
    start_jitter_max_us: u64,
    sink_stop: Duration,
    rng: StdRng,
}

impl<M: MobilityOracle> Simulation<M> {
    /// Set up transport, generators and sink flows for `transmitters`.
    ///
    /// Every transmitter must be known to `mobility`.
    pub fn new(config: &ExperimentConfig, transmitters: Vec<NodeId>, mobility: M) -> Result<Self, SimulationError> {
        for &id in &transmitters {
            if mobility.position_of(id, Duration::ZERO).is_none() {
                return Err(SimulationError::MissingMobility(id));
            }
        }

        let traffic = &config.traffic;
        let sinks = if traffic.enabled { traffic.sinks } else { 0 };
        if transmitters.len() < 2 * sinks as usize {
            return Err(SimulationError::TooFewNodes {
                nodes: transmitters.len(),
                sinks,
            });
        }

        let seed = config.simulation.seed;
        let mut transport = BroadcastTransport::new(&transmitters, config.transport_parameters(), seed.wrapping_add(1));

        let budget = config.beacon_budget();
        let interval = config.beacon_interval();
        let port = config.beacon.port;
        let mut generators = Vec::with_capacity(transmitters.len());
        for index in 0..transmitters.len() {
            let socket = transport.open(index, port)?;
            transport.connect(socket, SocketAddrV4::new(Ipv4Addr::BROADCAST, port))?;
            transport.set_receive_handler(socket, ReceiveHandler::Beacon)?;
            generators.push(BeaconGenerator::new(index, socket, config.beacon.payload_size, budget, interval));
        }

        let mut flows = Vec::with_capacity(sinks as usize);
        for (id, (source, sink)) in flow_endpoints(sinks).enumerate() {
            let sink_socket = transport.open(sink, traffic.port)?;
            transport.set_receive_handler(sink_socket, ReceiveHandler::Sink)?;
            let local_port = source_port(id).ok_or(SimulationError::PortsExhausted(id))?;
            let socket = transport.open(source, local_port)?;
            transport.connect(socket, SocketAddrV4::new(transport.address_of(sink), traffic.port))?;
            flows.push(SinkFlow::new(id, source, sink, socket, traffic.packet_size, cbr_interval(traffic.packet_size, traffic.rate_bps)));
        }

        let report = CsvReport::new(&config.output.interval_csv, &config.output.summary_csv);
        let sampler = ThroughputSampler::new(report, sinks, config.output.protocol_label.clone(), config.output.tx_power);

        log::info!(
            "Simulation set up: {} transmitters, {} beacons each every {:?}, {} sink flows",
            transmitters.len(),
            budget,
            interval,
            flows.len()
        );

        Ok(Self {
            scheduler: Scheduler::new(),
            mobility,
            transmitters,
            transport,
            accounting: DeliveryAccounting::new(),
            generators,
            reception: ReceptionAccountant::new(),
            sampler,
            monitor: FlowMonitor::new(flows.len()),
            flows,
            safety_range: SafetyRange::from_distance(config.beacon.safety_range),
            total_time: config.total_time(),
            beacon_start: config.beacon_start(),
            start_jitter_max_us: config.beacon.start_jitter_max_us,
            sink_stop: config.sink_stop_time(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Run the experiment to the configured end time.
    pub fn run(mut self) -> anyhow::Result<RunReport> {
        self.prepare()?;
        self.schedule_generators();
        self.schedule_sink_flows();
        self.run_until_stopped()?;
        Ok(self.finish())
    }

    /// Write headers, schedule the first sample and arm the stop time.
    fn prepare(&mut self) -> anyhow::Result<()> {
        let report = self.sampler.report();
        report
            .write_headers()
            .with_context(|| format!("Failed to create {} / {}", report.interval_path().display(), report.summary_path().display()))?;
        self.scheduler.schedule_after(Duration::ZERO, SimEvent::SampleThroughput);
        self.scheduler.stop(self.total_time);
        Ok(())
    }

    fn schedule_generators(&mut self) {
        for index in 0..self.generators.len() {
            let offset_us = if self.start_jitter_max_us > 0 {
                self.rng.gen_range(1..=self.start_jitter_max_us)
            } else {
                0
            };
            let at = self.beacon_start + Duration::from_micros(offset_us);
            self.scheduler.schedule_with_context(self.transmitters[index], at, SimEvent::GenerateBeacon(index));
        }
    }

    fn schedule_sink_flows(&mut self) {
        for flow in &mut self.flows {
            let start = Duration::from_secs_f64(self.rng.gen_range(1.0..2.0));
            let source_id = self.transmitters[flow.source];
            let key = self.scheduler.schedule_with_context(source_id, start, SimEvent::SendSinkPacket(flow.id));
            flow.set_pending(key);
            self.scheduler.schedule_with_context(source_id, self.sink_stop, SimEvent::StopSinkFlow(flow.id));
            log::debug!("[{}] sink flow {} to node {} starts at {:?}", source_id, flow.id, self.transmitters[flow.sink], start);
        }
    }

    fn run_until_stopped(&mut self) -> Result<(), SimulationError> {
        while self.step()? {}
        Ok(())
    }

    /// Dispatch the next due event. Returns false once the run is over.
    fn step(&mut self) -> Result<bool, SimulationError> {
        match self.scheduler.pop_due() {
            Some(scheduled) => {
                self.dispatch(scheduled)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn dispatch(&mut self, scheduled: ScheduledEvent<SimEvent>) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        if let Some(node) = scheduled.context {
            log::trace!("[{}] #{} {:?} at {:?}", node, scheduled.key.sequence, scheduled.event, now);
        }

        match scheduled.event {
            SimEvent::GenerateBeacon(index) => self.on_generate_beacon(index, now),
            SimEvent::Deliver { socket, datagram } => match self.transport.enqueue(socket, datagram)? {
                Some(ReceiveHandler::Beacon) => self.on_beacon_arrival(socket, now),
                Some(ReceiveHandler::Sink) => {
                    drain_sink(socket, now, &mut self.transport, &mut self.accounting, &mut self.monitor)?;
                    Ok(())
                }
                Some(ReceiveHandler::None) | None => Ok(()),
            },
            SimEvent::SampleThroughput => {
                self.sampler.sample(now, &mut self.accounting);
                self.scheduler.schedule_after(self.sampler.period(), SimEvent::SampleThroughput);
                Ok(())
            }
            SimEvent::SendSinkPacket(flow) => self.on_sink_send(flow, now),
            SimEvent::StopSinkFlow(flow) => {
                if let Some(flow) = self.flows.get_mut(flow) {
                    flow.stop(&mut self.scheduler);
                }
                Ok(())
            }
        }
    }

    fn on_generate_beacon(&mut self, index: NodeIndex, now: Duration) -> Result<(), SimulationError> {
        let Some(generator) = self.generators.get_mut(index) else {
            log::warn!("beacon tick for unknown transmitter index {}", index);
            return Ok(());
        };
        let mut ctx = BeaconContext {
            now,
            transmitters: &self.transmitters,
            mobility: &self.mobility,
            transport: &mut self.transport,
            accounting: &mut self.accounting,
            safety_range: self.safety_range,
        };
        let outcome = generator.tick(&mut ctx)?;

        self.schedule_deliveries(outcome.deliveries)?;
        if let Some(delay) = outcome.next_tick {
            self.scheduler.schedule_with_context(self.transmitters[index], now + delay, SimEvent::GenerateBeacon(index));
        }
        Ok(())
    }

    fn on_beacon_arrival(&mut self, socket: SocketId, now: Duration) -> Result<(), SimulationError> {
        let mut ctx = ReceptionContext {
            now,
            transmitters: &self.transmitters,
            mobility: &self.mobility,
            transport: &mut self.transport,
            accounting: &mut self.accounting,
            safety_range: self.safety_range,
        };
        self.reception.on_receive(socket, &mut ctx)?;
        Ok(())
    }

    fn on_sink_send(&mut self, id: FlowId, now: Duration) -> Result<(), SimulationError> {
        let Some(flow) = self.flows.get_mut(id) else {
            log::warn!("send for unknown sink flow {}", id);
            return Ok(());
        };
        let deliveries = flow.send(now, &mut self.transport, &self.mobility, &mut self.monitor)?;
        if flow.is_active() {
            let source_id = self.transmitters[flow.source];
            let key = self.scheduler.schedule_with_context(source_id, now + flow.interval, SimEvent::SendSinkPacket(id));
            flow.set_pending(key);
        }
        self.schedule_deliveries(deliveries)
    }

    fn schedule_deliveries(&mut self, deliveries: Vec<Delivery>) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        for delivery in deliveries {
            let receiver = self.transport.socket(delivery.socket)?.node_id;
            self.scheduler.schedule_with_context(
                receiver,
                now + delivery.delay,
                SimEvent::Deliver {
                    socket: delivery.socket,
                    datagram: delivery.datagram,
                },
            );
        }
        Ok(())
    }

    /// Stop leftover flows, write the summary row and tear the timeline down.
    fn finish(mut self) -> RunReport {
        for flow in &mut self.flows {
            flow.stop(&mut self.scheduler);
        }

        let summary = self.monitor.summarize(self.total_time, self.accounting.coverage_pdr(), self.accounting.total_sink_bytes());
        let report = self.sampler.report();
        if let Err(err) = report.append_summary(&summary) {
            log::warn!("Failed to append summary to {}: {}", report.summary_path().display(), err);
        }

        log::info!(
            "Run finished at {:?}: {} beacons sent, {} expected / {} actual in coverage, BSM PDR {}, {} sink packets",
            self.scheduler.now(),
            self.accounting.total_beacons_sent(),
            self.accounting.expected_in_coverage(),
            self.accounting.actual_in_coverage(),
            summary.bsm_pdr,
            self.accounting.total_sink_packets()
        );

        let events_processed = self.scheduler.events_processed();
        self.scheduler.destroy();

        RunReport {
            accounting: self.accounting,
            summary,
            samples: self.sampler.samples_taken(),
            events_processed,
            unresolved_senders: self.reception.unresolved_senders(),
            transport: self.transport.stats().clone(),
        }
    }
}
