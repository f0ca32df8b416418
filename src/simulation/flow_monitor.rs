//! Per-flow statistics for sink traffic and the end-of-run summary.

use std::time::Duration;

use super::accounting::ratio;
use super::report::RunSummary;
use super::types::{FlowId, UDP_IP_HEADER_BYTES};

/// Counters for one unicast flow. Byte counts include IPv4/UDP headers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub delay_sum: Duration,
    /// Sum of |delay - previous delay| over consecutive received packets.
    pub jitter_sum: Duration,
    last_delay: Option<Duration>,
}

impl FlowStats {
    /// Packets sent but never received. Anything still in flight when the run
    /// stops counts as lost.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }

    fn merge(&mut self, other: &FlowStats) {
        self.tx_packets += other.tx_packets;
        self.rx_packets += other.rx_packets;
        self.tx_bytes += other.tx_bytes;
        self.rx_bytes += other.rx_bytes;
        self.delay_sum += other.delay_sum;
        self.jitter_sum += other.jitter_sum;
    }
}

#[derive(Debug, Default)]
pub struct FlowMonitor {
    flows: Vec<FlowStats>,
}

impl FlowMonitor {
    pub fn new(flow_count: usize) -> Self {
        Self {
            flows: vec![FlowStats::default(); flow_count],
        }
    }

    #[cfg(test)]
    pub fn flow(&self, flow: FlowId) -> Option<&FlowStats> {
        self.flows.get(flow)
    }

    pub fn record_tx(&mut self, flow: FlowId, payload_size: u32) {
        if let Some(stats) = self.flows.get_mut(flow) {
            stats.tx_packets += 1;
            stats.tx_bytes += payload_size as u64 + UDP_IP_HEADER_BYTES;
        }
    }

    pub fn record_rx(&mut self, flow: FlowId, payload_size: u32, delay: Duration) {
        let Some(stats) = self.flows.get_mut(flow) else {
            log::warn!("reception for unknown flow {}", flow);
            return;
        };
        stats.rx_packets += 1;
        stats.rx_bytes += payload_size as u64 + UDP_IP_HEADER_BYTES;
        stats.delay_sum += delay;
        if let Some(previous) = stats.last_delay {
            stats.jitter_sum += delay.abs_diff(previous);
        }
        stats.last_delay = Some(delay);
    }

    /// All flows added together.
    pub fn totals(&self) -> FlowStats {
        let mut total = FlowStats::default();
        for stats in &self.flows {
            total.merge(stats);
        }
        total
    }

    /// Build the summary row.
    ///
    /// `sink_bytes` is the payload volume received by all sinks over the run.
    pub fn summarize(&self, total_time: Duration, bsm_pdr: f64, sink_bytes: u64) -> RunSummary {
        let t = self.totals();
        let lost = t.lost_packets();
        let secs = total_time.as_secs_f64();
        let per_rx = |value: f64| if t.rx_packets > 0 { value / t.rx_packets as f64 } else { 0.0 };
        let kbps = |bytes: u64| if secs > 0.0 { bytes as f64 * 8.0 / secs / 1000.0 } else { 0.0 };

        RunSummary {
            bsm_pdr,
            mean_delay_ns: per_rx(t.delay_sum.as_nanos() as f64),
            mean_jitter_ns: per_rx(t.jitter_sum.as_nanos() as f64),
            mean_tx_packet_size: ratio(t.tx_bytes, t.tx_packets),
            mean_rx_packet_size: ratio(t.rx_bytes, t.rx_packets),
            // Only meaningful once something arrived.
            mean_loss_ratio: if t.rx_packets > 0 { ratio(lost, t.rx_packets + lost) } else { 0.0 },
            mean_rx_throughput_kbps: if t.rx_packets > 0 { kbps(t.rx_bytes) } else { 0.0 },
            mean_routing_throughput_kbps: kbps(sink_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn jitter_accumulates_delay_differences() {
        let mut monitor = FlowMonitor::new(1);
        for _ in 0..3 {
            monitor.record_tx(0, 64);
        }
        monitor.record_rx(0, 64, ms(10));
        monitor.record_rx(0, 64, ms(14));
        monitor.record_rx(0, 64, ms(11));

        let stats = monitor.flow(0).unwrap();
        assert_eq!(stats.tx_bytes, 3 * 92);
        assert_eq!(stats.rx_bytes, 3 * 92);
        assert_eq!(stats.delay_sum, ms(35));
        assert_eq!(stats.jitter_sum, ms(7));
        assert_eq!(stats.lost_packets(), 0);
    }

    #[test]
    fn summary_combines_flows() {
        let mut monitor = FlowMonitor::new(2);
        for _ in 0..4 {
            monitor.record_tx(0, 64);
        }
        monitor.record_tx(1, 64);
        monitor.record_rx(0, 64, ms(2));
        monitor.record_rx(0, 64, ms(4));

        let summary = monitor.summarize(Duration::from_secs(2), 0.5, 128);
        assert_eq!(summary.bsm_pdr, 0.5);
        assert_eq!(summary.mean_delay_ns, 3_000_000.0);
        assert_eq!(summary.mean_jitter_ns, 1_000_000.0);
        assert_eq!(summary.mean_tx_packet_size, 92.0);
        assert_eq!(summary.mean_rx_packet_size, 92.0);
        assert_eq!(summary.mean_loss_ratio, 0.6);
        assert_eq!(summary.mean_rx_throughput_kbps, 184.0 * 8.0 / 2.0 / 1000.0);
        assert_eq!(summary.mean_routing_throughput_kbps, 128.0 * 8.0 / 2.0 / 1000.0);
    }

    #[test]
    fn summary_without_traffic_is_all_zero() {
        let monitor = FlowMonitor::new(0);
        assert_eq!(monitor.summarize(Duration::from_secs(10), 0.0, 0), RunSummary::default());
        // Nothing received: loss ratio and rx throughput stay at zero.
        let mut monitor = FlowMonitor::new(1);
        monitor.record_tx(0, 64);
        let summary = monitor.summarize(Duration::ZERO, 0.0, 0);
        assert_eq!(summary.mean_loss_ratio, 0.0);
        assert_eq!(summary.mean_tx_packet_size, 92.0);
        assert_eq!(summary.mean_routing_throughput_kbps, 0.0);
    }

    #[test]
    fn unknown_flow_is_ignored() {
        let mut monitor = FlowMonitor::new(1);
        monitor.record_tx(5, 64);
        monitor.record_rx(5, 64, ms(1));
        assert_eq!(monitor.totals(), FlowStats::default());
    }
}
