//! Delivery accounting shared by the beacon generator, the reception
//! accountant and the throughput sampler.
//!
//! One `DeliveryAccounting` is owned by the simulation and handed out by
//! `&mut` to whichever callback is running. The scheduler never runs two
//! callbacks at once, so there is exactly one writer at any simulated instant.

/// Beacon and sink-traffic counters.
///
/// Interval-scoped counters (`sent`, `received`, sink bytes/packets) are reset
/// by every throughput sample. Coverage counters accumulate for the whole run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeliveryAccounting {
    sent: u64,
    received: u64,
    expected_in_coverage: u64,
    actual_in_coverage: u64,
    interval_sink_bytes: u64,
    interval_sink_packets: u64,
    total_sink_bytes: u64,
    total_sink_packets: u64,
    total_beacons_sent: u64,
}

/// Values drained from the interval-scoped counters by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntervalCounters {
    pub sent: u64,
    pub received: u64,
    pub sink_bytes: u64,
    pub sink_packets: u64,
}

impl DeliveryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// A beacon left a moving sender. Returns the run-wide beacon count.
    pub fn record_beacon_sent(&mut self) -> u64 {
        self.sent += 1;
        self.total_beacons_sent += 1;
        self.total_beacons_sent
    }

    /// A moving neighbour was within the safety range when a beacon was sent.
    pub fn record_expected_in_coverage(&mut self) {
        self.expected_in_coverage += 1;
    }

    /// The transport handed a beacon to a receiver.
    pub fn record_beacon_received(&mut self) {
        self.received += 1;
    }

    /// A moving receiver got a beacon from a sender within the safety range.
    pub fn record_actual_in_coverage(&mut self) {
        self.actual_in_coverage += 1;
    }

    /// A sink received a traffic packet of `bytes` payload bytes.
    pub fn record_sink_packet(&mut self, bytes: u64) {
        self.interval_sink_bytes += bytes;
        self.interval_sink_packets += 1;
        self.total_sink_bytes += bytes;
        self.total_sink_packets += 1;
    }

    /// Read and zero the interval-scoped counters.
    pub fn drain_interval(&mut self) -> IntervalCounters {
        let drained = IntervalCounters {
            sent: self.sent,
            received: self.received,
            sink_bytes: self.interval_sink_bytes,
            sink_packets: self.interval_sink_packets,
        };
        self.sent = 0;
        self.received = 0;
        self.interval_sink_bytes = 0;
        self.interval_sink_packets = 0;
        drained
    }

    #[cfg(test)]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    #[cfg(test)]
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn expected_in_coverage(&self) -> u64 {
        self.expected_in_coverage
    }

    pub fn actual_in_coverage(&self) -> u64 {
        self.actual_in_coverage
    }

    pub fn total_sink_bytes(&self) -> u64 {
        self.total_sink_bytes
    }

    pub fn total_sink_packets(&self) -> u64 {
        self.total_sink_packets
    }

    pub fn total_beacons_sent(&self) -> u64 {
        self.total_beacons_sent
    }

    /// Cumulative in-coverage PDR, 0 when nothing was expected.
    pub fn coverage_pdr(&self) -> f64 {
        ratio(self.actual_in_coverage, self.expected_in_coverage)
    }
}

/// `num / den`, or 0 when `den` is 0. Never NaN or infinite.
pub fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_with_zero_denominator_is_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(5, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }

    #[test]
    fn drain_resets_interval_counters_only() {
        let mut acc = DeliveryAccounting::new();
        acc.record_beacon_sent();
        acc.record_beacon_sent();
        acc.record_beacon_received();
        acc.record_expected_in_coverage();
        acc.record_actual_in_coverage();
        acc.record_sink_packet(64);

        let drained = acc.drain_interval();
        assert_eq!(
            drained,
            IntervalCounters {
                sent: 2,
                received: 1,
                sink_bytes: 64,
                sink_packets: 1
            }
        );
        assert_eq!(acc.sent(), 0);
        assert_eq!(acc.received(), 0);
        assert_eq!(acc.expected_in_coverage(), 1);
        assert_eq!(acc.actual_in_coverage(), 1);
        assert_eq!(acc.total_sink_bytes(), 64);
        assert_eq!(acc.total_beacons_sent(), 2);
        assert_eq!(acc.drain_interval(), IntervalCounters::default());
    }

    #[test]
    fn coverage_pdr_is_zero_without_expectations() {
        let mut acc = DeliveryAccounting::new();
        assert_eq!(acc.coverage_pdr(), 0.0);
        // Received-in-coverage without any expectation is reported, not clamped.
        acc.record_actual_in_coverage();
        assert_eq!(acc.coverage_pdr(), 0.0);
        acc.record_expected_in_coverage();
        acc.record_expected_in_coverage();
        assert_eq!(acc.coverage_pdr(), 0.5);
    }
}
