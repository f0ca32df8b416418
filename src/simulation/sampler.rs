//! Once-per-interval throughput sampler.
//!
//! Each sample drains the interval counters into one CSV row. Coverage
//! counters are cumulative and only read. The runner reschedules the sampler
//! every `period` until the simulation stops.

use std::time::Duration;

use super::accounting::{DeliveryAccounting, ratio};
use super::report::{CsvReport, IntervalSample};

pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct ThroughputSampler {
    report: CsvReport,
    sinks: u32,
    protocol: String,
    tx_power: f64,
    period: Duration,
    samples_taken: u64,
}

impl ThroughputSampler {
    pub fn new(report: CsvReport, sinks: u32, protocol: impl Into<String>, tx_power: f64) -> Self {
        Self {
            report,
            sinks,
            protocol: protocol.into(),
            tx_power,
            period: SAMPLE_PERIOD,
            samples_taken: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    pub fn report(&self) -> &CsvReport {
        &self.report
    }

    /// Take one sample at `now`, append it to the interval CSV and reset the
    /// interval counters.
    ///
    /// A failed append is logged and otherwise ignored.
    pub fn sample(&mut self, now: Duration, accounting: &mut DeliveryAccounting) -> IntervalSample {
        let interval = accounting.drain_interval();
        let row = IntervalSample {
            timestamp: now.as_secs_f64(),
            throughput_kbps: (interval.sink_bytes as f64 * 8.0) / 1000.0,
            packets_received: interval.sink_packets,
            sinks: self.sinks,
            protocol: self.protocol.clone(),
            tx_power: self.tx_power,
            received: interval.received,
            sent: interval.sent,
            interval_pdr: ratio(interval.received, interval.sent),
            expected_in_coverage: accounting.expected_in_coverage(),
            actual_in_coverage: accounting.actual_in_coverage(),
            coverage_pdr: accounting.coverage_pdr(),
        };
        self.samples_taken += 1;

        log::info!(
            "Sample at {}s Rx={} of Tx={} PDR={}",
            row.timestamp,
            row.actual_in_coverage,
            row.expected_in_coverage,
            row.coverage_pdr
        );

        if let Err(err) = self.report.append_interval(&row) {
            log::warn!("Failed to append sample to {}: {}", self.report.interval_path().display(), err);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::report::INTERVAL_HEADER;

    fn sampler(dir: &tempfile::TempDir) -> ThroughputSampler {
        let report = CsvReport::new(dir.path().join("interval.csv"), dir.path().join("summary.csv"));
        report.write_headers().unwrap();
        ThroughputSampler::new(report, 10, "NONE", 7.5)
    }

    #[test]
    fn empty_interval_reports_zero_without_dividing() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = sampler(&dir);
        let mut acc = DeliveryAccounting::new();

        let row = sampler.sample(Duration::ZERO, &mut acc);
        assert_eq!(row.interval_pdr, 0.0);
        assert_eq!(row.coverage_pdr, 0.0);
        assert_eq!(row.throughput_kbps, 0.0);
        assert_eq!(row.to_csv_row(), "0,0,0,10,NONE,7.5,0,0,0,0,0,0");
    }

    #[test]
    fn sample_drains_interval_and_keeps_cumulative_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = sampler(&dir);
        let mut acc = DeliveryAccounting::new();
        for _ in 0..4 {
            acc.record_beacon_sent();
        }
        for _ in 0..3 {
            acc.record_beacon_received();
        }
        for _ in 0..4 {
            acc.record_expected_in_coverage();
        }
        acc.record_actual_in_coverage();
        acc.record_sink_packet(64);
        acc.record_sink_packet(64);

        let row = sampler.sample(Duration::from_secs(3), &mut acc);
        assert_eq!(row.timestamp, 3.0);
        assert_eq!(row.throughput_kbps, 1.024);
        assert_eq!(row.packets_received, 2);
        assert_eq!(row.sent, 4);
        assert_eq!(row.received, 3);
        assert_eq!(row.interval_pdr, 0.75);
        assert_eq!(row.coverage_pdr, 0.25);

        assert_eq!(acc.sent(), 0);
        assert_eq!(acc.received(), 0);
        assert_eq!(acc.expected_in_coverage(), 4);
        assert_eq!(acc.actual_in_coverage(), 1);
    }

    #[test]
    fn sampling_twice_without_traffic_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = sampler(&dir);
        let mut acc = DeliveryAccounting::new();
        acc.record_beacon_sent();
        acc.record_expected_in_coverage();
        acc.record_expected_in_coverage();
        acc.record_actual_in_coverage();
        sampler.sample(Duration::from_secs(1), &mut acc);

        let first = sampler.sample(Duration::from_secs(2), &mut acc);
        let second = sampler.sample(Duration::from_secs(3), &mut acc);
        assert_eq!(first.interval_pdr, 0.0);
        assert_eq!(second.interval_pdr, 0.0);
        assert_eq!(first.coverage_pdr, 0.5);
        assert_eq!(second.coverage_pdr, first.coverage_pdr);
        assert_eq!(sampler.samples_taken(), 3);

        let written = std::fs::read_to_string(sampler.report().interval_path()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], INTERVAL_HEADER);
    }

    #[test]
    fn unwritable_report_does_not_stop_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let report = CsvReport::new(dir.path().join("missing/interval.csv"), dir.path().join("missing/summary.csv"));
        let mut sampler = ThroughputSampler::new(report, 0, "NONE", 7.5);
        let mut acc = DeliveryAccounting::new();
        acc.record_beacon_sent();
        let row = sampler.sample(Duration::ZERO, &mut acc);
        assert_eq!(row.sent, 1);
        assert_eq!(acc.sent(), 0);
    }
}
