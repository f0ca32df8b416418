//! CSV output: one interval row per throughput sample, one summary row per run.
//!
//! Both files are opened per write (append mode) and closed straight after,
//! so no handle outlives a scheduler callback.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const INTERVAL_HEADER: &str = "SimulationSecond,ReceiveRate,PacketsReceived,NumberOfSinks,RoutingProtocol,TransmissionPower,WavePktsSent,WavePtksReceived,WavePktsPpr,ExpectedWavePktsReceived,ExpectedWavePktsInCoverageReceived,BSM_PDR";

pub const SUMMARY_HEADER: &str = "BSM_PDR,MeanDelay,MeanJitter,MeanTxPktSize,MeanRxPktSize,MeanPktLossRatio,MeanRxThroughputKbps,MeanRoutingThroughputKbps";

/// One row of the interval CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSample {
    /// Simulated time of the sample (s).
    pub timestamp: f64,
    /// Sink throughput over the interval (kbit).
    pub throughput_kbps: f64,
    /// Sink packets received over the interval.
    pub packets_received: u64,
    pub sinks: u32,
    pub protocol: String,
    pub tx_power: f64,
    pub received: u64,
    pub sent: u64,
    /// `received / sent` for this interval.
    pub interval_pdr: f64,
    pub expected_in_coverage: u64,
    pub actual_in_coverage: u64,
    /// Cumulative `actual / expected`.
    pub coverage_pdr: f64,
}

impl IntervalSample {
    /// Column order follows the row the experiment has always written:
    /// received before sent, even though the header names them the other way round.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            self.timestamp,
            self.throughput_kbps,
            self.packets_received,
            self.sinks,
            self.protocol,
            self.tx_power,
            self.received,
            self.sent,
            self.interval_pdr,
            self.expected_in_coverage,
            self.actual_in_coverage,
            self.coverage_pdr
        )
    }
}

/// The end-of-run summary row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub bsm_pdr: f64,
    /// Mean one-way delay per received sink packet (ns).
    pub mean_delay_ns: f64,
    /// Mean jitter per received sink packet (ns).
    pub mean_jitter_ns: f64,
    pub mean_tx_packet_size: f64,
    pub mean_rx_packet_size: f64,
    pub mean_loss_ratio: f64,
    pub mean_rx_throughput_kbps: f64,
    pub mean_routing_throughput_kbps: f64,
}

impl RunSummary {
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.bsm_pdr,
            self.mean_delay_ns,
            self.mean_jitter_ns,
            self.mean_tx_packet_size,
            self.mean_rx_packet_size,
            self.mean_loss_ratio,
            self.mean_rx_throughput_kbps,
            self.mean_routing_throughput_kbps
        )
    }
}

#[derive(Debug, Clone)]
pub struct CsvReport {
    interval_path: PathBuf,
    summary_path: PathBuf,
}

impl CsvReport {
    pub fn new(interval_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            interval_path: interval_path.into(),
            summary_path: summary_path.into(),
        }
    }

    pub fn interval_path(&self) -> &Path {
        &self.interval_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Create (or truncate) both files and write their header lines.
    pub fn write_headers(&self) -> io::Result<()> {
        let mut interval = File::create(&self.interval_path)?;
        writeln!(interval, "{}", INTERVAL_HEADER)?;
        let mut summary = File::create(&self.summary_path)?;
        writeln!(summary, "{}", SUMMARY_HEADER)?;
        Ok(())
    }

    pub fn append_interval(&self, sample: &IntervalSample) -> io::Result<()> {
        append_line(&self.interval_path, &sample.to_csv_row())
    }

    pub fn append_summary(&self, summary: &RunSummary) -> io::Result<()> {
        append_line(&self.summary_path, &summary.to_csv_row())
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: f64) -> IntervalSample {
        IntervalSample {
            timestamp,
            throughput_kbps: 0.512,
            packets_received: 1,
            sinks: 10,
            protocol: "NONE".to_string(),
            tx_power: 7.5,
            received: 7,
            sent: 3,
            interval_pdr: 7.0 / 3.0,
            expected_in_coverage: 4,
            actual_in_coverage: 2,
            coverage_pdr: 0.5,
        }
    }

    #[test]
    fn interval_row_puts_received_before_sent() {
        let row = sample(2.0).to_csv_row();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), INTERVAL_HEADER.split(',').count());
        assert_eq!(fields[0], "2");
        assert_eq!(fields[4], "NONE");
        assert_eq!(fields[6], "7");
        assert_eq!(fields[7], "3");
        assert_eq!(fields[11], "0.5");
    }

    #[test]
    fn headers_truncate_and_rows_append() {
        let dir = tempfile::tempdir().unwrap();
        let report = CsvReport::new(dir.path().join("interval.csv"), dir.path().join("summary.csv"));

        std::fs::write(report.interval_path(), "stale contents\n").unwrap();
        report.write_headers().unwrap();
        report.append_interval(&sample(0.0)).unwrap();
        report.append_interval(&sample(1.0)).unwrap();
        report.append_summary(&RunSummary::default()).unwrap();

        let interval = std::fs::read_to_string(report.interval_path()).unwrap();
        let lines: Vec<&str> = interval.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], INTERVAL_HEADER);
        assert!(lines[2].starts_with("1,"));

        let summary = std::fs::read_to_string(report.summary_path()).unwrap();
        assert_eq!(summary, format!("{}\n0,0,0,0,0,0,0,0\n", SUMMARY_HEADER));
    }

    #[test]
    fn append_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = CsvReport::new(dir.path().join("nope/interval.csv"), dir.path().join("nope/summary.csv"));
        assert!(report.append_interval(&sample(0.0)).is_err());
    }
}
