use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Recoverable per-item conditions that exclude one trace or station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    UnmatchedStation,
    MissingDelay,
    DegenerateTrace,
    ZeroVariance,
    LengthMismatch,
    MissingArrival,
    UnpairedWindow,
    SilentNoise,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Anomaly::UnmatchedStation => "unmatched station",
            Anomaly::MissingDelay => "missing delay",
            Anomaly::DegenerateTrace => "degenerate trace",
            Anomaly::ZeroVariance => "zero variance",
            Anomaly::LengthMismatch => "length mismatch",
            Anomaly::MissingArrival => "missing arrival",
            Anomaly::UnpairedWindow => "unpaired window",
            Anomaly::SilentNoise => "silent noise window",
        };
        f.write_str(name)
    }
}

/// Snapshot of counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub processed: usize,
    pub anomalies: BTreeMap<Anomaly, usize>,
}

impl RunMetrics {
    pub fn count(&self, anomaly: Anomaly) -> usize {
        self.anomalies.get(&anomaly).copied().unwrap_or(0)
    }

    pub fn total_anomalies(&self) -> usize {
        self.anomalies.values().sum()
    }
}

pub struct MetricsRecorder {
    inner: Mutex<RunMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RunMetrics::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
        }
    }

    pub fn record_anomaly(&self, anomaly: Anomaly) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics.anomalies.entry(anomaly).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> RunMetrics {
        if let Ok(metrics) = self.inner.lock() {
            metrics.clone()
        } else {
            RunMetrics::default()
        }
    }

    pub fn reset(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics = RunMetrics::default();
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
