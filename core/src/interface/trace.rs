use crate::interface::codes::ChannelId;
use serde::{Deserialize, Serialize};

const TIME_EPSILON: f64 = 1e-9;

/// Evenly sampled waveform of one channel.
///
/// Every stage that alters a trace works on an owned copy; methods that
/// change timing or samples either take `&mut self` on a caller-owned copy
/// or return a new trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: ChannelId,
    /// Time of the first sample, epoch seconds.
    pub start: f64,
    /// Sample interval in seconds.
    pub delta: f64,
    pub samples: Vec<f64>,
}

impl Trace {
    pub fn new(id: ChannelId, start: f64, delta: f64, samples: Vec<f64>) -> Self {
        Self {
            id,
            start,
            delta,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the last sample.
    pub fn end(&self) -> f64 {
        self.start + self.len().saturating_sub(1) as f64 * self.delta
    }

    /// Covered duration, `len * delta`.
    pub fn duration(&self) -> f64 {
        self.len() as f64 * self.delta
    }

    pub fn sample_time(&self, index: usize) -> f64 {
        self.start + index as f64 * self.delta
    }

    pub fn shift(&mut self, seconds: f64) {
        self.start += seconds;
    }

    pub fn shifted(&self, seconds: f64) -> Trace {
        let mut copy = self.clone();
        copy.shift(seconds);
        copy
    }

    /// Copy with identical identity and timing but new samples.
    pub fn with_samples(&self, samples: Vec<f64>) -> Trace {
        Trace {
            id: self.id.clone(),
            start: self.start,
            delta: self.delta,
            samples,
        }
    }

    pub fn is_all_zero(&self) -> bool {
        self.samples.iter().all(|&v| v == 0.0)
    }

    /// Copy of the samples falling inside the half-open window `[tmin, tmax)`.
    ///
    /// A sample exactly at `tmax` belongs to the next window, so adjacent
    /// windows never share a sample. Partial overlap is returned as-is;
    /// `None` when nothing overlaps.
    pub fn chop(&self, tmin: f64, tmax: f64) -> Option<Trace> {
        if self.is_empty() || !(tmax > tmin) || self.delta <= 0.0 {
            return None;
        }
        let first = ((tmin - self.start) / self.delta - TIME_EPSILON).ceil().max(0.0);
        let end = ((tmax - self.start) / self.delta - TIME_EPSILON).ceil();
        if end <= 0.0 || first >= end {
            return None;
        }
        let first = first as usize;
        let end = (end as usize).min(self.len());
        if first >= end {
            return None;
        }
        Some(Trace {
            id: self.id.clone(),
            start: self.sample_time(first),
            delta: self.delta,
            samples: self.samples[first..end].to_vec(),
        })
    }

    /// Copy restricted to the central `fraction` of the samples.
    pub fn central(&self, fraction: f64) -> Option<Trace> {
        if self.is_empty() || !(fraction > 0.0 && fraction <= 1.0) {
            return None;
        }
        let keep = ((self.len() as f64 * fraction).round() as usize).clamp(1, self.len());
        let trim = (self.len() - keep) / 2;
        Some(Trace {
            id: self.id.clone(),
            start: self.sample_time(trim),
            delta: self.delta,
            samples: self.samples[trim..trim + keep].to_vec(),
        })
    }
}
