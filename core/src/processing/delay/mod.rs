//! Per-channel delay estimation.
//!
//! Every strategy produces a [`DelayTable`]; a positive delay means the
//! channel records the wavefront later than the reference and alignment
//! subtracts it from the trace's time axis.

pub mod correlation;
pub mod phase_arrival;
pub mod picks;
pub mod plane_wave;

use crate::interface::{ChannelId, ChannelPattern, Event, Marker, Trace};
use crate::math::geodesic::Geodesic;
use crate::prelude::{EngineError, EngineResult};
use crate::processing::arrivals::ArrivalCache;
use crate::processing::geometry::ArrayGeometry;
use crate::processing::prefilter::BandFilter;
use crate::telemetry::{LogManager, MetricsRecorder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use correlation::{correlation_delay, LagEstimate};
pub use plane_wave::plane_wave_delay;

fn default_central_fraction() -> f64 {
    0.8
}

/// Closed set of delay strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Geometric moveout of a plane wave across the array.
    PlaneWave {
        back_azimuth_deg: f64,
        slowness_s_per_km: f64,
    },
    /// Lag maximizing the correlation against a per-group reference trace.
    CrossCorrelation {
        #[serde(default = "default_central_fraction")]
        central_fraction: f64,
        #[serde(default)]
        prefilter: bool,
        /// Reference channel per group; the first usable trace otherwise.
        #[serde(default)]
        reference: Option<ChannelPattern>,
    },
    /// Arrival-time picks relative to their mean.
    Picks {
        #[serde(default)]
        phase: Option<String>,
    },
    /// Modelled travel times from the single event in scope.
    PhaseArrival { phase: String },
}

impl Default for AlignmentMethod {
    fn default() -> Self {
        AlignmentMethod::PlaneWave {
            back_azimuth_deg: 0.0,
            slowness_s_per_km: 0.1,
        }
    }
}

impl AlignmentMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AlignmentMethod::PlaneWave { .. } => "plane_wave",
            AlignmentMethod::CrossCorrelation { .. } => "cross_correlation",
            AlignmentMethod::Picks { .. } => "picks",
            AlignmentMethod::PhaseArrival { .. } => "phase_arrival",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayEntry {
    pub pattern: ChannelPattern,
    pub delay: f64,
}

/// Channel pattern to delay mapping, immutable once built.
///
/// `skipped` lists channels the strategy already excluded and counted, so
/// later stages leave them out without counting them again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayTable {
    entries: Vec<DelayEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<ChannelPattern>,
}

impl DelayTable {
    pub fn new(entries: Vec<DelayEntry>) -> Self {
        Self {
            entries,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<ChannelPattern>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn skipped(&self) -> &[ChannelPattern] {
        &self.skipped
    }

    pub fn is_skipped(&self, id: &ChannelId) -> bool {
        self.skipped.iter().any(|pattern| pattern.matches(id))
    }

    pub fn entries(&self) -> &[DelayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delay for `id`: an exact entry wins over the first wildcard match.
    pub fn delay_for(&self, id: &ChannelId) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_exactly(id))
            .or_else(|| self.entries.iter().find(|entry| entry.pattern.matches(id)))
            .map(|entry| entry.delay)
    }

    pub fn mean_delay(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.iter().map(|e| e.delay).sum::<f64>() / self.entries.len() as f64)
    }

    /// Mean delay per channel code of the entry patterns.
    pub fn mean_delay_by_channel(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for entry in &self.entries {
            let slot = sums.entry(entry.pattern.channel.clone()).or_insert((0.0, 0));
            slot.0 += entry.delay;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(channel, (sum, count))| (channel, sum / count as f64))
            .collect()
    }
}

/// Everything a strategy may read while estimating delays for one run.
pub struct DelayContext<'a> {
    pub geometry: &'a ArrayGeometry,
    pub geodesic: &'a dyn Geodesic,
    pub events: &'a [Event],
    pub markers: &'a [Marker],
    pub traces: &'a [Trace],
    pub normalize: bool,
    pub prefilter: Option<BandFilter<'a>>,
    pub arrivals: Option<&'a mut ArrivalCache>,
    pub metrics: &'a MetricsRecorder,
    pub logger: &'a LogManager,
}

pub struct DelayEstimator {
    method: AlignmentMethod,
}

impl DelayEstimator {
    pub fn new(method: AlignmentMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> &AlignmentMethod {
        &self.method
    }

    pub fn estimate(&self, ctx: &mut DelayContext<'_>) -> EngineResult<DelayTable> {
        let table = match &self.method {
            AlignmentMethod::PlaneWave {
                back_azimuth_deg,
                slowness_s_per_km,
            } => plane_wave::estimate(ctx.geometry, *back_azimuth_deg, *slowness_s_per_km),
            AlignmentMethod::CrossCorrelation {
                central_fraction,
                prefilter,
                reference,
            } => {
                if *prefilter && ctx.prefilter.is_none() {
                    return Err(EngineError::Configuration(
                        "correlation prefilter requested but no filter is attached".into(),
                    ));
                }
                correlation::estimate(ctx, *central_fraction, reference.as_ref())
            }
            AlignmentMethod::Picks { phase } => {
                picks::estimate(ctx.markers, phase.as_deref(), ctx.logger)
            }
            AlignmentMethod::PhaseArrival { phase } => phase_arrival::estimate(ctx, phase)?,
        };
        ctx.logger.record(&format!(
            "{} delays resolved for {} patterns",
            self.method.name(),
            table.len()
        ));
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_entry_wins_over_wildcard() {
        let id = ChannelId::new("XX", "A", "", "BHZ");
        let table = DelayTable::new(vec![
            DelayEntry {
                pattern: ChannelPattern::channel_code("BHZ"),
                delay: 1.0,
            },
            DelayEntry {
                pattern: ChannelPattern::exact(&id),
                delay: 2.5,
            },
        ]);
        assert_eq!(table.delay_for(&id), Some(2.5));
        assert_eq!(
            table.delay_for(&ChannelId::new("XX", "B", "", "BHZ")),
            Some(1.0)
        );
        assert_eq!(table.delay_for(&ChannelId::new("XX", "B", "", "BHN")), None);
    }

    #[test]
    fn mean_delay_groups_by_channel_code() {
        let table = DelayTable::new(vec![
            DelayEntry {
                pattern: ChannelPattern::new("XX", "A", "", "Z"),
                delay: 1.0,
            },
            DelayEntry {
                pattern: ChannelPattern::new("XX", "B", "", "Z"),
                delay: 3.0,
            },
            DelayEntry {
                pattern: ChannelPattern::new("XX", "A", "", "N"),
                delay: -1.0,
            },
        ]);
        let means = table.mean_delay_by_channel();
        assert_eq!(means["Z"], 2.0);
        assert_eq!(means["N"], -1.0);
        assert_eq!(table.mean_delay(), Some(1.0));
        assert_eq!(DelayTable::default().mean_delay(), None);
    }

    #[test]
    fn method_deserializes_from_tag() {
        let method: AlignmentMethod =
            serde_json::from_str(r#"{"method": "picks", "phase": "P"}"#).unwrap();
        assert_eq!(
            method,
            AlignmentMethod::Picks {
                phase: Some("P".into())
            }
        );
        let method: AlignmentMethod =
            serde_json::from_str(r#"{"method": "cross_correlation"}"#).unwrap();
        assert!(matches!(
            method,
            AlignmentMethod::CrossCorrelation { central_fraction, .. } if central_fraction == 0.8
        ));
    }
}
