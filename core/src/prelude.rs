use crate::processing::characteristic::Characteristic;
use crate::processing::delay::AlignmentMethod;
use crate::processing::snr::SnrConfig;
use crate::processing::stack::GroupStrictness;
use serde::{Deserialize, Serialize};

/// Upper bound accepted for horizontal slowness, s/km.
pub const MAX_SLOWNESS: f64 = 8.0;

/// How traces with differing sample intervals are brought to one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Resample to the largest interval among the candidates.
    Coarsest,
    /// Resample to the smallest interval among the candidates.
    #[default]
    Finest,
}

impl SamplingPolicy {
    pub fn target_interval(&self, intervals: &[f64]) -> Option<f64> {
        let mut iter = intervals.iter().copied();
        let first = iter.next()?;
        Some(match self {
            SamplingPolicy::Coarsest => iter.fold(first, f64::max),
            SamplingPolicy::Finest => iter.fold(first, f64::min),
        })
    }
}

/// High/low-pass corners applied through the external filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBand {
    #[serde(default)]
    pub highpass_hz: Option<f64>,
    #[serde(default)]
    pub lowpass_hz: Option<f64>,
    #[serde(default = "default_filter_order")]
    pub order: u32,
}

fn default_filter_order() -> u32 {
    4
}

impl FilterBand {
    pub fn is_empty(&self) -> bool {
        self.highpass_hz.is_none() && self.lowpass_hz.is_none()
    }
}

/// Fixed array reference point overriding the computed center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterOverride {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
}

/// Options for one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub alignment: AlignmentMethod,
    /// Divide each trace by its standard deviation before stacking.
    pub normalize: bool,
    pub strictness: GroupStrictness,
    pub sampling: SamplingPolicy,
    pub filter: Option<FilterBand>,
    pub center: Option<CenterOverride>,
    pub snr: Option<SnrConfig>,
    /// Applied to each trace before it is stacked.
    pub characteristic: Option<Characteristic>,
    /// Send the aligned traces, renamed `<station>_s`, to the visualizer.
    pub emit_shifted: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentMethod::default(),
            normalize: false,
            strictness: GroupStrictness::Loose,
            sampling: SamplingPolicy::Finest,
            filter: None,
            center: None,
            snr: None,
            characteristic: None,
            emit_shifted: false,
        }
    }
}

impl EngineConfig {
    /// Checks ranges and dependent settings that need no collaborator.
    pub fn validate(&self) -> EngineResult<()> {
        match &self.alignment {
            AlignmentMethod::PlaneWave {
                back_azimuth_deg,
                slowness_s_per_km,
            } => {
                if !(0.0..360.0).contains(back_azimuth_deg) {
                    return Err(EngineError::Configuration(format!(
                        "back azimuth {back_azimuth_deg} outside [0, 360)"
                    )));
                }
                if !(0.0..=MAX_SLOWNESS).contains(slowness_s_per_km) {
                    return Err(EngineError::Configuration(format!(
                        "slowness {slowness_s_per_km} s/km outside [0, {MAX_SLOWNESS}]"
                    )));
                }
            }
            AlignmentMethod::CrossCorrelation {
                central_fraction,
                prefilter,
                ..
            } => {
                if !(*central_fraction > 0.0 && *central_fraction <= 1.0) {
                    return Err(EngineError::Configuration(format!(
                        "correlation central fraction {central_fraction} outside (0, 1]"
                    )));
                }
                if *prefilter && self.filter.map_or(true, |band| band.is_empty()) {
                    return Err(EngineError::Configuration(
                        "correlation prefilter requested without filter corners".into(),
                    ));
                }
            }
            AlignmentMethod::Picks { .. } | AlignmentMethod::PhaseArrival { .. } => {}
        }

        if let Some(characteristic) = &self.characteristic {
            characteristic.validate()?;
        }

        if let Some(snr) = &self.snr {
            if !(snr.window_length > 0.0) {
                return Err(EngineError::Configuration(format!(
                    "SNR window length {} must be positive",
                    snr.window_length
                )));
            }
            if snr.filter && self.filter.map_or(true, |band| band.is_empty()) {
                return Err(EngineError::Configuration(
                    "SNR window filtering requested without filter corners".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Stages of one engine run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    GeometryResolved,
    DelaysComputed,
    Aligned,
    Stacked,
    Filtered,
    Done,
}

/// Fatal, run-level failures. Per-trace anomalies never surface here.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no traces matched the selection: {0}")]
    EmptySelection(String),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("SNR threshold is ambiguous with {0} events in scope")]
    AmbiguousThreshold(usize),
    #[error("sample interval mismatch: expected {expected}s, found {found}s on {channel}")]
    SampleRateMismatch {
        expected: f64,
        found: f64,
        channel: String,
    },
    #[error("stack group {0} already finalized")]
    GroupFinalized(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("run aborted at {0}")]
    Aborted(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
