//! Characteristic functions applied to each trace before it joins a stack.
//!
//! The chain runs in a fixed order: transform, max-normalize, square, taper.
//! Every step works on a copy of the samples.

use crate::math::fft::envelope;
use crate::math::stats::StatsHelper;
use crate::prelude::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

fn default_taper_fraction() -> f64 {
    0.1
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CharacteristicFunction {
    /// Samples pass through unchanged.
    None,
    #[default]
    Abs,
    /// Magnitude of the analytic signal.
    Envelope,
    /// Centred short-term over long-term average of the squared samples.
    /// The long window is `short_s * long_ratio` seconds.
    StaLta { short_s: f64, long_ratio: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    #[serde(default)]
    pub function: CharacteristicFunction,
    /// Divide by the peak absolute value after the transform.
    #[serde(default)]
    pub max_normalize: bool,
    #[serde(default)]
    pub square: bool,
    /// Fraction of the trace faded in and out by a cosine ramp at each end.
    #[serde(default = "default_taper_fraction")]
    pub taper_fraction: f64,
}

impl Default for Characteristic {
    fn default() -> Self {
        Self {
            function: CharacteristicFunction::Abs,
            max_normalize: true,
            square: true,
            taper_fraction: default_taper_fraction(),
        }
    }
}

impl Characteristic {
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=0.5).contains(&self.taper_fraction) {
            return Err(EngineError::Configuration(format!(
                "taper fraction {} outside [0, 0.5]",
                self.taper_fraction
            )));
        }
        if let CharacteristicFunction::StaLta {
            short_s,
            long_ratio,
        } = self.function
        {
            if !(short_s > 0.0) || !(long_ratio >= 1.0) {
                return Err(EngineError::Configuration(format!(
                    "STA/LTA windows {short_s}s ratio {long_ratio} are invalid"
                )));
            }
        }
        Ok(())
    }

    /// Characteristic function of `samples` taken every `delta` seconds.
    pub fn apply(&self, samples: &[f64], delta: f64) -> Vec<f64> {
        let mut out = match self.function {
            CharacteristicFunction::None => samples.to_vec(),
            CharacteristicFunction::Abs => samples.iter().map(|v| v.abs()).collect(),
            CharacteristicFunction::Envelope => envelope(samples),
            CharacteristicFunction::StaLta {
                short_s,
                long_ratio,
            } => sta_lta_centered(samples, delta, short_s, short_s * long_ratio),
        };
        if self.max_normalize {
            let peak = StatsHelper::peak_abs(&out);
            if peak > 0.0 && peak.is_finite() {
                out.iter_mut().for_each(|v| *v /= peak);
            }
        }
        if self.square {
            out.iter_mut().for_each(|v| *v *= *v);
        }
        cosine_taper(&mut out, self.taper_fraction);
        out
    }
}

fn window_samples(seconds: f64, delta: f64) -> usize {
    ((seconds / delta).round() as usize).max(1)
}

/// Ratio of centred moving means of the squared samples; zero where the
/// long-term mean vanishes.
pub fn sta_lta_centered(samples: &[f64], delta: f64, short_s: f64, long_s: f64) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0);
    let mut total = 0.0;
    for v in samples {
        total += v * v;
        prefix.push(total);
    }
    let n = samples.len();
    let centred_mean = |i: usize, width: usize| {
        let lo = i.saturating_sub(width / 2);
        let hi = (i + width - width / 2).min(n);
        (prefix[hi] - prefix[lo]) / (hi - lo) as f64
    };
    let short = window_samples(short_s, delta);
    let long = window_samples(long_s, delta);
    (0..n)
        .map(|i| {
            let lta = centred_mean(i, long);
            if lta > 0.0 {
                centred_mean(i, short) / lta
            } else {
                0.0
            }
        })
        .collect()
}

/// Raised-cosine fade over `fraction` of the samples at both ends.
pub fn cosine_taper(samples: &mut [f64], fraction: f64) {
    let n = samples.len();
    let ramp = ((n as f64 * fraction).floor() as usize).min(n / 2);
    for i in 0..ramp {
        let weight = 0.5 - 0.5 * (PI * i as f64 / ramp as f64).cos();
        samples[i] *= weight;
        samples[n - 1 - i] *= weight;
    }
}
