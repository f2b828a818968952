use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wavelet {
    #[default]
    Ricker,
    Boxcar,
}

impl Wavelet {
    /// Amplitude at `t` seconds relative to the wavelet's onset.
    pub fn sample(&self, t: f64, frequency_hz: f64) -> f64 {
        match self {
            Wavelet::Ricker => ricker(t - 1.0 / frequency_hz, frequency_hz),
            Wavelet::Boxcar => boxcar(t, 1.0 / frequency_hz),
        }
    }
}

/// Ricker wavelet centred on `t = 0`.
pub fn ricker(t: f64, frequency_hz: f64) -> f64 {
    let arg = (PI * frequency_hz * t).powi(2);
    (1.0 - 2.0 * arg) * (-arg).exp()
}

/// Unit boxcar over `[0, width)`.
pub fn boxcar(t: f64, width: f64) -> f64 {
    if (0.0..width).contains(&t) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ricker_peaks_at_center() {
        assert_eq!(ricker(0.0, 2.0), 1.0);
        assert!(ricker(0.3, 2.0) < 0.0);
        assert!(ricker(5.0, 2.0).abs() < 1e-12);
    }

    #[test]
    fn boxcar_is_half_open() {
        assert_eq!(boxcar(0.0, 0.5), 1.0);
        assert_eq!(boxcar(0.5, 0.5), 0.0);
        assert_eq!(Wavelet::Boxcar.sample(-0.01, 2.0), 0.0);
    }
}
