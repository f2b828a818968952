use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Forward/inverse FFT pair planned once for a fixed size.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Zero-padded forward transform of a real sequence.
    pub fn forward(&self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());
        self.forward.process(&mut buffer);
        buffer
    }

    /// Inverse transform scaled by `1/size`, real part only.
    pub fn inverse_real(&self, mut spectrum: Vec<Complex64>) -> Vec<f64> {
        spectrum.resize(self.size, Complex64::zero());
        self.inverse.process(&mut spectrum);
        let scale = 1.0 / self.size as f64;
        spectrum.iter().map(|c| c.re * scale).collect()
    }

    /// Inverse transform scaled by `1/size`, keeping the complex values.
    pub fn inverse_complex(&self, mut spectrum: Vec<Complex64>) -> Vec<Complex64> {
        spectrum.resize(self.size, Complex64::zero());
        self.inverse.process(&mut spectrum);
        let scale = 1.0 / self.size as f64;
        spectrum.iter().map(|c| c * scale).collect()
    }
}

/// Magnitude of the analytic signal of `samples`.
pub fn envelope(samples: &[f64]) -> Vec<f64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let helper = FftHelper::new(n);
    let mut spectrum = helper.forward(samples);
    let half = n / 2;
    for (k, value) in spectrum.iter_mut().enumerate() {
        let weight = if k == 0 || (n % 2 == 0 && k == half) {
            1.0
        } else if k <= (n - 1) / 2 {
            2.0
        } else {
            0.0
        };
        *value *= weight;
    }
    helper
        .inverse_complex(spectrum)
        .iter()
        .map(|c| c.norm())
        .collect()
}

/// Full linear cross-correlation over every valid lag.
///
/// `values[i]` holds `sum_j candidate[j] * reference[j + lag]` for
/// `lag = min_lag + i`.
#[derive(Debug, Clone)]
pub struct CrossCorrelation {
    pub values: Vec<f64>,
    pub min_lag: isize,
}

impl CrossCorrelation {
    pub fn lag_at(&self, index: usize) -> isize {
        self.min_lag + index as isize
    }

    /// Lag and value of the first maximum.
    pub fn peak(&self) -> Option<(isize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, &value) in self.values.iter().enumerate() {
            match best {
                Some((_, current)) if value <= current => {}
                _ if value.is_nan() => {}
                _ => best = Some((index, value)),
            }
        }
        best.map(|(index, value)| (self.lag_at(index), value))
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.values.iter_mut().for_each(|v| *v *= factor);
        self
    }
}

pub fn cross_correlate(reference: &[f64], candidate: &[f64]) -> CrossCorrelation {
    if reference.is_empty() || candidate.is_empty() {
        return CrossCorrelation {
            values: Vec::new(),
            min_lag: 0,
        };
    }
    let n = reference.len();
    let m = candidate.len();
    let size = (n + m - 1).next_power_of_two();
    let helper = FftHelper::new(size);

    let ref_spec = helper.forward(reference);
    let cand_spec = helper.forward(candidate);
    let product: Vec<Complex64> = ref_spec
        .iter()
        .zip(cand_spec.iter())
        .map(|(r, c)| r * c.conj())
        .collect();
    let circular = helper.inverse_real(product);

    let min_lag = -(m as isize - 1);
    let values = (min_lag..n as isize)
        .map(|lag| circular[lag.rem_euclid(size as isize) as usize])
        .collect();

    CrossCorrelation { values, min_lag }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(reference: &[f64], candidate: &[f64], lag: isize) -> f64 {
        candidate
            .iter()
            .enumerate()
            .filter_map(|(j, &c)| {
                let idx = j as isize + lag;
                (idx >= 0 && (idx as usize) < reference.len()).then(|| c * reference[idx as usize])
            })
            .sum()
    }

    #[test]
    fn fft_helper_returns_same_length() {
        let helper = FftHelper::new(4);
        let output = helper.forward(&[1.0, 0.0, -1.0, 0.0]);
        assert_eq!(output.len(), 4);
        let back = helper.inverse_real(output);
        assert!((back[0] - 1.0).abs() < 1e-12);
        assert!((back[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_matches_direct_sum() {
        let reference = [0.0, 1.0, 3.0, -2.0, 0.5];
        let candidate = [1.0, -1.0, 2.0];
        let xcorr = cross_correlate(&reference, &candidate);
        assert_eq!(xcorr.values.len(), reference.len() + candidate.len() - 1);
        for (i, value) in xcorr.values.iter().enumerate() {
            let expected = direct(&reference, &candidate, xcorr.lag_at(i));
            assert!((value - expected).abs() < 1e-9, "lag {}", xcorr.lag_at(i));
        }
    }

    #[test]
    fn envelope_of_sine_is_flat() {
        // 8 whole periods over 256 samples.
        let samples: Vec<f64> = (0..256)
            .map(|i| 3.0 * (2.0 * std::f64::consts::PI * 8.0 * i as f64 / 256.0).sin())
            .collect();
        for value in envelope(&samples) {
            assert!((value - 3.0).abs() < 1e-9);
        }
        assert!(envelope(&[]).is_empty());
    }

    #[test]
    fn peak_finds_shift_of_impulse() {
        let mut reference = vec![0.0; 16];
        let mut candidate = vec![0.0; 16];
        reference[9] = 1.0;
        candidate[4] = 1.0;
        let (lag, value) = cross_correlate(&reference, &candidate).peak().unwrap();
        assert_eq!(lag, 5);
        assert!((value - 1.0).abs() < 1e-9);
    }
}
