pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation.
    pub fn std(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let var = samples.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>()
            / samples.len() as f64;
        var.sqrt()
    }

    pub fn sum_squares(samples: &[f64]) -> f64 {
        samples.iter().map(|&v| v * v).sum()
    }

    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        (Self::sum_squares(samples) / samples.len() as f64).sqrt()
    }

    pub fn peak_abs(samples: &[f64]) -> f64 {
        samples.iter().fold(0.0, |acc, &v| acc.max(v.abs()))
    }

    /// Sum of values in ascending order, independent of input ordering.
    pub fn ordered_sum(values: &mut [f64]) -> f64 {
        values.sort_by(f64::total_cmp);
        values.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn std_matches_population_definition() {
        let std = StatsHelper::std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - 2.0).abs() < 1e-12);
        assert_eq!(StatsHelper::std(&[3.0, 3.0]), 0.0);
    }

    #[test]
    fn peak_abs_uses_magnitude() {
        assert_eq!(StatsHelper::peak_abs(&[1.0, -4.0, 3.0]), 4.0);
    }

    #[test]
    fn ordered_sum_is_permutation_invariant() {
        let mut a = [1e16, 1.0, -1e16, 3.5];
        let mut b = [3.5, -1e16, 1.0, 1e16];
        assert_eq!(
            StatsHelper::ordered_sum(&mut a).to_bits(),
            StatsHelper::ordered_sum(&mut b).to_bits()
        );
    }
}
