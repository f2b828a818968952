use beamcore::interface::{Resampler, Trace};
use log::warn;
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Band-limited sinc interpolation onto a new sample interval.
///
/// One single-channel `SincFixedIn` is built per trace with the whole trace
/// as its input chunk. The filter delay is trimmed so the output starts at
/// the input start time.
#[derive(Debug, Clone, Copy)]
pub struct SincResampler {
    pub sinc_len: usize,
    /// Cutoff relative to the lower of the two Nyquist frequencies.
    pub f_cutoff: f32,
    pub oversampling_factor: usize,
}

impl Default for SincResampler {
    fn default() -> Self {
        Self {
            sinc_len: 128,
            f_cutoff: 0.95,
            oversampling_factor: 256,
        }
    }
}

impl SincResampler {
    fn parameters(&self) -> SincInterpolationParameters {
        SincInterpolationParameters {
            sinc_len: self.sinc_len,
            f_cutoff: self.f_cutoff,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: self.oversampling_factor,
            window: WindowFunction::BlackmanHarris2,
        }
    }

    fn convert(&self, samples: &[f64], ratio: f64, wanted: usize) -> Result<Vec<f64>, String> {
        let mut engine = SincFixedIn::<f64>::new(ratio, 1.0, self.parameters(), samples.len(), 1)
            .map_err(|err| err.to_string())?;
        let delay = engine.output_delay();
        let mut output = engine
            .process(&[samples], None)
            .map_err(|err| err.to_string())?
            .swap_remove(0);
        // Flush the filter tail with silence until the delayed output is complete.
        let mut flushes = 0;
        while output.len() < delay + wanted {
            if flushes == 8 {
                return Err(format!(
                    "filter produced {} of {} frames",
                    output.len(),
                    delay + wanted
                ));
            }
            let tail = engine
                .process_partial(None::<&[Vec<f64>]>, None)
                .map_err(|err| err.to_string())?;
            output.extend(tail.into_iter().flatten());
            flushes += 1;
        }
        Ok(output[delay..delay + wanted].to_vec())
    }
}

impl Resampler for SincResampler {
    fn resample(&self, trace: &Trace, delta: f64) -> Option<Trace> {
        if !(delta > 0.0) || !(trace.delta > 0.0) || trace.len() < 2 {
            return None;
        }
        let ratio = trace.delta / delta;
        let wanted = ((trace.len() - 1) as f64 * ratio + 1e-9).floor() as usize + 1;
        match self.convert(&trace.samples, ratio, wanted) {
            Ok(samples) => Some(Trace::new(trace.id.clone(), trace.start, delta, samples)),
            Err(err) => {
                warn!("resampling {} to {delta}s failed: {err}", trace.id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamcore::interface::ChannelId;
    use std::f64::consts::PI;

    fn sine(delta: f64, len: usize) -> Trace {
        Trace::new(
            ChannelId::new("SY", "A", "", "Z"),
            5.0,
            delta,
            (0..len).map(|i| (2.0 * PI * i as f64 * delta).sin()).collect(),
        )
    }

    fn assert_follows_sine(trace: &Trace, skip: usize) {
        let interior = &trace.samples[skip..trace.len() - skip];
        for (offset, value) in interior.iter().enumerate() {
            let t = (skip + offset) as f64 * trace.delta;
            let want = (2.0 * PI * t).sin();
            assert!((value - want).abs() < 1e-2, "t={t} got {value} want {want}");
        }
    }

    #[test]
    fn downsampling_keeps_low_frequency_sine() {
        let coarse = SincResampler::default().resample(&sine(0.01, 1000), 0.02).unwrap();
        assert_eq!(coarse.len(), 500);
        assert_eq!(coarse.start, 5.0);
        assert_eq!(coarse.delta, 0.02);
        assert_follows_sine(&coarse, 100);
    }

    #[test]
    fn upsampling_keeps_low_frequency_sine() {
        let fine = SincResampler::default().resample(&sine(0.02, 500), 0.01).unwrap();
        assert_eq!(fine.len(), 999);
        assert_follows_sine(&fine, 200);
    }

    #[test]
    fn degenerate_requests_are_refused() {
        let resampler = SincResampler::default();
        assert!(resampler.resample(&sine(0.01, 100), 0.0).is_none());
        assert!(resampler.resample(&sine(0.01, 1), 0.02).is_none());
    }
}
