use beamcore::interface::{FilterPrimitive, Trace};
use log::warn;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy)]
struct Section {
    b: [f64; 3],
    a: [f64; 2],
}

impl Section {
    fn run(&self, samples: &mut [f64]) {
        let (mut z1, mut z2) = (0.0, 0.0);
        for value in samples.iter_mut() {
            let x = *value;
            let y = self.b[0] * x + z1;
            z1 = self.b[1] * x - self.a[0] * y + z2;
            z2 = self.b[2] * x - self.a[1] * y;
            *value = y;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Low,
    High,
}

/// Causal Butterworth filter built from cascaded biquads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButterworthFilter;

impl ButterworthFilter {
    pub fn new() -> Self {
        Self
    }

    fn sections(band: Band, order: u32, corner_hz: f64, delta: f64) -> Option<Vec<Section>> {
        let nyquist = 0.5 / delta;
        if !(corner_hz > 0.0 && corner_hz < nyquist) || order == 0 {
            return None;
        }
        let w0 = 2.0 * PI * corner_hz * delta;
        let (sin_w, cos_w) = w0.sin_cos();
        let mut sections = Vec::new();

        for k in 0..order / 2 {
            let q = 1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * order) as f64).cos());
            let alpha = sin_w / (2.0 * q);
            let a0 = 1.0 + alpha;
            let b = match band {
                Band::Low => [(1.0 - cos_w) / 2.0, 1.0 - cos_w, (1.0 - cos_w) / 2.0],
                Band::High => [(1.0 + cos_w) / 2.0, -(1.0 + cos_w), (1.0 + cos_w) / 2.0],
            };
            sections.push(Section {
                b: [b[0] / a0, b[1] / a0, b[2] / a0],
                a: [-2.0 * cos_w / a0, (1.0 - alpha) / a0],
            });
        }

        if order % 2 == 1 {
            let k = (w0 / 2.0).tan();
            let norm = 1.0 / (1.0 + k);
            let b = match band {
                Band::Low => [k * norm, k * norm, 0.0],
                Band::High => [norm, -norm, 0.0],
            };
            sections.push(Section {
                b,
                a: [(k - 1.0) * norm, 0.0],
            });
        }
        Some(sections)
    }

    fn apply(&self, band: Band, trace: &mut Trace, order: u32, corner_hz: f64) {
        match Self::sections(band, order, corner_hz, trace.delta) {
            Some(sections) => {
                for section in &sections {
                    section.run(&mut trace.samples);
                }
            }
            None => warn!(
                "{:?}-pass corner {} Hz unusable for {} (interval {}s), left unfiltered",
                band, corner_hz, trace.id, trace.delta
            ),
        }
    }
}

impl FilterPrimitive for ButterworthFilter {
    fn highpass(&self, trace: &mut Trace, order: u32, corner_hz: f64) {
        self.apply(Band::High, trace, order, corner_hz);
    }

    fn lowpass(&self, trace: &mut Trace, order: u32, corner_hz: f64) {
        self.apply(Band::Low, trace, order, corner_hz);
    }
}
