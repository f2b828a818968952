use crate::interface::{FilterPrimitive, Trace};
use crate::prelude::FilterBand;

/// Applies a configured band through the external filter, on copies only.
#[derive(Clone, Copy)]
pub struct BandFilter<'a> {
    filter: &'a dyn FilterPrimitive,
    band: FilterBand,
}

impl<'a> BandFilter<'a> {
    pub fn new(filter: &'a dyn FilterPrimitive, band: FilterBand) -> Self {
        Self { filter, band }
    }

    pub fn apply(&self, trace: &mut Trace) {
        if let Some(corner) = self.band.highpass_hz {
            self.filter.highpass(trace, self.band.order, corner);
        }
        if let Some(corner) = self.band.lowpass_hz {
            self.filter.lowpass(trace, self.band.order, corner);
        }
    }

    pub fn filtered(&self, trace: &Trace) -> Trace {
        let mut copy = trace.clone();
        self.apply(&mut copy);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ChannelId;

    struct Scale;

    impl FilterPrimitive for Scale {
        fn highpass(&self, trace: &mut Trace, _order: u32, _corner_hz: f64) {
            trace.samples.iter_mut().for_each(|v| *v *= 2.0);
        }

        fn lowpass(&self, trace: &mut Trace, _order: u32, _corner_hz: f64) {
            trace.samples.iter_mut().for_each(|v| *v += 1.0);
        }
    }

    #[test]
    fn filtered_copy_leaves_input_untouched() {
        let band = FilterBand {
            highpass_hz: Some(0.5),
            lowpass_hz: Some(4.0),
            order: 4,
        };
        let trace = Trace::new(ChannelId::new("X", "A", "", "Z"), 0.0, 0.1, vec![1.0, 2.0]);
        let filtered = BandFilter::new(&Scale, band).filtered(&trace);
        assert_eq!(filtered.samples, vec![3.0, 5.0]);
        assert_eq!(trace.samples, vec![1.0, 2.0]);
    }
}
