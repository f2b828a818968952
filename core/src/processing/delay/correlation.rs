use super::{DelayContext, DelayEntry, DelayTable};
use crate::interface::{ChannelPattern, Trace};
use crate::math::fft::cross_correlate;
use crate::math::stats::StatsHelper;
use crate::telemetry::Anomaly;
use std::collections::BTreeMap;

/// Best lag between two traces, already converted to seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagEstimate {
    pub delay: f64,
    pub coefficient: f64,
}

/// Delay of `candidate` relative to `reference`.
///
/// Only the central `central_fraction` of the candidate takes part in the
/// correlation. Returns `None` when either trace is identically zero, or
/// when the sample intervals differ.
pub fn correlation_delay(
    reference: &Trace,
    candidate: &Trace,
    normalize: bool,
    central_fraction: f64,
) -> Option<LagEstimate> {
    if reference.is_all_zero() || candidate.is_all_zero() {
        return None;
    }
    if (reference.delta - candidate.delta).abs() > f64::EPSILON * reference.delta.abs().max(1.0) {
        return None;
    }
    let window = candidate.central(central_fraction)?;
    if window.is_all_zero() {
        return None;
    }

    let mut xcorr = cross_correlate(&reference.samples, &window.samples);
    if normalize {
        let energy = StatsHelper::sum_squares(&reference.samples) * StatsHelper::sum_squares(&window.samples);
        if energy <= 0.0 {
            return None;
        }
        xcorr = xcorr.scaled(1.0 / energy.sqrt());
    }
    let (lag, coefficient) = xcorr.peak()?;

    Some(LagEstimate {
        delay: (window.start - reference.start) - lag as f64 * reference.delta,
        coefficient,
    })
}

/// Correlates every trace against a reference of its channel-code group.
pub(super) fn estimate(
    ctx: &DelayContext<'_>,
    central_fraction: f64,
    reference: Option<&ChannelPattern>,
) -> DelayTable {
    let prepared: Vec<Trace> = match &ctx.prefilter {
        Some(filter) => ctx.traces.iter().map(|t| filter.filtered(t)).collect(),
        None => ctx.traces.to_vec(),
    };

    let mut groups: BTreeMap<&str, Vec<&Trace>> = BTreeMap::new();
    let mut skipped = Vec::new();
    for trace in &prepared {
        if trace.is_all_zero() {
            skipped.push(ChannelPattern::exact(&trace.id));
            ctx.metrics.record_anomaly(Anomaly::DegenerateTrace);
            ctx.logger
                .anomaly(&format!("{} is all zero, skipped for correlation", trace.id));
            continue;
        }
        groups.entry(trace.id.channel.as_str()).or_default().push(trace);
    }

    let mut entries = Vec::new();
    for (channel, members) in groups {
        let anchor = reference
            .and_then(|pattern| members.iter().find(|t| pattern.matches(&t.id)))
            .or_else(|| members.first())
            .copied();
        let Some(anchor) = anchor else {
            continue;
        };
        ctx.logger
            .detail(&format!("channel {channel}: correlating against {}", anchor.id));
        entries.push(DelayEntry {
            pattern: ChannelPattern::exact(&anchor.id),
            delay: 0.0,
        });

        for trace in members.iter().filter(|t| t.id != anchor.id) {
            match correlation_delay(anchor, trace, ctx.normalize, central_fraction) {
                Some(estimate) => {
                    ctx.logger.detail(&format!(
                        "{} lag {:.4}s coefficient {:.4}",
                        trace.id, estimate.delay, estimate.coefficient
                    ));
                    entries.push(DelayEntry {
                        pattern: ChannelPattern::exact(&trace.id),
                        delay: estimate.delay,
                    });
                }
                None => {
                    skipped.push(ChannelPattern::exact(&trace.id));
                    ctx.metrics.record_anomaly(Anomaly::DegenerateTrace);
                    ctx.logger
                        .anomaly(&format!("no correlation peak for {}", trace.id));
                }
            }
        }
    }
    DelayTable::new(entries).with_skipped(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ChannelId;

    fn boxcar(station: &str, onset: usize) -> Trace {
        let mut samples = vec![0.0; 400];
        samples[onset..onset + 50].iter_mut().for_each(|v| *v = 1.0);
        Trace::new(ChannelId::new("XX", station, "", "Z"), 100.0, 0.01, samples)
    }

    #[test]
    fn recovers_five_sample_boxcar_delay() {
        let reference = boxcar("A", 150);
        let delayed = boxcar("B", 155);
        let estimate = correlation_delay(&reference, &delayed, false, 0.8).unwrap();
        assert!((estimate.delay - 0.05).abs() <= 0.01, "{}", estimate.delay);

        let normalized = correlation_delay(&reference, &delayed, true, 0.8).unwrap();
        assert!((normalized.delay - 0.05).abs() <= 0.01);
        assert!(normalized.coefficient <= 1.0 + 1e-9);
    }

    #[test]
    fn recovers_shift_of_start_time() {
        let reference = boxcar("A", 150);
        let mut later = reference.clone();
        later.id = ChannelId::new("XX", "B", "", "Z");
        later.shift(0.37);
        let estimate = correlation_delay(&reference, &later, true, 1.0).unwrap();
        assert!((estimate.delay - 0.37).abs() <= 0.01, "{}", estimate.delay);
    }

    #[test]
    fn zero_trace_has_no_estimate() {
        let reference = boxcar("A", 150);
        let silent = reference.with_samples(vec![0.0; 400]);
        assert!(correlation_delay(&reference, &silent, false, 0.8).is_none());
        assert!(correlation_delay(&silent, &reference, false, 0.8).is_none());
    }
}
