use crate::interface::{ChannelId, Trace};
use crate::prelude::{EngineError, EngineResult};
use crate::processing::delay::DelayTable;
use crate::telemetry::{Anomaly, LogManager, MetricsRecorder};
use serde::Serialize;

/// Relative tolerance when comparing sample intervals.
const INTERVAL_TOLERANCE: f64 = 1e-9;

pub fn same_interval(a: f64, b: f64) -> bool {
    (a - b).abs() <= INTERVAL_TOLERANCE * a.abs().max(b.abs())
}

/// Time-shifted copy with its start moved earlier by `delay`.
pub fn align(trace: &Trace, delay: f64) -> Trace {
    trace.shifted(-delay)
}

/// Shift actually applied to one trace during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedShift {
    pub channel: ChannelId,
    pub delay: f64,
}

/// Applies delays to traces that already share one sample interval.
pub struct Aligner {
    delta: f64,
}

impl Aligner {
    pub fn new(delta: f64) -> EngineResult<Self> {
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "sample interval {delta} must be positive"
            )));
        }
        Ok(Self { delta })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn align(&self, trace: &Trace, delay: f64) -> EngineResult<Trace> {
        if !same_interval(trace.delta, self.delta) {
            return Err(EngineError::SampleRateMismatch {
                expected: self.delta,
                found: trace.delta,
                channel: trace.id.to_string(),
            });
        }
        Ok(align(trace, delay))
    }

    /// Aligns every trace that has a delay; the rest are counted and left out.
    pub fn align_all(
        &self,
        traces: &[Trace],
        delays: &DelayTable,
        metrics: &MetricsRecorder,
        logger: &LogManager,
    ) -> EngineResult<(Vec<Trace>, Vec<AppliedShift>)> {
        let mut aligned = Vec::with_capacity(traces.len());
        let mut shifts = Vec::with_capacity(traces.len());
        for trace in traces {
            let Some(delay) = delays.delay_for(&trace.id) else {
                if delays.is_skipped(&trace.id) {
                    logger.detail(&format!("{} skipped by the delay strategy", trace.id));
                    continue;
                }
                metrics.record_anomaly(Anomaly::MissingDelay);
                logger.anomaly(&format!("no delay for {}, excluded", trace.id));
                continue;
            };
            aligned.push(self.align(trace, delay)?);
            logger.detail(&format!("{} shifted by {:.4}s", trace.id, -delay));
            shifts.push(AppliedShift {
                channel: trace.id.clone(),
                delay,
            });
        }
        Ok((aligned, shifts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ChannelPattern;
    use crate::processing::delay::DelayEntry;

    fn trace(station: &str) -> Trace {
        Trace::new(
            ChannelId::new("XX", station, "", "Z"),
            50.0,
            0.1,
            vec![1.0, -2.0, 3.0],
        )
    }

    #[test]
    fn positive_delay_moves_start_earlier() {
        let original = trace("A");
        let aligned = align(&original, 1.5);
        assert_eq!(aligned.start, 48.5);
        assert_eq!(aligned.samples, original.samples);
        assert_eq!(original.start, 50.0);
    }

    #[test]
    fn rate_mismatch_is_rejected() {
        let aligner = Aligner::new(0.05).unwrap();
        assert!(matches!(
            aligner.align(&trace("A"), 0.0),
            Err(EngineError::SampleRateMismatch { .. })
        ));
        assert!(Aligner::new(0.0).is_err());
    }

    #[test]
    fn traces_without_delay_are_counted() {
        let delays = DelayTable::new(vec![DelayEntry {
            pattern: ChannelPattern::new("XX", "A", "", "*"),
            delay: 0.5,
        }]);
        let metrics = MetricsRecorder::new();
        let (aligned, shifts) = Aligner::new(0.1)
            .unwrap()
            .align_all(&[trace("A"), trace("B")], &delays, &metrics, &LogManager::default())
            .unwrap();
        assert_eq!(aligned.len(), 1);
        assert_eq!(shifts[0].delay, 0.5);
        assert_eq!(metrics.snapshot().count(Anomaly::MissingDelay), 1);
    }

    #[test]
    fn skipped_channels_are_not_counted_twice() {
        let delays = DelayTable::new(vec![DelayEntry {
            pattern: ChannelPattern::new("XX", "A", "", "*"),
            delay: 0.0,
        }])
        .with_skipped(vec![ChannelPattern::new("XX", "B", "", "Z")]);
        let metrics = MetricsRecorder::new();
        let (aligned, _) = Aligner::new(0.1)
            .unwrap()
            .align_all(&[trace("A"), trace("B")], &delays, &metrics, &LogManager::default())
            .unwrap();
        assert_eq!(aligned.len(), 1);
        assert_eq!(metrics.snapshot().total_anomalies(), 0);
    }
}
