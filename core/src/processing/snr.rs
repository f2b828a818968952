//! Signal-to-noise gate.
//!
//! For every reference time `t` the signal window is centred on `t` and the
//! noise window of equal length ends where the signal window starts. Windows
//! are half-open, so a sample on the shared boundary belongs to the signal
//! window only. Both windows are chopped independently from the trace source
//! and paired back up by window index and channel identity.

use crate::interface::{
    ChannelId, ChannelPattern, Event, Marker, Station, TimeWindow, Trace, TraceSource,
};
use crate::math::geodesic::Geodesic;
use crate::math::stats::StatsHelper;
use crate::prelude::{EngineError, EngineResult};
use crate::processing::arrivals::ArrivalCache;
use crate::processing::prefilter::BandFilter;
use crate::telemetry::{Anomaly, LogManager, MetricsRecorder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

const NOISE_SUFFIX: &str = "_noise";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnrMethod {
    /// Mean power of the signal window over mean power of the noise window.
    #[default]
    Power,
    /// Squared peak amplitude ratio.
    Peak,
}

/// Where the window reference time comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnrReference {
    /// Origin time of each event in scope.
    Event,
    /// Times of arrival picks, optionally of one phase.
    Picks {
        #[serde(default)]
        phase: Option<String>,
    },
    /// Modelled arrival of `phase` at each station.
    PhaseArrival { phase: String },
}

impl Default for SnrReference {
    fn default() -> Self {
        SnrReference::PhaseArrival { phase: "P".into() }
    }
}

fn default_window_length() -> f64 {
    10.0
}

fn default_channel() -> String {
    "*".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrConfig {
    #[serde(default = "default_window_length")]
    pub window_length: f64,
    /// Channels at or below this ratio end up in the hide-set.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub method: SnrMethod,
    #[serde(default)]
    pub db: bool,
    #[serde(default)]
    pub reference: SnrReference,
    /// Channel code pattern evaluated at each station.
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_true")]
    pub emit_markers: bool,
    /// Run both windows through the configured filter band first.
    #[serde(default)]
    pub filter: bool,
}

impl Default for SnrConfig {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            threshold: None,
            method: SnrMethod::Power,
            db: false,
            reference: SnrReference::default(),
            channel: default_channel(),
            emit_markers: true,
            filter: false,
        }
    }
}

/// Channel identity optionally qualified by the event it was measured for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnrKey {
    pub channel: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrRecord {
    #[serde(flatten)]
    pub key: SnrKey,
    pub ratio: f64,
}

/// Planned signal/noise window pair around one reference time.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrWindow {
    pub pattern: ChannelPattern,
    pub event: Option<String>,
    pub signal: Marker,
    pub noise: Marker,
}

/// A chopped trace tagged with the window it was cut for.
#[derive(Debug, Clone)]
pub struct WindowedTrace {
    pub window: usize,
    pub trace: Trace,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SnrReport {
    pub records: Vec<SnrRecord>,
    /// Signal and noise window markers derived for this run.
    pub markers: Vec<Marker>,
    /// Channels to suppress; only present with a threshold.
    pub hidden: Option<Vec<ChannelPattern>>,
}

impl SnrReport {
    pub fn ratio_for(&self, channel: &ChannelId) -> Option<f64> {
        self.records
            .iter()
            .find(|record| &record.key.channel == channel)
            .map(|record| record.ratio)
    }
}

/// Ratio of one signal window over its noise window.
///
/// Errors name the anomaly that excludes the pair.
pub fn snr_ratio(
    signal: &Trace,
    noise: &Trace,
    method: SnrMethod,
    db: bool,
) -> Result<f64, Anomaly> {
    if signal.is_empty() || signal.is_all_zero() {
        return Err(Anomaly::DegenerateTrace);
    }
    if noise.is_empty() || noise.is_all_zero() {
        return Err(Anomaly::SilentNoise);
    }
    let ratio = match method {
        SnrMethod::Power => {
            let signal_power = StatsHelper::sum_squares(&signal.samples) / signal.duration();
            let noise_power = StatsHelper::sum_squares(&noise.samples) / noise.duration();
            signal_power / noise_power
        }
        SnrMethod::Peak => {
            StatsHelper::peak_abs(&signal.samples).powi(2)
                / StatsHelper::peak_abs(&noise.samples).powi(2)
        }
    };
    if !ratio.is_finite() {
        return Err(Anomaly::DegenerateTrace);
    }
    Ok(if db { 10.0 * ratio.log10() } else { ratio })
}

/// Pairs signal and noise traces cut for the same window and channel.
///
/// Items without a partner are returned separately instead of being dropped
/// silently.
pub fn pair_windows(
    signal: Vec<WindowedTrace>,
    noise: Vec<WindowedTrace>,
) -> (Vec<(WindowedTrace, Trace)>, Vec<WindowedTrace>) {
    let mut pending: HashMap<(usize, ChannelId), VecDeque<Trace>> = HashMap::new();
    let mut noise_order = Vec::new();
    for item in noise {
        let key = (item.window, item.trace.id.clone());
        if !pending.contains_key(&key) {
            noise_order.push(key.clone());
        }
        pending.entry(key).or_default().push_back(item.trace);
    }

    let mut pairs = Vec::new();
    let mut unpaired = Vec::new();
    for item in signal {
        let key = (item.window, item.trace.id.clone());
        match pending.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(noise_trace) => pairs.push((item, noise_trace)),
            None => unpaired.push(item),
        }
    }
    for key in noise_order {
        if let Some(left) = pending.remove(&key) {
            unpaired.extend(left.into_iter().map(|trace| WindowedTrace {
                window: key.0,
                trace,
            }));
        }
    }
    (pairs, unpaired)
}

/// Every known channel whose ratio is not above `threshold`.
pub fn hide_set(known: &[ChannelId], records: &[SnrRecord], threshold: f64) -> Vec<ChannelPattern> {
    let visible: BTreeSet<&ChannelId> = records
        .iter()
        .filter(|record| record.ratio > threshold)
        .map(|record| &record.key.channel)
        .collect();
    known
        .iter()
        .filter(|id| !visible.contains(id))
        .map(ChannelPattern::exact)
        .collect()
}

/// Inputs the gate reads for one evaluation.
pub struct SnrContext<'a> {
    pub source: &'a dyn TraceSource,
    pub stations: &'a [Station],
    pub events: &'a [Event],
    pub markers: &'a [Marker],
    pub geodesic: &'a dyn Geodesic,
    pub arrivals: Option<&'a mut ArrivalCache>,
    pub filter: Option<BandFilter<'a>>,
    pub metrics: &'a MetricsRecorder,
    pub logger: &'a LogManager,
}

pub struct SnrGate {
    config: SnrConfig,
}

impl SnrGate {
    pub fn new(config: SnrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SnrConfig {
        &self.config
    }

    fn window_pair(&self, time: f64, pattern: ChannelPattern, label: &str, event: Option<&str>) -> SnrWindow {
        let half = self.config.window_length / 2.0;
        let mut signal = Marker::window(time - half, time + half, pattern.clone()).with_phase(label);
        let mut noise = Marker::window(
            time - half - self.config.window_length,
            time - half,
            pattern.clone(),
        )
        .with_phase(&format!("{label}{NOISE_SUFFIX}"));
        if let Some(name) = event {
            signal = signal.with_event(name);
            noise = noise.with_event(name);
        }
        SnrWindow {
            pattern,
            event: event.map(str::to_string),
            signal,
            noise,
        }
    }

    /// Number of distinct events the windows refer to.
    fn events_in_scope(&self, ctx: &SnrContext<'_>) -> usize {
        match &self.config.reference {
            SnrReference::Event | SnrReference::PhaseArrival { .. } => ctx.events.len(),
            SnrReference::Picks { phase } => ctx
                .markers
                .iter()
                .filter(|m| !m.is_event_marker())
                .filter(|m| phase.is_none() || m.phase == *phase)
                .filter_map(|m| m.event.as_deref())
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }

    /// Derives the signal and noise windows for the configured reference.
    pub fn plan_windows(&self, ctx: &mut SnrContext<'_>) -> EngineResult<Vec<SnrWindow>> {
        let mut windows = Vec::new();
        match &self.config.reference {
            SnrReference::Event => {
                for event in ctx.events {
                    for station in ctx.stations {
                        let pattern = ChannelPattern::station(&station.id, &self.config.channel);
                        windows.push(self.window_pair(event.time, pattern, "event", Some(&event.name)));
                    }
                }
            }
            SnrReference::Picks { phase } => {
                for pick in ctx.markers.iter().filter(|m| !m.is_event_marker()) {
                    if phase.is_some() && pick.phase != *phase {
                        continue;
                    }
                    let label = pick.phase.as_deref().unwrap_or("pick");
                    for pattern in &pick.patterns {
                        windows.push(self.window_pair(
                            pick.tmin,
                            pattern.clone(),
                            label,
                            pick.event.as_deref(),
                        ));
                    }
                }
            }
            SnrReference::PhaseArrival { phase } => {
                let cache = ctx.arrivals.as_deref_mut().ok_or_else(|| {
                    EngineError::Configuration(
                        "SNR phase reference requires an arrival model".into(),
                    )
                })?;
                let phases = vec![phase.clone()];
                for event in ctx.events {
                    for station in ctx.stations {
                        let line = ctx.geodesic.inverse(event.position(), station.position());
                        let Some(travel) = cache.first_arrival(line.distance_m, event.depth, &phases)
                        else {
                            ctx.metrics.record_anomaly(Anomaly::MissingArrival);
                            ctx.logger
                                .anomaly(&format!("no {phase} arrival at {}", station.id));
                            continue;
                        };
                        let pattern = ChannelPattern::station(&station.id, &self.config.channel);
                        windows.push(self.window_pair(
                            event.time + travel,
                            pattern,
                            phase,
                            Some(&event.name),
                        ));
                    }
                }
            }
        }
        Ok(windows)
    }

    fn chop_all(
        &self,
        ctx: &SnrContext<'_>,
        windows: &[SnrWindow],
        pick: impl Fn(&SnrWindow) -> &Marker,
    ) -> Vec<WindowedTrace> {
        let mut chopped = Vec::new();
        for (index, window) in windows.iter().enumerate() {
            let marker = pick(window);
            let selector = |id: &ChannelId| window.pattern.matches(id);
            for batch in ctx
                .source
                .chopper(TimeWindow::new(marker.tmin, marker.tmax), &selector)
            {
                chopped.extend(batch.into_iter().map(|trace| WindowedTrace {
                    window: index,
                    trace: match &ctx.filter {
                        Some(filter) => filter.filtered(&trace),
                        None => trace,
                    },
                }));
            }
        }
        chopped
    }

    pub fn evaluate(&self, ctx: &mut SnrContext<'_>) -> EngineResult<SnrReport> {
        if self.config.threshold.is_some() {
            let events = self.events_in_scope(ctx);
            if events > 1 {
                return Err(EngineError::AmbiguousThreshold(events));
            }
        }
        if self.config.filter && ctx.filter.is_none() {
            return Err(EngineError::Configuration(
                "SNR window filtering requested but no filter is attached".into(),
            ));
        }

        let windows = self.plan_windows(ctx)?;
        let signal = self.chop_all(ctx, &windows, |w| &w.signal);
        let noise = self.chop_all(ctx, &windows, |w| &w.noise);
        if signal.len() != noise.len() {
            ctx.logger.anomaly(&format!(
                "signal and noise sequences diverge: {} vs {} windows",
                signal.len(),
                noise.len()
            ));
        }
        let (pairs, unpaired) = pair_windows(signal, noise);
        for item in &unpaired {
            ctx.metrics.record_anomaly(Anomaly::UnpairedWindow);
            ctx.logger.anomaly(&format!(
                "{} has no partner window for reference #{}",
                item.trace.id, item.window
            ));
        }

        let mut records = Vec::with_capacity(pairs.len());
        for (signal, noise) in pairs {
            match snr_ratio(&signal.trace, &noise, self.config.method, self.config.db) {
                Ok(ratio) => {
                    ctx.metrics.record_processed();
                    records.push(SnrRecord {
                        key: SnrKey {
                            channel: signal.trace.id.clone(),
                            event: windows[signal.window].event.clone(),
                        },
                        ratio,
                    });
                }
                Err(anomaly) => {
                    ctx.metrics.record_anomaly(anomaly);
                    ctx.logger
                        .anomaly(&format!("{} skipped for SNR: {anomaly}", signal.trace.id));
                }
            }
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));

        let hidden = self
            .config
            .threshold
            .map(|threshold| hide_set(&ctx.source.channel_ids(), &records, threshold));
        let markers = if self.config.emit_markers {
            windows
                .iter()
                .flat_map(|w| [w.signal.clone(), w.noise.clone()])
                .collect()
        } else {
            Vec::new()
        };
        ctx.logger.record(&format!(
            "SNR computed for {} channels over {} windows",
            records.len(),
            windows.len()
        ));

        Ok(SnrReport {
            records,
            markers,
            hidden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{MemoryTraceSource, StationId};
    use crate::math::geodesic::Wgs84Geodesic;

    fn trace(station: &str, samples: Vec<f64>) -> Trace {
        Trace::new(ChannelId::new("XX", station, "", "Z"), 0.0, 1.0, samples)
    }

    /// Quiet first half, loud second half around t = 20.
    fn recording(station: &str, noise: f64, signal: f64) -> Trace {
        let samples = (0..40)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                sign * if i < 15 { noise } else { signal }
            })
            .collect();
        trace(station, samples)
    }

    fn config(threshold: Option<f64>) -> SnrConfig {
        SnrConfig {
            window_length: 10.0,
            threshold,
            reference: SnrReference::Event,
            ..SnrConfig::default()
        }
    }

    fn event(name: &str) -> Event {
        Event {
            name: name.into(),
            lat: 0.0,
            lon: 0.0,
            depth: 0.0,
            time: 20.0,
            magnitude: None,
        }
    }

    #[test]
    fn power_and_peak_ratios() {
        let signal = trace("A", vec![2.0, -2.0, 2.0, -2.0]);
        let noise = trace("A", vec![1.0, -1.0]);
        assert!((snr_ratio(&signal, &noise, SnrMethod::Power, false).unwrap() - 4.0).abs() < 1e-12);
        assert!((snr_ratio(&signal, &noise, SnrMethod::Peak, false).unwrap() - 4.0).abs() < 1e-12);
        let db = snr_ratio(&signal, &noise, SnrMethod::Power, true).unwrap();
        assert!((db - 10.0 * 4f64.log10()).abs() < 1e-12);
        let silent = trace("A", vec![0.0, 0.0]);
        assert_eq!(
            snr_ratio(&signal, &silent, SnrMethod::Power, false),
            Err(Anomaly::SilentNoise)
        );
    }

    #[test]
    fn threshold_splits_hidden_and_visible() {
        let a = ChannelId::new("XX", "A", "", "Z");
        let b = ChannelId::new("XX", "B", "", "Z");
        let c = ChannelId::new("XX", "C", "", "Z");
        let records = vec![
            SnrRecord {
                key: SnrKey {
                    channel: a.clone(),
                    event: None,
                },
                ratio: 2.0,
            },
            SnrRecord {
                key: SnrKey {
                    channel: b.clone(),
                    event: None,
                },
                ratio: 2.5,
            },
        ];
        let hidden = hide_set(&[a.clone(), b.clone(), c.clone()], &records, 2.0);
        assert!(hidden.contains(&ChannelPattern::exact(&a)));
        assert!(!hidden.contains(&ChannelPattern::exact(&b)));
        assert!(hidden.contains(&ChannelPattern::exact(&c)));
    }

    #[test]
    fn unpaired_windows_are_reported() {
        let item = |window, station: &str| WindowedTrace {
            window,
            trace: trace(station, vec![1.0]),
        };
        let (pairs, unpaired) = pair_windows(
            vec![item(0, "A"), item(1, "B"), item(2, "C")],
            vec![item(1, "B"), item(0, "A"), item(3, "D")],
        );
        assert_eq!(pairs.len(), 2);
        let names: Vec<&str> = unpaired.iter().map(|u| u.trace.id.station.as_str()).collect();
        assert_eq!(names, vec!["C", "D"]);
    }

    fn run(gate: &SnrGate, source: &MemoryTraceSource, events: &[Event]) -> EngineResult<SnrReport> {
        let stations = vec![
            Station::new(StationId::new("XX", "A", ""), 0.0, 0.0),
            Station::new(StationId::new("XX", "B", ""), 0.0, 0.1),
        ];
        let metrics = MetricsRecorder::new();
        let logger = LogManager::default();
        let mut ctx = SnrContext {
            source,
            stations: &stations,
            events,
            markers: &[],
            geodesic: &Wgs84Geodesic,
            arrivals: None,
            filter: None,
            metrics: &metrics,
            logger: &logger,
        };
        gate.evaluate(&mut ctx)
    }

    #[test]
    fn gate_hides_quiet_channels_around_event() {
        let source = MemoryTraceSource::new(vec![recording("A", 1.0, 5.0), recording("B", 1.0, 1.0)]);
        let report = run(&SnrGate::new(config(Some(2.0))), &source, &[event("ev")]).unwrap();
        let a = ChannelId::new("XX", "A", "", "Z");
        let b = ChannelId::new("XX", "B", "", "Z");
        assert!(report.ratio_for(&a).unwrap() > 2.0);
        assert!((report.ratio_for(&b).unwrap() - 1.0).abs() < 1e-9);
        let hidden = report.hidden.unwrap();
        assert_eq!(hidden, vec![ChannelPattern::exact(&b)]);
        assert_eq!(report.markers.len(), 4);
        assert_eq!(report.markers[1].phase.as_deref(), Some("event_noise"));
    }

    #[test]
    fn onset_on_window_boundary_counts_as_signal_only() {
        let mut samples = vec![1.0; 40];
        samples[15] = 100.0;
        let source = MemoryTraceSource::new(vec![trace("A", samples)]);
        let gate = SnrGate::new(SnrConfig {
            method: SnrMethod::Peak,
            ..config(None)
        });
        let report = run(&gate, &source, &[event("ev")]).unwrap();
        let ratio = report.ratio_for(&ChannelId::new("XX", "A", "", "Z")).unwrap();
        assert!((ratio - 10_000.0).abs() < 1e-9, "{ratio}");
    }

    #[test]
    fn threshold_with_two_events_is_ambiguous() {
        let source = MemoryTraceSource::new(vec![recording("A", 1.0, 5.0)]);
        let result = run(
            &SnrGate::new(config(Some(1.0))),
            &source,
            &[event("one"), event("two")],
        );
        assert!(matches!(result, Err(EngineError::AmbiguousThreshold(2))));
        assert!(run(&SnrGate::new(config(None)), &source, &[event("one"), event("two")]).is_ok());
    }
}
