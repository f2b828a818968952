//! Run orchestration: geometry, delays, alignment, stacking and the SNR gate.

use crate::interface::{
    ChannelId, Event, EventSource, FilterPrimitive, Marker, MarkerSink, Resampler,
    StationSource, TimeWindow, Trace, TraceSource, Visualizer,
};
use crate::math::geodesic::Wgs84Geodesic;
use crate::prelude::{EngineConfig, EngineError, EngineResult, FilterBand, RunState};
use crate::processing::align::{same_interval, AppliedShift, Aligner};
use crate::processing::arrivals::ArrivalCache;
use crate::processing::delay::{AlignmentMethod, DelayContext, DelayEstimator, DelayTable};
use crate::processing::geometry::{ArrayCenter, ArrayGeometry, GeometryModel};
use crate::processing::prefilter::BandFilter;
use crate::processing::scan::{beam_scan, stack_energy, BeamScan, DepthScan, ScanGrid};
use crate::processing::snr::{SnrContext, SnrGate, SnrReference, SnrReport};
use crate::processing::stack::{AddOutcome, GroupKey, Stacker};
use crate::telemetry::{Anomaly, LogManager, MetricsRecorder, RunMetrics};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked at stage and group boundaries.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn band_filter<'a>(
    band: Option<FilterBand>,
    filter: Option<&'a (dyn FilterPrimitive + Send + Sync)>,
) -> Option<BandFilter<'a>> {
    Some(BandFilter::new(filter?, band?))
}

/// Collaborators and selection for one run.
pub struct RunInputs<'a> {
    pub stations: &'a dyn StationSource,
    pub events: &'a dyn EventSource,
    pub markers: &'a [Marker],
    pub traces: &'a dyn TraceSource,
    pub window: TimeWindow,
    pub selector: Option<&'a dyn Fn(&ChannelId) -> bool>,
}

/// Geometry and rate-checked trace copies, ready for delay estimation.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub geometry: ArrayGeometry,
    pub events: Vec<Event>,
    pub traces: Vec<Trace>,
    pub delta: f64,
}

#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub center: ArrayCenter,
    pub delays: DelayTable,
    pub stacks: BTreeMap<GroupKey, Trace>,
    pub contributions: BTreeMap<GroupKey, usize>,
    pub shifts: Vec<AppliedShift>,
    pub snr: Option<SnrReport>,
    pub metrics: RunMetrics,
    pub state: RunState,
    /// Every state entered during the run, in order.
    pub transitions: Vec<RunState>,
}

pub struct ArrayEngine {
    config: EngineConfig,
    geometry: GeometryModel,
    geodesic: Wgs84Geodesic,
    filter: Option<Box<dyn FilterPrimitive + Send + Sync>>,
    resampler: Option<Box<dyn Resampler + Send + Sync>>,
    arrivals: Option<ArrivalCache>,
    marker_sink: Option<Box<dyn MarkerSink + Send>>,
    visualizer: Option<Box<dyn Visualizer + Send>>,
    abort: AbortHandle,
    metrics: MetricsRecorder,
    logger: LogManager,
    state: RunState,
    transitions: Vec<RunState>,
}

impl ArrayEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            geometry: GeometryModel::new(),
            geodesic: Wgs84Geodesic,
            filter: None,
            resampler: None,
            arrivals: None,
            marker_sink: None,
            visualizer: None,
            abort: AbortHandle::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::default(),
            state: RunState::Idle,
            transitions: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.logger = LogManager::new(label);
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn FilterPrimitive + Send + Sync>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_resampler(mut self, resampler: Box<dyn Resampler + Send + Sync>) -> Self {
        self.resampler = Some(resampler);
        self
    }

    /// Attaches a memo cache; it outlives the run until taken back.
    pub fn with_arrival_cache(mut self, cache: ArrivalCache) -> Self {
        self.arrivals = Some(cache);
        self
    }

    pub fn with_marker_sink(mut self, sink: Box<dyn MarkerSink + Send>) -> Self {
        self.marker_sink = Some(sink);
        self
    }

    pub fn with_visualizer(mut self, visualizer: Box<dyn Visualizer + Send>) -> Self {
        self.visualizer = Some(visualizer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// States entered since the last run started.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        self.transitions.push(state);
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn arrival_cache(&self) -> Option<&ArrivalCache> {
        self.arrivals.as_ref()
    }

    pub fn take_arrival_cache(&mut self) -> Option<ArrivalCache> {
        self.arrivals.take()
    }

    fn check_abort(&self, stage: &str) -> EngineResult<()> {
        if self.abort.is_aborted() {
            self.logger.anomaly(&format!("abort requested, stopping at {stage}"));
            return Err(EngineError::Aborted(stage.to_string()));
        }
        Ok(())
    }

    /// Dependent settings that need an attached collaborator.
    fn check_collaborators(&self) -> EngineResult<()> {
        self.config.validate()?;
        let needs_filter = matches!(
            self.config.alignment,
            AlignmentMethod::CrossCorrelation { prefilter: true, .. }
        ) || self.config.snr.as_ref().map_or(false, |snr| snr.filter);
        if needs_filter && self.filter.is_none() {
            return Err(EngineError::Configuration(
                "filtering requested but no filter is attached".into(),
            ));
        }
        let needs_arrivals = matches!(self.config.alignment, AlignmentMethod::PhaseArrival { .. })
            || self.config.snr.as_ref().map_or(false, |snr| {
                matches!(snr.reference, SnrReference::PhaseArrival { .. })
            });
        if needs_arrivals && self.arrivals.is_none() {
            return Err(EngineError::Configuration(
                "phase arrivals requested but no arrival model is attached".into(),
            ));
        }
        Ok(())
    }

    /// Resolves geometry and selects the traces of known stations, brought
    /// to one sample interval.
    pub fn prepare(&mut self, inputs: &RunInputs<'_>) -> EngineResult<PreparedRun> {
        self.transitions.clear();
        self.enter(RunState::Idle);
        self.metrics.reset();
        self.check_collaborators()?;

        let geometry = self
            .geometry
            .resolve(inputs.stations.stations(), self.config.center)?;
        self.logger.record(&format!(
            "array center ({:.5}, {:.5}) over {} stations",
            geometry.center.lat,
            geometry.center.lon,
            geometry.stations.len()
        ));
        self.enter(RunState::GeometryResolved);
        self.check_abort("geometry")?;

        let select = |id: &ChannelId| inputs.selector.map_or(true, |selector| selector(id));
        let mut selected = Vec::new();
        for batch in inputs.traces.chopper(inputs.window, &select) {
            for trace in batch {
                if !geometry.stations.iter().any(|station| station.owns(&trace.id)) {
                    self.metrics.record_anomaly(Anomaly::UnmatchedStation);
                    self.logger
                        .anomaly(&format!("{} has no station metadata, skipped", trace.id));
                    continue;
                }
                if trace.is_empty() || !(trace.delta > 0.0) {
                    self.metrics.record_anomaly(Anomaly::DegenerateTrace);
                    self.logger.anomaly(&format!("{} has no usable samples", trace.id));
                    continue;
                }
                selected.push(trace);
            }
        }
        if selected.is_empty() {
            return Err(EngineError::EmptySelection(
                "no traces of known stations in the requested window".into(),
            ));
        }

        let intervals: Vec<f64> = selected.iter().map(|t| t.delta).collect();
        let delta = self
            .config
            .sampling
            .target_interval(&intervals)
            .ok_or_else(|| EngineError::EmptySelection("no sample intervals".into()))?;
        let traces = self.unify_rate(selected, delta)?;

        Ok(PreparedRun {
            geometry,
            events: inputs.events.events(),
            traces,
            delta,
        })
    }

    fn unify_rate(&self, traces: Vec<Trace>, delta: f64) -> EngineResult<Vec<Trace>> {
        traces
            .into_iter()
            .map(|trace| {
                if same_interval(trace.delta, delta) {
                    return Ok(trace);
                }
                let mismatch = || EngineError::SampleRateMismatch {
                    expected: delta,
                    found: trace.delta,
                    channel: trace.id.to_string(),
                };
                let resampler = self.resampler.as_ref().ok_or_else(mismatch)?;
                let resampled = resampler.resample(&trace, delta).ok_or_else(mismatch)?;
                self.logger.detail(&format!(
                    "{} resampled from {}s to {}s",
                    trace.id, trace.delta, delta
                ));
                Ok(resampled)
            })
            .collect()
    }

    /// Executes one full run.
    ///
    /// Fatal conditions return an error and no partial stack; per-trace
    /// anomalies are counted in the returned metrics.
    pub fn run(&mut self, inputs: &RunInputs<'_>) -> EngineResult<EngineOutput> {
        let prepared = self.prepare(inputs)?;

        let delays = {
            let estimator = DelayEstimator::new(self.config.alignment.clone());
            let prefilter = match self.config.alignment {
                AlignmentMethod::CrossCorrelation {
                    prefilter: true, ..
                } => band_filter(self.config.filter, self.filter.as_deref()),
                _ => None,
            };
            let mut ctx = DelayContext {
                geometry: &prepared.geometry,
                geodesic: &self.geodesic,
                events: &prepared.events,
                markers: inputs.markers,
                traces: &prepared.traces,
                normalize: self.config.normalize,
                prefilter,
                arrivals: self.arrivals.as_mut(),
                metrics: &self.metrics,
                logger: &self.logger,
            };
            estimator.estimate(&mut ctx)?
        };
        self.enter(RunState::DelaysComputed);
        self.check_abort("delays")?;

        let aligner = Aligner::new(prepared.delta)?;
        let (aligned, shifts) =
            aligner.align_all(&prepared.traces, &delays, &self.metrics, &self.logger)?;
        if aligned.is_empty() {
            return Err(EngineError::EmptySelection(
                "no selected trace received a delay".into(),
            ));
        }
        self.enter(RunState::Aligned);

        let shifted: Vec<Trace> = if self.config.emit_shifted {
            aligned.iter().map(shifted_copy).collect()
        } else {
            Vec::new()
        };
        let (stacks, contributions) = self.stack(aligned)?;
        self.enter(RunState::Stacked);

        let snr = match self.config.snr.clone() {
            Some(snr_config) => {
                let gate = SnrGate::new(snr_config);
                let filter = if gate.config().filter {
                    band_filter(self.config.filter, self.filter.as_deref())
                } else {
                    None
                };
                let mut ctx = SnrContext {
                    source: inputs.traces,
                    stations: &prepared.geometry.stations,
                    events: &prepared.events,
                    markers: inputs.markers,
                    geodesic: &self.geodesic,
                    arrivals: self.arrivals.as_mut(),
                    filter,
                    metrics: &self.metrics,
                    logger: &self.logger,
                };
                Some(gate.evaluate(&mut ctx)?)
            }
            None => None,
        };

        if let Some(report) = &snr {
            if let (Some(sink), false) = (self.marker_sink.as_mut(), report.markers.is_empty()) {
                sink.add_markers(&report.markers);
            }
            if let Some(hidden) = &report.hidden {
                self.logger
                    .record(&format!("{} channels below SNR threshold", hidden.len()));
                if let Some(visualizer) = self.visualizer.as_mut() {
                    visualizer.hide(hidden);
                }
                self.enter(RunState::Filtered);
            }
        }

        if let Some(visualizer) = self.visualizer.as_mut() {
            let mut rendered = shifted;
            rendered.extend(stacks.values().cloned());
            visualizer.show_traces(&rendered);
        }
        self.enter(RunState::Done);

        let metrics = self.metrics.snapshot();
        self.logger.record(&format!(
            "run done: {} stacks from {} traces, {} anomalies",
            stacks.len(),
            metrics.processed,
            metrics.total_anomalies()
        ));

        Ok(EngineOutput {
            center: prepared.geometry.center,
            delays,
            stacks,
            contributions,
            shifts,
            snr,
            metrics,
            state: self.state,
            transitions: self.transitions.clone(),
        })
    }

    #[allow(clippy::type_complexity)]
    fn stack(
        &self,
        aligned: Vec<Trace>,
    ) -> EngineResult<(BTreeMap<GroupKey, Trace>, BTreeMap<GroupKey, usize>)> {
        let mut stacker =
            Stacker::new(self.config.strictness).with_characteristic(self.config.characteristic);
        let mut groups: BTreeMap<GroupKey, Vec<Trace>> = BTreeMap::new();
        for trace in aligned {
            groups.entry(stacker.key_for(&trace.id)).or_default().push(trace);
        }

        for (key, members) in groups {
            self.check_abort(&format!("stack group {key}"))?;
            for trace in members {
                match stacker.add_to_group(key.clone(), &trace, self.config.normalize)? {
                    AddOutcome::Added { .. } => self.metrics.record_processed(),
                    AddOutcome::ZeroVariance => {
                        self.metrics.record_anomaly(Anomaly::ZeroVariance);
                        self.logger
                            .anomaly(&format!("{} has zero variance, not stacked", trace.id));
                    }
                    AddOutcome::LengthMismatch { expected, found } => {
                        self.metrics.record_anomaly(Anomaly::LengthMismatch);
                        self.logger.anomaly(&format!(
                            "{} has {found} samples, group {key} expects {expected}",
                            trace.id
                        ));
                    }
                }
            }
        }
        if stacker.group_count() == 0 {
            return Err(EngineError::EmptySelection(
                "every aligned trace was rejected by the stacker".into(),
            ));
        }

        let stacks = stacker.finalize_all();
        let contributions = stacks
            .keys()
            .filter_map(|key| {
                stacker
                    .accumulator(key)
                    .map(|acc| (key.clone(), acc.count()))
            })
            .collect();
        Ok((stacks, contributions))
    }

    /// Plane-wave beam power over `grid` using this engine's selection.
    pub fn scan(&mut self, inputs: &RunInputs<'_>, grid: ScanGrid) -> EngineResult<BeamScan> {
        let prepared = self.prepare(inputs)?;
        let scan = beam_scan(
            &prepared.geometry,
            &prepared.traces,
            grid,
            self.config.strictness,
            self.config.normalize,
            &self.abort,
        )?;
        if let Some(best) = scan.best() {
            self.logger.record(&format!(
                "beam peak at baz {:.1} slowness {:.3} power {:.4e}",
                best.back_azimuth_deg, best.slowness_s_per_km, best.power
            ));
        }
        self.enter(RunState::Done);
        Ok(scan)
    }

    /// Stack energy per trial source depth.
    ///
    /// Each depth re-derives `phase` delays for the single event in scope
    /// with its depth replaced, then aligns and stacks with this engine's
    /// settings, the characteristic function included.
    pub fn depth_scan(
        &mut self,
        inputs: &RunInputs<'_>,
        phase: &str,
        depths_m: &[f64],
    ) -> EngineResult<DepthScan> {
        if depths_m.is_empty() {
            return Err(EngineError::Configuration("depth scan without depths".into()));
        }
        if self.arrivals.is_none() {
            return Err(EngineError::Configuration(
                "depth scan requires an arrival model".into(),
            ));
        }
        let prepared = self.prepare(inputs)?;
        let event = match prepared.events.as_slice() {
            [event] => event.clone(),
            events => {
                return Err(EngineError::Configuration(format!(
                    "depth scan needs exactly one event, {} in scope",
                    events.len()
                )))
            }
        };

        let estimator = DelayEstimator::new(AlignmentMethod::PhaseArrival {
            phase: phase.to_string(),
        });
        let aligner = Aligner::new(prepared.delta)?;
        let mut energy = Vec::with_capacity(depths_m.len());
        for &depth in depths_m {
            self.check_abort(&format!("depth {depth:.0} m"))?;
            let trial = [Event {
                depth,
                ..event.clone()
            }];
            let delays = {
                let mut ctx = DelayContext {
                    geometry: &prepared.geometry,
                    geodesic: &self.geodesic,
                    events: &trial,
                    markers: inputs.markers,
                    traces: &prepared.traces,
                    normalize: self.config.normalize,
                    prefilter: None,
                    arrivals: self.arrivals.as_mut(),
                    metrics: &self.metrics,
                    logger: &self.logger,
                };
                estimator.estimate(&mut ctx)?
            };
            let (aligned, _) =
                aligner.align_all(&prepared.traces, &delays, &self.metrics, &self.logger)?;
            let value = if aligned.is_empty() {
                0.0
            } else {
                stack_energy(&self.stack(aligned)?.0)
            };
            self.logger
                .detail(&format!("depth {:.1} km stack energy {value:.4e}", depth / 1000.0));
            energy.push(value);
        }

        let scan = DepthScan {
            depths_m: depths_m.to_vec(),
            energy,
        };
        if let Some((depth, value)) = scan.best() {
            self.logger.record(&format!(
                "depth scan peak at {:.1} km, energy {value:.4e}",
                depth / 1000.0
            ));
        }
        self.enter(RunState::Done);
        Ok(scan)
    }
}

/// Copy of an aligned trace renamed to `<station>_s` for display.
fn shifted_copy(trace: &Trace) -> Trace {
    let mut copy = trace.clone();
    copy.id.station = format!("{}_s", copy.id.station);
    copy
}
