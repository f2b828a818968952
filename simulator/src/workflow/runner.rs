use crate::dsp::filter::ButterworthFilter;
use crate::dsp::resample::SincResampler;
use crate::generator::profile::Scenario;
use crate::viewer::console::ConsoleViewer;
use crate::viewer::model::ViewerModel;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use beamcore::interface::{MemoryCatalog, MemoryTraceSource, TimeWindow};
use beamcore::processing::{
    scan_row, AbortHandle, ArrivalCache, BeamScan, DepthScan, HomogeneousHalfSpace, PreparedRun,
};
use beamcore::{ArrayEngine, EngineError, EngineOutput, RunInputs};
use log::info;
use std::sync::Arc;

fn sources(scenario: &Scenario) -> (MemoryCatalog, MemoryTraceSource) {
    (
        MemoryCatalog::new(scenario.stations.clone(), vec![scenario.event.clone()]),
        MemoryTraceSource::new(scenario.traces.clone()),
    )
}

fn run_inputs<'a>(
    scenario: &'a Scenario,
    catalog: &'a MemoryCatalog,
    source: &'a MemoryTraceSource,
) -> RunInputs<'a> {
    RunInputs {
        stations: catalog,
        events: catalog,
        markers: &scenario.picks,
        traces: source,
        window: TimeWindow::unbounded(),
        selector: None,
    }
}

pub struct WorkflowResult {
    pub output: EngineOutput,
    pub viewer: ViewerModel,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    viewer: ConsoleViewer,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            viewer: ConsoleViewer::new(),
        }
    }

    pub fn with_viewer(mut self, viewer: ConsoleViewer) -> Self {
        self.viewer = viewer;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn label(&self) -> String {
        self.config
            .label
            .clone()
            .unwrap_or_else(|| "beamsim".to_string())
    }

    fn engine(&self) -> ArrayEngine {
        let velocity = self.config.generator.velocity_km_s;
        let model = HomogeneousHalfSpace {
            p_velocity_km_s: velocity,
            s_velocity_km_s: velocity / 3f64.sqrt(),
        };
        ArrayEngine::new(self.config.engine.clone())
            .with_label(&self.label())
            .with_filter(Box::new(ButterworthFilter::new()))
            .with_resampler(Box::new(SincResampler::default()))
            .with_arrival_cache(ArrivalCache::new(Box::new(model)))
            .with_marker_sink(Box::new(self.viewer.clone()))
            .with_visualizer(Box::new(self.viewer.clone()))
    }

    pub fn execute(&self, scenario: &Scenario) -> anyhow::Result<WorkflowResult> {
        let (catalog, source) = sources(scenario);
        let inputs = run_inputs(scenario, &catalog, &source);

        let mut engine = self.engine();
        let output = engine
            .run(&inputs)
            .with_context(|| format!("running {} alignment", self.config.engine.alignment.name()))?;
        info!(
            "[{}] {} stacks, {} anomalies",
            self.label(),
            output.stacks.len(),
            output.metrics.total_anomalies()
        );

        Ok(WorkflowResult {
            output,
            viewer: self.viewer.snapshot(),
        })
    }

    /// Stack energy over the configured trial depths for the scenario event.
    pub fn depth_scan(&self, scenario: &Scenario) -> anyhow::Result<DepthScan> {
        let (catalog, source) = sources(scenario);
        let inputs = run_inputs(scenario, &catalog, &source);
        let depths = self.config.scan.depths_m()?;
        let phase = &self.config.scan.depth_phase;
        let scan = self
            .engine()
            .depth_scan(&inputs, phase, &depths)
            .with_context(|| format!("scanning {} depths for {phase}", depths.len()))?;
        info!("[{}] depth scan over {} depths", self.label(), depths.len());
        Ok(scan)
    }

    fn prepare(&self, scenario: &Scenario) -> anyhow::Result<PreparedRun> {
        let (catalog, source) = sources(scenario);
        let inputs = run_inputs(scenario, &catalog, &source);
        self.engine()
            .prepare(&inputs)
            .context("preparing traces for beam scan")
    }

    /// Beam scan with one blocking task per back-azimuth row.
    pub async fn scan(&self, scenario: &Scenario, abort: AbortHandle) -> anyhow::Result<BeamScan> {
        let grid = self.config.scan.grid()?;
        let prepared = Arc::new(self.prepare(scenario)?);
        let slownesses = Arc::new(grid.slownesses.clone());
        let strictness = self.config.engine.strictness;
        let normalize = self.config.engine.normalize;

        let mut handles = Vec::with_capacity(grid.back_azimuths.len());
        for &baz in &grid.back_azimuths {
            let prepared = prepared.clone();
            let slownesses = slownesses.clone();
            let abort = abort.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                if abort.is_aborted() {
                    return Err(EngineError::Aborted(format!("scan row {baz}")));
                }
                scan_row(
                    &prepared.geometry,
                    &prepared.traces,
                    baz,
                    &slownesses,
                    strictness,
                    normalize,
                )
            }));
        }

        let mut rows = Vec::with_capacity(handles.len());
        for handle in handles {
            let row = handle.await.context("joining beam scan task")??;
            rows.push(row);
        }
        BeamScan::from_rows(grid, rows).context("assembling beam scan")
    }
}
