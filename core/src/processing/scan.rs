use crate::interface::Trace;
use crate::math::stats::StatsHelper;
use crate::prelude::{EngineError, EngineResult, MAX_SLOWNESS};
use crate::processing::align::align;
use crate::processing::delay::plane_wave;
use crate::processing::engine::AbortHandle;
use crate::processing::geometry::ArrayGeometry;
use crate::processing::stack::{GroupKey, GroupStrictness, Stacker};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Back-azimuth by slowness grid evaluated by a beam scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanGrid {
    pub back_azimuths: Vec<f64>,
    pub slownesses: Vec<f64>,
}

impl ScanGrid {
    /// Evenly spaced grid over `[0, 360)` and `[0, max_slowness]`.
    pub fn regular(baz_step_deg: f64, max_slowness: f64, slowness_step: f64) -> EngineResult<Self> {
        if !(baz_step_deg > 0.0 && baz_step_deg <= 360.0) {
            return Err(EngineError::Configuration(format!(
                "back azimuth step {baz_step_deg} outside (0, 360]"
            )));
        }
        if !(slowness_step > 0.0) || !(0.0..=MAX_SLOWNESS).contains(&max_slowness) {
            return Err(EngineError::Configuration(format!(
                "slowness grid 0..{max_slowness} step {slowness_step} is invalid"
            )));
        }
        let baz_count = (360.0 / baz_step_deg).ceil() as usize;
        let back_azimuths = (0..baz_count)
            .map(|i| i as f64 * baz_step_deg)
            .filter(|baz| *baz < 360.0)
            .collect();
        let slow_count = (max_slowness / slowness_step + 1e-9).floor() as usize + 1;
        let slownesses = (0..slow_count).map(|i| i as f64 * slowness_step).collect();
        Ok(Self {
            back_azimuths,
            slownesses,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.back_azimuths.len(), self.slownesses.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamPeak {
    pub back_azimuth_deg: f64,
    pub slowness_s_per_km: f64,
    pub power: f64,
}

/// Beam power per grid node, rows indexed by back azimuth.
#[derive(Debug, Clone)]
pub struct BeamScan {
    pub grid: ScanGrid,
    pub power: Array2<f64>,
}

impl BeamScan {
    pub fn from_rows(grid: ScanGrid, rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        let shape = grid.shape();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let power = Array2::from_shape_vec(shape, flat)
            .map_err(|err| EngineError::InvalidInput(format!("beam scan rows: {err}")))?;
        Ok(Self { grid, power })
    }

    /// Strongest node; the first one wins ties.
    pub fn best(&self) -> Option<BeamPeak> {
        let mut best: Option<((usize, usize), f64)> = None;
        for (index, &power) in self.power.indexed_iter() {
            if power.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if power <= current => {}
                _ => best = Some((index, power)),
            }
        }
        best.map(|((row, col), power)| BeamPeak {
            back_azimuth_deg: self.grid.back_azimuths[row],
            slowness_s_per_km: self.grid.slownesses[col],
            power,
        })
    }
}

/// Trial source depths in metres, `min_km` inclusive and `max_km` exclusive.
pub fn depth_grid(min_km: f64, max_km: f64, step_km: f64) -> EngineResult<Vec<f64>> {
    if !(step_km > 0.0) || !(min_km >= 0.0) || !(max_km > min_km) {
        return Err(EngineError::Configuration(format!(
            "depth grid {min_km}..{max_km} km step {step_km} is invalid"
        )));
    }
    let count = ((max_km - min_km) / step_km - 1e-9).ceil() as usize;
    Ok((0..count)
        .map(|i| (min_km + i as f64 * step_km) * 1000.0)
        .collect())
}

/// Stack energy per trial depth, in the order the depths were given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthScan {
    pub depths_m: Vec<f64>,
    pub energy: Vec<f64>,
}

impl DepthScan {
    /// Depth and energy of the strongest stack; the first one wins ties.
    pub fn best(&self) -> Option<(f64, f64)> {
        self.depths_m
            .iter()
            .zip(&self.energy)
            .filter(|(_, e)| !e.is_nan())
            .fold(None, |best: Option<(f64, f64)>, (&depth, &energy)| match best {
                Some((_, current)) if energy <= current => best,
                _ => Some((depth, energy)),
            })
    }
}

/// Sum of squared samples over every stacked group.
pub fn stack_energy(stacks: &BTreeMap<GroupKey, Trace>) -> f64 {
    stacks
        .values()
        .map(|stack| StatsHelper::sum_squares(&stack.samples))
        .sum()
}

/// Plane-wave stacks of `traces` for one back azimuth and slowness.
pub fn beam(
    geometry: &ArrayGeometry,
    traces: &[Trace],
    back_azimuth_deg: f64,
    slowness_s_per_km: f64,
    strictness: GroupStrictness,
    normalize: bool,
) -> EngineResult<BTreeMap<GroupKey, Trace>> {
    let delays = plane_wave::estimate(geometry, back_azimuth_deg, slowness_s_per_km);
    let mut stacker = Stacker::new(strictness);
    for trace in traces {
        if let Some(delay) = delays.delay_for(&trace.id) {
            stacker.add(&align(trace, delay), normalize)?;
        }
    }
    Ok(stacker.finalize_all())
}

/// Mean square amplitude averaged over the stacked groups.
pub fn beam_power(stacks: &BTreeMap<GroupKey, Trace>) -> f64 {
    if stacks.is_empty() {
        return 0.0;
    }
    stacks
        .values()
        .map(|stack| StatsHelper::rms(&stack.samples).powi(2))
        .sum::<f64>()
        / stacks.len() as f64
}

pub fn scan_row(
    geometry: &ArrayGeometry,
    traces: &[Trace],
    back_azimuth_deg: f64,
    slownesses: &[f64],
    strictness: GroupStrictness,
    normalize: bool,
) -> EngineResult<Vec<f64>> {
    slownesses
        .iter()
        .map(|&slowness| {
            beam(geometry, traces, back_azimuth_deg, slowness, strictness, normalize)
                .map(|stacks| beam_power(&stacks))
        })
        .collect()
}

/// Evaluates every grid row in turn, checking `abort` between rows.
pub fn beam_scan(
    geometry: &ArrayGeometry,
    traces: &[Trace],
    grid: ScanGrid,
    strictness: GroupStrictness,
    normalize: bool,
    abort: &AbortHandle,
) -> EngineResult<BeamScan> {
    let mut rows = Vec::with_capacity(grid.back_azimuths.len());
    for &baz in &grid.back_azimuths {
        if abort.is_aborted() {
            return Err(EngineError::Aborted(format!("beam scan row {baz}")));
        }
        rows.push(scan_row(geometry, traces, baz, &grid.slownesses, strictness, normalize)?);
    }
    BeamScan::from_rows(grid, rows)
}
