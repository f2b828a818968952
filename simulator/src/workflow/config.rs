use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use beamcore::prelude::FilterBand;
use beamcore::processing::snr::SnrConfig;
use beamcore::processing::{depth_grid, AlignmentMethod, GroupStrictness, ScanGrid};
use beamcore::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Grid settings for the concurrent beam scan and the depth scan.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub baz_step_deg: f64,
    pub max_slowness: f64,
    pub slowness_step: f64,
    pub depth_min_km: f64,
    /// Exclusive upper bound of the trial depths.
    pub depth_max_km: f64,
    pub depth_step_km: f64,
    pub depth_phase: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            baz_step_deg: 10.0,
            max_slowness: 0.3,
            slowness_step: 0.02,
            depth_min_km: 1.0,
            depth_max_km: 30.0,
            depth_step_km: 2.0,
            depth_phase: "P".into(),
        }
    }
}

impl ScanSettings {
    pub fn grid(&self) -> anyhow::Result<ScanGrid> {
        ScanGrid::regular(self.baz_step_deg, self.max_slowness, self.slowness_step)
            .context("building beam scan grid")
    }

    pub fn depths_m(&self) -> anyhow::Result<Vec<f64>> {
        depth_grid(self.depth_min_km, self.depth_max_km, self.depth_step_km)
            .context("building depth scan grid")
    }
}

/// Alignment strategy selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum MethodArg {
    PlaneWave,
    Correlation,
    Picks,
    Phase,
}

/// Flag values used when no workflow file is given.
#[derive(Clone, Debug)]
pub struct CliOverrides {
    pub method: MethodArg,
    pub back_azimuth_deg: f64,
    pub slowness_s_per_km: f64,
    pub normalize: bool,
    pub loose: bool,
    pub snr_threshold: Option<f64>,
    pub emit_shifted: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub scan: ScanSettings,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .engine
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(args: &CliOverrides) -> Self {
        let alignment = match args.method {
            MethodArg::PlaneWave => AlignmentMethod::PlaneWave {
                back_azimuth_deg: args.back_azimuth_deg,
                slowness_s_per_km: args.slowness_s_per_km,
            },
            MethodArg::Correlation => AlignmentMethod::CrossCorrelation {
                central_fraction: 0.8,
                prefilter: false,
                reference: None,
            },
            MethodArg::Picks => AlignmentMethod::Picks {
                phase: Some("P".into()),
            },
            MethodArg::Phase => AlignmentMethod::PhaseArrival { phase: "P".into() },
        };
        let engine = EngineConfig {
            alignment,
            normalize: args.normalize,
            strictness: if args.loose {
                GroupStrictness::Loose
            } else {
                GroupStrictness::Strict
            },
            filter: Some(FilterBand {
                highpass_hz: Some(0.5),
                lowpass_hz: Some(8.0),
                order: 4,
            }),
            snr: args.snr_threshold.map(|threshold| SnrConfig {
                threshold: Some(threshold),
                ..SnrConfig::default()
            }),
            emit_shifted: args.emit_shifted,
            ..EngineConfig::default()
        };
        Self {
            label: None,
            engine,
            generator: GeneratorConfig::default(),
            scan: ScanSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overrides(method: MethodArg) -> CliOverrides {
        CliOverrides {
            method,
            back_azimuth_deg: 45.0,
            slowness_s_per_km: 0.1,
            normalize: true,
            loose: false,
            snr_threshold: Some(2.0),
            emit_shifted: false,
        }
    }

    #[test]
    fn config_from_args_produces_engine_config() {
        let cfg = WorkflowConfig::from_args(&overrides(MethodArg::PlaneWave));
        assert!(cfg.engine.validate().is_ok());
        assert_eq!(cfg.engine.strictness, GroupStrictness::Strict);
        assert_eq!(cfg.engine.snr.unwrap().threshold, Some(2.0));
        let picks = WorkflowConfig::from_args(&overrides(MethodArg::Picks));
        assert_eq!(picks.engine.alignment.name(), "picks");
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"label: yaml-run\nengine:\n  alignment:\n    method: plane_wave\n    back_azimuth_deg: 120.0\n    slowness_s_per_km: 0.08\n  normalize: true\n  strictness: strict\ngenerator:\n  ring_stations: 3\n  seed: 11\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.label.as_deref(), Some("yaml-run"));
        assert!(cfg.engine.normalize);
        assert_eq!(cfg.generator.ring_stations, 3);
        assert_eq!(cfg.generator.aperture_km, 20.0);
        assert_eq!(cfg.scan.depths_m().unwrap().len(), 15);
    }

    #[test]
    fn config_load_rejects_out_of_range_slowness() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"engine:\n  alignment:\n    method: plane_wave\n    back_azimuth_deg: 10.0\n    slowness_s_per_km: 12.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
