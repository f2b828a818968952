use anyhow::Context;
use beamcore::processing::AbortHandle;
use clap::Parser;
use generator::profile::build_scenario;
use std::fs;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use viewer::console::ConsoleViewer;
use workflow::config::{CliOverrides, MethodArg, WorkflowConfig};
use workflow::report::RunReport;
use workflow::runner::Runner;

mod dsp;
mod generator;
mod viewer;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic seismic array beamforming driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = MethodArg::PlaneWave)]
    method: MethodArg,
    /// Back azimuth for plane-wave alignment, degrees
    #[arg(long, default_value_t = 60.0)]
    baz: f64,
    /// Horizontal slowness for plane-wave alignment, s/km
    #[arg(long, default_value_t = 0.12)]
    slowness: f64,
    #[arg(long, default_value_t = false)]
    normalize: bool,
    /// Group by channel code across locations
    #[arg(long, default_value_t = false)]
    loose: bool,
    /// Enable the SNR gate and hide channels at or below this ratio
    #[arg(long)]
    snr_threshold: Option<f64>,
    /// Override the generator seed
    #[arg(long)]
    seed: Option<u64>,
    /// Write the JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
    /// Run a concurrent back-azimuth/slowness beam scan after stacking
    #[arg(long, default_value_t = false)]
    scan: bool,
    /// Stack energy over trial source depths for the scenario event
    #[arg(long, default_value_t = false)]
    depth_scan: bool,
    /// Show the aligned traces next to the stacks
    #[arg(long, default_value_t = false)]
    shifted: bool,
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(&CliOverrides {
            method: args.method,
            back_azimuth_deg: args.baz,
            slowness_s_per_km: args.slowness,
            normalize: args.normalize,
            loose: args.loose,
            snr_threshold: args.snr_threshold,
            emit_shifted: args.shifted,
        })
    };
    if let Some(seed) = args.seed {
        workflow_config.generator.seed = seed;
    }

    let viewer = if args.quiet {
        ConsoleViewer::quiet()
    } else {
        ConsoleViewer::new()
    };
    let runner = Runner::new(workflow_config.clone()).with_viewer(viewer.clone());
    let scenario = build_scenario(&workflow_config.generator)?;
    viewer.publish_status(&format!(
        "scenario '{}' with {} stations and {} traces",
        scenario.event.name,
        scenario.stations.len(),
        scenario.traces.len()
    ));

    let result = runner.execute(&scenario)?;
    let output = &result.output;
    println!(
        "Run {} -> center ({:.5}, {:.5}), {} stacks, {} traces stacked, {} anomalies",
        runner.label(),
        output.center.lat,
        output.center.lon,
        output.stacks.len(),
        output.metrics.processed,
        output.metrics.total_anomalies()
    );
    for (key, trace) in &output.stacks {
        println!(
            "  {} -> {} ({} contributions, {} samples)",
            key,
            trace.id,
            output.contributions.get(key).copied().unwrap_or(0),
            trace.len()
        );
    }

    let report = RunReport::from_output(
        &runner.label(),
        workflow_config.engine.alignment.name(),
        output,
    );
    for line in &report.shifts {
        println!(
            "  shift {} {:+.3}s (relative {:+.3}s)",
            line.channel, line.shift, line.relative_shift
        );
    }
    if let Some(hidden) = &report.hidden {
        println!("  hidden channels: {}", hidden.join(", "));
    }

    if let Some(path) = &args.report {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        fs::write(path, json)
            .with_context(|| format!("writing run report {}", path.display()))?;
        viewer.publish_status(&format!("report written to {}", path.display()));
    }

    if args.scan {
        let runtime = TokioBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("creating runtime for beam scan")?;
        let scan = runtime.block_on(runner.scan(&scenario, AbortHandle::new()))?;
        match scan.best() {
            Some(best) => println!(
                "Beam scan peak -> baz {:.1} deg, slowness {:.3} s/km, power {:.4e}",
                best.back_azimuth_deg, best.slowness_s_per_km, best.power
            ),
            None => println!("Beam scan produced no finite power"),
        }
    }

    if args.depth_scan {
        let scan = runner.depth_scan(&scenario)?;
        for (depth, energy) in scan.depths_m.iter().zip(&scan.energy) {
            println!("  depth {:>5.1} km energy {:.4e}", depth / 1000.0, energy);
        }
        if let Some((depth, energy)) = scan.best() {
            println!(
                "Depth scan peak -> {:.1} km, energy {:.4e}",
                depth / 1000.0,
                energy
            );
        }
    }

    Ok(())
}
