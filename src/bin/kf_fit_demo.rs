use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use kf_track_fit::config::{load_fitter_config, load_json, save_json};
use kf_track_fit::data::idx;
use kf_track_fit::fitter::{fit_batch, BatchSummary, Trajectory};
use kf_track_fit::geo::{FieldMode, Setup};
use kf_track_fit::sim::{pull, PullStats, Scenario, TrackSimulator};
use kf_track_fit::FitterConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "kf_fit_demo")]
#[command(about = "Simulate tracks through a toy dipole spectrometer and fit them", long_about = None)]
struct Args {
    /// Scenario JSON (or .json.gz); built-in defaults when absent
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Fitter config JSON (or .json.gz); built-in defaults when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of tracks (overrides the scenario)
    #[arg(long)]
    n_tracks: Option<usize>,

    /// Random seed (overrides the scenario)
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate the field with the original function instead of slices
    #[arg(long, default_value_t = false)]
    orig_field: bool,

    /// Worker threads for the fit
    #[arg(long, default_value = "4")]
    threads: usize,

    /// Also write the summary here (.json or .json.gz)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
struct Summary {
    n_tracks: usize,
    field_mode: FieldMode,
    fit: BatchSummary,
    /// Pulls at the first station
    pull_x: PullStats,
    pull_tx: PullStats,
    pull_qp: PullStats,
    /// Mean |dp/p| at the first station
    mean_momentum_resolution: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut scenario: Scenario = match &args.scenario {
        Some(path) => load_json(path)?,
        None => Scenario::default(),
    };
    if let Some(n) = args.n_tracks {
        scenario.n_tracks = n;
    }
    if let Some(seed) = args.seed {
        scenario.seed = seed;
    }
    if args.orig_field {
        scenario.field_mode = FieldMode::Orig;
    }

    let config = match &args.config {
        Some(path) => load_fitter_config(path)?,
        None => FitterConfig {
            mass: scenario.mass,
            ..Default::default()
        },
    };

    // hits come from the field function itself, the fit may use slices
    let truth_setup: Setup<f64> = scenario
        .build_setup(FieldMode::Orig)
        .context("Failed to build the simulation setup")?;
    let fit_setup: Setup<f64> = scenario
        .build_setup(scenario.field_mode)
        .context("Failed to build the fit setup")?;
    log::info!("{}", fit_setup);

    let simulator = TrackSimulator::new(&scenario, &truth_setup)?;
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let tracks = simulator.simulate_tracks(scenario.n_tracks, &mut rng)?;
    log::info!("simulated {} tracks", tracks.len());

    let mut trajectories: Vec<Trajectory> = tracks.iter().map(|t| t.trajectory.clone()).collect();
    let fit = fit_batch(&fit_setup, &config, &mut trajectories, args.threads)?;

    let first_station = || {
        tracks
            .iter()
            .zip(&trajectories)
            .filter(|(_, t)| t.is_fitted)
            .map(|(sim, t)| (&t.nodes[0].param_up, &sim.truth[0]))
    };
    let summary = Summary {
        n_tracks: tracks.len(),
        field_mode: scenario.field_mode,
        fit,
        pull_x: PullStats::from_values(first_station().map(|(f, t)| pull(f, t, idx::X))),
        pull_tx: PullStats::from_values(first_station().map(|(f, t)| pull(f, t, idx::TX))),
        pull_qp: PullStats::from_values(first_station().map(|(f, t)| pull(f, t, idx::QP))),
        mean_momentum_resolution: PullStats::from_values(
            first_station().map(|(f, t)| ((f.qp - t.qp) / t.qp).abs()),
        )
        .mean,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(path) = &args.output {
        save_json(path, &summary)?;
        log::info!("summary written to {}", path.display());
    }
    Ok(())
}
