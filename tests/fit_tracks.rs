use kf_track_fit::config::load_json;
use kf_track_fit::data::idx;
use kf_track_fit::fitter::{fit_batch, Trajectory};
use kf_track_fit::geo::{FieldMode, Setup};
use kf_track_fit::sim::{pull, PullStats, Scenario, SimulatedTrack, TrackSimulator};
use kf_track_fit::FitterConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn simulate(scenario: &Scenario) -> Vec<SimulatedTrack> {
    let setup: Setup<f64> = scenario.build_setup(FieldMode::Orig).unwrap();
    let sim = TrackSimulator::new(scenario, &setup).unwrap();
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    sim.simulate_tracks(scenario.n_tracks, &mut rng).unwrap()
}

fn trajectories(tracks: &[SimulatedTrack]) -> Vec<Trajectory> {
    tracks.iter().map(|t| t.trajectory.clone()).collect()
}

#[test]
fn test_precise_hits_recover_the_momentum() {
    let scenario = Scenario {
        rad_len: None,
        time_resolution: None,
        hit_resolution: 1e-4,
        p_min: 2.0,
        p_max: 10.0,
        n_tracks: 20,
        seed: 11,
        field_mode: FieldMode::Orig,
        ..Default::default()
    };
    let tracks = simulate(&scenario);
    let setup: Setup<f64> = scenario.build_setup(FieldMode::Orig).unwrap();
    let config = FitterConfig {
        n_passes: 3,
        ..Default::default()
    };

    let mut fitted = trajectories(&tracks);
    let summary = fit_batch(&setup, &config, &mut fitted, 2).unwrap();
    assert_eq!(summary.n_fitted, 20);
    assert_eq!(summary.n_failed, 0);

    for (sim, t) in tracks.iter().zip(&fitted) {
        assert!(t.is_fitted);
        for (node, truth) in t.nodes.iter().zip(&sim.truth) {
            let p = &node.param_up;
            assert!((p.x - truth.x).abs() < 1e-2, "x {} vs {}", p.x, truth.x);
            assert!((p.y - truth.y).abs() < 1e-2, "y {} vs {}", p.y, truth.y);
            assert!(
                ((p.qp - truth.qp) / truth.qp).abs() < 1e-2,
                "qp {} vs {}",
                p.qp,
                truth.qp
            );
            assert_eq!(p.ndf, 2.0 * scenario.station_z.len() as f64 - 5.0);
        }
    }
}

#[test]
fn test_full_simulation_pulls() {
    let scenario = Scenario {
        n_tracks: 300,
        seed: 5,
        ..Default::default()
    };
    let tracks = simulate(&scenario);
    let setup: Setup<f64> = scenario.build_setup(scenario.field_mode).unwrap();

    let mut fitted = trajectories(&tracks);
    let summary = fit_batch(&setup, &FitterConfig::default(), &mut fitted, 4).unwrap();
    assert_eq!(summary.n_failed, 0);
    assert!(
        summary.mean_chi2_ndf > 0.3 && summary.mean_chi2_ndf < 3.0,
        "chi2/ndf = {}",
        summary.mean_chi2_ndf
    );

    let first = || {
        tracks
            .iter()
            .zip(&fitted)
            .map(|(sim, t)| (&t.nodes[0].param_up, &sim.truth[0]))
    };
    let qp_pull = PullStats::from_values(first().map(|(f, t)| pull(f, t, idx::QP)));
    assert_eq!(qp_pull.n, 300);
    assert!(qp_pull.mean.abs() < 0.5, "qp pull mean {}", qp_pull.mean);
    assert!(qp_pull.rms > 0.5 && qp_pull.rms < 2.0, "qp pull rms {}", qp_pull.rms);

    let resolution = PullStats::from_values(first().map(|(f, t)| ((f.qp - t.qp) / t.qp).abs()));
    assert!(resolution.mean < 0.05, "dp/p = {}", resolution.mean);

    // the time measurements enter the fit
    let ndf_time = fitted[0].nodes[0].param_up.ndf_time;
    assert_eq!(ndf_time, scenario.station_z.len() as f64 - 2.0);
}

#[test]
fn test_scenario_from_partial_json() {
    let path = std::env::temp_dir().join(format!("{}-kf_scenario.json", std::process::id()));
    std::fs::write(&path, r#"{"n_tracks": 5, "rad_len": null, "field_mode": "Orig"}"#).unwrap();
    let scenario: Scenario = load_json(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(scenario.n_tracks, 5);
    assert_eq!(scenario.rad_len, None);
    assert_eq!(scenario.field_mode, FieldMode::Orig);
    assert_eq!(scenario.station_z, Scenario::default().station_z);

    let tracks = simulate(&scenario);
    assert_eq!(tracks.len(), 5);
}
