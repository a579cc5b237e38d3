//! Parallel fitting of many trajectories through a shared setup.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::config::FitterConfig;
use crate::error::{KfError, KfResult};
use crate::geo::Setup;

use super::track_fitter::TrackFitter;
use super::trajectory::Trajectory;

/// Outcome of a batch fit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub n_fitted: usize,
    pub n_failed: usize,
    /// Mean chi²/ndf over the fitted trajectories with ndf > 0
    pub mean_chi2_ndf: f64,
}

/// Fits every trajectory `config.n_passes` times on `n_threads` workers.
///
/// Each worker owns its own [`TrackFitter`]. A trajectory that fails to fit
/// is logged, left with `is_fitted == false` and counted in the summary;
/// the rest of the batch goes on.
pub fn fit_batch(
    setup: &Setup<f64>,
    config: &FitterConfig,
    trajectories: &mut [Trajectory],
    n_threads: usize,
) -> KfResult<BatchSummary> {
    config.validate()?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .map_err(|e| KfError::Config(format!("cannot start {} fit threads: {}", n_threads, e)))?;

    let results: Vec<Option<f64>> = pool.install(|| {
        trajectories
            .par_iter_mut()
            .enumerate()
            .map_init(
                || TrackFitter::new(setup, config.clone()),
                |fitter, (i, t)| {
                    let fitter = fitter.as_mut().ok()?;
                    for _ in 0..config.n_passes {
                        if let Err(e) = fitter.fit_trajectory(t) {
                            log::warn!("fit_batch: trajectory {} failed: {}", i, e);
                            t.is_fitted = false;
                            return None;
                        }
                    }
                    let p = &t.nodes.first()?.param_dn;
                    Some(if p.ndf > 0.0 { p.chi_sq / p.ndf } else { f64::NAN })
                },
            )
            .collect()
    });

    let n_fitted = results.iter().filter(|r| r.is_some()).count();
    let chi2_ndf: Vec<f64> = results.iter().flatten().copied().filter(|c| c.is_finite()).collect();
    let mean_chi2_ndf = if chi2_ndf.is_empty() {
        0.0
    } else {
        chi2_ndf.iter().sum::<f64>() / chi2_ndf.len() as f64
    };

    let summary = BatchSummary {
        n_fitted,
        n_failed: results.len() - n_fitted,
        mean_chi2_ndf,
    };
    log::info!(
        "fit_batch: {} fitted, {} failed, <chi2/ndf> = {:.3}",
        summary.n_fitted,
        summary.n_failed,
        summary.mean_chi2_ndf
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MeasurementXy;
    use crate::fitter::TrajectoryNode;
    use crate::geo::{zero_field_fn, FieldMode, FieldType, GeoLayer, HomogeneousMaterialFactory, SetupBuilder};
    use std::sync::Arc;

    fn setup() -> Setup<f64> {
        let mut b = SetupBuilder::new();
        b.set_target_property(0.0, 0.0, -5.0, 0.05, 2.0);
        b.set_field_function(zero_field_fn(), FieldType::Null);
        b.set_material_map_factory(Arc::new(HomogeneousMaterialFactory::new(9.37)));
        for i in 0..4 {
            let z = 10.0 * (i + 1) as f64;
            b.add_layer(GeoLayer::new(0, i, z, z - 0.01, z + 0.01, 5.0, 5.0)).unwrap();
        }
        b.make_setup(FieldMode::Intrpl).unwrap()
    }

    fn line(x0: f64, tx: f64) -> Trajectory {
        let nodes = (1..=4)
            .map(|i| {
                let z = 10.0 * i as f64;
                let m = MeasurementXy::from_resolution(x0 + tx * z, 0.0, 0.01, 0.01);
                TrajectoryNode::new(z).with_hit(m)
            })
            .collect();
        Trajectory::new(nodes)
    }

    #[test]
    fn test_batch_counts_failures() {
        let setup = setup();
        let mut batch: Vec<Trajectory> = (0..9).map(|i| line(0.1 * i as f64, 0.01)).collect();
        batch.push(Trajectory::new(vec![TrajectoryNode::new(5.0)]));

        let summary = fit_batch(&setup, &FitterConfig::default(), &mut batch, 3).unwrap();
        assert_eq!(summary.n_fitted, 9);
        assert_eq!(summary.n_failed, 1);
        assert!(summary.mean_chi2_ndf < 1e-8);
        assert!(batch[..9].iter().all(|t| t.is_fitted));
        assert!(!batch[9].is_fitted);
        assert!((batch[4].nodes[0].param_dn.x - 0.4 - 0.1).abs() < 1e-8);
    }

    #[test]
    fn test_batch_rejects_bad_config() {
        let setup = setup();
        let config = FitterConfig {
            max_extrapolation_step: -1.0,
            ..Default::default()
        };
        assert!(fit_batch(&setup, &config, &mut [], 1).is_err());
    }
}
