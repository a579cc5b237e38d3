//! Toy detector scenarios: a row of silicon-like stations in a dipole
//! field, and muon tracks transported through it to produce smeared hits.
//!
//! Tracks are carried by the same Runge-Kutta propagator the fit uses, with
//! Gaussian scattering kicks and the mean energy loss applied at every
//! station, so fitted states can be compared with the true ones.

use std::sync::Arc;

use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::data::{idx, MeasurementTime, MeasurementXy, TrackParam};
use crate::error::{KfError, KfResult};
use crate::filters::{FitDirection, TrackKalmanFilter};
use crate::fitter::{NodeMaterial, Trajectory, TrajectoryNode};
use crate::geo::{FieldFn, FieldMode, FieldType, GeoLayer, HomogeneousMaterialFactory, Setup, SetupBuilder};
use crate::types::defs::{MUON_MASS, SPEED_OF_LIGHT_INV};
use crate::types::Scalar;

/// Detector id given to the stations.
const STATION_DET: i32 = 0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Station positions along the beam [cm], increasing
    pub station_z: Vec<f64>,
    /// Half size of a station in x and y [cm]
    pub station_half_size: f64,
    /// Station thickness along z [cm]
    pub station_thickness: f64,
    /// Radiation length of the station material [cm]; None for no material
    pub rad_len: Option<f64>,

    /// Peak By of the dipole [kG]
    pub field_by: f64,
    pub field_z_center: f64,
    /// Distance from the centre where By has dropped to half [cm]
    pub field_half_length: f64,

    pub target_z: f64,
    pub target_dz: f64,
    pub target_r: f64,

    pub n_tracks: usize,
    /// Hit resolution in x and y [cm]
    pub hit_resolution: f64,
    /// Hit time resolution [ns]; None for hits without time
    pub time_resolution: Option<f64>,
    /// Momentum range [GeV/c]
    pub p_min: f64,
    pub p_max: f64,
    /// Largest |tx| and |ty| at the target
    pub slope_max: f64,
    pub mass: f64,
    pub seed: u64,

    /// Field evaluation of the fit; hits are always made with the field
    /// function itself
    pub field_mode: FieldMode,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            station_z: vec![30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0],
            station_half_size: 50.0,
            station_thickness: 0.03,
            rad_len: Some(9.37),
            field_by: -10.0,
            field_z_center: 50.0,
            field_half_length: 80.0,
            target_z: 0.0,
            target_dz: 0.025,
            target_r: 2.5,
            n_tracks: 1000,
            hit_resolution: 0.0025,
            time_resolution: Some(0.1),
            p_min: 1.0,
            p_max: 10.0,
            slope_max: 0.25,
            mass: MUON_MASS,
            seed: 1,
            field_mode: FieldMode::Intrpl,
        }
    }
}

impl Scenario {
    pub fn validate(&self) -> KfResult<()> {
        if self.station_z.is_empty() {
            return Err(KfError::Config("scenario has no stations".to_string()));
        }
        if self.station_z.windows(2).any(|w| w[0] >= w[1]) {
            return Err(KfError::Config("station z must be increasing".to_string()));
        }
        if self.station_z[0] <= self.target_z {
            return Err(KfError::Config(format!(
                "first station at z = {} is not downstream of the target at z = {}",
                self.station_z[0], self.target_z
            )));
        }
        if !(self.p_min > 0.0 && self.p_min < self.p_max) {
            return Err(KfError::Config(format!(
                "bad momentum range [{}, {}]",
                self.p_min, self.p_max
            )));
        }
        if !(self.hit_resolution > 0.0) || self.time_resolution.is_some_and(|dt| !(dt > 0.0)) {
            return Err(KfError::Config("resolutions must be positive".to_string()));
        }
        if !(self.slope_max >= 0.0) {
            return Err(KfError::Config(format!("bad slope range {}", self.slope_max)));
        }
        Ok(())
    }

    /// Dipole with By falling off as `1 / (1 + u⁴)`, `u` the distance from
    /// the centre in half lengths, and slightly weaker off axis.
    pub fn field_fn(&self) -> FieldFn {
        let (b0, zc, half) = (self.field_by, self.field_z_center, self.field_half_length);
        Arc::new(move |x, y, z| {
            let u = (z - zc) / half;
            let by = b0 / (1.0 + u * u * u * u) * (1.0 - 1.0e-5 * (x * x + y * y));
            (0.0, by, 0.0)
        })
    }

    pub fn setup_builder(&self) -> KfResult<SetupBuilder> {
        self.validate()?;
        let mut b = SetupBuilder::new();
        b.set_target_property(0.0, 0.0, self.target_z, self.target_dz, self.target_r);
        let field_type = if self.field_by == 0.0 {
            FieldType::Null
        } else {
            FieldType::Normal
        };
        b.set_field_function(self.field_fn(), field_type);
        // without material the slabs are transparent
        let rad_len = self.rad_len.unwrap_or(f64::INFINITY);
        b.set_material_map_factory(Arc::new(HomogeneousMaterialFactory::new(rad_len)));

        let dz = 0.5 * self.station_thickness;
        for (i, &z) in self.station_z.iter().enumerate() {
            b.add_layer(GeoLayer::new(
                STATION_DET,
                i as i32,
                z,
                z - dz,
                z + dz,
                self.station_half_size,
                self.station_half_size,
            ))?;
        }
        Ok(b)
    }

    pub fn build_setup<T: Scalar>(&self, mode: FieldMode) -> KfResult<Setup<T>> {
        self.setup_builder()?.make_setup(mode)
    }
}

/// A simulated track: its true state at every station, upstream of the
/// station material, and the trajectory made of its hits.
#[derive(Clone, Debug)]
pub struct SimulatedTrack {
    pub truth: Vec<TrackParam<f64>>,
    pub trajectory: Trajectory,
}

/// Transports tracks from the target through the stations of a setup.
pub struct TrackSimulator<'a> {
    scenario: &'a Scenario,
    setup: &'a Setup<f64>,
    hit_noise: Normal<f64>,
    time_noise: Option<Normal<f64>>,
}

impl<'a> TrackSimulator<'a> {
    pub fn new(scenario: &'a Scenario, setup: &'a Setup<f64>) -> KfResult<Self> {
        scenario.validate()?;
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma).map_err(|e| KfError::Config(format!("bad resolution {}: {}", sigma, e)))
        };
        Ok(Self {
            scenario,
            setup,
            hit_noise: normal(scenario.hit_resolution)?,
            time_noise: scenario.time_resolution.map(normal).transpose()?,
        })
    }

    /// Gaussian kick of the slopes with the covariance the filter would add
    /// for the same layer.
    fn scatter<R: Rng>(kf: &mut TrackKalmanFilter<f64>, rad_thick: f64, rng: &mut R) {
        let mut kick = kf.clone();
        kick.tr_mut().reset_errors(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        kick.multiple_scattering(rad_thick);
        let c = kick.tr();
        let (a, b, d) = (c.c(idx::TX, idx::TX), c.c(idx::TY, idx::TX), c.c(idx::TY, idx::TY));
        if !(a > 0.0) {
            return;
        }
        let l11 = a.sqrt();
        let l21 = b / l11;
        let l22 = (d - l21 * l21).max(0.0).sqrt();
        let n1: f64 = rng.sample(StandardNormal);
        let n2: f64 = rng.sample(StandardNormal);
        let tr = kf.tr_mut();
        tr.tx += l11 * n1;
        tr.ty += l21 * n1 + l22 * n2;
    }

    pub fn simulate<R: Rng>(&self, rng: &mut R) -> KfResult<SimulatedTrack> {
        let s = self.scenario;
        let p = rng.gen_range(s.p_min..s.p_max);
        let charge = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

        let mut start = TrackParam::<f64>::new();
        start.z = s.target_z;
        start.tx = rng.gen_range(-s.slope_max..=s.slope_max);
        start.ty = rng.gen_range(-s.slope_max..=s.slope_max);
        start.qp = charge / p;
        start.vi = (1.0 + s.mass * s.mass / (p * p)).sqrt() * SPEED_OF_LIGHT_INV;

        let mut kf = TrackKalmanFilter::with_track(start);
        kf.set_particle_mass(s.mass);

        let mut truth = Vec::with_capacity(s.station_z.len());
        let mut nodes = Vec::with_capacity(s.station_z.len());
        for (i, &z) in s.station_z.iter().enumerate() {
            let region = self.setup.field().field_region_for_segment(kf.tr(), kf.tr().z, z);
            kf.extrapolate(z, &region);
            let tr = *kf.tr();

            let mxy = MeasurementXy::from_resolution(
                tr.x + self.hit_noise.sample(rng),
                tr.y + self.hit_noise.sample(rng),
                s.hit_resolution,
                s.hit_resolution,
            );
            let mut node = TrajectoryNode::new(z)
                .with_hit(mxy)
                .with_reference(STATION_DET, i as i32);
            if let (Some(noise), Some(dt)) = (&self.time_noise, s.time_resolution) {
                node = node.with_time(MeasurementTime::new(tr.t + noise.sample(rng), dt * dt, 1.0));
            }
            if s.rad_len.is_some() {
                node = node.with_material(NodeMaterial::Layer(i));
                let rad_thick = self.setup.material(i)?.get_thickness_x0(tr.x, tr.y);
                Self::scatter(&mut kf, rad_thick, rng);
                kf.energy_loss_correction(rad_thick, FitDirection::Downstream);
            }
            truth.push(tr);
            nodes.push(node);
        }

        Ok(SimulatedTrack {
            truth,
            trajectory: Trajectory::new(nodes),
        })
    }

    pub fn simulate_tracks<R: Rng>(&self, n: usize, rng: &mut R) -> KfResult<Vec<SimulatedTrack>> {
        (0..n).map(|_| self.simulate(rng)).collect()
    }
}

/// (fitted - true) / error of one parameter.
pub fn pull(fitted: &TrackParam<f64>, truth: &TrackParam<f64>, i: usize) -> f64 {
    (fitted.param(i) - truth.param(i)) / fitted.c(i, i).sqrt()
}

/// Mean and spread of a pull distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PullStats {
    pub n: usize,
    pub mean: f64,
    pub rms: f64,
}

impl PullStats {
    /// Non-finite values are left out.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
        if v.is_empty() {
            return Self::default();
        }
        let n = v.len() as f64;
        let mean = v.iter().sum::<f64>() / n;
        let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Self {
            n: v.len(),
            mean,
            rms: var.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_scenario_is_valid() {
        let s = Scenario::default();
        assert!(s.validate().is_ok());
        let setup: Setup<f64> = s.build_setup(FieldMode::Orig).unwrap();
        assert_eq!(setup.n_material_layers(), 8);
        assert_eq!(setup.index_map().local_to_global(STATION_DET, 3).unwrap(), 3);
    }

    #[test]
    fn test_scenario_validation() {
        let unordered = Scenario {
            station_z: vec![30.0, 20.0],
            ..Default::default()
        };
        assert!(unordered.validate().is_err());
        let behind_target = Scenario {
            target_z: 40.0,
            ..Default::default()
        };
        assert!(behind_target.validate().is_err());
        let no_time = Scenario {
            time_resolution: Some(0.0),
            ..Default::default()
        };
        assert!(no_time.validate().is_err());
    }

    #[test]
    fn test_dipole_profile() {
        let s = Scenario::default();
        let f = s.field_fn();
        assert_eq!(f(0.0, 0.0, 50.0), (0.0, -10.0, 0.0));
        let (_, by, _) = f(0.0, 0.0, 130.0);
        assert!((by + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_simulated_hits_follow_the_track() {
        let s = Scenario {
            rad_len: None,
            hit_resolution: 1e-9,
            time_resolution: None,
            ..Default::default()
        };
        let setup: Setup<f64> = s.build_setup(FieldMode::Orig).unwrap();
        let sim = TrackSimulator::new(&s, &setup).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let track = sim.simulate(&mut rng).unwrap();

        assert_eq!(track.truth.len(), s.station_z.len());
        assert_eq!(track.trajectory.n_hits(), s.station_z.len());
        for (node, truth) in track.trajectory.nodes.iter().zip(&track.truth) {
            assert_eq!(node.z, truth.z);
            let m = node.mxy.unwrap();
            assert!((m.x - truth.x).abs() < 1e-7);
            assert!(node.mt.is_none());
            assert_eq!(node.material, NodeMaterial::None);
        }
        // no material: the momentum is unchanged
        let qp = track.truth[0].qp;
        assert!(track.truth.iter().all(|t| t.qp == qp));
        // the track bends in x
        let t0 = &track.truth[0];
        let t1 = track.truth.last().unwrap();
        assert!((t1.tx - t0.tx).abs() > 1e-3);
    }

    #[test]
    fn test_material_slows_the_track() {
        let s = Scenario::default();
        let setup: Setup<f64> = s.build_setup(FieldMode::Orig).unwrap();
        let sim = TrackSimulator::new(&s, &setup).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let track = sim.simulate(&mut rng).unwrap();
        let first = track.truth[0].qp.abs();
        let last = track.truth.last().unwrap().qp.abs();
        assert!(last > first);
        assert!(track.trajectory.nodes.iter().all(|n| n.mt.is_some()));
    }

    #[test]
    fn test_pull_stats() {
        let stats = PullStats::from_values([1.0, -1.0, 1.0, -1.0, f64::NAN]);
        assert_eq!(stats.n, 4);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.rms, 1.0);
        assert_eq!(PullStats::from_values(std::iter::empty()), PullStats::default());
    }
}
