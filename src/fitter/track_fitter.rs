//! Kalman filter fit of a whole trajectory with smoothing
//!
//! The trajectory is filtered downstream from its first hit, then upstream
//! from its last hit; on the way back every node in the measured region is
//! smoothed with the state stored by the downstream pass, so it ends up
//! with the parameters estimated from all hits. Nodes outside the measured
//! region get the fitted track propagated to them.

use crate::config::FitterConfig;
use crate::data::{idx, TrackParam};
use crate::error::{KfError, KfResult};
use crate::filters::{FitDirection, TrackKalmanFilter};
use crate::geo::Setup;
use crate::types::defs::SPEED_OF_LIGHT_INV;
use crate::types::{StateMat7, StateVec7, N_TRACK_PARAM};

use super::trajectory::{NodeMaterial, Trajectory, TrajectoryNode};

/// Initial variances of the parameters not measured by the first hit
const FIRST_HIT_C22: f64 = 100.0;
const FIRST_HIT_C33: f64 = 100.0;
const FIRST_HIT_C44: f64 = 10.0;
const FIRST_HIT_C55: f64 = 1.0e4;
const FIRST_HIT_C66: f64 = 1.0e2;
/// Variance of a coordinate the first hit does not measure
const UNMEASURED_C: f64 = 1.0e4;
/// Lowest momentum covered by the initial inverse velocity range [GeV/c]
const MIN_VELOCITY_MOMENTUM: f64 = 0.5;
/// Tolerated chi² difference between the two filter passes
const CHI2_MISMATCH: f64 = 0.1;

/// States the transport and the material effects are linearized around.
#[derive(Clone, Copy, Debug, Default)]
struct Linearization {
    param_up: TrackParam<f64>,
    param_dn: TrackParam<f64>,
}

/// Fits trajectories through one setup.
pub struct TrackFitter<'a> {
    setup: &'a Setup<f64>,
    config: FitterConfig,
    fit: TrackKalmanFilter<f64>,
}

impl<'a> TrackFitter<'a> {
    pub fn new(setup: &'a Setup<f64>, config: FitterConfig) -> KfResult<Self> {
        config.validate()?;
        let mut fit = TrackKalmanFilter::new();
        fit.set_particle_mass(config.particle_mass());
        fit.set_do_fit_velocity(config.do_fit_velocity);
        fit.set_max_extrapolation_step(config.max_extrapolation_step);
        Ok(Self { setup, config, fit })
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    pub fn setup(&self) -> &Setup<f64> {
        self.setup
    }

    /// Transports the current track to `z` through the field between here
    /// and there.
    fn extrapolate(&mut self, z: f64) {
        let tr = self.fit.tr();
        let field = self.setup.field().field_region_for_segment(tr, tr.z, z);
        self.fit.extrapolate(z, &field);
    }

    fn filter_node(&mut self, n: &TrajectoryNode) {
        if let Some(mxy) = &n.mxy {
            self.fit.filter_xy(mxy, self.config.skip_unmeasured_coordinates);
        }
        if let Some(mt) = &n.mt {
            self.fit.filter_time_measurement(mt);
        }
    }

    /// Starts the fit at a hit: the position errors are taken from the hit,
    /// the rest of the covariance is wide open.
    fn filter_first_measurement(&mut self, n: &TrajectoryNode) -> KfResult<()> {
        let mxy = n
            .mxy
            .as_ref()
            .ok_or_else(|| KfError::Trajectory(format!("node at z = {} has no hit", n.z)))?;
        let skip = self.config.skip_unmeasured_coordinates;

        let tr = self.fit.tr_mut();
        if (tr.z - n.z).abs() > 1e-10 {
            return Err(KfError::Trajectory(format!(
                "z mismatch: fitted track at {} != node at {}",
                tr.z, n.z
            )));
        }

        tr.reset_errors(
            mxy.dx2,
            mxy.dy2,
            FIRST_HIT_C22,
            FIRST_HIT_C33,
            FIRST_HIT_C44,
            FIRST_HIT_C55,
            FIRST_HIT_C66,
        );
        tr.set_c(idx::Y, idx::X, mxy.dxy);
        tr.x = mxy.x;
        tr.y = mxy.y;
        tr.z = n.z;

        if skip {
            // an unmeasured coordinate starts from the previous pass; the x-y
            // covariance of the hit is kept unless y is the unmeasured one
            if mxy.ndf_x == 0.0 {
                tr.x = n.param_dn.x;
                tr.set_c(idx::X, idx::X, UNMEASURED_C);
            }
            if mxy.ndf_y == 0.0 {
                tr.y = n.param_dn.y;
                tr.set_c(idx::Y, idx::Y, UNMEASURED_C);
                tr.set_c(idx::Y, idx::X, 0.0);
            }
        }

        tr.ndf = -5.0 + mxy.ndf_x + mxy.ndf_y;
        match &n.mt {
            Some(mt) => {
                tr.t = mt.t;
                tr.set_c(idx::T, idx::T, mt.dt2);
                tr.ndf_time = -2.0 + 1.0;
            }
            None => tr.ndf_time = -2.0,
        }
        tr.vi = SPEED_OF_LIGHT_INV;
        tr.init_velocity_range(MIN_VELOCITY_MOMENTUM);
        Ok(())
    }

    fn add_material_effects(
        &mut self,
        n: &mut TrajectoryNode,
        l: &Linearization,
        direction: FitDirection,
    ) -> KfResult<()> {
        let rad_thick = match n.material {
            NodeMaterial::None => return Ok(()),
            NodeMaterial::Fixed(x) => x,
            NodeMaterial::Layer(i) => self
                .setup
                .material(i)?
                .get_thickness_x0(l.param_dn.x, l.param_dn.y),
        };
        n.rad_thick = rad_thick;

        let tx = 0.5 * (l.param_dn.tx + l.param_up.tx);
        let ty = 0.5 * (l.param_dn.ty + l.param_up.ty);
        let ms_qp = self
            .config
            .fixed_ms_qp
            .unwrap_or(0.5 * (l.param_dn.qp + l.param_up.qp));

        self.fit.multiple_scattering_with(rad_thick, tx, ty, ms_qp);

        if self.config.fixed_ms_qp.is_none() {
            let qp0 = match direction {
                FitDirection::Downstream => l.param_up.qp,
                FitDirection::Upstream => l.param_dn.qp,
            };
            self.fit.set_qp0(qp0);
            self.fit.energy_loss_correction(rad_thick, direction);
        }
        Ok(())
    }

    /// Straight lines between consecutive hits, with qp = 0.
    fn straight_line_linearization(t: &Trajectory, first: usize, last: usize) -> Vec<Linearization> {
        let mut lin = vec![Linearization::default(); t.nodes.len()];

        let line = |x: f64, y: f64, z: f64, tx: f64, ty: f64| {
            let mut p = TrackParam::<f64>::new();
            p.x = x;
            p.y = y;
            p.z = z;
            p.tx = tx;
            p.ty = ty;
            p.qp = 0.0;
            p.t = 0.0;
            p.vi = SPEED_OF_LIGHT_INV;
            p
        };

        let hit_xy = |i: usize| t.nodes[i].mxy.map(|m| (m.x, m.y)).unwrap_or_default();

        if first == last {
            let (x, y) = hit_xy(first);
            let p = line(x, y, t.nodes[first].z, 0.0, 0.0);
            lin[first] = Linearization {
                param_up: p,
                param_dn: p,
            };
            return lin;
        }

        let mut i1 = first;
        for i2 in first + 1..=last {
            if !t.nodes[i2].has_hit() {
                continue;
            }
            let (x1, y1) = hit_xy(i1);
            let (x2, y2) = hit_xy(i2);
            let z1 = t.nodes[i1].z;
            let dz = t.nodes[i2].z - z1;
            let dzi = if dz.abs() > 1e-4 { 1.0 / dz } else { 0.0 };
            let tx = (x2 - x1) * dzi;
            let ty = (y2 - y1) * dzi;

            for i in i1..=i2 {
                let z = t.nodes[i].z;
                let p = line(x1 + tx * (z - z1), y1 + ty * (z - z1), z, tx, ty);
                // the downstream side of i2 comes with the next segment
                if i < i2 || i == last {
                    lin[i].param_dn = p;
                }
                // the upstream side of i1 came with the previous one
                if i > i1 || i == first {
                    lin[i].param_up = p;
                }
            }
            i1 = i2;
        }
        lin
    }

    /// Fits the trajectory. When it was fitted before, the transport and
    /// the material effects are linearized around that fit.
    pub fn fit_trajectory(&mut self, t: &mut Trajectory) -> KfResult<()> {
        let n_nodes = t.nodes.len();
        if n_nodes == 0 {
            log::warn!("TrackFitter: no nodes found");
            return Err(KfError::Trajectory("no nodes".to_string()));
        }

        let Some((first, last)) = t.hit_range() else {
            log::warn!("TrackFitter: no hit nodes found");
            return Err(KfError::Trajectory("no hit nodes".to_string()));
        };

        if !t.is_ordered_in_z() {
            log::warn!("TrackFitter: track nodes are not ordered in z");
        }

        let lin = if t.is_fitted {
            let mut lin = vec![Linearization::default(); n_nodes];
            for i in first..=last {
                let n = &t.nodes[i];
                if !n.is_fitted {
                    return Err(KfError::Trajectory(format!(
                        "node {} in the measured region is not fitted",
                        i
                    )));
                }
                lin[i] = Linearization {
                    param_up: n.param_up,
                    param_dn: n.param_dn,
                };
            }
            lin
        } else {
            Self::straight_line_linearization(t, first, last)
        };

        t.is_fitted = false;
        for n in t.nodes.iter_mut() {
            n.is_fitted = false;
        }

        // downstream up to the last hit
        self.fit.set_track(lin[first].param_dn);
        self.filter_first_measurement(&t.nodes[first])?;
        self.trace_node("fit downstream", first);

        for i in first + 1..=last {
            self.fit.set_qp0(lin[i - 1].param_dn.qp);
            self.extrapolate(t.nodes[i].z);
            self.filter_node(&t.nodes[i]);
            self.trace_node("fit downstream", i);

            let n = &mut t.nodes[i];
            n.param_up = *self.fit.tr();
            self.add_material_effects(n, &lin[i], FitDirection::Downstream)?;
            n.param_dn = *self.fit.tr();
        }

        let dn_chi2 = self.fit.tr().chi_sq;

        // upstream from the last hit, smoothing on the way
        self.fit.set_track(lin[last].param_up);
        self.filter_first_measurement(&t.nodes[last])?;
        t.nodes[last].is_fitted = true;
        self.trace_node("fit upstream", last);

        for i in (first + 1..last).rev() {
            self.fit.set_qp0(lin[i + 1].param_up.qp);
            self.extrapolate(t.nodes[i].z);

            // without smoothing the nodes keep the downstream pass states
            let n = &mut t.nodes[i];
            if self.config.smooth {
                smooth(&mut n.param_dn, self.fit.tr())?;
            }
            self.add_material_effects(n, &lin[i], FitDirection::Upstream)?;
            if self.config.smooth {
                smooth(&mut n.param_up, self.fit.tr())?;
            }
            n.is_fitted = true;

            self.filter_node(&t.nodes[i]);
            self.trace_node("fit upstream", i);
        }

        if first < last {
            self.fit.set_qp0(lin[first + 1].param_up.qp);
            self.extrapolate(t.nodes[first].z);
            self.filter_node(&t.nodes[first]);
            self.trace_node("fit upstream", first);
        }
        {
            let n = &mut t.nodes[first];
            n.param_dn = *self.fit.tr();
            self.add_material_effects(n, &lin[first], FitDirection::Upstream)?;
            n.param_up = *self.fit.tr();
            n.is_fitted = true;
        }

        let fitted = *self.fit.tr();

        // propagate downstream of the last hit
        self.fit.set_track(t.nodes[last].param_dn);
        for i in last + 1..n_nodes {
            self.extrapolate(t.nodes[i].z);
            let l = Linearization {
                param_up: *self.fit.tr(),
                param_dn: *self.fit.tr(),
            };
            let n = &mut t.nodes[i];
            n.param_up = *self.fit.tr();
            self.add_material_effects(n, &l, FitDirection::Downstream)?;
            n.param_dn = *self.fit.tr();
            n.is_fitted = true;
        }

        // propagate upstream of the first hit
        self.fit.set_track(t.nodes[first].param_up);
        for i in (0..first).rev() {
            self.extrapolate(t.nodes[i].z);
            let l = Linearization {
                param_up: *self.fit.tr(),
                param_dn: *self.fit.tr(),
            };
            let n = &mut t.nodes[i];
            n.param_dn = *self.fit.tr();
            self.add_material_effects(n, &l, FitDirection::Upstream)?;
            n.param_up = *self.fit.tr();
            n.is_fitted = true;
        }

        if !self.config.smooth && (fitted.chi_sq - dn_chi2).abs() > CHI2_MISMATCH {
            log::debug!(
                "TrackFitter: chi2 mismatch: dn {} != up {}, hits {}..{} of {} nodes",
                dn_chi2,
                fitted.chi_sq,
                first,
                last,
                n_nodes
            );
        }

        for n in t.nodes.iter_mut() {
            for p in [&mut n.param_dn, &mut n.param_up] {
                p.chi_sq = fitted.chi_sq;
                p.ndf = fitted.ndf;
                p.chi_sq_time = fitted.chi_sq_time;
                p.ndf_time = fitted.ndf_time;
            }
        }
        t.is_fitted = true;
        Ok(())
    }

    fn trace_node(&self, pass: &str, node: usize) {
        let tr = self.fit.tr();
        log::trace!(
            "{}: node {} chi2 {:.3} x {:.4} y {:.4} z {:.3} tx {:.5} ty {:.5}",
            pass,
            node,
            tr.chi_sq,
            tr.x,
            tr.y,
            tr.z,
            tr.tx,
            tr.ty
        );
    }
}

/// Combines two independent estimates of the same state into `t1`.
///
/// The weighted mean uses the inverse of the summed covariances; its chi²
/// and ndf add up with those of both inputs. Fails if the sum is
/// singular.
pub fn smooth(t1: &mut TrackParam<f64>, t2: &TrackParam<f64>) -> KfResult<()> {
    let c1 = StateMat7::from_fn(|i, j| t1.c(i, j));
    let c2 = StateMat7::from_fn(|i, j| t2.c(i, j));

    let Some(si) = (c1 + c2).try_inverse() else {
        return Err(KfError::SingularMatrix(format!("summed covariance at z = {}", t1.z)));
    };

    let r = StateVec7::from_column_slice(&t1.params());
    let m = StateVec7::from_column_slice(&t2.params());
    let dzeta = m - r;

    let k = c1 * si;
    let c = c1 - k * c1;
    let r = r + k * dzeta;

    let si_dzeta = si * dzeta;
    let (mut chi2, mut chi2_time) = (0.0, 0.0);
    for i in 0..N_TRACK_PARAM {
        if i < idx::T {
            chi2 += dzeta[i] * si_dzeta[i];
        } else {
            chi2_time += dzeta[i] * si_dzeta[i];
        }
    }

    let mut params = [0.0; N_TRACK_PARAM];
    params.copy_from_slice(r.as_slice());
    t1.set_params(&params);
    for i in 0..N_TRACK_PARAM {
        for j in 0..=i {
            t1.set_c(i, j, c[(i, j)]);
        }
    }

    t1.chi_sq += chi2 + t2.chi_sq;
    t1.chi_sq_time += chi2_time + t2.chi_sq_time;
    t1.ndf += 5.0 + t2.ndf;
    t1.ndf_time += 2.0 + t2.ndf_time;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MeasurementXy;
    use crate::geo::{zero_field_fn, FieldMode, FieldType, GeoLayer, HomogeneousMaterialFactory, SetupBuilder};
    use std::sync::Arc;

    const ZS: [f64; 6] = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];

    fn line_x(z: f64) -> f64 {
        0.1 + 0.01 * z
    }

    fn line_y(z: f64) -> f64 {
        -0.2 + 0.02 * z
    }

    fn zero_field_setup() -> Setup<f64> {
        let mut b = SetupBuilder::new();
        b.set_target_property(0.0, 0.0, -5.0, 0.05, 2.0);
        b.set_field_function(zero_field_fn(), FieldType::Null);
        b.set_material_map_factory(Arc::new(HomogeneousMaterialFactory::new(9.37)));
        for (i, &z) in ZS.iter().enumerate() {
            b.add_layer(GeoLayer::new(0, i as i32, z, z - 0.015, z + 0.015, 10.0, 10.0))
                .unwrap();
        }
        b.make_setup(FieldMode::Orig).unwrap()
    }

    /// Hits exactly on a straight line, an empty node on each side.
    fn straight_trajectory(material: NodeMaterial) -> Trajectory {
        let mut nodes = vec![TrajectoryNode::new(0.0)];
        for &z in &ZS {
            let m = MeasurementXy::from_resolution(line_x(z), line_y(z), 0.005, 0.005);
            nodes.push(TrajectoryNode::new(z).with_hit(m).with_material(material));
        }
        nodes.push(TrajectoryNode::new(80.0));
        Trajectory::new(nodes)
    }

    #[test]
    fn test_smooth_equal_estimates() {
        let mut t1 = TrackParam::<f64>::new();
        t1.x = 1.0;
        t1.tx = 0.1;
        t1.ndf = 3.0;
        for i in 0..N_TRACK_PARAM {
            t1.set_c(i, i, 2.0);
        }
        let t2 = t1;

        smooth(&mut t1, &t2).unwrap();
        assert!((t1.x - 1.0).abs() < 1e-12);
        assert!((t1.tx - 0.1).abs() < 1e-12);
        for i in 0..N_TRACK_PARAM {
            assert!((t1.c(i, i) - 1.0).abs() < 1e-12);
        }
        assert!(t1.chi_sq.abs() < 1e-12);
        assert_eq!(t1.ndf, 3.0 + 5.0 + 3.0);
    }

    #[test]
    fn test_smooth_weights_by_covariance() {
        let mut t1 = TrackParam::<f64>::new();
        let mut t2 = TrackParam::<f64>::new();
        t1.x = 0.0;
        t2.x = 1.0;
        t1.set_c(idx::X, idx::X, 3.0);
        t2.set_c(idx::X, idx::X, 1.0);

        smooth(&mut t1, &t2).unwrap();
        assert!((t1.x - 0.75).abs() < 1e-12);
        assert!((t1.c(idx::X, idx::X) - 0.75).abs() < 1e-12);
        assert!((t1.chi_sq - 0.25).abs() < 1e-12);
        assert_eq!(t1.chi_sq_time, 0.0);
    }

    #[test]
    fn test_smooth_singular_sum() {
        let mut t1 = TrackParam::<f64>::new();
        t1.reset_errors(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let t2 = t1;
        assert!(matches!(smooth(&mut t1, &t2), Err(KfError::SingularMatrix(_))));
    }

    #[test]
    fn test_fit_rejects_empty_trajectories() {
        let setup = zero_field_setup();
        let mut fitter = TrackFitter::new(&setup, FitterConfig::default()).unwrap();

        let mut empty = Trajectory::default();
        assert!(matches!(fitter.fit_trajectory(&mut empty), Err(KfError::Trajectory(_))));

        let mut no_hits = Trajectory::new(vec![TrajectoryNode::new(1.0), TrajectoryNode::new(2.0)]);
        assert!(fitter.fit_trajectory(&mut no_hits).is_err());
        assert!(!no_hits.is_fitted);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let setup = zero_field_setup();
        let config = FitterConfig {
            n_passes: 0,
            ..Default::default()
        };
        assert!(TrackFitter::new(&setup, config).is_err());
    }

    #[test]
    fn test_straight_line_fit() {
        let setup = zero_field_setup();
        let mut fitter = TrackFitter::new(&setup, FitterConfig::default()).unwrap();
        let mut t = straight_trajectory(NodeMaterial::None);
        fitter.fit_trajectory(&mut t).unwrap();

        assert!(t.is_fitted);
        for n in &t.nodes {
            assert!(n.is_fitted);
            for p in [&n.param_up, &n.param_dn] {
                assert!((p.z - n.z).abs() < 1e-10);
                assert!((p.x - line_x(n.z)).abs() < 1e-8, "x at z = {}", n.z);
                assert!((p.y - line_y(n.z)).abs() < 1e-8, "y at z = {}", n.z);
                assert!((p.tx - 0.01).abs() < 1e-9);
                assert!((p.ty - 0.02).abs() < 1e-9);
                assert!(p.chi_sq < 1e-10);
                assert_eq!(p.ndf, 2.0 * ZS.len() as f64 - 5.0);
                assert_eq!(p.ndf_time, -2.0);
            }
        }

        // extrapolated errors grow away from the measured region
        let inner = t.nodes[3].param_dn.c(idx::X, idx::X);
        assert!(t.nodes[0].param_up.c(idx::X, idx::X) > inner);
        assert!(t.nodes[7].param_dn.c(idx::X, idx::X) > inner);
    }

    #[test]
    fn test_smoothing_uses_all_hits() {
        let setup = zero_field_setup();
        let mut smoothed = straight_trajectory(NodeMaterial::None);
        TrackFitter::new(&setup, FitterConfig::default())
            .unwrap()
            .fit_trajectory(&mut smoothed)
            .unwrap();

        let config = FitterConfig {
            smooth: false,
            ..Default::default()
        };
        let mut forward = straight_trajectory(NodeMaterial::None);
        TrackFitter::new(&setup, config)
            .unwrap()
            .fit_trajectory(&mut forward)
            .unwrap();

        let i = 2;
        let c_smoothed = smoothed.nodes[i].param_dn.c(idx::TX, idx::TX);
        let c_forward = forward.nodes[i].param_dn.c(idx::TX, idx::TX);
        assert!(c_smoothed < c_forward, "{} vs {}", c_smoothed, c_forward);
        assert!(forward.is_fitted);
    }

    #[test]
    fn test_material_and_refit() {
        let setup = zero_field_setup();
        let config = FitterConfig {
            fixed_ms_qp: Some(1.0),
            ..Default::default()
        };
        let mut fitter = TrackFitter::new(&setup, config).unwrap();
        let mut t = straight_trajectory(NodeMaterial::Layer(0));
        fitter.fit_trajectory(&mut t).unwrap();

        let expected = setup.material(0).unwrap().get_thickness_x0(line_x(10.0), line_y(10.0));
        assert!(expected > 0.0);
        assert!((t.nodes[1].rad_thick - expected).abs() < 1e-9);

        // scattering in the last layer widens the slopes behind it
        let last = &t.nodes[ZS.len()];
        assert!(last.param_dn.c(idx::TX, idx::TX) > last.param_up.c(idx::TX, idx::TX));

        let first_fit = t.clone();
        fitter.fit_trajectory(&mut t).unwrap();
        for (a, b) in first_fit.nodes.iter().zip(&t.nodes) {
            assert!((a.param_dn.x - b.param_dn.x).abs() < 1e-8);
            assert!((a.param_dn.tx - b.param_dn.tx).abs() < 1e-9);
            assert_eq!(a.param_dn.ndf, b.param_dn.ndf);
        }
    }

    #[test]
    fn test_unmeasured_x_is_skipped() {
        let setup = zero_field_setup();
        let config = FitterConfig {
            skip_unmeasured_coordinates: true,
            ..Default::default()
        };
        let mut fitter = TrackFitter::new(&setup, config).unwrap();

        // the outer hits only measure y and carry a meaningless x
        let mut t = straight_trajectory(NodeMaterial::None);
        for i in [1, ZS.len()] {
            let z = t.nodes[i].z;
            let m = MeasurementXy::new(100.0, line_y(z), 2.5e-5, 2.5e-5, 0.0, 0.0, 1.0);
            t.nodes[i].mxy = Some(m);
        }
        fitter.fit_trajectory(&mut t).unwrap();

        let mut full = straight_trajectory(NodeMaterial::None);
        fitter.fit_trajectory(&mut full).unwrap();

        for (n, f) in t.nodes.iter().zip(&full.nodes) {
            let p = &n.param_dn;
            assert!((p.x - line_x(n.z)).abs() < 1e-6, "x at z = {}", n.z);
            assert!((p.y - line_y(n.z)).abs() < 1e-6, "y at z = {}", n.z);
            assert!(p.ndf < f.param_dn.ndf);
            // fewer x hits leave a wider x slope
            assert!(p.c(idx::TX, idx::TX) > f.param_dn.c(idx::TX, idx::TX));
        }
    }

    #[test]
    fn test_single_hit_trajectory() {
        let setup = zero_field_setup();
        let mut fitter = TrackFitter::new(&setup, FitterConfig::default()).unwrap();
        let m = MeasurementXy::from_resolution(0.3, -0.4, 0.01, 0.02);
        let mut t = Trajectory::new(vec![TrajectoryNode::new(10.0).with_hit(m), TrajectoryNode::new(20.0)]);
        fitter.fit_trajectory(&mut t).unwrap();

        let p = &t.nodes[0].param_up;
        assert_eq!(p.x, 0.3);
        assert_eq!(p.y, -0.4);
        assert_eq!(p.ndf, -3.0);
        assert!((p.c(idx::Y, idx::Y) - 0.0004).abs() < 1e-12);
        assert!(t.nodes[1].is_fitted);
        assert!((t.nodes[1].param_dn.z - 20.0).abs() < 1e-10);
    }
}
