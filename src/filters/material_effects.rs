//! Multiple scattering and mean energy loss in detector material.

use crate::data::idx;
use crate::types::Scalar;

use super::track_kalman_filter::{FitDirection, TrackKalmanFilter};

/// Silicon parameters for the Bethe-Bloch approximation:
/// density [g/cm³], x0 and x1 of the density effect, mean excitation
/// energy [GeV] and Z/A.
const SILICON_RHO: f64 = 2.33;
const SILICON_X0: f64 = 0.20;
const SILICON_X1: f64 = 3.00;
const SILICON_I: f64 = 173e-9;
const SILICON_ZA: f64 = 0.49848;

/// Radiation length of silicon times its density [g/cm²].
const SILICON_X0_MASS: f64 = 9.34961;

/// Highland formula constants.
const HIGHLAND_SCALE: f64 = 0.0136;
const HIGHLAND_LOG: f64 = 0.038;

impl<T: Scalar> TrackKalmanFilter<T> {
    /// Scattering in a thin layer of `rad_thick` radiation lengths, using the
    /// current slopes and qp0.
    pub fn multiple_scattering(&mut self, rad_thick: T) {
        let (tx, ty, qp0) = (self.tr.tx, self.tr.ty, self.qp0);
        self.multiple_scattering_with(rad_thick, tx, ty, qp0);
    }

    /// Scattering in a thin layer with explicitly given slopes and qp.
    pub fn multiple_scattering_with(&mut self, rad_thick: T, tx: T, ty: T, qp: T) {
        let txtx = tx * tx;
        let tyty = ty * ty;
        let txty = tx * ty;
        let l = (T::one() + txtx + tyty).sqrt();

        let lg = T::cst(HIGHLAND_SCALE) * (T::one() + T::cst(HIGHLAND_LOG) * (rad_thick * l).ln());
        let lg = T::select(lg.gt_mask(T::zero()), lg, T::zero());

        let s0 = lg * qp * l;
        let a = (T::one() + self.mass2 * qp * qp) * s0 * s0 * l * rad_thick;

        let mask = self.mask;
        *self.tr.c_mut(idx::TX, idx::TX) += T::select(mask, (T::one() + txtx) * a, T::zero());
        *self.tr.c_mut(idx::TY, idx::TX) += T::select(mask, txty * a, T::zero());
        *self.tr.c_mut(idx::TY, idx::TY) += T::select(mask, (T::one() + tyty) * a, T::zero());
    }

    /// Scattering spread over a layer of finite `thickness` [cm]: the
    /// position block and its correlation with the slopes are also inflated.
    /// `downstream` tells on which side of the layer the track sits.
    pub fn multiple_scattering_in_thick_material(&mut self, rad_thick: T, thickness: T, downstream: bool) {
        let tx = self.tr.tx;
        let ty = self.tr.ty;
        let txtx = tx * tx;
        let tyty = ty * ty;
        let txtx1 = T::one() + txtx;
        let h = txtx + tyty;
        let t = (T::one() + h).sqrt();
        let qp0t = self.qp0 * t;

        // series expansion of the Highland log term in h = tx² + ty²
        let c1 = T::cst(HIGHLAND_SCALE);
        let c2 = c1 * T::cst(HIGHLAND_LOG);
        let c3 = c2 * T::cst(0.5);
        let c4 = -c3 / T::cst(2.0);
        let c5 = c3 / T::cst(3.0);
        let c6 = -c3 / T::cst(4.0);

        let s0 = (c1 + c2 * rad_thick.ln() + c3 * h + h * h * (c4 + c5 * h + c6 * h * h)) * qp0t;
        let a = (t + self.mass2 * self.qp0 * qp0t) * rad_thick * s0 * s0;

        let d = if downstream { T::one() } else { -T::one() };
        let t23 = thickness * thickness / T::cst(3.0);
        let t2 = thickness / T::cst(2.0);

        let mask = self.mask;
        let txty_a = tx * ty * a;
        let tyty1_a = (T::one() + tyty) * a;
        let updates = [
            (idx::X, idx::X, txtx1 * a * t23),
            (idx::Y, idx::X, txty_a * t23),
            (idx::TX, idx::X, txtx1 * a * d * t2),
            (idx::TY, idx::X, txty_a * d * t2),
            (idx::Y, idx::Y, tyty1_a * t23),
            (idx::TX, idx::Y, txty_a * d * t2),
            (idx::TY, idx::Y, tyty1_a * d * t2),
            (idx::TX, idx::TX, txtx1 * a),
            (idx::TY, idx::TX, txty_a),
            (idx::TY, idx::TY, tyty1_a),
        ];
        for (i, j, v) in updates {
            *self.tr.c_mut(i, j) += T::select(mask, v, T::zero());
        }
    }

    /// Rescales qp for the mean energy loss in `rad_thick` radiation lengths
    /// of silicon. Going downstream the particle loses energy, going
    /// upstream it regains it.
    ///
    /// Momenta above 10 GeV/c are treated as 10 GeV/c. A lane where the
    /// corrected energy falls below the mass keeps its qp.
    pub fn energy_loss_correction(&mut self, rad_thick: T, direction: FitDirection) {
        let qp2_cut = T::cst(1.0 / (10.0 * 10.0));
        let qp02 = (self.qp0 * self.qp0).max(qp2_cut);
        let p2 = T::one() / qp02;
        let e2 = self.mass2 + p2;

        let bethe = Self::approximate_bethe_bloch(p2 / self.mass2);

        let tr = (T::one() + self.tr.tx * self.tr.tx + self.tr.ty * self.tr.ty).sqrt();

        let mut de = bethe * rad_thick * tr * T::cst(SILICON_RHO) * T::cst(SILICON_X0_MASS);
        if direction == FitDirection::Downstream {
            de = -de;
        }

        let e_corrected = e2.sqrt() + de;
        let corr = (p2 / (e_corrected * e_corrected - self.mass2)).sqrt();
        let ok = !corr.is_nan_mask() & self.mask;
        let corr = T::select(ok, corr, T::one());

        self.qp0 *= corr;
        self.tr.qp *= corr;
        for j in [idx::X, idx::Y, idx::TX, idx::TY, idx::T, idx::VI] {
            *self.tr.c_mut(idx::QP, j) *= corr;
        }
        *self.tr.c_mut(idx::QP, idx::QP) *= corr * corr;
    }

    /// Mean energy loss per unit mass thickness [GeV·cm²/g] in silicon as a
    /// function of (βγ)².
    pub fn approximate_bethe_bloch(bg2: T) -> T {
        Self::approximate_bethe_bloch_with(
            bg2,
            T::cst(SILICON_RHO),
            T::cst(SILICON_X0),
            T::cst(SILICON_X1),
            T::cst(SILICON_I),
            T::cst(SILICON_ZA),
        )
    }

    /// Bethe-Bloch with the density effect correction for a material given
    /// by its density `kp0`, density-effect bounds `kp1`, `kp2` (in units of
    /// log10 βγ), mean excitation energy `kp3` [GeV] and Z/A `kp4`.
    pub fn approximate_bethe_bloch_with(bg2: T, kp0: T, kp1: T, kp2: T, kp3: T, kp4: T) -> T {
        let rho = kp0;
        let x0 = kp1 * T::cst(2.303);
        let x1 = kp2 * T::cst(2.303);
        let m_i = kp3;
        let m_za = kp4;
        let mk = T::cst(0.307075e-3); // GeV·cm²/g
        let two_me = T::cst(1.022e-3); // GeV
        let half = T::cst(0.5);

        let max_t = two_me * bg2;

        // density effect
        let x = half * bg2.ln();
        let lhw_i = (T::cst(28.816e-9) * (rho * m_za).sqrt() / m_i).ln();

        let d2 = T::select(x1.lt_mask(x), lhw_i + x - half, T::zero());
        let r = (x1 - x) / (x1 - x0);
        let in_between = x0.lt_mask(x) & x.lt_mask(x1);
        let d2 = T::select(in_between, lhw_i + x - half + (half - lhw_i - x0) * r * r * r, d2);

        mk * m_za * ((T::one() + bg2) / bg2)
            * (half * (two_me * bg2 * max_t / (m_i * m_i)).ln() - bg2 / (T::one() + bg2) - d2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TrackParam;
    use crate::types::defs::{MUON_MASS, SPEED_OF_LIGHT_INV};

    fn filter(tx: f64, ty: f64, qp: f64) -> TrackKalmanFilter<f64> {
        let mut tr = TrackParam::<f64>::new();
        tr.tx = tx;
        tr.ty = ty;
        tr.qp = qp;
        tr.vi = SPEED_OF_LIGHT_INV;
        tr.reset_errors(1.0, 1.0, 1e-4, 1e-4, 1e-2, 1.0, 1e-4);
        TrackKalmanFilter::with_track(tr)
    }

    #[test]
    fn test_thin_scattering_matches_highland() {
        let mut kf = filter(0.0, 0.0, 1.0);
        kf.multiple_scattering(0.01);

        let theta = 0.0136 * (1.0 + 0.038 * 0.01f64.ln());
        let beta2_inv = 1.0 + MUON_MASS * MUON_MASS;
        let expected = theta * theta * beta2_inv * 0.01;

        assert!((kf.tr().c(2, 2) - 1e-4 - expected).abs() < 1e-15);
        assert!((kf.tr().c(3, 3) - 1e-4 - expected).abs() < 1e-15);
        assert_eq!(kf.tr().c(3, 2), 0.0);
        assert_eq!(kf.tr().c(0, 0), 1.0);
    }

    #[test]
    fn test_scattering_grows_with_inclination() {
        let mut straight = filter(0.0, 0.0, 0.5);
        let mut inclined = filter(0.3, 0.2, 0.5);
        straight.multiple_scattering(0.005);
        inclined.multiple_scattering(0.005);
        assert!(inclined.tr().c(2, 2) > straight.tr().c(2, 2));
        assert!(inclined.tr().c(3, 2) > 0.0);
    }

    #[test]
    fn test_scattering_without_material_is_a_noop() {
        let mut kf = filter(0.1, 0.1, 1.0);
        let before = *kf.tr();
        kf.multiple_scattering(0.0);
        assert_eq!(*kf.tr(), before);

        kf.set_mask(false);
        kf.multiple_scattering(0.05);
        assert_eq!(*kf.tr(), before);
    }

    #[test]
    fn test_thick_material_reduces_to_thin_at_zero_thickness() {
        let mut thin = filter(0.0, 0.0, 1.0);
        let mut thick = filter(0.0, 0.0, 1.0);
        thin.multiple_scattering(0.02);
        thick.multiple_scattering_in_thick_material(0.02, 0.0, true);
        assert!((thin.tr().c(2, 2) - thick.tr().c(2, 2)).abs() < 1e-15);
        assert_eq!(thick.tr().c(0, 0), 1.0);
        assert_eq!(thick.tr().c(2, 0), 0.0);
    }

    #[test]
    fn test_thick_material_position_terms() {
        let mut down = filter(0.0, 0.0, 1.0);
        let mut up = filter(0.0, 0.0, 1.0);
        down.multiple_scattering_in_thick_material(0.02, 3.0, true);
        up.multiple_scattering_in_thick_material(0.02, 3.0, false);

        let a = down.tr().c(2, 2) - 1e-4;
        assert!((down.tr().c(0, 0) - 1.0 - a * 3.0).abs() < 1e-12);
        assert!((down.tr().c(2, 0) - a * 1.5).abs() < 1e-12);
        assert!((up.tr().c(2, 0) + a * 1.5).abs() < 1e-12);
        assert!((down.tr().c(3, 1) - a * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_bethe_bloch_silicon() {
        // muon at 1 GeV/c, just above the minimum of ionization
        let bg2 = 1.0 / (MUON_MASS * MUON_MASS);
        let dedx = TrackKalmanFilter::<f64>::approximate_bethe_bloch(bg2);
        assert!(dedx > 1.6e-3 && dedx < 2.0e-3, "dE/dx = {}", dedx);

        // falls towards the minimum, then rises slowly
        let slow = TrackKalmanFilter::<f64>::approximate_bethe_bloch(0.5);
        let mip = TrackKalmanFilter::<f64>::approximate_bethe_bloch(9.0);
        let fast = TrackKalmanFilter::<f64>::approximate_bethe_bloch(1e4);
        assert!(slow > mip);
        assert!(fast > mip);
    }

    #[test]
    fn test_energy_loss_direction() {
        let mut down = filter(0.0, 0.0, 1.0);
        down.energy_loss_correction(0.01, FitDirection::Downstream);
        assert!(down.tr().qp > 1.0);
        assert_eq!(down.qp0(), down.tr().qp);

        let corr = down.tr().qp;
        assert!((down.tr().c(4, 4) - 1e-2 * corr * corr).abs() < 1e-15);

        // regaining the energy brings qp back
        down.energy_loss_correction(0.01, FitDirection::Upstream);
        assert!((down.tr().qp - 1.0).abs() < 1e-6);

        let mut up = filter(0.0, 0.0, -1.0);
        up.energy_loss_correction(0.01, FitDirection::Upstream);
        assert!(up.tr().qp > -1.0 && up.tr().qp < 0.0);
    }

    #[test]
    fn test_energy_loss_scales_qp_correlations() {
        let mut kf = filter(0.1, 0.0, 0.5);
        kf.tr_mut().set_c(4, 2, 1e-3);
        kf.tr_mut().set_c(5, 4, 2e-3);
        kf.energy_loss_correction(0.02, FitDirection::Downstream);
        let corr = kf.tr().qp / 0.5;
        assert!((kf.tr().c(4, 2) - 1e-3 * corr).abs() < 1e-15);
        assert!((kf.tr().c(5, 4) - 2e-3 * corr).abs() < 1e-15);
        assert_eq!(kf.tr().c(2, 2), 1e-4);
    }

    #[test]
    fn test_energy_loss_stopping_particle_keeps_qp() {
        // 100 MeV/c muon in a full radiation length cannot lose that much
        let mut kf = filter(0.0, 0.0, 10.0);
        let before = *kf.tr();
        kf.energy_loss_correction(1.0, FitDirection::Downstream);
        assert_eq!(kf.tr().qp, before.qp);
        assert_eq!(kf.tr().c(4, 4), before.c(4, 4));
        assert!(kf.tr().is_finite());
    }
}
