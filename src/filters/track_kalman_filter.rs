//! Kalman filter over a single track state
//!
//! State vector (7D): x, y, tx, ty, qp, t, vi (see [`idx`]).
//! Covariance is the packed lower triangle held by [`TrackParam`].
//!
//! Every update is written as `r -= F·zetawi`, `C -= F·wi·Fᵀ` with
//! `F = C·Hᵀ`, and every conditional goes through [`Scalar::select`] with
//! the filter mask, so inactive lanes are left untouched.

use serde::{Deserialize, Serialize};

use crate::data::{idx, MeasurementTime, MeasurementU, MeasurementXy, TrackParam};
use crate::types::defs::{DEFAULT_MAX_EXTRAPOLATION_STEP, MUON_MASS, SPEED_OF_LIGHT_INV};
use crate::types::{Scalar, Vec7, N_TRACK_PARAM};

/// Direction of the fit along z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitDirection {
    /// Towards smaller z
    Upstream,
    /// Towards larger z
    Downstream,
}

impl std::ops::Not for FitDirection {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            FitDirection::Upstream => FitDirection::Downstream,
            FitDirection::Downstream => FitDirection::Upstream,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackKalmanFilter<T: Scalar> {
    /// Track being fitted
    pub(super) tr: TrackParam<T>,
    /// qp used to linearize the transport and the material effects
    pub(super) qp0: T,

    /// Particle hypothesis [GeV/c²]
    pub(super) mass: T,
    pub(super) mass2: T,

    /// Active lanes
    pub(super) mask: T::Mask,

    /// Fit the inverse velocity as a free parameter instead of deriving it
    /// from qp0 and the mass
    pub(super) do_fit_velocity: bool,

    /// Longest single Runge-Kutta step [cm]
    pub(super) max_extrapolation_step: T,
}

impl<T: Scalar> Default for TrackKalmanFilter<T> {
    fn default() -> Self {
        let mass = T::cst(MUON_MASS);
        Self {
            tr: TrackParam::default(),
            qp0: T::zero(),
            mass,
            mass2: mass * mass,
            mask: T::mask(true),
            do_fit_velocity: false,
            max_extrapolation_step: T::cst(DEFAULT_MAX_EXTRAPOLATION_STEP),
        }
    }
}

impl<T: Scalar> TrackKalmanFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter over `tr`, linearized at its own qp.
    pub fn with_track(tr: TrackParam<T>) -> Self {
        let mut f = Self::default();
        f.set_track(tr);
        f
    }

    pub fn set_track(&mut self, tr: TrackParam<T>) {
        self.qp0 = tr.qp;
        self.tr = tr;
    }

    pub fn tr(&self) -> &TrackParam<T> {
        &self.tr
    }

    pub fn tr_mut(&mut self) -> &mut TrackParam<T> {
        &mut self.tr
    }

    pub fn into_track(self) -> TrackParam<T> {
        self.tr
    }

    pub fn qp0(&self) -> T {
        self.qp0
    }

    pub fn set_qp0(&mut self, qp0: T) {
        self.qp0 = qp0;
    }

    pub fn mask(&self) -> T::Mask {
        self.mask
    }

    pub fn set_mask(&mut self, mask: T::Mask) {
        self.mask = mask;
    }

    pub fn particle_mass(&self) -> T {
        self.mass
    }

    pub fn particle_mass2(&self) -> T {
        self.mass2
    }

    pub fn set_particle_mass(&mut self, mass: T) {
        self.mass = mass;
        self.mass2 = mass * mass;
    }

    pub fn do_fit_velocity(&self) -> bool {
        self.do_fit_velocity
    }

    pub fn set_do_fit_velocity(&mut self, v: bool) {
        self.do_fit_velocity = v;
    }

    pub fn max_extrapolation_step(&self) -> T {
        self.max_extrapolation_step
    }

    pub fn set_max_extrapolation_step(&mut self, step: f64) {
        self.max_extrapolation_step = T::cst(step);
    }

    /// `r -= F·zetawi` and `C -= F·wi·Fᵀ` on the first `n_rows` parameters.
    #[inline]
    pub(super) fn apply_update(&mut self, f: &Vec7<T>, zetawi: T, wi: T, n_rows: usize) {
        for (i, fi) in f.iter().enumerate().take(n_rows) {
            *self.tr.param_mut(i) -= *fi * zetawi;
        }
        for i in 0..n_rows {
            let ki = f[i] * wi;
            for j in 0..=i {
                *self.tr.c_mut(i, j) -= ki * f[j];
            }
        }
    }

    /// Update with a 1D measurement of `cos_phi·x + sin_phi·y`.
    ///
    /// A measurement with a non-positive variance gets zero weight.
    pub fn filter1d(&mut self, m: &MeasurementU<T>) {
        let tr = &self.tr;
        let zeta = m.cos_phi * tr.x + m.sin_phi * tr.y - m.u;

        let mut f = [T::zero(); N_TRACK_PARAM];
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = m.cos_phi * tr.c(i, idx::X) + m.sin_phi * tr.c(i, idx::Y);
        }
        let hch = f[idx::X] * m.cos_phi + f[idx::Y] * m.sin_phi;

        let do_filter = if T::PROTECTED {
            hch.lt_mask(m.du2 * T::cst(16.0))
        } else {
            T::mask(true)
        };

        // keeps du2 from vanishing next to a much larger HCH in single precision
        let w = m.du2 + if T::PROTECTED { T::cst(1.0000001) * hch } else { hch };

        let valid = self.mask & m.du2.gt_mask(T::zero());
        let wi = T::select(valid, T::one() / w, T::zero());
        let zetawi = T::select(
            valid,
            zeta / (T::select(do_filter, m.du2, T::zero()) + hch),
            T::zero(),
        );

        self.tr.chi_sq += zeta * zeta * wi;
        self.tr.ndf += T::select(valid, m.ndf, T::zero());

        self.apply_update(&f, zetawi, wi, N_TRACK_PARAM);
    }

    /// Update with a 2D measurement as two sequential 1D updates: x, then
    /// the direction whose error is uncorrelated with x.
    ///
    /// With `skip_unmeasured_coordinates` a component with zero ndf is not
    /// filtered at all.
    pub fn filter_xy(&mut self, m: &MeasurementXy<T>, skip_unmeasured_coordinates: bool) {
        let mx = m.x_component();
        let mu = m.u_component();

        let mask_old = self.mask;
        if skip_unmeasured_coordinates {
            self.mask = mask_old & m.ndf_x.gt_mask(T::zero());
        }
        self.filter1d(&mx);
        if skip_unmeasured_coordinates {
            self.mask = mask_old & m.ndf_y.gt_mask(T::zero());
        }
        self.filter1d(&mu);
        self.mask = mask_old;
    }

    /// Update with a time measurement in the lanes of `time_info`.
    ///
    /// If the track time error is far larger than the measurement error the
    /// track time is set to the measured value and the chi² gets no
    /// contribution.
    pub fn filter_time(&mut self, t: T, dt2: T, time_info: T::Mask) {
        let mut f = [T::zero(); N_TRACK_PARAM];
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = self.tr.c(idx::T, i);
        }
        let hch = self.tr.c(idx::T, idx::T);

        let mask = self.mask & time_info;
        let do_filter = mask & hch.lt_mask(dt2 * T::cst(16.0));

        let wi = T::select(mask, T::one() / (dt2 + T::cst(1.0000001) * hch), T::zero());
        let zeta = T::select(mask, self.tr.t - t, T::zero());
        let zetawi = T::select(
            mask,
            zeta / (T::select(do_filter, dt2, T::zero()) + hch),
            T::zero(),
        );

        self.tr.chi_sq_time += T::select(do_filter, zeta * zeta * wi, T::zero());
        self.tr.ndf_time += T::select(mask, T::one(), T::zero());

        self.apply_update(&f, zetawi, wi, N_TRACK_PARAM);
    }

    /// [`Self::filter_time`] for the lanes where the measurement has ndf.
    pub fn filter_time_measurement(&mut self, m: &MeasurementTime<T>) {
        self.filter_time(m.t, m.dt2, m.ndf_t.gt_mask(T::zero()));
    }

    /// Constrains vi to the value expected for the particle mass,
    /// `sqrt(1 + m²qp²)/c`, linearized at qp0.
    pub fn measure_velocity_with_qp(&mut self) {
        let e = (T::one() + self.mass2 * self.qp0 * self.qp0).sqrt();
        let vi0 = e * T::cst(SPEED_OF_LIGHT_INV);
        let h = self.mass2 * self.qp0 / e * T::cst(SPEED_OF_LIGHT_INV);

        let zeta = vi0 + h * (self.tr.qp - self.qp0) - self.tr.vi;

        // H = (0, 0, 0, 0, h, 0, -1)
        let mut f = [T::zero(); N_TRACK_PARAM];
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = h * self.tr.c(idx::QP, i) - self.tr.c(idx::VI, i);
        }
        let hch = f[idx::QP] * h - f[idx::VI];

        let wi = T::select(self.mask, T::one() / hch, T::zero());
        let zetawi = T::select(self.mask, zeta / hch, T::zero());
        self.tr.chi_sq_time += T::select(self.mask, zeta * zeta * wi, T::zero());
        self.tr.ndf_time += T::select(self.mask, T::one(), T::zero());

        self.apply_update(&f, zetawi, wi, N_TRACK_PARAM);
    }

    /// Fixes the inverse velocity to `vi`.
    pub fn filter_vi(&mut self, vi: T) {
        let zeta = self.tr.vi - vi;

        let mut f = [T::zero(); N_TRACK_PARAM];
        for (i, fi) in f.iter_mut().enumerate() {
            *fi = self.tr.c(idx::VI, i);
        }
        let hch = f[idx::VI];

        let wi = T::select(self.mask, T::one() / hch, T::zero());
        let zetawi = T::select(self.mask, zeta / hch, T::zero());
        self.tr.chi_sq_time += T::select(self.mask, zeta * zeta * wi, T::zero());
        self.tr.ndf_time += T::select(self.mask, T::one(), T::zero());

        self.apply_update(&f, zetawi, wi, idx::VI);

        self.tr.vi = vi;
        for j in 0..idx::VI {
            self.tr.set_c(idx::VI, j, T::zero());
        }
        self.tr.set_c(idx::VI, idx::VI, T::cst(1.0e-8));
    }

    /// Update with a 2D measurement taken at another z.
    ///
    /// `extr_x`, `extr_y` are the track extrapolated to the measurement and
    /// `jx`, `jy` their derivatives w.r.t. the state. Only C10 among the
    /// off-diagonal covariances may be non-zero on entry.
    pub fn filter_extrapolated_xy(
        &mut self,
        m: &MeasurementXy<T>,
        extr_x: T,
        extr_y: T,
        jx: &Vec7<T>,
        jy: &Vec7<T>,
    ) {
        let t = &mut self.tr;

        let zeta0 = extr_x - m.x;
        let zeta1 = extr_y - m.y;

        // F = C·Hᵀ
        let f00 = t.c(0, 0);
        let f01 = t.c(1, 0);
        let f10 = t.c(1, 0);
        let f11 = t.c(1, 1);
        let f20 = jx[2] * t.c(2, 2);
        let f21 = jy[2] * t.c(2, 2);
        let f30 = jx[3] * t.c(3, 3);
        let f31 = jy[3] * t.c(3, 3);
        let f40 = jx[4] * t.c(4, 4);
        let f41 = jy[4] * t.c(4, 4);

        let mut s00 = m.dx2 + f00 + jx[2] * f20 + jx[3] * f30 + jx[4] * f40;
        let mut s10 = m.dxy + f10 + jy[2] * f20 + jy[3] * f30 + jy[4] * f40;
        let mut s11 = m.dy2 + f11 + jy[2] * f21 + jy[3] * f31 + jy[4] * f41;

        let si = T::one() / (s00 * s11 - s10 * s10);
        let s00_tmp = s00;
        s00 = si * s11;
        s10 = -si * s10;
        s11 = si * s00_tmp;

        t.chi_sq += zeta0 * zeta0 * s00 + T::cst(2.0) * zeta0 * zeta1 * s10 + zeta1 * zeta1 * s11;
        t.ndf += m.ndf_x + m.ndf_y;

        let k00 = f00 * s00 + f01 * s10;
        let k01 = f00 * s10 + f01 * s11;
        let k10 = f10 * s00 + f11 * s10;
        let k11 = f10 * s10 + f11 * s11;
        let k20 = f20 * s00 + f21 * s10;
        let k21 = f20 * s10 + f21 * s11;
        let k30 = f30 * s00 + f31 * s10;
        let k31 = f30 * s10 + f31 * s11;
        let k40 = f40 * s00 + f41 * s10;
        let k41 = f40 * s10 + f41 * s11;

        t.x -= k00 * zeta0 + k01 * zeta1;
        t.y -= k10 * zeta0 + k11 * zeta1;
        t.tx -= k20 * zeta0 + k21 * zeta1;
        t.ty -= k30 * zeta0 + k31 * zeta1;
        t.qp -= k40 * zeta0 + k41 * zeta1;

        *t.c_mut(0, 0) -= k00 * f00 + k01 * f01;
        *t.c_mut(1, 0) -= k10 * f00 + k11 * f01;
        *t.c_mut(1, 1) -= k10 * f10 + k11 * f11;
        t.set_c(2, 0, -(k20 * f00 + k21 * f01));
        t.set_c(2, 1, -(k20 * f10 + k21 * f11));
        *t.c_mut(2, 2) -= k20 * f20 + k21 * f21;
        t.set_c(3, 0, -(k30 * f00 + k31 * f01));
        t.set_c(3, 1, -(k30 * f10 + k31 * f11));
        t.set_c(3, 2, -(k30 * f20 + k31 * f21));
        *t.c_mut(3, 3) -= k30 * f30 + k31 * f31;
        t.set_c(4, 0, -(k40 * f00 + k41 * f01));
        t.set_c(4, 1, -(k40 * f10 + k41 * f11));
        t.set_c(4, 2, -(k40 * f20 + k41 * f21));
        t.set_c(4, 3, -(k40 * f30 + k41 * f31));
        *t.c_mut(4, 4) -= k40 * f40 + k41 * f41;
    }

    /// Chi² of the x and the u sub-measurements of `m` against a position
    /// (x, y) with covariance (c00, c10, c11).
    pub fn get_chi2x_chi2u(m: &MeasurementXy<T>, x: T, y: T, c00: T, c10: T, c11: T) -> (T, T) {
        let (mut x, mut y) = (x, y);
        let (mut c00, mut c10, mut c11) = (c00, c10, c11);

        let chi2x = {
            let zeta = x - m.x;
            let f0 = c00;
            let f1 = c10;
            let wi = T::one() / (m.dx2 + f0);
            let zetawi = zeta * wi;
            let k1 = f1 * wi;
            x -= f0 * zetawi;
            y -= f1 * zetawi;
            c00 -= f0 * f0 * wi;
            c10 -= k1 * f0;
            c11 -= k1 * f1;
            m.ndf_x * zeta * zetawi
        };

        let chi2u = {
            let cos_phi = -m.dxy / m.dx2;
            let u = cos_phi * m.x + m.y;
            let du2 = m.dy2 + cos_phi * m.dxy;
            let zeta = cos_phi * x + y - u;
            let f0 = cos_phi * c00 + c10;
            let f1 = cos_phi * c10 + c11;
            let hch = f0 * cos_phi + f1;
            m.ndf_y * zeta * zeta / (du2 + hch)
        };

        (chi2x, chi2u)
    }

    /// x and its variance on a straight line to `z_out`.
    pub fn extrapolate_line_x_dx2(&self, z_out: T) -> (T, T) {
        let t = &self.tr;
        let dz = z_out - t.z;
        (
            t.x + t.tx * dz,
            t.c(0, 0) + dz * (T::cst(2.0) * t.c(2, 0) + dz * t.c(2, 2)),
        )
    }

    /// y and its variance on a straight line to `z_out`.
    pub fn extrapolate_line_y_dy2(&self, z_out: T) -> (T, T) {
        let t = &self.tr;
        let dz = z_out - t.z;
        (
            t.y + t.ty * dz,
            t.c(1, 1) + dz * (T::cst(2.0) * t.c(3, 1) + dz * t.c(3, 3)),
        )
    }

    /// x-y covariance on a straight line to `z_out`.
    pub fn extrapolate_line_dxy(&self, z_out: T) -> T {
        let t = &self.tr;
        let dz = z_out - t.z;
        t.c(1, 0) + dz * (t.c(2, 1) + t.c(3, 0) + dz * t.c(3, 2))
    }
}
