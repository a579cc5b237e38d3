//! Transport of the track state and covariance along z.
//!
//! In a field the state follows a 4th order Runge-Kutta integration of the
//! track equations linearized at `qp0`; the Jacobian of the step is
//! integrated alongside the state and the covariance is transported as
//! `C = R·C·Rᵀ`. Without a field the track is a straight line.

use crate::data::{idx, MeasurementXy};
use crate::geo::{FieldRegion, FieldType};
use crate::types::defs::{C_LIGHT, SPEED_OF_LIGHT_INV};
use crate::types::{identity_mat7, mat7_mul, mat7_mul_transposed, zero_mat7, Mat7, Scalar, Vec7};

use super::track_kalman_filter::TrackKalmanFilter;

/// Distance below which a lane counts as arrived [cm].
const Z_TOLERANCE: f64 = 1.0e-6;

impl<T: Scalar> TrackKalmanFilter<T> {
    /// Transports the track to `z_out`, splitting the path into steps no
    /// longer than the maximal extrapolation step.
    pub fn extrapolate(&mut self, z_out: T, field: &FieldRegion<T>) {
        if field.field_type() == FieldType::Null {
            self.extrapolate_line_no_field(z_out);
            return;
        }

        let sgn = T::select(self.tr.z.lt_mask(z_out), T::one(), -T::one());
        loop {
            let dz = T::select(self.mask, (z_out - self.tr.z).abs(), T::zero());
            // a NaN coordinate never converges, stop on it
            if T::all(dz.le_mask(T::cst(Z_TOLERANCE)) | dz.is_nan_mask()) {
                break;
            }
            let z_new = self.tr.z + sgn * self.max_extrapolation_step;
            let z_new = T::select((sgn * (z_out - z_new)).le_mask(T::zero()), z_out, z_new);
            self.extrapolate_step(z_new, field);
        }
    }

    /// One Runge-Kutta step to `z_out` regardless of its length.
    pub fn extrapolate_step(&mut self, z_out: T, field: &FieldRegion<T>) {
        let z_masked = T::select(self.mask, z_out, self.tr.z);
        let h = z_masked - self.tr.z;
        let half = h * T::cst(0.5);

        let step_dz = [T::zero(), T::zero(), half, half, h];
        let step_w = [
            T::zero(),
            h / T::cst(6.0),
            h / T::cst(3.0),
            h / T::cst(3.0),
            h / T::cst(6.0),
        ];

        let c_light = T::cst(C_LIGHT);
        let c_inv = T::cst(SPEED_OF_LIGHT_INV);
        let qp0 = self.qp0;
        let m2 = self.mass2;

        let mut r0 = self.tr.params();
        r0[idx::QP] = qp0;

        // f[s] is the derivative of the state at substep s, jac[s] its
        // Jacobian w.r.t. the state
        let mut f = [[T::zero(); 7]; 5];
        let mut jac = [zero_mat7::<T>(); 5];

        for step in 1..5 {
            let mut rstep = [T::zero(); 7];
            for (i, r) in rstep.iter_mut().enumerate() {
                *r = r0[i] + step_dz[step] * f[step - 1][i];
            }
            let z = self.tr.z + step_dz[step];
            let b = field.get(rstep[idx::X], rstep[idx::Y], z);

            let tx = rstep[idx::TX];
            let ty = rstep[idx::TY];
            let tx2 = tx * tx;
            let ty2 = ty * ty;
            let txty = tx * ty;
            let l2 = T::one() + tx2 + ty2;
            let l2i = T::one() / l2;
            let l = l2.sqrt();
            let cl = c_light * l;
            let clqp0 = cl * qp0;

            let fs = &mut f[step];
            let js = &mut jac[step];

            fs[idx::X] = tx;
            js[idx::X][idx::TX] = T::one();

            fs[idx::Y] = ty;
            js[idx::Y][idx::TY] = T::one();

            let f2tmp = txty * b.x - (T::one() + tx2) * b.y + ty * b.z;
            fs[idx::TX] = clqp0 * f2tmp;
            js[idx::TX][idx::TX] = clqp0 * (tx * f2tmp * l2i + ty * b.x - T::cst(2.0) * tx * b.y);
            js[idx::TX][idx::TY] = clqp0 * (ty * f2tmp * l2i + tx * b.x + b.z);
            js[idx::TX][idx::QP] = cl * f2tmp;

            let f3tmp = -txty * b.y - tx * b.z + (T::one() + ty2) * b.x;
            fs[idx::TY] = clqp0 * f3tmp;
            js[idx::TY][idx::TX] = clqp0 * (tx * f3tmp * l2i - ty * b.y - b.z);
            js[idx::TY][idx::TY] = clqp0 * (ty * f3tmp * l2i + T::cst(2.0) * ty * b.x - tx * b.y);
            js[idx::TY][idx::QP] = cl * f3tmp;

            fs[idx::QP] = T::zero();

            if self.do_fit_velocity {
                let vi = rstep[idx::VI];
                fs[idx::T] = vi * l;
                js[idx::T][idx::TX] = vi * tx / l;
                js[idx::T][idx::TY] = vi * ty / l;
                js[idx::T][idx::VI] = l;
            } else {
                let p_factor = (T::one() + m2 * qp0 * qp0).sqrt();
                let vi = p_factor * c_inv;
                fs[idx::T] = vi * l;
                js[idx::T][idx::TX] = vi * tx / l;
                js[idx::T][idx::TY] = vi * ty / l;
                js[idx::T][idx::QP] = m2 * qp0 * l / p_factor * c_inv;
            }

            fs[idx::VI] = T::zero();
        }

        // derivative of each substep w.r.t. the initial state
        let mut k = [zero_mat7::<T>(); 5];
        for step in 1..5 {
            let fk = mat7_mul(&jac[step], &k[step - 1]);
            for i in 0..7 {
                for j in 0..7 {
                    k[step][i][j] = jac[step][i][j] + step_dz[step] * fk[i][j];
                }
            }
        }

        let mut r_jac: Mat7<T> = identity_mat7();
        for (i, row) in r_jac.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                for step in 1..5 {
                    *v += step_w[step] * k[step][i][j];
                }
            }
        }

        let dqp = self.tr.qp - qp0;
        let mut r = r0;
        for (i, ri) in r.iter_mut().enumerate() {
            for step in 1..5 {
                *ri += step_w[step] * f[step][i];
            }
            *ri += r_jac[i][idx::QP] * dqp;
        }

        self.tr.set_params(&r);
        self.tr.z = z_masked;

        let rc = mat7_mul(&r_jac, &self.tr.cov_matrix());
        self.tr.set_cov_matrix(&mat7_mul_transposed(&rc, &r_jac));
    }

    /// Straight line transport with the field switched off for the step:
    /// qp0 is temporarily set to zero.
    pub fn extrapolate_line(&mut self, z_out: T, field: &FieldRegion<T>) {
        let qp0 = self.qp0;
        self.qp0 = T::zero();
        self.extrapolate(z_out, field);
        self.qp0 = qp0;
    }

    /// Straight line transport without any field lookup.
    pub fn extrapolate_line_no_field(&mut self, z_out: T) {
        let z_masked = T::select(self.mask, z_out, self.tr.z);
        let dz = z_masked - self.tr.z;

        let tr = &self.tr;
        let l = (T::one() + tr.tx * tr.tx + tr.ty * tr.ty).sqrt();

        let mut jac: Mat7<T> = identity_mat7();
        jac[idx::X][idx::TX] = dz;
        jac[idx::Y][idx::TY] = dz;
        jac[idx::T][idx::TX] = dz * tr.tx * tr.vi / l;
        jac[idx::T][idx::TY] = dz * tr.ty * tr.vi / l;
        jac[idx::T][idx::VI] = dz * l;

        let c = mat7_mul_transposed(&mat7_mul(&jac, &tr.cov_matrix()), &jac);

        let tr = &mut self.tr;
        tr.x += tr.tx * dz;
        tr.y += tr.ty * dz;
        tr.t += l * tr.vi * dz;
        tr.z = z_masked;
        tr.set_cov_matrix(&c);
    }

    /// Position of the track at `z` along a straight line corrected for the
    /// field to first order in qp, with its derivatives w.r.t. the state.
    ///
    /// Returns (x, y, ∂x/∂r, ∂y/∂r). The track itself is not modified.
    pub fn get_extrapolated_xy_line(&self, z: T, field: &FieldRegion<T>) -> (T, T, Vec7<T>, Vec7<T>) {
        let tr = &self.tr;
        let dz = z - tr.z;
        let tx = tr.tx;
        let ty = tr.ty;
        let txty = tx * ty;

        let ct = T::cst(C_LIGHT) * (T::one() + tx * tx + ty * ty).sqrt();
        let s = field.double_integrals(tr.x, tr.y, tr.z, tr.x + dz * tx, tr.y + dz * ty, z);

        let extr_x = tr.x + tx * dz;
        let extr_y = tr.y + ty * dz;

        let mut jx = [T::zero(); 7];
        jx[idx::X] = T::one();
        jx[idx::TX] = dz;
        jx[idx::QP] = ct * (s.x * txty + s.y * (-tx * tx - T::one()) + s.z * ty);

        let mut jy = [T::zero(); 7];
        jy[idx::Y] = T::one();
        jy[idx::TY] = dz;
        jy[idx::QP] = ct * (s.x * (ty * ty + T::one()) - s.y * txty - s.z * tx);

        (extr_x, extr_y, jx, jy)
    }

    /// Adds a 2D point constraint at `targ_z`, e.g. the target, to a track
    /// whose off-diagonal covariances are still zero apart from C10.
    pub fn filter_with_target_at_line(&mut self, targ_z: T, targ_xy: &MeasurementXy<T>, field: &FieldRegion<T>) {
        let (extr_x, extr_y, jx, jy) = self.get_extrapolated_xy_line(targ_z, field);
        self.filter_extrapolated_xy(targ_xy, extr_x, extr_y, &jx, &jy);
    }
}
