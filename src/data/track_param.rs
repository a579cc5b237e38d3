//! Track state at a given z: seven parameters, their packed covariance and
//! the fit-quality accumulators.

use serde::{Deserialize, Serialize};

use crate::types::defs::{PROTON_MASS, SPEED_OF_LIGHT_INV};
use crate::types::{cov_index, Mat7, Scalar, N_COV_PARAM, N_TRACK_PARAM};

/// Indices of the track parameters in the state vector.
pub mod idx {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const TX: usize = 2;
    pub const TY: usize = 3;
    pub const QP: usize = 4;
    pub const T: usize = 5;
    pub const VI: usize = 6;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackParam<T: Scalar> {
    /// Reference z of the state [cm]
    pub z: T,
    /// Position [cm]
    pub x: T,
    pub y: T,
    /// Slopes dx/dz, dy/dz
    pub tx: T,
    pub ty: T,
    /// Charge over momentum [(GeV/c)^-1]
    pub qp: T,
    /// Time [ns]
    pub t: T,
    /// Inverse velocity along the track [ns/cm]
    pub vi: T,

    /// Lower triangle of the 7×7 covariance, row by row
    pub cov: [T; N_COV_PARAM],

    pub chi_sq: T,
    pub ndf: T,
    pub chi_sq_time: T,
    pub ndf_time: T,
}

impl<T: Scalar> Default for TrackParam<T> {
    fn default() -> Self {
        let mut cov = [T::zero(); N_COV_PARAM];
        for i in 0..N_TRACK_PARAM {
            cov[cov_index(i, i)] = T::one();
        }
        Self {
            z: T::zero(),
            x: T::zero(),
            y: T::zero(),
            tx: T::zero(),
            ty: T::zero(),
            qp: T::zero(),
            t: T::zero(),
            vi: T::zero(),
            cov,
            chi_sq: T::zero(),
            ndf: T::zero(),
            chi_sq_time: T::zero(),
            ndf_time: T::zero(),
        }
    }
}

impl<T: Scalar> TrackParam<T> {
    /// Unit covariance, all parameters zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Covariance element (i, j), symmetric.
    #[inline]
    pub fn c(&self, i: usize, j: usize) -> T {
        self.cov[cov_index(i, j)]
    }

    #[inline]
    pub fn set_c(&mut self, i: usize, j: usize, v: T) {
        self.cov[cov_index(i, j)] = v;
    }

    #[inline]
    pub fn c_mut(&mut self, i: usize, j: usize) -> &mut T {
        &mut self.cov[cov_index(i, j)]
    }

    /// Parameter by state index (see [`idx`]).
    #[inline]
    pub fn param(&self, i: usize) -> T {
        match i {
            idx::X => self.x,
            idx::Y => self.y,
            idx::TX => self.tx,
            idx::TY => self.ty,
            idx::QP => self.qp,
            idx::T => self.t,
            _ => self.vi,
        }
    }

    #[inline]
    pub fn param_mut(&mut self, i: usize) -> &mut T {
        match i {
            idx::X => &mut self.x,
            idx::Y => &mut self.y,
            idx::TX => &mut self.tx,
            idx::TY => &mut self.ty,
            idx::QP => &mut self.qp,
            idx::T => &mut self.t,
            _ => &mut self.vi,
        }
    }

    /// State vector (x, y, tx, ty, qp, t, vi).
    pub fn params(&self) -> [T; N_TRACK_PARAM] {
        [self.x, self.y, self.tx, self.ty, self.qp, self.t, self.vi]
    }

    pub fn set_params(&mut self, r: &[T; N_TRACK_PARAM]) {
        self.x = r[idx::X];
        self.y = r[idx::Y];
        self.tx = r[idx::TX];
        self.ty = r[idx::TY];
        self.qp = r[idx::QP];
        self.t = r[idx::T];
        self.vi = r[idx::VI];
    }

    /// Covariance unpacked into a dense symmetric matrix.
    pub fn cov_matrix(&self) -> Mat7<T> {
        let mut m = [[T::zero(); N_TRACK_PARAM]; N_TRACK_PARAM];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = self.c(i, j);
            }
        }
        m
    }

    /// Stores the lower triangle of `m`.
    pub fn set_cov_matrix(&mut self, m: &Mat7<T>) {
        for i in 0..N_TRACK_PARAM {
            for j in 0..=i {
                self.set_c(i, j, m[i][j]);
            }
        }
    }

    /// Clears the covariance to a diagonal and restarts the fit-quality
    /// accumulators (ndf starts at -5 for the five spatial parameters and at
    /// -2 for time and velocity).
    #[allow(clippy::too_many_arguments)]
    pub fn reset_errors(&mut self, c00: T, c11: T, c22: T, c33: T, c44: T, c55: T, c66: T) {
        self.cov = [T::zero(); N_COV_PARAM];
        for (i, v) in [c00, c11, c22, c33, c44, c55, c66].into_iter().enumerate() {
            self.set_c(i, i, v);
        }
        self.chi_sq = T::zero();
        self.ndf = T::cst(-5.0);
        self.chi_sq_time = T::zero();
        self.ndf_time = T::cst(-2.0);
    }

    /// Initial inverse velocity and its variance for particles above `min_p`
    /// [GeV/c], spanning from the speed of light to a proton at `min_p`.
    pub fn init_velocity_range(&mut self, min_p: f64) {
        let ratio = PROTON_MASS / min_p;
        let max_vi = (1.0 + ratio * ratio).sqrt() * SPEED_OF_LIGHT_INV;
        let min_vi = SPEED_OF_LIGHT_INV;
        let vmean = min_vi + 0.4 * (max_vi - min_vi);
        let dvi = (max_vi - vmean) / 3.0;
        self.vi = T::cst(vmean);
        self.set_c(idx::VI, idx::VI, T::cst(dvi * dvi));
    }

    pub fn qp_error(&self) -> T {
        self.c(idx::QP, idx::QP).sqrt()
    }

    pub fn x_error(&self) -> T {
        self.c(idx::X, idx::X).sqrt()
    }

    pub fn y_error(&self) -> T {
        self.c(idx::Y, idx::Y).sqrt()
    }

    pub fn tx_error(&self) -> T {
        self.c(idx::TX, idx::TX).sqrt()
    }

    pub fn ty_error(&self) -> T {
        self.c(idx::TY, idx::TY).sqrt()
    }

    pub fn time_error(&self) -> T {
        self.c(idx::T, idx::T).sqrt()
    }

    /// +1 or -1 from the sign of qp.
    pub fn charge(&self) -> T {
        T::select(self.qp.gt_mask(T::zero()), T::one(), -T::one())
    }

    /// Momentum magnitude [GeV/c], capped at 1e4 for near-straight tracks.
    pub fn p(&self) -> T {
        let aqp = self.qp.abs();
        T::select(aqp.gt_mask(T::cst(1.0e-4)), T::one() / aqp, T::cst(1.0e4))
    }

    pub fn pz(&self) -> T {
        self.p() / (T::one() + self.tx * self.tx + self.ty * self.ty).sqrt()
    }

    pub fn px(&self) -> T {
        self.pz() * self.tx
    }

    pub fn py(&self) -> T {
        self.pz() * self.ty
    }

    pub fn pt(&self) -> T {
        let t2 = self.tx * self.tx + self.ty * self.ty;
        self.p() * (t2 / (T::one() + t2)).sqrt()
    }

    /// Azimuthal angle [rad].
    pub fn phi(&self) -> T {
        self.ty.atan2(self.tx)
    }

    pub fn phi_error(&self) -> T {
        let denom = self.tx * self.tx + self.ty * self.ty;
        let d_tx = -self.ty / denom;
        let d_ty = self.tx / denom;
        let var = d_tx * d_tx * self.c(idx::TX, idx::TX)
            + d_ty * d_ty * self.c(idx::TY, idx::TY)
            + T::cst(2.0) * d_tx * d_ty * self.c(idx::TY, idx::TX);
        var.sqrt()
    }

    /// Polar angle [rad].
    pub fn theta(&self) -> T {
        (self.tx * self.tx + self.ty * self.ty).sqrt().atan()
    }

    pub fn theta_error(&self) -> T {
        let s = self.tx * self.tx + self.ty * self.ty;
        let denom = s.sqrt() * (T::one() + s);
        let d_tx = self.tx / denom;
        let d_ty = self.ty / denom;
        let var = d_tx * d_tx * self.c(idx::TX, idx::TX)
            + d_ty * d_ty * self.c(idx::TY, idx::TY)
            + T::cst(2.0) * d_tx * d_ty * self.c(idx::TY, idx::TX);
        var.sqrt()
    }

    /// Pseudorapidity.
    pub fn eta(&self) -> T {
        -(self.theta() * T::cst(0.5)).tan().ln()
    }

    /// All parameters and covariance entries finite, diagonal non-negative.
    pub fn is_finite(&self) -> bool {
        let params_ok = self.params().iter().all(|v| v.is_finite()) && self.z.is_finite();
        let cov_ok = self.cov.iter().all(|v| v.is_finite());
        let diag_ok = (0..N_TRACK_PARAM).all(|i| self.c(i, i) >= T::zero());
        params_ok && cov_ok && diag_ok
    }

    /// Copies the state into another scalar precision.
    pub fn convert<U: Scalar>(&self) -> TrackParam<U> {
        let c = |v: T| U::cst(v.as_f64());
        let mut cov = [U::zero(); N_COV_PARAM];
        for (dst, src) in cov.iter_mut().zip(self.cov.iter()) {
            *dst = c(*src);
        }
        TrackParam {
            z: c(self.z),
            x: c(self.x),
            y: c(self.y),
            tx: c(self.tx),
            ty: c(self.ty),
            qp: c(self.qp),
            t: c(self.t),
            vi: c(self.vi),
            cov,
            chi_sq: c(self.chi_sq),
            ndf: c(self.ndf),
            chi_sq_time: c(self.chi_sq_time),
            ndf_time: c(self.ndf_time),
        }
    }
}
