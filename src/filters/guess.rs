//! Closed-form starting parameters for a track from its hits.

use crate::types::defs::{C_LIGHT, SPEED_OF_LIGHT_INV};
use crate::types::Scalar;

use super::track_kalman_filter::TrackKalmanFilter;

/// Curvature pivot below which the guess falls back to a straight line.
const CURVATURE_PIVOT_MIN: f64 = 1.0e-4;

/// Pivots of the line solves below this leave the parameter at zero.
const LINE_PIVOT_MIN: f64 = 1.0e-12;

/// One hit as seen by [`TrackKalmanFilter::guess_track`].
#[derive(Clone, Copy, Debug)]
pub struct GuessHit<T: Scalar> {
    pub x: T,
    pub y: T,
    pub z: T,
    pub t: T,
    /// By at the hit [kG]
    pub by: T,
    /// Hit takes part in the fit
    pub used: T::Mask,
    /// Hit carries a time measurement
    pub timed: T::Mask,
}

impl<T: Scalar> GuessHit<T> {
    pub fn new(x: T, y: T, z: T, t: T, by: T) -> Self {
        Self {
            x,
            y,
            z,
            t,
            by,
            used: T::mask(true),
            timed: T::mask(true),
        }
    }
}

impl<T: Scalar> TrackKalmanFilter<T> {
    /// Estimates x, y, tx, ty, qp and t at `track_z` from `hits` with a
    /// linear least-squares fit.
    ///
    /// x is fitted as `x0 + tx·z + L·S(z)` where `S` is the double integral
    /// of By along z, y as a straight line sheared by the same curvature.
    /// The time is the one of the first used hit that has one. With fewer
    /// than three used hits, or a degenerate curvature pivot, qp comes out
    /// as zero; with one used hit the slopes are zero and the position is
    /// the hit; with none every fitted parameter is zero. The covariance is
    /// untouched.
    pub fn guess_track(&mut self, track_z: T, hits: &[GuessHit<T>]) {
        let zero = T::zero();
        let half = T::cst(0.5);

        let (mut a_0, mut a_1, mut a_2, mut a_3, mut a_4, mut a_5) = (zero, zero, zero, zero, zero, zero);
        let (mut ax0, mut ax1, mut ax2) = (zero, zero, zero);
        let (mut by0, mut by1, mut by2) = (zero, zero, zero);

        let mut time = zero;
        let mut is_time_set = T::mask(false);

        let mut prev_z = zero;
        // single and double field integrals
        let mut sy = zero;
        let mut s_y = zero;

        for hit in hits {
            let w = T::select(hit.used, T::one(), zero);

            let set_time = !is_time_set & hit.timed & hit.used;
            time = T::select(set_time, hit.t, time);
            is_time_set = is_time_set | set_time;

            let z = hit.z - track_z;

            let dz = z - prev_z;
            s_y += w * dz * sy + half * dz * dz * hit.by;
            sy += w * dz * hit.by;
            prev_z = T::select(hit.used, z, prev_z);

            let s = s_y;
            let wz = w * z;
            let ws = w * s;

            a_0 += w;
            a_1 += wz;
            a_2 += wz * z;
            a_3 += ws;
            a_4 += ws * z;
            a_5 += ws * s;

            ax0 += w * hit.x;
            ax1 += wz * hit.x;
            ax2 += ws * hit.x;

            by0 += w * hit.y;
            by1 += wz * hit.y;
            by2 += ws * hit.y;
        }

        // x: symmetric 3×3 system in (x0, tx, L)
        let m00 = a_0;
        let m01 = a_1;
        let m02 = a_3;
        let mut m11 = a_2;
        let mut m12 = a_4;
        let mut m21 = m12;
        let mut m22 = a_5;

        m11 = m00 * m11 - m01 * m01;
        m12 = m00 * m12 - m01 * m02;
        ax1 = m00 * ax1 - m01 * ax0;

        m21 = m00 * m21 - m02 * m01;
        m22 = m00 * m22 - m02 * m02;
        ax2 = m00 * ax2 - m02 * ax0;

        m22 = m11 * m22 - m21 * m12;
        ax2 = m11 * ax2 - m21 * ax1;

        let mut l = T::select(m22.abs().gt_mask(T::cst(CURVATURE_PIVOT_MIN)), ax2 / m22, zero);
        ax1 -= l * m12;
        ax0 -= l * m02;

        let pivot_min = T::cst(LINE_PIVOT_MIN);
        let tx = T::select(m11.abs().gt_mask(pivot_min), ax1 / m11, zero);
        ax0 -= tx * m01;
        let x = T::select(m00.abs().gt_mask(pivot_min), ax0 / m00, zero);

        let txtx1 = T::one() + tx * tx;
        l /= txtx1;
        let l1 = l * tx;

        // y: 2×2 system in (y0, ty) with the curvature folded in
        let a_1 = a_1 + a_3 * l1;
        let a_2 = a_2 + (a_4 + a_4 + a_5 * l1) * l1;
        let by1 = by1 + by2 * l1;

        let det = a_0 * a_2 - a_1 * a_1;
        let ty = T::select(det.abs().gt_mask(pivot_min), (a_0 * by1 - a_1 * by0) / det, zero);
        let y = T::select(a_0.abs().gt_mask(pivot_min), (by0 - a_1 * ty) / a_0, zero);

        let tr = &mut self.tr;
        tr.x = x;
        tr.y = y;
        tr.tx = tx;
        tr.ty = ty;
        tr.qp = -l / T::cst(C_LIGHT) / (txtx1 + ty * ty).sqrt();
        tr.t = time;
        tr.z = track_z;
        tr.vi = T::cst(SPEED_OF_LIGHT_INV);
        self.qp0 = self.tr.qp;
    }
}
