//! Transverse polynomial model of the field at a fixed z.
//!
//! Each field component is approximated by a full 2D polynomial of degree 5
//! in (x, y). Coefficients are ordered by total degree, and within a degree
//! by rising power of y:
//! 1, x, y, x², xy, y², x³, x²y, xy², y³, ...

use serde::{Deserialize, Serialize};

use crate::data::TrackParam;
use crate::geo::field_value::{FieldFn, FieldValue};
use crate::types::{FieldNormalMat, FieldRhsMat, Scalar, FIELD_POL_DEGREE, FIELD_POL_NCOEFF};

/// Grid density of the least-squares fit: points per coefficient along an axis.
const FIT_POINTS_PER_COEFF: f64 = 10.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSlice<T: Scalar> {
    /// Reference z of the slice [cm]
    pub z_ref: T,
    pub cx: [T; FIELD_POL_NCOEFF],
    pub cy: [T; FIELD_POL_NCOEFF],
    pub cz: [T; FIELD_POL_NCOEFF],
}

/// Position of x^(d-k) y^k in the coefficient array.
#[inline]
const fn coeff_index(degree: usize, k: usize) -> usize {
    degree * (degree + 1) / 2 + k
}

/// All monomials of total degree <= 5 at (x, y).
fn monomials(x: f64, y: f64) -> [f64; FIELD_POL_NCOEFF] {
    let mut m = [0.0; FIELD_POL_NCOEFF];
    m[0] = 1.0;
    for d in 1..=FIELD_POL_DEGREE {
        let prev = coeff_index(d - 1, 0);
        let cur = coeff_index(d, 0);
        // raise every monomial of degree d-1 by x, then the last one by y
        for k in 0..d {
            m[cur + k] = m[prev + k] * x;
        }
        m[cur + d] = m[prev + d - 1] * y;
    }
    m
}

/// Horner evaluation: sum over k of y^k * Q_k(x).
#[inline]
fn horner<T: Scalar>(c: &[T; FIELD_POL_NCOEFF], x: T, y: T) -> T {
    let mut res = T::zero();
    for k in (0..=FIELD_POL_DEGREE).rev() {
        let mut q = T::zero();
        for j in (0..=FIELD_POL_DEGREE - k).rev() {
            q = q * x + c[coeff_index(j + k, k)];
        }
        res = res * y + q;
    }
    res
}

/// Solves `a · X = b` in place by Gaussian elimination with partial
/// pivoting. On return `b` holds X. Returns false for a singular system.
fn solve_normal_equations(a: &mut FieldNormalMat, b: &mut FieldRhsMat) -> bool {
    let n = FIELD_POL_NCOEFF;
    for col in 0..n {
        let mut piv = col;
        for row in col + 1..n {
            if a[(row, col)].abs() > a[(piv, col)].abs() {
                piv = row;
            }
        }
        if a[(piv, col)] == 0.0 {
            return false;
        }
        if piv != col {
            a.swap_rows(piv, col);
            b.swap_rows(piv, col);
        }
        let inv = 1.0 / a[(col, col)];
        for row in col + 1..n {
            let f = a[(row, col)] * inv;
            if f == 0.0 {
                continue;
            }
            for k in col..n {
                a[(row, k)] -= f * a[(col, k)];
            }
            for k in 0..3 {
                b[(row, k)] -= f * b[(col, k)];
            }
        }
    }
    for col in (0..n).rev() {
        for k in 0..3 {
            let mut s = b[(col, k)];
            for j in col + 1..n {
                s -= a[(col, j)] * b[(j, k)];
            }
            b[(col, k)] = s / a[(col, col)];
        }
    }
    true
}

impl<T: Scalar> FieldSlice<T> {
    /// Fits the slice to `field_fn` over [-x_max, x_max] × [-y_max, y_max] at
    /// `z_ref` by least squares on a regular grid.
    pub fn fit(field_fn: &FieldFn, x_max: f64, y_max: f64, z_ref: f64) -> Self {
        let dx = (x_max / FIELD_POL_NCOEFF as f64 / FIT_POINTS_PER_COEFF).min(1.0);
        let dy = (y_max / FIELD_POL_NCOEFF as f64 / FIT_POINTS_PER_COEFF).min(1.0);

        let mut a = FieldNormalMat::zeros();
        let mut b = FieldRhsMat::zeros();

        let nx = (2.0 * x_max / dx).floor() as usize;
        let ny = (2.0 * y_max / dy).floor() as usize;
        for ix in 0..=nx {
            let x = -x_max + ix as f64 * dx;
            for iy in 0..=ny {
                let y = -y_max + iy as f64 * dy;
                let (bx, by, bz) = field_fn(x, y, z_ref);
                let m = monomials(x, y);
                for i in 0..FIELD_POL_NCOEFF {
                    b[(i, 0)] += bx * m[i];
                    b[(i, 1)] += by * m[i];
                    b[(i, 2)] += bz * m[i];
                    for j in 0..=i {
                        a[(i, j)] += m[i] * m[j];
                    }
                }
            }
        }
        for i in 0..FIELD_POL_NCOEFF {
            for j in 0..i {
                a[(j, i)] = a[(i, j)];
            }
        }

        if !solve_normal_equations(&mut a, &mut b) {
            log::warn!("FieldSlice::fit: singular normal equations at z = {}", z_ref);
            b.fill(0.0);
        }

        let mut slice = Self {
            z_ref: T::cst(z_ref),
            cx: [T::zero(); FIELD_POL_NCOEFF],
            cy: [T::zero(); FIELD_POL_NCOEFF],
            cz: [T::zero(); FIELD_POL_NCOEFF],
        };
        for i in 0..FIELD_POL_NCOEFF {
            slice.cx[i] = T::cst(b[(i, 0)]);
            slice.cy[i] = T::cst(b[(i, 1)]);
            slice.cz[i] = T::cst(b[(i, 2)]);
        }
        slice
    }

    /// Field at (x, y) on the slice. Outside the fitted extent the polynomial
    /// is extrapolated as is.
    pub fn get_field_value(&self, x: T, y: T) -> FieldValue<T> {
        FieldValue::new(
            horner(&self.cx, x, y),
            horner(&self.cy, x, y),
            horner(&self.cz, x, y),
        )
    }

    /// Field where the straight-line extension of the track crosses the slice.
    pub fn get_field_value_for_line(&self, track: &TrackParam<T>) -> FieldValue<T> {
        let dz = self.z_ref - track.z;
        self.get_field_value(track.x + track.tx * dz, track.y + track.ty * dz)
    }

    /// Copies the slice into another scalar precision.
    pub fn convert<U: Scalar>(&self) -> FieldSlice<U> {
        let c = |src: &[T; FIELD_POL_NCOEFF]| {
            let mut dst = [U::zero(); FIELD_POL_NCOEFF];
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = U::cst(s.as_f64());
            }
            dst
        };
        FieldSlice {
            z_ref: U::cst(self.z_ref.as_f64()),
            cx: c(&self.cx),
            cy: c(&self.cy),
            cz: c(&self.cz),
        }
    }
}
