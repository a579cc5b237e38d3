//! Linear algebra type system for the track fit
//!
//! Fixed dimensions of the track state, the packed covariance and the
//! dense matrices used by the Runge-Kutta transport and the smoother.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const N_TRACK_PARAM: usize = 7; // x, y, tx, ty, qp, t, vi
pub const N_COV_PARAM: usize = N_TRACK_PARAM * (N_TRACK_PARAM + 1) / 2; // 28

// ===== Field Polynomial Dimensions =====
pub const FIELD_POL_DEGREE: usize = 5;
pub const FIELD_POL_NCOEFF: usize = (FIELD_POL_DEGREE + 1) * (FIELD_POL_DEGREE + 2) / 2; // 21

// ===== Generic dense blocks (Runge-Kutta transport) =====
pub type Vec7<T> = [T; N_TRACK_PARAM];
pub type Mat7<T> = [[T; N_TRACK_PARAM]; N_TRACK_PARAM];

// ===== Double-precision types (smoother, field fit) =====
pub type StateVec7 = SVector<f64, N_TRACK_PARAM>;
pub type StateMat7 = SMatrix<f64, N_TRACK_PARAM, N_TRACK_PARAM>;
pub type FieldNormalMat = SMatrix<f64, FIELD_POL_NCOEFF, FIELD_POL_NCOEFF>;
pub type FieldRhsMat = SMatrix<f64, FIELD_POL_NCOEFF, 3>;

/// Offset of element (i, j) in the packed lower-triangular covariance.
#[inline]
pub const fn cov_index(i: usize, j: usize) -> usize {
    if j <= i {
        i * (i + 1) / 2 + j
    } else {
        j * (j + 1) / 2 + i
    }
}

/// A 7×7 matrix of zeros.
pub fn zero_mat7<T: crate::types::Scalar>() -> Mat7<T> {
    [[T::zero(); N_TRACK_PARAM]; N_TRACK_PARAM]
}

/// The 7×7 identity.
pub fn identity_mat7<T: crate::types::Scalar>() -> Mat7<T> {
    let mut m = zero_mat7();
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = T::one();
    }
    m
}

/// Dense product `a · b`.
pub fn mat7_mul<T: crate::types::Scalar>(a: &Mat7<T>, b: &Mat7<T>) -> Mat7<T> {
    let mut out = zero_mat7();
    for i in 0..N_TRACK_PARAM {
        for j in 0..N_TRACK_PARAM {
            let mut s = T::zero();
            for k in 0..N_TRACK_PARAM {
                s += a[i][k] * b[k][j];
            }
            out[i][j] = s;
        }
    }
    out
}

/// Dense product `a · bᵀ`.
pub fn mat7_mul_transposed<T: crate::types::Scalar>(a: &Mat7<T>, b: &Mat7<T>) -> Mat7<T> {
    let mut out = zero_mat7();
    for i in 0..N_TRACK_PARAM {
        for j in 0..N_TRACK_PARAM {
            let mut s = T::zero();
            for k in 0..N_TRACK_PARAM {
                s += a[i][k] * b[j][k];
            }
            out[i][j] = s;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cov_index_is_symmetric_and_packed() {
        assert_eq!(cov_index(0, 0), 0);
        assert_eq!(cov_index(1, 0), 1);
        assert_eq!(cov_index(1, 1), 2);
        assert_eq!(cov_index(6, 6), N_COV_PARAM - 1);
        for i in 0..N_TRACK_PARAM {
            for j in 0..N_TRACK_PARAM {
                assert_eq!(cov_index(i, j), cov_index(j, i));
            }
        }
    }

    #[test]
    fn test_mat7_products() {
        let mut a = identity_mat7::<f64>();
        a[0][2] = 10.0;
        let id = identity_mat7::<f64>();
        let p = mat7_mul(&a, &id);
        assert_eq!(p, a);
        let aat = mat7_mul_transposed(&a, &a);
        assert!((aat[0][0] - 101.0).abs() < 1e-12);
        assert!((aat[0][2] - 10.0).abs() < 1e-12);
        assert!((aat[2][0] - 10.0).abs() < 1e-12);
    }
}
