//! Measurements consumed by the filter.
//!
//! The `ndf` fields are usability flags (0 or 1), not degrees of freedom.

use serde::{Deserialize, Serialize};

use crate::types::Scalar;

/// 1D measurement of `u = cos_phi * x + sin_phi * y`.
///
/// The direction cosines need not be normalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementU<T: Scalar> {
    pub cos_phi: T,
    pub sin_phi: T,
    pub u: T,
    /// Variance of u
    pub du2: T,
    pub ndf: T,
}

impl<T: Scalar> Default for MeasurementU<T> {
    fn default() -> Self {
        Self {
            cos_phi: T::one(),
            sin_phi: T::zero(),
            u: T::zero(),
            du2: T::one(),
            ndf: T::zero(),
        }
    }
}

impl<T: Scalar> MeasurementU<T> {
    pub fn new(cos_phi: T, sin_phi: T, u: T, du2: T, ndf: T) -> Self {
        Self {
            cos_phi,
            sin_phi,
            u,
            du2,
            ndf,
        }
    }
}

/// 2D position measurement with its covariance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementXy<T: Scalar> {
    pub x: T,
    pub y: T,
    pub dx2: T,
    pub dy2: T,
    pub dxy: T,
    pub ndf_x: T,
    pub ndf_y: T,
}

impl<T: Scalar> Default for MeasurementXy<T> {
    // unit variances and zero ndf keep unused lanes inert
    fn default() -> Self {
        Self {
            x: T::zero(),
            y: T::zero(),
            dx2: T::one(),
            dy2: T::one(),
            dxy: T::zero(),
            ndf_x: T::zero(),
            ndf_y: T::zero(),
        }
    }
}

impl<T: Scalar> MeasurementXy<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(x: T, y: T, dx2: T, dy2: T, dxy: T, ndf_x: T, ndf_y: T) -> Self {
        Self {
            x,
            y,
            dx2,
            dy2,
            dxy,
            ndf_x,
            ndf_y,
        }
    }

    /// Uncorrelated measurement with resolutions `dx`, `dy`, both axes used.
    pub fn from_resolution(x: T, y: T, dx: T, dy: T) -> Self {
        Self::new(x, y, dx * dx, dy * dy, T::zero(), T::one(), T::one())
    }

    /// The x component as a 1D measurement.
    pub fn x_component(&self) -> MeasurementU<T> {
        MeasurementU::new(T::one(), T::zero(), self.x, self.dx2, self.ndf_x)
    }

    /// The remainder of the measurement once x is known: the direction whose
    /// error is uncorrelated with x.
    pub fn u_component(&self) -> MeasurementU<T> {
        let cos_phi = -self.dxy / self.dx2;
        MeasurementU::new(
            cos_phi,
            T::one(),
            cos_phi * self.x + self.y,
            self.dy2 - self.dxy * self.dxy / self.dx2,
            self.ndf_y,
        )
    }
}

/// Time measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementTime<T: Scalar> {
    pub t: T,
    pub dt2: T,
    pub ndf_t: T,
}

impl<T: Scalar> Default for MeasurementTime<T> {
    fn default() -> Self {
        Self {
            t: T::zero(),
            dt2: T::one(),
            ndf_t: T::zero(),
        }
    }
}

impl<T: Scalar> MeasurementTime<T> {
    pub fn new(t: T, dt2: T, ndf_t: T) -> Self {
        Self { t, dt2, ndf_t }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_inert() {
        let m = MeasurementXy::<f32>::default();
        assert_eq!(m.ndf_x, 0.0);
        assert_eq!(m.ndf_y, 0.0);
        assert_eq!(m.dx2, 1.0);
        let t = MeasurementTime::<f64>::default();
        assert_eq!(t.ndf_t, 0.0);
    }

    #[test]
    fn test_u_component_is_decorrelated_from_x() {
        let m = MeasurementXy::<f64>::new(1.0, 2.0, 4.0, 9.0, 3.0, 1.0, 1.0);
        let u = m.u_component();
        // cov(x, u) = cos_phi * dx2 + dxy = 0
        assert!((u.cos_phi * m.dx2 + m.dxy).abs() < 1e-12);
        assert!((u.du2 - (9.0 - 9.0 / 4.0)).abs() < 1e-12);
        assert!((u.u - (-0.75 * 1.0 + 2.0)).abs() < 1e-12);
    }
}
