//! Scalar abstraction shared by every numeric routine of the fitter.
//!
//! The filter is written once against [`Scalar`]. Each scalar carries a
//! [`Scalar::Mask`] type for per-lane activity flags, and all conditional
//! updates go through [`Scalar::select`] instead of branching, so a packed
//! lane type can implement the same trait without lanes leaking into
//! each other.

use std::fmt::Debug;
use std::ops::{AddAssign, BitAnd, BitOr, DivAssign, MulAssign, Not, SubAssign};

use num_traits::Float;

/// Floating type the track fit can run on.
pub trait Scalar:
    Float + Default + Debug + Send + Sync + 'static + AddAssign + SubAssign + MulAssign + DivAssign
{
    /// Per-lane boolean.
    type Mask: Copy
        + Debug
        + PartialEq
        + BitAnd<Output = Self::Mask>
        + BitOr<Output = Self::Mask>
        + Not<Output = Self::Mask>;

    /// Enables the regularized weight branch of the measurement updates.
    /// Double precision does not need it.
    const PROTECTED: bool;

    /// Converts a literal constant.
    fn cst(v: f64) -> Self;

    /// Widens to f64 (used by the field function and the smoother).
    fn as_f64(self) -> f64;

    /// Mask with every lane set to `b`.
    fn mask(b: bool) -> Self::Mask;

    fn lt_mask(self, other: Self) -> Self::Mask;
    fn le_mask(self, other: Self) -> Self::Mask;
    fn gt_mask(self, other: Self) -> Self::Mask;

    /// `mask ? a : b`, lane by lane.
    fn select(mask: Self::Mask, a: Self, b: Self) -> Self;

    fn any(mask: Self::Mask) -> bool;
    fn all(mask: Self::Mask) -> bool;

    /// Lanes holding a NaN.
    fn is_nan_mask(self) -> Self::Mask {
        !self.le_mask(self) & !self.gt_mask(self)
    }
}

macro_rules! impl_scalar {
    ($t:ty, $protected:expr) => {
        impl Scalar for $t {
            type Mask = bool;

            const PROTECTED: bool = $protected;

            #[inline]
            fn cst(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn mask(b: bool) -> bool {
                b
            }

            #[inline]
            fn lt_mask(self, other: Self) -> bool {
                self < other
            }

            #[inline]
            fn le_mask(self, other: Self) -> bool {
                self <= other
            }

            #[inline]
            fn gt_mask(self, other: Self) -> bool {
                self > other
            }

            #[inline]
            fn select(mask: bool, a: Self, b: Self) -> Self {
                if mask {
                    a
                } else {
                    b
                }
            }

            #[inline]
            fn any(mask: bool) -> bool {
                mask
            }

            #[inline]
            fn all(mask: bool) -> bool {
                mask
            }
        }
    };
}

impl_scalar!(f32, true);
impl_scalar!(f64, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_scalar() {
        assert_eq!(f64::select(true, 1.0, 2.0), 1.0);
        assert_eq!(f64::select(false, 1.0, 2.0), 2.0);
        assert_eq!(f32::select(1.0f32.lt_mask(2.0), 3.0, 4.0), 3.0);
    }

    #[test]
    fn test_protected_only_below_double() {
        assert!(<f32 as Scalar>::PROTECTED);
        assert!(!<f64 as Scalar>::PROTECTED);
    }

    #[test]
    fn test_nan_mask() {
        assert!(f64::NAN.is_nan_mask());
        assert!(!1.0f64.is_nan_mask());
    }
}
