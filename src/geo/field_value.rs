use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::defs::MIN_FIELD2;
use crate::types::Scalar;

/// Field function: (x, y, z) [cm] -> (Bx, By, Bz) [kG]
pub type FieldFn = Arc<dyn Fn(f64, f64, f64) -> (f64, f64, f64) + Send + Sync>;

/// A field function returning zero everywhere.
pub fn zero_field_fn() -> FieldFn {
    Arc::new(|_, _, _| (0.0, 0.0, 0.0))
}

/// Whether a field is present at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// No field, tracks are straight
    Null,
    Normal,
}

/// How the field is evaluated during the fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMode {
    /// Direct calls to the field function
    Orig,
    /// Polynomial slices and quadratic regions
    Intrpl,
}

/// Magnetic field vector [kG].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValue<T: Scalar> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Scalar> FieldValue<T> {
    pub fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(T::zero(), T::zero(), T::zero())
    }

    /// Evaluates a field function at a point, lane by lane for packed types.
    pub fn from_fn(field_fn: &FieldFn, x: T, y: T, z: T) -> Self {
        let (bx, by, bz) = field_fn(x.as_f64(), y.as_f64(), z.as_f64());
        Self::new(T::cst(bx), T::cst(by), T::cst(bz))
    }

    pub fn norm2(&self) -> T {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// True if the field is negligible in every lane.
    pub fn is_zero(&self) -> bool {
        T::all(self.norm2().le_mask(T::cst(MIN_FIELD2)))
    }

    /// Lane-wise `mask ? a : b`.
    pub fn select(mask: T::Mask, a: &Self, b: &Self) -> Self {
        Self::new(
            T::select(mask, a.x, b.x),
            T::select(mask, a.y, b.y),
            T::select(mask, a.z, b.z),
        )
    }
}

impl<T: Scalar> Add for FieldValue<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<T: Scalar> Sub for FieldValue<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<T: Scalar> Mul<T> for FieldValue<T> {
    type Output = Self;

    fn mul(self, k: T) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl<T: Scalar> fmt::Display for FieldValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B = ({:?}, {:?}, {:?}) kG", self.x, self.y, self.z)
    }
}
