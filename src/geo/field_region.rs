//! Field model used along one extrapolation.
//!
//! In the interpolated mode each component is a quadratic in z about a
//! reference z0, built from two or three field samples taken along the
//! track. The transverse coordinates are ignored in this mode: the
//! dependence on (x, y) is already folded into where the nodes were
//! sampled. In the original mode the region forwards to the field function.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::field_value::{FieldFn, FieldMode, FieldType, FieldValue};
use crate::types::Scalar;

/// Quadratic coefficients B(z) = c0 + c1·dz + c2·dz², dz = z - z0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuadraticField<T: Scalar> {
    pub c0: FieldValue<T>,
    pub c1: FieldValue<T>,
    pub c2: FieldValue<T>,
    pub z0: T,
}

impl<T: Scalar> QuadraticField<T> {
    /// Straight line through two nodes. `z1 == z0` is not guarded.
    pub fn from_two_nodes(b0: &FieldValue<T>, z0: T, b1: &FieldValue<T>, z1: T) -> Self {
        let dzi = T::one() / (z1 - z0);
        Self {
            c0: *b0,
            c1: (*b1 - *b0) * dzi,
            c2: FieldValue::zero(),
            z0,
        }
    }

    /// Parabola through three nodes. Coincident nodes are not guarded.
    pub fn from_three_nodes(
        b0: &FieldValue<T>,
        z0: T,
        b1: &FieldValue<T>,
        z1: T,
        b2: &FieldValue<T>,
        z2: T,
    ) -> Self {
        let dz1 = z1 - z0;
        let dz2 = z2 - z0;
        let det = T::one() / (dz1 * dz2 * (z2 - z1));
        let w21 = -dz2 * det;
        let w22 = dz1 * det;
        let w11 = -dz2 * w21;
        let w12 = -dz1 * w22;

        let db1 = *b1 - *b0;
        let db2 = *b2 - *b0;
        Self {
            c0: *b0,
            c1: db1 * w11 + db2 * w12,
            c2: db1 * w21 + db2 * w22,
            z0,
        }
    }

    pub fn get(&self, z: T) -> FieldValue<T> {
        let dz = z - self.z0;
        self.c0 + (self.c1 + self.c2 * dz) * dz
    }

    /// Re-centers the same parabola at `z`.
    pub fn shift(&mut self, z: T) {
        let dz = z - self.z0;
        let c2dz = self.c2 * dz;
        self.c0 = self.c0 + (self.c1 + c2dz) * dz;
        self.c1 = self.c1 + c2dz * T::cst(2.0);
        self.z0 = z;
    }

    /// ∫∫B along z from z1 to z2: ∫_{z1}^{z2} dz ∫_{z1}^{z} B(z') dz'.
    pub fn double_integrals(&self, z1: T, z2: T) -> FieldValue<T> {
        let a = z1 - self.z0;
        let h = z2 - z1;
        // expand about z1
        let b0 = self.get(z1);
        let b1 = self.c1 + self.c2 * (T::cst(2.0) * a);
        let b2 = self.c2;
        let h2 = h * h;
        b0 * (h2 * T::cst(0.5)) + b1 * (h2 * h / T::cst(6.0)) + b2 * (h2 * h2 / T::cst(12.0))
    }
}

#[derive(Clone)]
enum RegionKind<T: Scalar> {
    Original(FieldFn),
    Interpolated(QuadraticField<T>),
}

/// Field available to one extrapolation call.
#[derive(Clone)]
pub struct FieldRegion<T: Scalar> {
    kind: RegionKind<T>,
    field_type: FieldType,
}

impl<T: Scalar> Default for FieldRegion<T> {
    /// A zero interpolated field.
    fn default() -> Self {
        Self {
            kind: RegionKind::Interpolated(QuadraticField::default()),
            field_type: FieldType::Null,
        }
    }
}

impl<T: Scalar> FieldRegion<T> {
    /// Interpolated region through two nodes.
    pub fn from_two_nodes(b0: &FieldValue<T>, z0: T, b1: &FieldValue<T>, z1: T) -> Self {
        let field_type = Self::type_of(&[b0, b1]);
        Self {
            kind: RegionKind::Interpolated(QuadraticField::from_two_nodes(b0, z0, b1, z1)),
            field_type,
        }
    }

    /// Interpolated region through three nodes.
    pub fn from_three_nodes(
        b0: &FieldValue<T>,
        z0: T,
        b1: &FieldValue<T>,
        z1: T,
        b2: &FieldValue<T>,
        z2: T,
    ) -> Self {
        let field_type = Self::type_of(&[b0, b1, b2]);
        Self {
            kind: RegionKind::Interpolated(QuadraticField::from_three_nodes(b0, z0, b1, z1, b2, z2)),
            field_type,
        }
    }

    /// Interpolated region from known coefficients.
    pub fn from_quadratic(field_type: FieldType, quad: QuadraticField<T>) -> Self {
        Self {
            kind: RegionKind::Interpolated(quad),
            field_type,
        }
    }

    /// Region evaluating the field function directly.
    pub fn from_fn(field_type: FieldType, field_fn: FieldFn) -> Self {
        Self {
            kind: RegionKind::Original(field_fn),
            field_type,
        }
    }

    fn type_of(nodes: &[&FieldValue<T>]) -> FieldType {
        if nodes.iter().all(|b| b.is_zero()) {
            FieldType::Null
        } else {
            FieldType::Normal
        }
    }

    pub fn field_mode(&self) -> FieldMode {
        match self.kind {
            RegionKind::Original(_) => FieldMode::Orig,
            RegionKind::Interpolated(_) => FieldMode::Intrpl,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn set_field_type(&mut self, field_type: FieldType) {
        self.field_type = field_type;
    }

    /// True when the region was built from negligible field values.
    pub fn is_zero_field(&self) -> bool {
        self.field_type == FieldType::Null
    }

    /// Interpolation coefficients, if the region is interpolated.
    pub fn quadratic(&self) -> Option<&QuadraticField<T>> {
        match &self.kind {
            RegionKind::Interpolated(q) => Some(q),
            RegionKind::Original(_) => None,
        }
    }

    /// Field at a point. In the interpolated mode x and y are ignored.
    pub fn get(&self, x: T, y: T, z: T) -> FieldValue<T> {
        match &self.kind {
            RegionKind::Interpolated(q) => q.get(z),
            RegionKind::Original(f) => FieldValue::from_fn(f, x, y, z),
        }
    }

    /// Re-centers an interpolated region at `z`. No effect in the original mode.
    pub fn shift(&mut self, z: T) {
        if let RegionKind::Interpolated(q) = &mut self.kind {
            q.shift(z);
        }
    }

    /// Double integrals of the field along the straight segment from
    /// (x1, y1, z1) to (x2, y2, z2), integrating over z.
    #[allow(clippy::too_many_arguments)]
    pub fn double_integrals(&self, x1: T, y1: T, z1: T, x2: T, y2: T, z2: T) -> FieldValue<T> {
        match &self.kind {
            RegionKind::Interpolated(q) => q.double_integrals(z1, z2),
            RegionKind::Original(f) => {
                // Simpson rule on (z2 - s) B(s), exact for B quadratic in z
                let half = T::cst(0.5);
                let h = z2 - z1;
                let b1 = FieldValue::from_fn(f, x1, y1, z1);
                let bm = FieldValue::from_fn(f, (x1 + x2) * half, (y1 + y2) * half, (z1 + z2) * half);
                (b1 + bm * T::cst(2.0)) * (h * h / T::cst(6.0))
            }
        }
    }
}

impl<T: Scalar> fmt::Debug for FieldRegion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RegionKind::Interpolated(q) => f
                .debug_struct("FieldRegion")
                .field("field_type", &self.field_type)
                .field("quadratic", q)
                .finish(),
            RegionKind::Original(_) => f
                .debug_struct("FieldRegion")
                .field("field_type", &self.field_type)
                .field("field_fn", &"<fn>")
                .finish(),
        }
    }
}
