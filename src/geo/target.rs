use std::fmt;

use crate::geo::material_map::MaterialMap;
use crate::types::Scalar;

/// Target: a thin slab of material around the primary vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct Target<T: Scalar> {
    pub x: T,
    pub y: T,
    pub z: T,
    /// Half-thickness [cm]
    pub dz: T,
    /// Transverse size [cm]
    pub r: T,
    material: MaterialMap,
}

impl<T: Scalar> Target<T> {
    pub fn new(x: f64, y: f64, z: f64, dz: f64, r: f64, material: MaterialMap) -> Self {
        Self {
            x: T::cst(x),
            y: T::cst(y),
            z: T::cst(z),
            dz: T::cst(dz),
            r: T::cst(r),
            material,
        }
    }

    pub fn material(&self) -> &MaterialMap {
        &self.material
    }

    pub fn set_material(&mut self, material: MaterialMap) {
        self.material = material;
    }
}

impl<T: Scalar> fmt::Display for Target<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Target: x = {:.3}, y = {:.3}, z = {:.3}, dz = {:.3}, r = {:.3} cm, mean x/X0 = {:.4}%",
            self.x.as_f64(),
            self.y.as_f64(),
            self.z.as_f64(),
            self.dz.as_f64(),
            self.r.as_f64(),
            100.0 * self.material.thickness_mean()
        )
    }
}
