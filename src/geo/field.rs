//! Magnetic field of a setup and the builder that produces it.

use std::fmt;

use crate::data::TrackParam;
use crate::error::{KfError, KfResult};
use crate::geo::field_region::{FieldRegion, QuadraticField};
use crate::geo::field_slice::FieldSlice;
use crate::geo::field_value::{FieldFn, FieldMode, FieldType, FieldValue};
use crate::types::defs::TARGET_FIELD_INIT_STEP;
use crate::types::Scalar;

#[derive(Clone)]
enum FieldData<T: Scalar> {
    /// Field function plus the z of every slice it stands in for
    Original { field_fn: FieldFn, slice_z: Vec<T> },
    /// Fitted slices, ordered in z
    Interpolated { slices: Vec<FieldSlice<T>> },
}

/// Field of the whole setup, either as the raw function or as a set of
/// polynomial slices.
#[derive(Clone)]
pub struct Field<T: Scalar> {
    data: FieldData<T>,
    /// Field near the primary vertex
    prim_vertex_field: FieldRegion<T>,
    field_type: FieldType,
}

impl<T: Scalar> Field<T> {
    pub fn field_mode(&self) -> FieldMode {
        match self.data {
            FieldData::Original { .. } => FieldMode::Orig,
            FieldData::Interpolated { .. } => FieldMode::Intrpl,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn prim_vertex_field(&self) -> &FieldRegion<T> {
        &self.prim_vertex_field
    }

    pub fn n_slices(&self) -> usize {
        match &self.data {
            FieldData::Original { slice_z, .. } => slice_z.len(),
            FieldData::Interpolated { slices } => slices.len(),
        }
    }

    /// Reference z of a slice.
    ///
    /// # Panics
    ///
    /// If `slice_id >= self.n_slices()`. The fit only passes ids of
    /// existing slices; use [`Field::slice`] for a checked lookup.
    pub fn slice_z(&self, slice_id: usize) -> T {
        match &self.data {
            FieldData::Original { slice_z, .. } => slice_z[slice_id],
            FieldData::Interpolated { slices } => slices[slice_id].z_ref,
        }
    }

    /// The fitted slice, in the interpolated mode.
    pub fn slice(&self, slice_id: usize) -> Option<&FieldSlice<T>> {
        match &self.data {
            FieldData::Original { .. } => None,
            FieldData::Interpolated { slices } => slices.get(slice_id),
        }
    }

    /// Field at (x, y) on a slice.
    ///
    /// # Panics
    ///
    /// If `slice_id >= self.n_slices()`, in both field modes.
    pub fn get_field_value(&self, slice_id: usize, x: T, y: T) -> FieldValue<T> {
        match &self.data {
            FieldData::Original { field_fn, slice_z } => {
                FieldValue::from_fn(field_fn, x, y, slice_z[slice_id])
            }
            FieldData::Interpolated { slices } => slices[slice_id].get_field_value(x, y),
        }
    }

    /// Field region through three sampled nodes. In the original mode the
    /// nodes are ignored and the region calls the field function.
    pub fn get_field_region(
        &self,
        b0: &FieldValue<T>,
        z0: T,
        b1: &FieldValue<T>,
        z1: T,
        b2: &FieldValue<T>,
        z2: T,
    ) -> FieldRegion<T> {
        match &self.data {
            FieldData::Original { field_fn, .. } => {
                FieldRegion::from_fn(self.field_type, field_fn.clone())
            }
            FieldData::Interpolated { .. } => FieldRegion::from_three_nodes(b0, z0, b1, z1, b2, z2),
        }
    }

    /// Field region valid for a track moving between `z_from` and `z_to`.
    ///
    /// In the interpolated mode the region is built from the slices closest
    /// to the middle of the segment, each sampled where the straight-line
    /// extension of `track` crosses it.
    pub fn field_region_for_segment(&self, track: &TrackParam<T>, z_from: T, z_to: T) -> FieldRegion<T> {
        let slices = match &self.data {
            FieldData::Original { field_fn, .. } => {
                return FieldRegion::from_fn(self.field_type, field_fn.clone());
            }
            FieldData::Interpolated { slices } => slices,
        };
        if self.field_type == FieldType::Null || slices.is_empty() {
            return FieldRegion::default();
        }

        let z_mid = (z_from + z_to) * T::cst(0.5);
        let mut order: Vec<usize> = (0..slices.len()).collect();
        order.sort_by(|&a, &b| {
            let da = (slices[a].z_ref - z_mid).abs();
            let db = (slices[b].z_ref - z_mid).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut nearest: Vec<&FieldSlice<T>> = order.iter().take(3).map(|&i| &slices[i]).collect();
        nearest.sort_by(|a, b| a.z_ref.partial_cmp(&b.z_ref).unwrap_or(std::cmp::Ordering::Equal));

        let node = |s: &FieldSlice<T>| s.get_field_value_for_line(track);
        match nearest.as_slice() {
            [s0, s1, s2] => FieldRegion::from_three_nodes(
                &node(s0),
                s0.z_ref,
                &node(s1),
                s1.z_ref,
                &node(s2),
                s2.z_ref,
            ),
            [s0, s1] => FieldRegion::from_two_nodes(&node(s0), s0.z_ref, &node(s1), s1.z_ref),
            [s0] => {
                let b = node(s0);
                let field_type = if b.is_zero() {
                    FieldType::Null
                } else {
                    FieldType::Normal
                };
                let quad = QuadraticField {
                    c0: b,
                    c1: FieldValue::zero(),
                    c2: FieldValue::zero(),
                    z0: s0.z_ref,
                };
                FieldRegion::from_quadratic(field_type, quad)
            }
            _ => FieldRegion::default(),
        }
    }

    /// Drops a slice, e.g. when its detector layer is disabled.
    pub fn remove_slice(&mut self, slice_id: usize) -> KfResult<()> {
        if slice_id >= self.n_slices() {
            return Err(KfError::IndexOutOfRange(slice_id));
        }
        match &mut self.data {
            FieldData::Original { slice_z, .. } => {
                slice_z.remove(slice_id);
            }
            FieldData::Interpolated { slices } => {
                slices.remove(slice_id);
            }
        }
        Ok(())
    }
}

impl<T: Scalar> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("mode", &self.field_mode())
            .field("type", &self.field_type)
            .field("n_slices", &self.n_slices())
            .field("prim_vertex_field", &self.prim_vertex_field)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct SliceRef {
    half_size_x: f64,
    half_size_y: f64,
    ref_z: f64,
}

/// Builder of [`Field`].
#[derive(Clone)]
pub struct FieldFactory {
    slice_refs: Vec<SliceRef>,
    field_fn: Option<FieldFn>,
    field_type: FieldType,
    field_mode: FieldMode,
    target_step: f64,
    target: Option<[f64; 3]>,
}

impl Default for FieldFactory {
    fn default() -> Self {
        Self {
            slice_refs: Vec::new(),
            field_fn: None,
            field_type: FieldType::Null,
            field_mode: FieldMode::Intrpl,
            target_step: TARGET_FIELD_INIT_STEP,
            target: None,
        }
    }
}

impl FieldFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a slice. Slices are kept ordered in z; a second slice at
    /// an already registered z is ignored.
    pub fn add_slice_reference(&mut self, half_size_x: f64, half_size_y: f64, ref_z: f64) {
        if self.slice_refs.iter().any(|s| s.ref_z == ref_z) {
            return;
        }
        let pos = self.slice_refs.partition_point(|s| s.ref_z < ref_z);
        self.slice_refs.insert(
            pos,
            SliceRef {
                half_size_x,
                half_size_y,
                ref_z,
            },
        );
    }

    pub fn reset_slice_references(&mut self) {
        self.slice_refs.clear();
    }

    pub fn set_field_function(&mut self, field_fn: FieldFn, field_type: FieldType) {
        self.field_fn = Some(field_fn);
        self.field_type = field_type;
    }

    pub fn set_field_mode(&mut self, field_mode: FieldMode) {
        self.field_mode = field_mode;
    }

    pub fn field_mode(&self) -> FieldMode {
        self.field_mode
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Spacing of the nodes sampled near the target [cm].
    pub fn set_step(&mut self, step: f64) {
        self.target_step = step;
    }

    pub fn set_target(&mut self, x: f64, y: f64, z: f64) {
        self.target = Some([x, y, z]);
    }

    pub fn make_field<T: Scalar>(&self) -> KfResult<Field<T>> {
        let target = match self.target {
            Some(t) if t.iter().all(|v| v.is_finite()) => t,
            _ => return Err(KfError::FieldFactory("target is undefined".into())),
        };
        if self.slice_refs.is_empty() {
            return Err(KfError::FieldFactory("no slice references were provided".into()));
        }
        let field_fn = self
            .field_fn
            .clone()
            .ok_or_else(|| KfError::FieldFactory("no field function is provided".into()))?;

        let field = match self.field_mode {
            FieldMode::Orig => Field {
                data: FieldData::Original {
                    field_fn: field_fn.clone(),
                    slice_z: self.slice_refs.iter().map(|s| T::cst(s.ref_z)).collect(),
                },
                prim_vertex_field: FieldRegion::from_fn(self.field_type, field_fn),
                field_type: self.field_type,
            },
            FieldMode::Intrpl => {
                let slices = self
                    .slice_refs
                    .iter()
                    .map(|s| FieldSlice::<f64>::fit(&field_fn, s.half_size_x, s.half_size_y, s.ref_z).convert())
                    .collect();

                let [x, y, z0] = target;
                let mut nodes = [(FieldValue::<T>::zero(), T::zero()); 3];
                for (i, node) in nodes.iter_mut().enumerate() {
                    let z = z0 + i as f64 * self.target_step;
                    let (bx, by, bz) = field_fn(x, y, z);
                    *node = (FieldValue::new(T::cst(bx), T::cst(by), T::cst(bz)), T::cst(z));
                }
                let mut prim_vertex_field = FieldRegion::from_three_nodes(
                    &nodes[0].0,
                    nodes[0].1,
                    &nodes[1].0,
                    nodes[1].1,
                    &nodes[2].0,
                    nodes[2].1,
                );
                if self.field_type == FieldType::Null {
                    prim_vertex_field.set_field_type(FieldType::Null);
                }
                Field {
                    data: FieldData::Interpolated { slices },
                    prim_vertex_field,
                    field_type: self.field_type,
                }
            }
        };
        log::info!(
            "FieldFactory: created {:?} field of type {:?} with {} slices",
            self.field_mode,
            self.field_type,
            field.n_slices()
        );
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dipole() -> FieldFn {
        Arc::new(|_x, _y, z| (0.0, -10.0 * (-(z - 50.0) * (z - 50.0) / 2000.0).exp(), 0.0))
    }

    fn factory(mode: FieldMode) -> FieldFactory {
        let mut f = FieldFactory::new();
        f.set_field_function(dipole(), FieldType::Normal);
        f.set_field_mode(mode);
        f.set_target(0.0, 0.0, -40.0);
        for z in [30.0, 10.0, 50.0, 30.0] {
            f.add_slice_reference(2.0, 2.0, z);
        }
        f
    }

    #[test]
    fn test_missing_inputs_are_reported() {
        let mut f = FieldFactory::new();
        assert!(matches!(f.make_field::<f64>(), Err(KfError::FieldFactory(_))));
        f.set_target(0.0, 0.0, 0.0);
        assert!(f.make_field::<f64>().is_err());
        f.add_slice_reference(1.0, 1.0, 10.0);
        let err = f.make_field::<f64>().unwrap_err();
        assert!(err.to_string().contains("field function"));
        f.set_field_function(dipole(), FieldType::Normal);
        assert!(f.make_field::<f64>().is_ok());
    }

    #[test]
    fn test_slices_sorted_and_deduplicated() {
        let field = factory(FieldMode::Orig).make_field::<f64>().unwrap();
        assert_eq!(field.n_slices(), 3);
        assert_eq!(field.slice_z(0), 10.0);
        assert_eq!(field.slice_z(2), 50.0);
        assert_eq!(field.field_mode(), FieldMode::Orig);
    }

    #[test]
    fn test_interpolated_field_matches_function() {
        let field = factory(FieldMode::Intrpl).make_field::<f64>().unwrap();
        assert_eq!(field.field_mode(), FieldMode::Intrpl);
        let b = field.get_field_value(2, 0.5, -0.5);
        assert!((b.y + 10.0).abs() < 1e-6);
        let pv = field.prim_vertex_field().get(0.0, 0.0, -37.5);
        let (_, by, _) = dipole()(0.0, 0.0, -37.5);
        assert!((pv.y - by).abs() < 1e-9);
    }

    #[test]
    fn test_remove_slice() {
        let mut field = factory(FieldMode::Intrpl).make_field::<f32>().unwrap();
        field.remove_slice(1).unwrap();
        assert_eq!(field.n_slices(), 2);
        assert_eq!(field.slice_z(1), 50.0);
        assert!(field.remove_slice(5).is_err());
    }

    #[test]
    #[should_panic]
    fn test_field_value_of_missing_slice_panics_in_orig_mode() {
        let field = factory(FieldMode::Orig).make_field::<f64>().unwrap();
        field.get_field_value(3, 0.0, 0.0);
    }

    #[test]
    #[should_panic]
    fn test_slice_z_of_missing_slice_panics() {
        let field = factory(FieldMode::Intrpl).make_field::<f64>().unwrap();
        assert!(field.slice(3).is_none());
        field.slice_z(3);
    }

    #[test]
    fn test_region_for_segment_uses_nearest_slices() {
        let field = factory(FieldMode::Intrpl).make_field::<f64>().unwrap();
        let tr = TrackParam::<f64>::new();
        let region = field.field_region_for_segment(&tr, 20.0, 40.0);
        assert!(!region.is_zero_field());
        assert!((region.get(0.0, 0.0, 50.0).y + 10.0).abs() < 1e-6);
    }
}
