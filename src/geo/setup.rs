//! Detector setup seen by the fit, and its builder.

use std::fmt;
use std::sync::Arc;

use crate::error::{KfError, KfResult};
use crate::geo::field::{Field, FieldFactory};
use crate::geo::field_value::{FieldFn, FieldMode, FieldType};
use crate::geo::material_map::{MaterialMap, MaterialMapFactory};
use crate::geo::module_index::{ModuleIndexMap, ModuleIndexMapFactory};
use crate::geo::target::Target;
use crate::types::defs::TARGET_FIELD_INIT_STEP;
use crate::types::Scalar;

const TARGET_CENTER_OFFSET: f64 = 0.05; // cm
const TARGET_MATERIAL_OFFSET: f64 = 2.0; // in units of dz
const TARGET_TRANSVERSE_MARGIN: f64 = 1.3;
const TARGET_MATERIAL_N_BINS: i32 = 20;
const LAYER_MATERIAL_N_BINS: i32 = 100;

/// Material layers, field, target and module indexing of a detector.
///
/// Read-only during fitting; one instance is shared by all fitting threads.
#[derive(Clone, Debug)]
pub struct Setup<T: Scalar> {
    module_index_map: ModuleIndexMap,
    material_layers: Vec<MaterialMap>,
    field: Field<T>,
    target: Target<T>,
}

impl<T: Scalar> Setup<T> {
    pub fn n_material_layers(&self) -> usize {
        self.material_layers.len()
    }

    pub fn material(&self, i_layer: usize) -> KfResult<&MaterialMap> {
        self.material_layers
            .get(i_layer)
            .ok_or(KfError::IndexOutOfRange(i_layer))
    }

    pub fn material_layers(&self) -> &[MaterialMap] {
        &self.material_layers
    }

    pub fn field(&self) -> &Field<T> {
        &self.field
    }

    pub fn target(&self) -> &Target<T> {
        &self.target
    }

    pub fn index_map(&self) -> &ModuleIndexMap {
        &self.module_index_map
    }

    /// Removes a detector layer from the setup. Its material is merged into
    /// the next layer downstream, or into the previous one if it was the
    /// last. The matching field slice is dropped and the global indices of
    /// the layers behind it shift down by one.
    pub fn disable_layer(&mut self, det: i32, loc: i32) -> KfResult<()> {
        let i_layer = self.module_index_map.local_to_global(det, loc)?;
        if i_layer >= self.material_layers.len() || i_layer >= self.field.n_slices() {
            return Err(KfError::IndexOutOfRange(i_layer));
        }

        let removed = self.material_layers.remove(i_layer);
        let n_left = self.material_layers.len();
        if n_left > 0 {
            let i_merge = if i_layer < n_left { i_layer } else { n_left - 1 };
            self.material_layers[i_merge].add(&removed, self.target.z.as_f64());
        }
        self.field.remove_slice(i_layer)?;
        self.module_index_map.disable(det, loc)?;

        log::info!(
            "Setup: disabled layer det = {}, loc = {} (global index {}), {} layers left",
            det,
            loc,
            i_layer,
            n_left
        );
        Ok(())
    }
}

impl<T: Scalar> fmt::Display for Setup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Setup: {} layers, field {:?}/{:?}",
            self.material_layers.len(),
            self.field.field_mode(),
            self.field.field_type()
        )?;
        writeln!(f, "  {}", self.target)?;
        for (i, m) in self.material_layers.iter().enumerate() {
            let (det, loc) = self.module_index_map.global_to_local(i).unwrap_or((-1, -1));
            writeln!(
                f,
                "  layer {:2} (det {}, loc {}): z = {:8.3} cm, mean x/X0 = {:.4}%",
                i,
                det,
                loc,
                m.z_ref(),
                100.0 * m.thickness_mean()
            )?;
        }
        Ok(())
    }
}

/// Geometry of one detector layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoLayer {
    pub det: i32,
    pub loc: i32,
    /// Reference z [cm]
    pub z_ref: f64,
    pub z_min: f64,
    pub z_max: f64,
    /// Half sizes [cm]
    pub x_max: f64,
    pub y_max: f64,
}

impl GeoLayer {
    pub fn new(det: i32, loc: i32, z_ref: f64, z_min: f64, z_max: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            det,
            loc,
            z_ref,
            z_min,
            z_max,
            x_max,
            y_max,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct TargetProperty {
    x: f64,
    y: f64,
    z: f64,
    dz: f64,
    r: f64,
}

/// Builds a [`Setup`] from geometry layers, a target, a field function and
/// a material source.
#[derive(Clone, Default)]
pub struct SetupBuilder {
    geo_layers: Vec<GeoLayer>,
    material_factory: Option<Arc<dyn MaterialMapFactory>>,
    field_fn: Option<(FieldFn, FieldType)>,
    target: Option<TargetProperty>,
}

impl SetupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer, keeping the layers ordered in z. Two layers may not
    /// share a reference z or a module address.
    pub fn add_layer(&mut self, layer: GeoLayer) -> KfResult<()> {
        if let Some(dup) = self
            .geo_layers
            .iter()
            .find(|l| l.z_ref == layer.z_ref || (l.det == layer.det && l.loc == layer.loc))
        {
            return Err(KfError::SetupBuilder(format!(
                "duplicating geometry layer det = {}, loc = {}, z = {} (existing: det = {}, loc = {}, z = {})",
                layer.det, layer.loc, layer.z_ref, dup.det, dup.loc, dup.z_ref
            )));
        }
        let pos = self.geo_layers.partition_point(|l| l.z_ref < layer.z_ref);
        self.geo_layers.insert(pos, layer);
        Ok(())
    }

    pub fn set_target_property(&mut self, x: f64, y: f64, z: f64, dz: f64, r: f64) {
        self.target = Some(TargetProperty { x, y, z, dz, r });
    }

    pub fn set_field_function(&mut self, field_fn: FieldFn, field_type: FieldType) {
        self.field_fn = Some((field_fn, field_type));
    }

    pub fn set_material_map_factory(&mut self, factory: Arc<dyn MaterialMapFactory>) {
        self.material_factory = Some(factory);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn make_setup<T: Scalar>(&self, mode: FieldMode) -> KfResult<Setup<T>> {
        let tgt = self
            .target
            .ok_or_else(|| KfError::SetupBuilder("target properties are not set".into()))?;
        if self.geo_layers.is_empty() {
            return Err(KfError::SetupBuilder("no geometry layers were added".into()));
        }
        let (field_fn, field_type) = self
            .field_fn
            .clone()
            .ok_or_else(|| KfError::SetupBuilder("field function is not set".into()))?;
        let factory = self
            .material_factory
            .as_ref()
            .ok_or_else(|| KfError::SetupBuilder("material map factory is not set".into()))?;

        let mut field_factory = FieldFactory::new();
        field_factory.set_field_function(field_fn, field_type);
        field_factory.set_field_mode(mode);
        field_factory.set_step(TARGET_FIELD_INIT_STEP);
        field_factory.set_target(tgt.x, tgt.y, tgt.z);

        let mut index_factory = ModuleIndexMapFactory::new();
        let mut material_layers = Vec::with_capacity(self.geo_layers.len());
        for layer in &self.geo_layers {
            index_factory.add_component(layer.det, layer.loc, layer.z_ref)?;
            field_factory.add_slice_reference(layer.x_max, layer.y_max, layer.z_ref);
            material_layers.push(factory.generate_material_map(
                layer.z_ref,
                layer.z_min,
                layer.z_max,
                layer.x_max.max(layer.y_max),
                LAYER_MATERIAL_N_BINS,
            )?);
        }

        let target_material = {
            let z_ref = tgt.z + TARGET_CENTER_OFFSET;
            let z_min = tgt.z - TARGET_MATERIAL_OFFSET * tgt.dz;
            let z_max = (tgt.z + TARGET_MATERIAL_OFFSET * tgt.dz).max(z_ref);
            factory.generate_material_map(
                z_ref,
                z_min,
                z_max,
                TARGET_TRANSVERSE_MARGIN * tgt.r,
                TARGET_MATERIAL_N_BINS,
            )?
        };

        let setup = Setup {
            module_index_map: index_factory.make_index_map(),
            material_layers,
            field: field_factory.make_field()?,
            target: Target::new(tgt.x, tgt.y, tgt.z, tgt.dz, tgt.r, target_material),
        };
        log::info!(
            "SetupBuilder: created setup with {} layers, field mode {:?}, field type {:?}",
            setup.n_material_layers(),
            mode,
            field_type
        );
        Ok(setup)
    }
}

impl fmt::Debug for SetupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupBuilder")
            .field("geo_layers", &self.geo_layers)
            .field("has_material_factory", &self.material_factory.is_some())
            .field("has_field_fn", &self.field_fn.is_some())
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::field_value::zero_field_fn;
    use crate::geo::material_map::HomogeneousMaterialFactory;

    fn builder() -> SetupBuilder {
        let mut b = SetupBuilder::new();
        b.set_target_property(0.0, 0.0, -44.0, 0.025, 2.5);
        b.set_field_function(
            Arc::new(|_x, _y, z| (0.0, if z.abs() < 50.0 { -5.0 } else { 0.0 }, 0.0)),
            FieldType::Normal,
        );
        b.set_material_map_factory(Arc::new(HomogeneousMaterialFactory::new(9.37)));
        for (i, z) in [30.0, 10.0, 20.0].into_iter().enumerate() {
            b.add_layer(GeoLayer::new(1, i as i32, z, z - 0.015, z + 0.015, 5.0, 5.0)).unwrap();
        }
        b
    }

    #[test]
    fn test_builder_requires_inputs() {
        let mut b = SetupBuilder::new();
        assert!(b.make_setup::<f64>(FieldMode::Intrpl).is_err());
        b.set_target_property(0.0, 0.0, 0.0, 0.1, 1.0);
        b.add_layer(GeoLayer::new(0, 0, 10.0, 9.9, 10.1, 3.0, 3.0)).unwrap();
        let err = b.make_setup::<f64>(FieldMode::Intrpl).unwrap_err();
        assert!(err.to_string().contains("field function"));
        b.set_field_function(zero_field_fn(), FieldType::Null);
        let err = b.make_setup::<f64>(FieldMode::Intrpl).unwrap_err();
        assert!(err.to_string().contains("material"));
    }

    #[test]
    fn test_duplicate_layers_rejected() {
        let mut b = builder();
        assert!(b.add_layer(GeoLayer::new(2, 0, 10.0, 9.9, 10.1, 1.0, 1.0)).is_err());
        assert!(b.add_layer(GeoLayer::new(1, 0, 40.0, 39.9, 40.1, 1.0, 1.0)).is_err());
    }

    #[test]
    fn test_make_setup() {
        let setup = builder().make_setup::<f64>(FieldMode::Intrpl).unwrap();
        assert_eq!(setup.n_material_layers(), 3);
        assert_eq!(setup.field().n_slices(), 3);
        assert_eq!(setup.material(0).unwrap().z_ref(), 10.0);
        assert_eq!(setup.index_map().global_to_local(0).unwrap(), (1, 1));
        assert_eq!(setup.material(0).unwrap().n_bins(), 100);
        assert_eq!(setup.target().material().n_bins(), 20);
        let t: f64 = setup.material(1).unwrap().get_thickness_x0(1.0, 1.0);
        assert!((t - 0.03 / 9.37).abs() < 1e-6);
        assert!(setup.to_string().contains("3 layers"));
    }

    #[test]
    fn test_disable_layer_keeps_material() {
        let mut setup = builder().make_setup::<f32>(FieldMode::Orig).unwrap();
        let before: f64 = setup.material_layers().iter().map(|m| m.thickness_mean()).sum();

        // middle layer: merged downstream
        setup.disable_layer(1, 2).unwrap();
        assert_eq!(setup.n_material_layers(), 2);
        assert_eq!(setup.field().n_slices(), 2);
        assert_eq!(setup.index_map().local_to_global(1, 0).unwrap(), 1);
        assert_eq!(setup.field().slice_z(1), 30.0);

        // last layer: merged upstream
        setup.disable_layer(1, 0).unwrap();
        assert_eq!(setup.n_material_layers(), 1);
        let after = setup.material(0).unwrap().thickness_mean();
        assert!((after - before).abs() < 1e-5, "{} vs {}", after, before);
        assert!(setup.disable_layer(1, 0).is_err());
    }
}
