pub mod field;
pub mod field_region;
pub mod field_slice;
pub mod field_value;
pub mod material_map;
pub mod module_index;
pub mod setup;
pub mod target;

pub use field::{Field, FieldFactory};
pub use field_region::{FieldRegion, QuadraticField};
pub use field_slice::FieldSlice;
pub use field_value::{zero_field_fn, FieldFn, FieldMode, FieldType, FieldValue};
pub use material_map::{HomogeneousMaterialFactory, MaterialMap, MaterialMapFactory};
pub use module_index::{ModuleIndexMap, ModuleIndexMapFactory};
pub use setup::{GeoLayer, Setup, SetupBuilder};
pub use target::Target;
