use thiserror::Error;

/// Track fit error types
///
/// Only misconfiguration detected while building a setup or a trajectory is
/// reported here. Per-track numeric edge cases are absorbed by masking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KfError {
    #[error("Invalid material map: {0}")]
    InvalidMaterialMap(String),

    #[error("Inconsistent z ordering: zMin {z_min} <= zRef {z_ref} <= zMax {z_max} violated")]
    InconsistentZ { z_min: f64, z_ref: f64, z_max: f64 },

    #[error("Duplicate component: detector {det}, local index {loc}")]
    DuplicateComponent { det: i32, loc: i32 },

    #[error("Unknown component: detector {det}, local index {loc}")]
    UnknownComponent { det: i32, loc: i32 },

    #[error("Global index {0} is out of range")]
    IndexOutOfRange(usize),

    #[error("Field factory: {0}")]
    FieldFactory(String),

    #[error("Setup builder: {0}")]
    SetupBuilder(String),

    #[error("Invalid fitter configuration: {0}")]
    Config(String),

    #[error("Trajectory: {0}")]
    Trajectory(String),

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),
}

/// Result type for setup and fit operations
pub type KfResult<T> = Result<T, KfError>;
