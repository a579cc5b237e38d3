pub mod defs;
pub mod linalg;
pub mod scalar;

pub use linalg::*;
pub use scalar::Scalar;
