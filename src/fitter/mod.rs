//! Trajectory fitting: per-track Kalman filter with smoothing and a
//! parallel batch driver.

pub mod batch;
pub mod track_fitter;
pub mod trajectory;

pub use batch::{fit_batch, BatchSummary};
pub use track_fitter::{smooth, TrackFitter};
pub use trajectory::{NodeMaterial, Trajectory, TrajectoryNode};
