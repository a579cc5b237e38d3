//! Kalman filter track fitting in a magnetic field with material effects.
//!
//! A [`geo::Setup`] describes the detector: the field, the material layers
//! and the target. [`filters::TrackKalmanFilter`] carries one track state
//! (or a lane-masked batch of them for a [`types::Scalar`] type) through
//! it, and [`fitter::TrackFitter`] fits whole trajectories.

pub mod config;
pub mod data;
pub mod error;
pub mod filters;
pub mod fitter;
pub mod geo;
pub mod sim;
pub mod types;

pub use config::FitterConfig;
pub use data::{MeasurementTime, MeasurementU, MeasurementXy, TrackParam};
pub use error::{KfError, KfResult};
pub use filters::{FitDirection, TrackKalmanFilter};
pub use fitter::{fit_batch, TrackFitter, Trajectory, TrajectoryNode};
pub use geo::{Setup, SetupBuilder};
