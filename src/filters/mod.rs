//! Kalman filter for charged-particle tracks
//!
//! Measurement updates, Runge-Kutta transport through a field region,
//! material effects and the closed-form starting guess, all as methods of
//! [`TrackKalmanFilter`].

pub mod extrapolation;
pub mod guess;
pub mod material_effects;
pub mod track_kalman_filter;

pub use guess::GuessHit;
pub use track_kalman_filter::{FitDirection, TrackKalmanFilter};
