//! Physical and numerical constants.
//!
//! Units: length in cm, field in kG, time in ns, momentum in GeV/c.

/// Speed of light [cm/ns].
pub const SPEED_OF_LIGHT: f64 = 29.9792458;

/// Inverse speed of light [ns/cm].
pub const SPEED_OF_LIGHT_INV: f64 = 1.0 / SPEED_OF_LIGHT;

/// Curvature constant [(GeV/c)/(kG·cm)].
pub const C_LIGHT: f64 = 1.0e-5 * SPEED_OF_LIGHT;

pub const MUON_MASS: f64 = 0.105658; // GeV/c²
pub const PROTON_MASS: f64 = 0.938272; // GeV/c²
pub const ELECTRON_MASS: f64 = 0.000511; // GeV/c²

/// Squared field magnitude below which a field value counts as zero [kG²].
pub const MIN_FIELD2: f64 = 1.0e-8;

/// Default cap on a single extrapolation step [cm].
pub const DEFAULT_MAX_EXTRAPOLATION_STEP: f64 = 50.0;

/// Field node spacing near the primary vertex [cm].
pub const TARGET_FIELD_INIT_STEP: f64 = 2.5;
