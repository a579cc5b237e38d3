pub mod measurement;
pub mod track_param;

pub use measurement::{MeasurementTime, MeasurementU, MeasurementXy};
pub use track_param::{idx, TrackParam};
