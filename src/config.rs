//! Fitter configuration and JSON (optionally gzip-compressed) file helpers.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KfError, KfResult};
use crate::types::defs::{DEFAULT_MAX_EXTRAPOLATION_STEP, ELECTRON_MASS, MUON_MASS};

/// Settings of [`crate::fitter::TrackFitter`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Particle mass hypothesis [GeV/c²]
    pub mass: f64,
    /// Electron hypothesis, overrides `mass`
    pub is_electron: bool,
    /// Longest Runge-Kutta step [cm]
    pub max_extrapolation_step: f64,
    /// Fit the inverse velocity as a free parameter
    pub do_fit_velocity: bool,
    /// Do not filter hit coordinates flagged with zero ndf
    pub skip_unmeasured_coordinates: bool,
    /// qp for the scattering estimate; disables the energy loss correction
    pub fixed_ms_qp: Option<f64>,
    /// Combine the two filter passes at every node
    pub smooth: bool,
    /// Number of fits per trajectory in a batch; each pass is linearized
    /// around the previous one
    pub n_passes: usize,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            mass: MUON_MASS,
            is_electron: false,
            max_extrapolation_step: DEFAULT_MAX_EXTRAPOLATION_STEP,
            do_fit_velocity: false,
            skip_unmeasured_coordinates: false,
            fixed_ms_qp: None,
            smooth: true,
            n_passes: 2,
        }
    }
}

impl FitterConfig {
    /// Mass used by the filter.
    pub fn particle_mass(&self) -> f64 {
        if self.is_electron {
            ELECTRON_MASS
        } else {
            self.mass
        }
    }

    pub fn validate(&self) -> KfResult<()> {
        if !(self.mass >= 0.0) {
            return Err(KfError::Config(format!("negative particle mass {}", self.mass)));
        }
        if !(self.max_extrapolation_step > 0.0) {
            return Err(KfError::Config(format!(
                "extrapolation step must be positive, got {}",
                self.max_extrapolation_step
            )));
        }
        if self.n_passes == 0 {
            return Err(KfError::Config("at least one fit pass is needed".to_string()));
        }
        Ok(())
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// Reads a JSON file, gunzipping it if the name ends with `.gz`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let value = if is_gz(path) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        serde_json::from_reader(BufReader::new(file))
    };
    value.with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes pretty JSON, gzipped if the name ends with `.gz`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    if is_gz(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        serde_json::to_writer_pretty(&mut encoder, value)?;
        encoder.finish().context("Failed to finalize compression")?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    Ok(())
}

/// Loads a [`FitterConfig`] and checks it.
pub fn load_fitter_config(path: &Path) -> anyhow::Result<FitterConfig> {
    let config: FitterConfig = load_json(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: FitterConfig = serde_json::from_str(r#"{"do_fit_velocity": true}"#).unwrap();
        assert!(config.do_fit_velocity);
        assert_eq!(config.mass, MUON_MASS);
        assert_eq!(config.max_extrapolation_step, 50.0);
        assert!(config.smooth);
        assert_eq!(config.fixed_ms_qp, None);
    }

    #[test]
    fn test_electron_flag_selects_mass() {
        let config = FitterConfig {
            is_electron: true,
            ..Default::default()
        };
        assert_eq!(config.particle_mass(), ELECTRON_MASS);
        assert_eq!(FitterConfig::default().particle_mass(), MUON_MASS);
    }

    #[test]
    fn test_validate() {
        assert!(FitterConfig::default().validate().is_ok());
        let bad_step = FitterConfig {
            max_extrapolation_step: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_step.validate(), Err(KfError::Config(_))));
        let bad_mass = FitterConfig {
            mass: f64::NAN,
            ..Default::default()
        };
        assert!(bad_mass.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_through_gzip() {
        let dir = std::env::temp_dir();
        let config = FitterConfig {
            fixed_ms_qp: Some(0.25),
            skip_unmeasured_coordinates: true,
            ..Default::default()
        };
        for name in ["kf_track_fit_config_test.json", "kf_track_fit_config_test.json.gz"] {
            let path = dir.join(format!("{}-{}", std::process::id(), name));
            save_json(&path, &config).unwrap();
            let loaded = load_fitter_config(&path).unwrap();
            assert_eq!(loaded, config);
            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_json::<FitterConfig>(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
