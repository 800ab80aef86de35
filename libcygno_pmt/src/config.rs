use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::calibration::{Calibration, SiteTag};
use super::constants::DRS4_NUMBER_OF_CHANNELS;
use super::error::{CalibrationError, ConfigError};

/// Structure representing the application configuration. Contains pathing, run and
/// DRS4 calibration information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub midas_path: PathBuf,
    pub hdf_path: PathBuf,
    pub calibration_path: Option<PathBuf>,
    pub site: SiteTag,
    pub drs4_correction: bool,
    pub channel_offsets: Vec<f32>,
    pub first_run_number: i32,
    pub last_run_number: i32,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid
    fn default() -> Self {
        Self {
            midas_path: PathBuf::from("None"),
            hdf_path: PathBuf::from("None"),
            calibration_path: None,
            site: SiteTag::default(),
            drs4_correction: false,
            channel_offsets: vec![-0.3; DRS4_NUMBER_OF_CHANNELS],
            first_run_number: 0,
            last_run_number: 0,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml_str)?;
        // An unknown site is a calibration error, not a YAML one
        if let Some(site) = value.get("site").and_then(|site| site.as_str()) {
            SiteTag::from_str(site)?;
        }

        Ok(serde_yaml::from_value::<Self>(value)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check if a specific run exists by evaluating the existance of the MIDAS file
    pub fn does_run_exist(&self, run_number: i32) -> bool {
        self.get_midas_file_name(run_number).exists()
    }

    /// Get the path to a run's MIDAS file
    pub fn get_midas_file_name(&self, run_number: i32) -> PathBuf {
        self.midas_path
            .join(format!("{}.mid", self.get_run_str(run_number)))
    }

    /// Get the path to the output hdf5 file
    pub fn get_hdf_file_name(&self, run_number: i32) -> Result<PathBuf, ConfigError> {
        let hdf_file_path: PathBuf = self
            .hdf_path
            .join(format!("{}.h5", self.get_run_str(run_number)));
        if self.hdf_path.exists() {
            Ok(hdf_file_path)
        } else {
            Err(ConfigError::BadFilePath(self.hdf_path.clone()))
        }
    }

    /// Build the run-level DRS4 calibration. None if the correction is disabled
    pub fn load_calibration(&self) -> Result<Option<Calibration>, ConfigError> {
        if !self.drs4_correction {
            return Ok(None);
        }
        let dir = self
            .calibration_path
            .as_ref()
            .ok_or(CalibrationError::NoCalibrationPath)?;
        let calibration = Calibration::load(dir, self.site, self.channel_offsets.clone())?;
        spdlog::info!(
            "Loaded DRS4 calibration for site {} from {}",
            self.site,
            dir.to_string_lossy()
        );
        Ok(Some(calibration))
    }

    /// Construct the run string using the CYGNO DAQ format
    fn get_run_str(&self, run_number: i32) -> String {
        format!("run{run_number:0>5}")
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
