//! Calibration settings
//!
//! Defaults can be overridden by a TOML file and then by command-line flags.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::models::DepthUnit;

pub const DEFAULT_PPM_PER_UNIT: f64 = 200.0;
pub const DEFAULT_TOLERANCE_FRACTION: f64 = 0.01;
pub const DEFAULT_ALERT_THRESHOLD: f64 = 100.0;
pub const DEFAULT_NORMALIZE_DECIMALS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// ppm that make up one gas unit
    pub ppm_per_unit: f64,
    /// Relative tolerance between component sum and reported total
    pub tolerance_fraction: f64,
    /// TotalGas above this raises the alert flag
    pub alert_threshold: f64,
    /// Decimal places kept when normalizing ppm readings
    pub normalize_decimals: u32,
    pub depth_unit: DepthUnit,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ppm_per_unit: DEFAULT_PPM_PER_UNIT,
            tolerance_fraction: DEFAULT_TOLERANCE_FRACTION,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            normalize_decimals: DEFAULT_NORMALIZE_DECIMALS,
            depth_unit: DepthUnit::Meters,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("Invalid settings file")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ppm_per_unit.is_finite() && self.ppm_per_unit > 0.0) {
            bail!("ppm_per_unit must be a positive number, got {}", self.ppm_per_unit);
        }
        if !(self.tolerance_fraction.is_finite() && self.tolerance_fraction >= 0.0) {
            bail!(
                "tolerance_fraction must be zero or positive, got {}",
                self.tolerance_fraction
            );
        }
        if !self.alert_threshold.is_finite() {
            bail!("alert_threshold must be finite");
        }
        if self.normalize_decimals > 12 {
            bail!("normalize_decimals must be at most 12, got {}", self.normalize_decimals);
        }
        Ok(())
    }
}
