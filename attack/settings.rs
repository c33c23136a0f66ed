//! Attack-level knobs. Settings can be written to and read from a small TOML file so
//! that a batch of experiments can share one configuration; every field has a
//! default, so a partial file is valid.

use crate::divergence::Metric;
use crate::likelihood::VarianceMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read or write settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML settings file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize settings to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Policies shared by every stage of an attack run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackSettings {
    /// Divergence used to rank shadow configurations.
    pub metric: Metric,
    /// Score against a single pooled variance instead of per-example variances.
    pub use_global_variance: bool,
    /// Spread target models across the rayon thread pool.
    pub parallel: bool,
}

impl Default for AttackSettings {
    fn default() -> Self {
        Self {
            metric: Metric::Kl,
            use_global_variance: false,
            parallel: true,
        }
    }
}

impl AttackSettings {
    pub fn variance_mode(&self) -> VarianceMode {
        VarianceMode::from_global_flag(self.use_global_variance)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let toml_string = fs::read_to_string(path)?;
        let settings = toml::from_str(&toml_string)?;
        Ok(settings)
    }
}
