//! Pipeline configuration.
//!
//! The default configuration is embedded at compile time from
//! `config/default.toml`. A user config file replaces it entirely; its
//! relative paths are resolved against the file's directory.

use std::path::{Path, PathBuf};

use fire_resource_crosswalk::{ClassificationConfig, CrosswalkConfig};
use fire_resource_geography_models::{SourceFieldMapping, TargetFieldMapping};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors that can occur while loading a pipeline config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered back to TOML.
    #[error("Config render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Input file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPaths {
    /// Census tract boundaries (`GeoJSON`).
    pub tracts: PathBuf,
    /// Tract population and housing table. When absent, attributes are
    /// read from the tract features' properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tract_attributes: Option<PathBuf>,
    /// Response area boundaries (`GeoJSON` or Esri JSON).
    pub response_areas: PathBuf,
}

/// Field names in the input files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default)]
    pub source: SourceFieldMapping,
    #[serde(default)]
    pub target: TargetFieldMapping,
}

/// Output location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

/// Everything the `run` and `validate` commands need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    #[serde(default)]
    pub fields: FieldConfig,
    #[serde(default)]
    pub crosswalk: CrosswalkConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    pub outputs: OutputConfig,
}

impl PipelineConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The embedded default config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Loads `path` when given, otherwise the embedded default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::embedded();
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded pipeline config from {}", path.display());

        Ok(match path.parent() {
            Some(base) if !base.as_os_str().is_empty() => config.relative_to(base),
            _ => config,
        })
    }

    /// Resolves relative paths against `base`.
    #[must_use]
    pub fn relative_to(mut self, base: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.inputs.tracts);
        if let Some(attributes) = self.inputs.tract_attributes.as_mut() {
            resolve(attributes);
        }
        resolve(&mut self.inputs.response_areas);
        resolve(&mut self.outputs.dir);
        self
    }

    /// Renders the config as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
