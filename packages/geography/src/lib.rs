#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census tract and response area boundary loading.
//!
//! Reads tract polygons from `GeoJSON` (with population and housing
//! counts either as feature properties or in a separate ACS attribute
//! CSV) and response area polygons from `GeoJSON` or Esri JSON, producing
//! the immutable [`SourceRegion`](fire_resource_geography_models::SourceRegion)
//! and [`TargetRegion`](fire_resource_geography_models::TargetRegion)
//! collections the crosswalk consumes.

pub mod load;
pub mod normalize;

use thiserror::Error;

/// Errors that can occur while loading boundary and attribute files.
#[derive(Debug, Error)]
pub enum GeoError {
    /// Reading a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl GeoError {
    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }
}
