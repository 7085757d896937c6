#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census tract and fire response area types.
//!
//! Census tracts are the *source* geography: population and housing
//! counts are published per tract. Fire response areas are the *target*
//! geography: incidents are attributed per response area. Both are
//! loaded once per run and never mutated.

use std::collections::BTreeMap;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Housing unit counts keyed by structure type (e.g. `single_family`,
/// `multi_family`, `mobile_home`).
///
/// A `BTreeMap` keeps category order stable so output columns are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HousingUnits(pub BTreeMap<String, f64>);

impl HousingUnits {
    /// Creates an empty set of counts.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the count for `category`, or 0 if absent.
    #[must_use]
    pub fn get(&self, category: &str) -> f64 {
        self.0.get(category).copied().unwrap_or(0.0)
    }

    /// Sets the count for `category`.
    pub fn insert(&mut self, category: impl Into<String>, count: f64) {
        self.0.insert(category.into(), count);
    }

    /// Adds `count` to `category`, creating it if needed.
    pub fn add(&mut self, category: &str, count: f64) {
        *self.0.entry(category.to_string()).or_insert(0.0) += count;
    }

    /// Sum of all categories.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Iterates over `(category, count)` pairs in category order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Category names in order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for HousingUnits {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A census tract: the geography demographic counts are published on.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRegion {
    /// Census GEOID (e.g. "48453001100").
    pub id: String,
    /// Tract boundary.
    pub geometry: MultiPolygon<f64>,
    /// Total population from ACS estimates.
    pub population: f64,
    /// Housing units by structure type.
    pub housing: HousingUnits,
}

/// A fire department response area.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRegion {
    /// Response area identifier as published by the department.
    pub id: String,
    /// Response area boundary.
    pub geometry: MultiPolygon<f64>,
}

/// Which side of the crosswalk a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    /// Census tract.
    Source,
    /// Response area.
    Target,
}

impl std::fmt::Display for RegionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Source => "census tract",
            Self::Target => "response area",
        })
    }
}

/// How polygon geometry is encoded in a boundary file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryFormat {
    /// Standard `GeoJSON` `FeatureCollection`.
    #[default]
    Geojson,
    /// Esri JSON feature set (`features[].attributes` and
    /// `features[].geometry.rings`), as returned by `ArcGIS` REST queries
    /// with `f=json`.
    EsriRings,
}

fn default_source_id_field() -> String {
    "GEOID".to_string()
}

fn default_population_field() -> String {
    "population".to_string()
}

fn default_target_id_field() -> String {
    "response_area_id".to_string()
}

/// Where census tract attributes live in the input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFieldMapping {
    /// Property (or CSV column) holding the tract id.
    #[serde(default = "default_source_id_field")]
    pub id: String,
    /// Property (or CSV column) holding total population.
    #[serde(default = "default_population_field")]
    pub population: String,
    /// Housing category name -> property (or CSV column) holding its count.
    #[serde(default)]
    pub housing: BTreeMap<String, String>,
}

impl Default for SourceFieldMapping {
    fn default() -> Self {
        Self {
            id: default_source_id_field(),
            population: default_population_field(),
            housing: BTreeMap::new(),
        }
    }
}

/// Where response area attributes live in the boundary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFieldMapping {
    /// Property (or Esri attribute) holding the response area id.
    #[serde(default = "default_target_id_field")]
    pub id: String,
    #[serde(default)]
    pub format: GeometryFormat,
}

impl Default for TargetFieldMapping {
    fn default() -> Self {
        Self {
            id: default_target_id_field(),
            format: GeometryFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_mapping_defaults() {
        let source: SourceFieldMapping = serde_json::from_str("{}").unwrap();
        assert_eq!(source.id, "GEOID");
        assert_eq!(source.population, "population");
        assert!(source.housing.is_empty());

        let target: TargetFieldMapping =
            serde_json::from_str(r#"{ "format": "esri_rings" }"#).unwrap();
        assert_eq!(target.id, "response_area_id");
        assert_eq!(target.format, GeometryFormat::EsriRings);
    }

    #[test]
    fn housing_total_sums_categories() {
        let housing: HousingUnits = [("single_family", 120.0), ("multi_family", 80.0)]
            .into_iter()
            .collect();
        assert!((housing.total() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn housing_missing_category_is_zero() {
        let housing = HousingUnits::new();
        assert!(housing.get("mobile_home").abs() < f64::EPSILON);
        assert!(housing.is_empty());
    }

    #[test]
    fn housing_add_accumulates() {
        let mut housing = HousingUnits::new();
        housing.add("single_family", 1.5);
        housing.add("single_family", 2.5);
        assert!((housing.get("single_family") - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn housing_serializes_as_plain_map() {
        let mut housing = HousingUnits::new();
        housing.insert("single_family", 3.0);
        let json = serde_json::to_string(&housing).unwrap();
        assert_eq!(json, r#"{"single_family":3.0}"#);
    }
}
