#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crosswalk, apportionment and configuration types.
//!
//! An [`Overlap`] records how much of a census tract lies inside a fire
//! response area. Apportioning tract counts across overlaps yields one
//! [`ApportionedEstimate`] per response area plus an
//! [`UnassignedSummary`] for whatever no response area covers.

use fire_resource_geography_models::{HousingUnits, RegionRole};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Fractional overlap between one census tract and one response area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    /// Census tract id.
    pub source_id: String,
    /// Response area id.
    pub target_id: String,
    /// Area of the intersection, in the units of the input coordinates.
    pub intersection_area: f64,
    /// Share of the tract's area inside the response area.
    pub fraction: f64,
}

/// Area-weighted tract attributes summed into one response area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApportionedEstimate {
    /// Response area id.
    pub target_id: String,
    /// Apportioned population.
    pub population: f64,
    /// Apportioned housing units by structure type.
    pub housing: HousingUnits,
}

impl ApportionedEstimate {
    /// An estimate with every attribute at zero.
    #[must_use]
    pub fn zero(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            population: 0.0,
            housing: HousingUnits::new(),
        }
    }
}

/// Population and housing that no response area received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnassignedSummary {
    /// Population outside every response area.
    pub population: f64,
    /// Housing units outside every response area.
    pub housing: HousingUnits,
    /// Tracts that produced no overlap at all.
    pub uncovered_source_ids: Vec<String>,
}

/// Result of apportioning tract attributes over the crosswalk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apportionment {
    /// One estimate per response area, in response area id order.
    pub estimates: Vec<ApportionedEstimate>,
    /// Whatever was not assigned.
    pub unassigned: UnassignedSummary,
}

/// Density-based classification of a response area.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UrbanClass {
    /// More than 10,000 residents per square mile by default.
    UrbanCore,
    /// 3,000 to 10,000 residents per square mile by default.
    InnerSuburban,
    /// Fewer than 3,000 residents per square mile by default.
    OuterSuburban,
    /// Density could not be computed.
    Unknown,
}

/// An [`ApportionedEstimate`] together with the density and housing mix
/// fields derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseAreaProfile {
    #[serde(flatten)]
    pub estimate: ApportionedEstimate,
    pub total_housing_units: f64,
    /// Share of housing units that are single-family, in percent.
    pub pct_single_family: Option<f64>,
    pub land_area_sq_mi: Option<f64>,
    /// Residents per square mile.
    pub population_density: Option<f64>,
    pub urban_class: UrbanClass,
}

/// A region left out of the crosswalk because its geometry could not be
/// made valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRegion {
    pub region_id: String,
    pub role: RegionRole,
    pub reason: String,
}

/// A region whose geometry needed repair before intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairedRegion {
    pub region_id: String,
    pub role: RegionRole,
}

/// A tract whose kept overlaps cover noticeably less (or more) than its
/// full area before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialCoverage {
    pub source_id: String,
    /// Sum of raw overlap fractions.
    pub covered_fraction: f64,
}

/// Everything worth reporting about a crosswalk build that is not an
/// overlap row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkDiagnostics {
    pub skipped_regions: Vec<SkippedRegion>,
    pub repaired_regions: Vec<RepairedRegion>,
    /// Pairs whose bounding boxes intersected.
    pub candidate_pairs: usize,
    /// Intersections at or below the epsilon threshold.
    pub dropped_slivers: usize,
    pub partial_coverage: Vec<PartialCoverage>,
}

impl CrosswalkDiagnostics {
    /// Whether any region was skipped.
    #[must_use]
    pub fn has_skipped(&self) -> bool {
        !self.skipped_regions.is_empty()
    }
}

/// Overlaps plus the diagnostics collected while building them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapBuild {
    pub overlaps: Vec<Overlap>,
    pub diagnostics: CrosswalkDiagnostics,
}

/// Totals and diagnostics for one crosswalk run, written alongside the
/// output tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkReport {
    pub source_regions: usize,
    pub target_regions: usize,
    pub overlaps: usize,
    pub input_population: f64,
    pub apportioned_population: f64,
    pub unassigned: UnassignedSummary,
    pub diagnostics: CrosswalkDiagnostics,
}

/// Threshold below which an intersection is treated as a boundary
/// sliver and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EpsilonPolicy {
    /// Drop intersections no larger than `fraction` of the smaller of the
    /// two polygons.
    FractionOfSmaller {
        /// e.g. `1e-4` for 0.01%.
        fraction: f64,
    },
    /// Drop intersections no larger than `area`, in input coordinate units.
    Absolute {
        /// Minimum kept area.
        area: f64,
    },
}

impl Default for EpsilonPolicy {
    fn default() -> Self {
        Self::FractionOfSmaller { fraction: 1e-4 }
    }
}

impl EpsilonPolicy {
    /// The minimum intersection area for a pair with the given areas.
    #[must_use]
    pub fn threshold(&self, source_area: f64, target_area: f64) -> f64 {
        match *self {
            Self::FractionOfSmaller { fraction } => fraction * source_area.min(target_area),
            Self::Absolute { area } => area,
        }
    }
}

/// How the floating-point residual of a tract's fractions is folded back
/// in so they sum to exactly one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResidualPolicy {
    /// Scale every fraction of the tract by the same factor.
    #[default]
    Proportional,
    /// Add the whole residual to the tract's largest overlap.
    LargestOverlap,
}

const fn default_partial_coverage_warning() -> f64 {
    1e-3
}

const fn default_conservation_tolerance() -> f64 {
    1e-6
}

/// Parameters for building and normalizing the crosswalk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkConfig {
    #[serde(default)]
    pub epsilon: EpsilonPolicy,
    #[serde(default)]
    pub residual_policy: ResidualPolicy,
    /// Raw coverage deviating from 1 by more than this is reported as
    /// [`PartialCoverage`].
    #[serde(default = "default_partial_coverage_warning")]
    pub partial_coverage_warning: f64,
    /// Relative tolerance for the apportionment conservation check.
    #[serde(default = "default_conservation_tolerance")]
    pub conservation_tolerance: f64,
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        Self {
            epsilon: EpsilonPolicy::default(),
            residual_policy: ResidualPolicy::default(),
            partial_coverage_warning: default_partial_coverage_warning(),
            conservation_tolerance: default_conservation_tolerance(),
        }
    }
}

/// How polygon area is converted to square miles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AreaMeasure {
    /// Coordinates are WGS84 longitude/latitude; area is geodesic.
    #[default]
    Geodesic,
    /// Coordinates are projected; `units_per_mile` converts them
    /// (5280 for US survey feet state plane).
    Planar {
        /// Coordinate units in one mile.
        units_per_mile: f64,
    },
}

const fn default_urban_core_min_density() -> f64 {
    10_000.0
}

const fn default_inner_suburban_min_density() -> f64 {
    3_000.0
}

fn default_single_family_categories() -> Vec<String> {
    vec!["single_family".to_string()]
}

/// Parameters for deriving density and urban classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default)]
    pub area_measure: AreaMeasure,
    /// Densities above this are [`UrbanClass::UrbanCore`].
    #[serde(default = "default_urban_core_min_density")]
    pub urban_core_min_density: f64,
    /// Densities at or above this (and not urban core) are
    /// [`UrbanClass::InnerSuburban`].
    #[serde(default = "default_inner_suburban_min_density")]
    pub inner_suburban_min_density: f64,
    /// Housing categories counted as single-family.
    #[serde(default = "default_single_family_categories")]
    pub single_family_categories: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            area_measure: AreaMeasure::default(),
            urban_core_min_density: default_urban_core_min_density(),
            inner_suburban_min_density: default_inner_suburban_min_density(),
            single_family_categories: default_single_family_categories(),
        }
    }
}

impl ClassificationConfig {
    /// Classifies a population density (residents per square mile).
    #[must_use]
    pub fn classify(&self, density: Option<f64>) -> UrbanClass {
        match density {
            Some(d) if !d.is_finite() || d < 0.0 => UrbanClass::Unknown,
            Some(d) if d > self.urban_core_min_density => UrbanClass::UrbanCore,
            Some(d) if d >= self.inner_suburban_min_density => UrbanClass::InnerSuburban,
            Some(_) => UrbanClass::OuterSuburban,
            None => UrbanClass::Unknown,
        }
    }
}
