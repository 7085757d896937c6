#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Areal crosswalk from census tracts to fire response areas.
//!
//! Population and housing are published per census tract while fire
//! incidents are attributed per response area. This crate intersects the
//! two geographies, records what share of each tract falls inside each
//! response area ([`overlaps::build_overlaps`]), folds floating-point
//! residue back in so every tract is apportioned exactly once
//! ([`normalize::normalize_fractions`]), and sums area-weighted tract
//! attributes into per-response-area estimates
//! ([`apportion::apportion`]). [`profile`] derives density and the urban
//! classification from the estimates, and [`export`] writes everything
//! out for the analysis and visualization stages.
//!
//! The computation is pure and deterministic: all tunables travel in
//! [`CrosswalkConfig`] and [`ClassificationConfig`].

pub mod apportion;
pub mod export;
pub mod normalize;
pub mod overlaps;
pub mod profile;
pub mod progress;

pub use fire_resource_crosswalk_models::{
    Apportionment, ClassificationConfig, CrosswalkConfig, Overlap, OverlapBuild,
    ResponseAreaProfile,
};

use fire_resource_crosswalk_models::CrosswalkReport;
use fire_resource_geography_models::{SourceRegion, TargetRegion};
use thiserror::Error;

use crate::progress::ProgressCallback;

/// Errors that can occur while building or writing the crosswalk.
#[derive(Debug, Error)]
pub enum CrosswalkError {
    /// A required region collection was empty.
    #[error("No {collection} supplied")]
    EmptyInputCollection {
        /// Which collection (e.g. "census tracts").
        collection: &'static str,
    },

    /// Apportioned totals do not add back up to the input totals.
    #[error(
        "Apportionment does not conserve {attribute}: input total {expected}, \
         apportioned plus unassigned {actual}"
    )]
    NonConservingApportionment {
        /// Attribute name (`population` or a housing category).
        attribute: String,
        /// Sum over all census tracts.
        expected: f64,
        /// Sum over all estimates plus the unassigned remainder.
        actual: f64,
    },

    /// An overlap referenced a region that is not in the input.
    #[error("Overlap references unknown {role} {id}")]
    UnknownRegion {
        /// "census tract" or "response area".
        role: &'static str,
        /// The unknown id.
        id: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one crosswalk run produces.
#[derive(Debug, Clone)]
pub struct CrosswalkRun {
    /// Normalized crosswalk rows.
    pub overlaps: Vec<Overlap>,
    pub apportionment: Apportionment,
    pub profiles: Vec<ResponseAreaProfile>,
    pub report: CrosswalkReport,
}

/// Runs the whole crosswalk step: build, normalize, apportion and
/// profile.
///
/// # Errors
///
/// Returns [`CrosswalkError`] if either collection is empty or the
/// apportionment fails its conservation check.
pub fn run_crosswalk(
    sources: &[SourceRegion],
    targets: &[TargetRegion],
    crosswalk: &CrosswalkConfig,
    classification: &ClassificationConfig,
    progress: &dyn ProgressCallback,
) -> Result<CrosswalkRun, CrosswalkError> {
    let build = overlaps::build_overlaps_with_progress(sources, targets, crosswalk, progress)?;
    let raw_count = build.overlaps.len();

    let overlaps = normalize::normalize_fractions(&build.overlaps, crosswalk.residual_policy);
    let apportionment = apportion::apportion(&overlaps, sources, targets, crosswalk)?;
    let profiles = profile::profile_response_areas(&apportionment, targets, classification);

    let input_population: f64 = sources.iter().map(|s| s.population).sum();
    let apportioned_population: f64 = apportionment.estimates.iter().map(|e| e.population).sum();

    log::info!(
        "Crosswalk: {raw_count} overlaps across {} tracts and {} response areas; \
         {apportioned_population:.1} of {input_population:.1} residents apportioned, \
         {:.1} unassigned",
        sources.len(),
        targets.len(),
        apportionment.unassigned.population,
    );

    let report = CrosswalkReport {
        source_regions: sources.len(),
        target_regions: targets.len(),
        overlaps: overlaps.len(),
        input_population,
        apportioned_population,
        unassigned: apportionment.unassigned.clone(),
        diagnostics: build.diagnostics,
    };

    Ok(CrosswalkRun {
        overlaps,
        apportionment,
        profiles,
        report,
    })
}
