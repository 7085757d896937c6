//! Tract/response-area overlap computation.
//!
//! Every region is validated (and repaired if needed) first. Response
//! area envelopes go into an R-tree; each tract is intersected only with
//! the response areas whose envelopes touch its own. Intersections at or
//! below the configured epsilon are boundary slivers and are dropped.

use fire_resource_crosswalk_models::{
    CrosswalkConfig, CrosswalkDiagnostics, Overlap, OverlapBuild, PartialCoverage, RepairedRegion,
    SkippedRegion,
};
use fire_resource_geography_models::{RegionRole, SourceRegion, TargetRegion};
use fire_resource_spatial::EnvelopeIndex;
use fire_resource_spatial::repair::{GeometryStatus, validate};
use geo::{Area, BooleanOps, MultiPolygon};

use crate::CrosswalkError;
use crate::progress::{NullProgress, ProgressCallback};

/// A region whose geometry passed validation, with its area cached.
struct PreparedRegion<'a> {
    id: &'a str,
    geometry: MultiPolygon<f64>,
    area: f64,
}

/// Builds the tract-to-response-area overlaps.
///
/// See [`build_overlaps_with_progress`].
///
/// # Errors
///
/// Returns [`CrosswalkError::EmptyInputCollection`] if either collection
/// is empty or no response area has usable geometry.
pub fn build_overlaps(
    sources: &[SourceRegion],
    targets: &[TargetRegion],
    config: &CrosswalkConfig,
) -> Result<OverlapBuild, CrosswalkError> {
    build_overlaps_with_progress(sources, targets, config, &NullProgress)
}

/// Builds the tract-to-response-area overlaps, reporting one progress
/// tick per tract.
///
/// For each tract/response-area pair whose bounding boxes intersect, the
/// polygons are intersected and an [`Overlap`] is emitted when the
/// intersection area exceeds [`EpsilonPolicy::threshold`]. The overlap's
/// fraction is the intersection area over the tract's area.
///
/// Regions whose geometry cannot be made valid are recorded as
/// [`SkippedRegion`]s in the diagnostics and take no part in the
/// crosswalk. Overlaps are returned ordered by tract id, then response
/// area id.
///
/// [`EpsilonPolicy::threshold`]: fire_resource_crosswalk_models::EpsilonPolicy::threshold
///
/// # Errors
///
/// Returns [`CrosswalkError::EmptyInputCollection`] if either collection
/// is empty or no response area has usable geometry.
pub fn build_overlaps_with_progress(
    sources: &[SourceRegion],
    targets: &[TargetRegion],
    config: &CrosswalkConfig,
    progress: &dyn ProgressCallback,
) -> Result<OverlapBuild, CrosswalkError> {
    if sources.is_empty() {
        return Err(CrosswalkError::EmptyInputCollection {
            collection: "census tracts",
        });
    }
    if targets.is_empty() {
        return Err(CrosswalkError::EmptyInputCollection {
            collection: "response areas",
        });
    }

    let mut diagnostics = CrosswalkDiagnostics::default();

    let prepared_targets: Vec<PreparedRegion<'_>> = targets
        .iter()
        .filter_map(|t| prepare(&t.id, &t.geometry, RegionRole::Target, &mut diagnostics))
        .collect();

    if prepared_targets.is_empty() {
        return Err(CrosswalkError::EmptyInputCollection {
            collection: "response areas with valid geometry",
        });
    }

    let index = EnvelopeIndex::build(prepared_targets.iter().map(|t| &t.geometry));
    log::debug!("Indexed {} response area envelopes", index.len());

    progress.set_total(sources.len() as u64);
    progress.set_message("Intersecting census tracts".to_string());

    let mut overlaps = Vec::new();

    for source in sources {
        progress.inc(1);

        let Some(prepared) = prepare(
            &source.id,
            &source.geometry,
            RegionRole::Source,
            &mut diagnostics,
        ) else {
            continue;
        };

        let mut covered = 0.0;

        for position in index.candidates(&prepared.geometry) {
            diagnostics.candidate_pairs += 1;
            let target = &prepared_targets[position];

            let intersection_area = prepared.geometry.intersection(&target.geometry).unsigned_area();
            if !intersection_area.is_finite() || intersection_area <= 0.0 {
                continue;
            }

            let threshold = config.epsilon.threshold(prepared.area, target.area);
            if intersection_area <= threshold {
                log::debug!(
                    "Dropping sliver {} x {}: area {intersection_area} <= {threshold}",
                    prepared.id,
                    target.id
                );
                diagnostics.dropped_slivers += 1;
                continue;
            }

            let fraction = intersection_area / prepared.area;
            covered += fraction;

            overlaps.push(Overlap {
                source_id: prepared.id.to_string(),
                target_id: target.id.to_string(),
                intersection_area,
                fraction,
            });
        }

        if covered > 0.0 && (covered - 1.0).abs() > config.partial_coverage_warning {
            log::debug!(
                "Census tract {} is {:.2}% covered by response areas",
                prepared.id,
                covered * 100.0
            );
            diagnostics.partial_coverage.push(PartialCoverage {
                source_id: prepared.id.to_string(),
                covered_fraction: covered,
            });
        }
    }

    overlaps.sort_by(|a, b| {
        a.source_id
            .cmp(&b.source_id)
            .then_with(|| a.target_id.cmp(&b.target_id))
    });

    progress.finish(format!("{} overlaps", overlaps.len()));

    if diagnostics.has_skipped() {
        log::warn!(
            "{} regions skipped for invalid geometry",
            diagnostics.skipped_regions.len()
        );
    }
    if !diagnostics.partial_coverage.is_empty() {
        log::warn!(
            "{} census tracts are only partially covered by response areas",
            diagnostics.partial_coverage.len()
        );
    }
    log::info!(
        "Built {} overlaps from {} candidate pairs ({} slivers dropped, {} regions repaired)",
        overlaps.len(),
        diagnostics.candidate_pairs,
        diagnostics.dropped_slivers,
        diagnostics.repaired_regions.len()
    );

    Ok(OverlapBuild {
        overlaps,
        diagnostics,
    })
}

/// Validates a region's geometry, recording repairs and failures.
fn prepare<'a>(
    id: &'a str,
    geometry: &MultiPolygon<f64>,
    role: RegionRole,
    diagnostics: &mut CrosswalkDiagnostics,
) -> Option<PreparedRegion<'a>> {
    let status = validate(geometry);
    if status.is_repaired() {
        log::debug!("Repaired geometry of {role} {id}");
        diagnostics.repaired_regions.push(RepairedRegion {
            region_id: id.to_string(),
            role,
        });
    }

    match status {
        GeometryStatus::Valid(geometry) | GeometryStatus::Repaired(geometry) => {
            Some(PreparedRegion::new(id, geometry))
        }
        GeometryStatus::Invalid { reason } => {
            log::warn!("Skipping {role} {id}: {reason}");
            diagnostics.skipped_regions.push(SkippedRegion {
                region_id: id.to_string(),
                role,
                reason,
            });
            None
        }
    }
}

impl<'a> PreparedRegion<'a> {
    fn new(id: &'a str, geometry: MultiPolygon<f64>) -> Self {
        let area = geometry.unsigned_area();
        Self { id, geometry, area }
    }
}
