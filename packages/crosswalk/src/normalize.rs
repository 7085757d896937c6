//! Fraction normalization.
//!
//! Summing intersection areas rarely reproduces a tract's area exactly:
//! overlay rounding, dropped slivers and tracts that poke past the city
//! limits all leave a residual. Normalizing folds that residual back into
//! the tract's remaining overlaps so every tract with at least one overlap
//! is apportioned exactly once.

use std::collections::BTreeMap;

use fire_resource_crosswalk_models::{Overlap, ResidualPolicy};

/// Rescales each tract's overlap fractions to sum to 1.
///
/// Input order is preserved. Tracts with no overlaps have nothing to
/// rescale and are unaffected.
///
/// Under [`ResidualPolicy::LargestOverlap`] a negative residual larger
/// than the tract's largest fraction cannot be absorbed without a negative
/// fraction; such tracts are rescaled proportionally instead.
#[must_use]
pub fn normalize_fractions(overlaps: &[Overlap], policy: ResidualPolicy) -> Vec<Overlap> {
    let mut normalized = overlaps.to_vec();

    let mut by_source: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (position, overlap) in overlaps.iter().enumerate() {
        by_source
            .entry(overlap.source_id.as_str())
            .or_default()
            .push(position);
    }

    for (source_id, positions) in by_source {
        let sum: f64 = positions.iter().map(|&i| overlaps[i].fraction).sum();
        if !sum.is_finite() || sum <= 0.0 {
            log::warn!("Census tract {source_id} has fraction sum {sum}, leaving as is");
            continue;
        }

        let residual = 1.0 - sum;
        if residual.abs() > 1e-9 {
            log::debug!("Census tract {source_id}: distributing residual {residual:e}");
        }

        if policy == ResidualPolicy::LargestOverlap {
            let largest = positions.iter().copied().max_by(|&a, &b| {
                overlaps[a]
                    .fraction
                    .total_cmp(&overlaps[b].fraction)
                    // Prefer the smaller target id on ties.
                    .then_with(|| overlaps[b].target_id.cmp(&overlaps[a].target_id))
            });
            if let Some(i) = largest {
                let absorbed = overlaps[i].fraction + residual;
                if absorbed >= 0.0 {
                    normalized[i].fraction = absorbed;
                    continue;
                }
                log::warn!(
                    "Census tract {source_id}: residual {residual:.4} exceeds its largest \
                     overlap with {}, rescaling proportionally",
                    overlaps[i].target_id
                );
            }
        }

        for &i in &positions {
            normalized[i].fraction = overlaps[i].fraction / sum;
        }
    }

    normalized
}

/// Sum of fractions per tract id.
#[must_use]
pub fn fraction_sums(overlaps: &[Overlap]) -> BTreeMap<&str, f64> {
    let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
    for overlap in overlaps {
        *sums.entry(overlap.source_id.as_str()).or_insert(0.0) += overlap.fraction;
    }
    sums
}
