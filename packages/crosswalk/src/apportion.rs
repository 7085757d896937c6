//! Area-weighted apportionment of tract attributes.
//!
//! Each response area receives `attribute * fraction` from every tract it
//! overlaps. Whatever no response area receives (tracts with no overlap,
//! and the uncovered share of tracts whose fractions sum below one) is
//! reported in the [`UnassignedSummary`], and the totals are checked to
//! add back up to the input.

use std::collections::{BTreeMap, BTreeSet};

use fire_resource_crosswalk_models::{
    ApportionedEstimate, Apportionment, CrosswalkConfig, Overlap, UnassignedSummary,
};
use fire_resource_geography_models::{HousingUnits, SourceRegion, TargetRegion};

use crate::CrosswalkError;
use crate::normalize::fraction_sums;

/// Apportions tract population and housing to response areas.
///
/// Every response area gets an estimate; one with no incoming overlap
/// gets zeros. Estimates are ordered by response area id.
///
/// # Errors
///
/// * [`CrosswalkError::EmptyInputCollection`] if either collection is
///   empty.
/// * [`CrosswalkError::UnknownRegion`] if an overlap names a tract or
///   response area that is not in the input.
/// * [`CrosswalkError::NonConservingApportionment`] if apportioned plus
///   unassigned totals deviate from the input totals by more than
///   [`CrosswalkConfig::conservation_tolerance`] (relative), which
///   happens when a tract's fractions sum above one.
pub fn apportion(
    overlaps: &[Overlap],
    sources: &[SourceRegion],
    targets: &[TargetRegion],
    config: &CrosswalkConfig,
) -> Result<Apportionment, CrosswalkError> {
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

    let categories: BTreeSet<&str> = sources.iter().flat_map(|s| s.housing.categories()).collect();
    let zero_housing: HousingUnits = categories.iter().map(|&c| (c, 0.0)).collect();

    let source_by_id: BTreeMap<&str, &SourceRegion> =
        sources.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut estimates: BTreeMap<&str, ApportionedEstimate> = targets
        .iter()
        .map(|t| {
            (
                t.id.as_str(),
                ApportionedEstimate {
                    housing: zero_housing.clone(),
                    ..ApportionedEstimate::zero(t.id.as_str())
                },
            )
        })
        .collect();

    for overlap in overlaps {
        let source = source_by_id
            .get(overlap.source_id.as_str())
            .ok_or_else(|| CrosswalkError::UnknownRegion {
                role: "census tract",
                id: overlap.source_id.clone(),
            })?;
        let estimate = estimates
            .get_mut(overlap.target_id.as_str())
            .ok_or_else(|| CrosswalkError::UnknownRegion {
                role: "response area",
                id: overlap.target_id.clone(),
            })?;

        estimate.population += source.population * overlap.fraction;
        for (category, count) in source.housing.iter() {
            estimate.housing.add(category, count * overlap.fraction);
        }
    }

    let unassigned = unassigned_summary(overlaps, sources, &zero_housing);
    let estimates: Vec<ApportionedEstimate> = estimates.into_values().collect();

    check_conservation(&estimates, &unassigned, sources, &categories, config)?;

    if !unassigned.uncovered_source_ids.is_empty() {
        log::warn!(
            "{} census tracts ({:.0} residents) fall outside every response area",
            unassigned.uncovered_source_ids.len(),
            sources
                .iter()
                .filter(|s| unassigned.uncovered_source_ids.contains(&s.id))
                .map(|s| s.population)
                .sum::<f64>()
        );
    }

    Ok(Apportionment {
        estimates,
        unassigned,
    })
}

/// Collects the attribute share that no response area received.
fn unassigned_summary(
    overlaps: &[Overlap],
    sources: &[SourceRegion],
    zero_housing: &HousingUnits,
) -> UnassignedSummary {
    let sums = fraction_sums(overlaps);
    let mut unassigned = UnassignedSummary {
        housing: zero_housing.clone(),
        ..UnassignedSummary::default()
    };

    for source in sources {
        let share = match sums.get(source.id.as_str()) {
            None => {
                unassigned.uncovered_source_ids.push(source.id.clone());
                1.0
            }
            // Over-apportionment is not "unassigned"; the conservation
            // check catches it.
            Some(&sum) => (1.0 - sum).max(0.0),
        };

        if share <= 0.0 {
            continue;
        }

        unassigned.population += source.population * share;
        for (category, count) in source.housing.iter() {
            unassigned.housing.add(category, count * share);
        }
    }

    unassigned
}

fn check_conservation(
    estimates: &[ApportionedEstimate],
    unassigned: &UnassignedSummary,
    sources: &[SourceRegion],
    categories: &BTreeSet<&str>,
    config: &CrosswalkConfig,
) -> Result<(), CrosswalkError> {
    let check = |attribute: &str, expected: f64, actual: f64| {
        let tolerance = config.conservation_tolerance * expected.abs().max(1.0);
        if (expected - actual).abs() > tolerance {
            return Err(CrosswalkError::NonConservingApportionment {
                attribute: attribute.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    };

    check(
        "population",
        sources.iter().map(|s| s.population).sum(),
        estimates.iter().map(|e| e.population).sum::<f64>() + unassigned.population,
    )?;

    for &category in categories {
        check(
            category,
            sources.iter().map(|s| s.housing.get(category)).sum(),
            estimates.iter().map(|e| e.housing.get(category)).sum::<f64>()
                + unassigned.housing.get(category),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_fractions;
    use crate::overlaps::build_overlaps;
    use crate::test_support::{area, assert_close, rect, tract, tract_with_housing};
    use fire_resource_crosswalk_models::{EpsilonPolicy, ResidualPolicy};

    fn overlap(source: &str, target: &str, fraction: f64) -> Overlap {
        Overlap {
            source_id: source.to_string(),
            target_id: target.to_string(),
            intersection_area: fraction,
            fraction,
        }
    }

    fn pipeline(sources: &[SourceRegion], targets: &[TargetRegion], config: &CrosswalkConfig) -> Apportionment {
        let build = build_overlaps(sources, targets, config).unwrap();
        let overlaps = normalize_fractions(&build.overlaps, config.residual_policy);
        apportion(&overlaps, sources, targets, config).unwrap()
    }

    #[test]
    fn seventy_thirty_split() {
        let sources = vec![tract("A", rect(0.0, 0.0, 10.0, 10.0), 1000.0)];
        let targets = vec![
            area("X", rect(0.0, 0.0, 7.0, 10.0)),
            area("Y", rect(7.0, 0.0, 10.0, 10.0)),
        ];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        assert_close(result.estimates[0].population, 700.0);
        assert_close(result.estimates[1].population, 300.0);
        assert_close(result.unassigned.population, 0.0);
    }

    #[test]
    fn halves_receive_half_the_population() {
        let sources = vec![tract_with_housing(
            "A",
            rect(0.0, 0.0, 10.0, 10.0),
            800.0,
            &[("single_family", 200.0)],
        )];
        let targets = vec![
            area("X", rect(0.0, 0.0, 5.0, 10.0)),
            area("Y", rect(5.0, 0.0, 10.0, 10.0)),
        ];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        for estimate in &result.estimates {
            assert_close(estimate.population, 400.0);
            assert_close(estimate.housing.get("single_family"), 100.0);
        }
    }

    #[test]
    fn fully_covered_population_is_conserved() {
        let sources: Vec<SourceRegion> = (0..4u32)
            .map(|i| {
                let x = f64::from(i) * 2.5;
                tract(&format!("T{i}"), rect(x, 0.0, x + 2.5, 10.0), 100.0 * f64::from(i + 1))
            })
            .collect();
        let targets = vec![
            area("X", rect(0.0, 0.0, 3.3, 10.0)),
            area("Y", rect(3.3, 0.0, 6.1, 10.0)),
            area("Z", rect(6.1, 0.0, 10.0, 10.0)),
        ];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        let total: f64 = result.estimates.iter().map(|e| e.population).sum();
        assert_close(total, 1000.0);
        assert!(result.unassigned.uncovered_source_ids.is_empty());
    }

    #[test]
    fn area_without_overlaps_gets_zero_estimate() {
        let sources = vec![tract_with_housing(
            "A",
            rect(0.0, 0.0, 1.0, 1.0),
            10.0,
            &[("single_family", 4.0)],
        )];
        let targets = vec![
            area("X", rect(0.0, 0.0, 1.0, 1.0)),
            area("EMPTY", rect(50.0, 50.0, 51.0, 51.0)),
        ];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        assert_eq!(result.estimates.len(), 2);
        let empty = &result.estimates[0];
        assert_eq!(empty.target_id, "EMPTY");
        assert_close(empty.population, 0.0);
        assert_close(empty.housing.get("single_family"), 0.0);
    }

    #[test]
    fn uncovered_tract_is_unassigned() {
        let sources = vec![
            tract("IN", rect(0.0, 0.0, 1.0, 1.0), 10.0),
            tract("OUT", rect(100.0, 100.0, 101.0, 101.0), 25.0),
        ];
        let targets = vec![area("X", rect(0.0, 0.0, 1.0, 1.0))];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        assert_close(result.estimates[0].population, 10.0);
        assert_close(result.unassigned.population, 25.0);
        assert_eq!(result.unassigned.uncovered_source_ids, vec!["OUT".to_string()]);
    }

    #[test]
    fn sliver_only_tract_goes_to_unassigned() {
        // 0.0001% of S lies in X; epsilon is 0.01%.
        let sources = vec![
            tract("S", rect(0.0, 0.0, 10.0, 10.0), 400.0),
            tract("T", rect(20.0, 0.0, 30.0, 10.0), 100.0),
        ];
        let targets = vec![area("X", rect(10.0 - 1e-5, 0.0, 30.0, 10.0))];
        let config = CrosswalkConfig {
            epsilon: EpsilonPolicy::FractionOfSmaller { fraction: 1e-4 },
            ..CrosswalkConfig::default()
        };

        let result = pipeline(&sources, &targets, &config);
        assert_close(result.estimates[0].population, 100.0);
        assert_close(result.unassigned.population, 400.0);
        assert_eq!(result.unassigned.uncovered_source_ids, vec!["S".to_string()]);
    }

    #[test]
    fn unnormalized_shortfall_is_unassigned() {
        let sources = vec![tract("A", rect(0.0, 0.0, 1.0, 1.0), 100.0)];
        let targets = vec![area("X", rect(0.0, 0.0, 1.0, 1.0))];
        let overlaps = vec![overlap("A", "X", 0.9)];

        let result = apportion(&overlaps, &sources, &targets, &CrosswalkConfig::default()).unwrap();
        assert_close(result.estimates[0].population, 90.0);
        assert_close(result.unassigned.population, 10.0);
        assert!(result.unassigned.uncovered_source_ids.is_empty());
    }

    #[test]
    fn over_apportionment_is_fatal() {
        let sources = vec![tract("A", rect(0.0, 0.0, 1.0, 1.0), 100.0)];
        let targets = vec![area("X", rect(0.0, 0.0, 1.0, 1.0)), area("Y", rect(0.0, 0.0, 1.0, 1.0))];
        let overlaps = vec![overlap("A", "X", 0.8), overlap("A", "Y", 0.7)];

        let err = apportion(&overlaps, &sources, &targets, &CrosswalkConfig::default()).unwrap_err();
        match err {
            CrosswalkError::NonConservingApportionment {
                attribute,
                expected,
                actual,
            } => {
                assert_eq!(attribute, "population");
                assert_close(expected, 100.0);
                assert_close(actual, 150.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn overlapping_response_areas_are_fixed_by_normalization() {
        let sources = vec![tract("A", rect(0.0, 0.0, 10.0, 10.0), 100.0)];
        let targets = vec![
            area("X", rect(0.0, 0.0, 6.0, 10.0)),
            area("Y", rect(4.0, 0.0, 10.0, 10.0)),
        ];
        let config = CrosswalkConfig {
            residual_policy: ResidualPolicy::Proportional,
            ..CrosswalkConfig::default()
        };

        let result = pipeline(&sources, &targets, &config);
        assert_close(result.estimates[0].population, 50.0);
        assert_close(result.estimates[1].population, 50.0);
    }

    #[test]
    fn stacked_response_areas_stay_non_negative_under_largest_overlap() {
        let sources = vec![tract("A", rect(0.0, 0.0, 10.0, 10.0), 1000.0)];
        let targets = vec![
            area("X", rect(0.0, 0.0, 9.0, 10.0)),
            area("Y", rect(0.5, 0.0, 9.5, 10.0)),
            area("Z", rect(1.0, 0.0, 10.0, 10.0)),
        ];
        let config = CrosswalkConfig {
            residual_policy: ResidualPolicy::LargestOverlap,
            ..CrosswalkConfig::default()
        };

        let result = pipeline(&sources, &targets, &config);
        for estimate in &result.estimates {
            assert!(estimate.population >= 0.0, "{estimate:?}");
            assert_close(estimate.population, 1000.0 / 3.0);
        }
        assert_close(result.unassigned.population, 0.0);
    }

    #[test]
    fn unknown_ids_are_fatal() {
        let sources = vec![tract("A", rect(0.0, 0.0, 1.0, 1.0), 1.0)];
        let targets = vec![area("X", rect(0.0, 0.0, 1.0, 1.0))];

        let err = apportion(&[overlap("Q", "X", 1.0)], &sources, &targets, &CrosswalkConfig::default())
            .unwrap_err();
        assert!(matches!(err, CrosswalkError::UnknownRegion { role: "census tract", .. }));

        let err = apportion(&[overlap("A", "Q", 1.0)], &sources, &targets, &CrosswalkConfig::default())
            .unwrap_err();
        assert!(matches!(err, CrosswalkError::UnknownRegion { role: "response area", .. }));
    }

    #[test]
    fn housing_categories_are_conserved() {
        let sources = vec![
            tract_with_housing("A", rect(0.0, 0.0, 10.0, 10.0), 10.0, &[("single_family", 7.0)]),
            tract_with_housing("B", rect(10.0, 0.0, 20.0, 10.0), 10.0, &[("mobile_home", 3.0)]),
        ];
        let targets = vec![area("X", rect(0.0, 0.0, 15.0, 10.0))];

        let result = pipeline(&sources, &targets, &CrosswalkConfig::default());
        let x = &result.estimates[0];
        assert_close(x.housing.get("single_family"), 7.0);
        // B is only half covered, but normalization folds all of it into X.
        assert_close(x.housing.get("mobile_home"), 3.0);
        assert_close(result.unassigned.housing.get("mobile_home"), 0.0);
        assert_close(x.population, 20.0);
    }
}
