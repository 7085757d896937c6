//! Density and urban classification per response area.

use std::collections::BTreeMap;

use fire_resource_crosswalk_models::{
    AreaMeasure, Apportionment, ClassificationConfig, ResponseAreaProfile,
};
use fire_resource_geography_models::TargetRegion;
use fire_resource_spatial::repair::validate;
use geo::{Area, GeodesicArea, MultiPolygon};

/// Square meters in one international square mile.
const SQ_METERS_PER_SQ_MILE: f64 = 2_589_988.110_336;

/// Land area of `geometry` in square miles.
#[must_use]
pub fn land_area_sq_mi(geometry: &MultiPolygon<f64>, measure: AreaMeasure) -> f64 {
    match measure {
        AreaMeasure::Geodesic => geometry.geodesic_area_unsigned() / SQ_METERS_PER_SQ_MILE,
        AreaMeasure::Planar { units_per_mile } => {
            geometry.unsigned_area() / (units_per_mile * units_per_mile)
        }
    }
}

/// Builds one profile per estimate.
///
/// Land area comes from the response area's (repaired) geometry. Areas
/// whose geometry is unusable, or whose area is zero, get no density and
/// classify as unknown.
#[must_use]
pub fn profile_response_areas(
    apportionment: &Apportionment,
    targets: &[TargetRegion],
    config: &ClassificationConfig,
) -> Vec<ResponseAreaProfile> {
    let geometry_by_id: BTreeMap<&str, &MultiPolygon<f64>> = targets
        .iter()
        .map(|t| (t.id.as_str(), &t.geometry))
        .collect();

    apportionment
        .estimates
        .iter()
        .map(|estimate| {
            let land_area_sq_mi = geometry_by_id
                .get(estimate.target_id.as_str())
                .and_then(|geometry| {
                    validate(geometry)
                        .geometry()
                        .map(|g| land_area_sq_mi(g, config.area_measure))
                })
                .filter(|area| area.is_finite());

            let total_housing_units = estimate.housing.total();
            let single_family: f64 = config
                .single_family_categories
                .iter()
                .map(|category| estimate.housing.get(category))
                .sum();
            let pct_single_family = (total_housing_units > 0.0)
                .then(|| 100.0 * single_family / total_housing_units);

            let population_density = land_area_sq_mi
                .filter(|&area| area > 0.0)
                .map(|area| estimate.population / area);

            if land_area_sq_mi.is_none() {
                log::warn!(
                    "Response area {} has no measurable land area; density unknown",
                    estimate.target_id
                );
            }

            ResponseAreaProfile {
                estimate: estimate.clone(),
                total_housing_units,
                pct_single_family,
                land_area_sq_mi,
                population_density,
                urban_class: config.classify(population_density),
            }
        })
        .collect()
}
