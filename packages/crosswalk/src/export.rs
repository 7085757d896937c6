//! Writers for the crosswalk outputs.
//!
//! Each writer takes any [`Write`] sink so the CLI can target files and
//! tests can target a `Vec<u8>`. [`write_outputs`] writes the full set
//! into a directory.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fire_resource_crosswalk_models::{
    CrosswalkReport, Overlap, ResponseAreaProfile, UnassignedSummary,
};
use fire_resource_geography_models::TargetRegion;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::{CrosswalkError, CrosswalkRun};

/// Label of the trailing row in `apportioned.csv`.
pub const UNASSIGNED_ROW: &str = "unassigned";

/// Where [`write_outputs`] put each file.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub crosswalk: PathBuf,
    pub apportioned: PathBuf,
    pub diagnostics: PathBuf,
    pub response_areas: PathBuf,
}

impl OutputPaths {
    /// Standard file names under `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            crosswalk: dir.join("crosswalk.csv"),
            apportioned: dir.join("apportioned.csv"),
            diagnostics: dir.join("diagnostics.json"),
            response_areas: dir.join("response_areas.geojson"),
        }
    }
}

/// Writes the crosswalk table, one row per overlap.
///
/// # Errors
///
/// Returns [`CrosswalkError::Csv`] if writing fails.
pub fn write_crosswalk_csv<W: Write>(writer: W, overlaps: &[Overlap]) -> Result<(), CrosswalkError> {
    let mut csv = csv::Writer::from_writer(writer);
    if overlaps.is_empty() {
        csv.write_record(["source_id", "target_id", "intersection_area", "fraction"])?;
    }
    for overlap in overlaps {
        csv.serialize(overlap)?;
    }
    csv.flush()?;
    Ok(())
}

fn housing_categories(profiles: &[ResponseAreaProfile], unassigned: &UnassignedSummary) -> Vec<String> {
    profiles
        .iter()
        .flat_map(|p| p.estimate.housing.categories())
        .chain(unassigned.housing.categories())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// Writes per-response-area estimates and derived fields, followed by an
/// `unassigned` row carrying the population and housing no response area
/// received.
///
/// # Errors
///
/// Returns [`CrosswalkError::Csv`] if writing fails.
pub fn write_apportioned_csv<W: Write>(
    writer: W,
    profiles: &[ResponseAreaProfile],
    unassigned: &UnassignedSummary,
) -> Result<(), CrosswalkError> {
    let categories = housing_categories(profiles, unassigned);
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["target_id".to_string(), "population".to_string()];
    header.extend(categories.iter().cloned());
    header.extend(
        [
            "total_housing_units",
            "pct_single_family",
            "land_area_sq_mi",
            "population_density",
            "urban_class",
        ]
        .map(str::to_string),
    );
    csv.write_record(&header)?;

    for profile in profiles {
        let estimate = &profile.estimate;
        let mut record = vec![estimate.target_id.clone(), estimate.population.to_string()];
        record.extend(categories.iter().map(|c| estimate.housing.get(c).to_string()));
        record.push(profile.total_housing_units.to_string());
        record.push(optional(profile.pct_single_family));
        record.push(optional(profile.land_area_sq_mi));
        record.push(optional(profile.population_density));
        record.push(profile.urban_class.to_string());
        csv.write_record(&record)?;
    }

    let mut record = vec![UNASSIGNED_ROW.to_string(), unassigned.population.to_string()];
    record.extend(categories.iter().map(|c| unassigned.housing.get(c).to_string()));
    record.push(unassigned.housing.total().to_string());
    record.extend(std::iter::repeat_n(String::new(), 4));
    csv.write_record(&record)?;

    csv.flush()?;
    Ok(())
}

/// Writes the run report as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`CrosswalkError::Json`] if serialization fails.
pub fn write_diagnostics_json<W: Write>(
    writer: W,
    report: &CrosswalkReport,
) -> Result<(), CrosswalkError> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Property key the response area map joins on.
pub const RESPONSE_AREA_ID_PROPERTY: &str = "response_area_id";

/// Flattens a profile into feature properties. The id is written under
/// [`RESPONSE_AREA_ID_PROPERTY`] and housing categories become
/// `housing_<category>` keys.
fn profile_properties(profile: &ResponseAreaProfile) -> Result<JsonObject, CrosswalkError> {
    let mut properties = match serde_json::to_value(profile)? {
        JsonValue::Object(map) => map,
        other => {
            let mut map = JsonObject::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Some(id) = properties.remove("target_id") {
        properties.insert(RESPONSE_AREA_ID_PROPERTY.to_string(), id);
    }
    properties.remove("housing");
    for (category, count) in profile.estimate.housing.iter() {
        properties.insert(format!("housing_{category}"), JsonValue::from(count));
    }
    Ok(properties)
}

/// Writes response area geometries with their profile fields as a
/// `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`CrosswalkError::Json`] if serialization fails, or
/// [`CrosswalkError::UnknownRegion`] if a profile has no matching
/// response area.
pub fn write_response_areas_geojson<W: Write>(
    mut writer: W,
    profiles: &[ResponseAreaProfile],
    targets: &[TargetRegion],
) -> Result<(), CrosswalkError> {
    let features = profiles
        .iter()
        .map(|profile| {
            let target = targets
                .iter()
                .find(|t| t.id == profile.estimate.target_id)
                .ok_or_else(|| CrosswalkError::UnknownRegion {
                    role: "response area",
                    id: profile.estimate.target_id.clone(),
                })?;

            Ok(Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&target.geometry))),
                id: Some(geojson::feature::Id::String(target.id.clone())),
                properties: Some(profile_properties(profile)?),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, CrosswalkError>>()?;

    let collection = GeoJson::from(features.into_iter().collect::<FeatureCollection>());
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>, CrosswalkError> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Writes every output of `run` into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`CrosswalkError`] if the directory or any file cannot be
/// written.
pub fn write_outputs(
    dir: &Path,
    run: &CrosswalkRun,
    targets: &[TargetRegion],
) -> Result<OutputPaths, CrosswalkError> {
    fs::create_dir_all(dir)?;
    let paths = OutputPaths::in_dir(dir);

    write_crosswalk_csv(create(&paths.crosswalk)?, &run.overlaps)?;
    write_apportioned_csv(
        create(&paths.apportioned)?,
        &run.profiles,
        &run.apportionment.unassigned,
    )?;
    write_diagnostics_json(create(&paths.diagnostics)?, &run.report)?;
    write_response_areas_geojson(create(&paths.response_areas)?, &run.profiles, targets)?;

    log::info!("Wrote crosswalk outputs to {}", dir.display());
    Ok(paths)
}
