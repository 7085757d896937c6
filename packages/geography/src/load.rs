//! Loads census tracts and response areas from boundary files.
//!
//! Tract boundaries are `GeoJSON` (TIGER/Line exports converted with
//! `ogr2ogr`, or the `TIGERweb` `f=geojson` endpoint). Tract attributes
//! come either from the feature properties or from an ACS table exported
//! as CSV and joined on the tract id. Response areas are `GeoJSON` or the
//! Esri JSON returned by the city's `ArcGIS` `FeatureServer`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use fire_resource_geography_models::{
    GeometryFormat, HousingUnits, SourceFieldMapping, SourceRegion, TargetFieldMapping,
    TargetRegion,
};
use geo::MultiPolygon;
use geojson::GeoJson;

use crate::GeoError;
use crate::normalize::{esri_rings_to_multipolygon, parse_count, property_count, property_id};

/// One boundary feature after id and geometry extraction.
struct RawFeature {
    id: String,
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: MultiPolygon<f64>,
}

/// Tract attributes from one CSV row.
struct AttributeRow {
    population: f64,
    housing: HousingUnits,
}

/// Reads census tracts from a `GeoJSON` file, optionally joining
/// attributes from a CSV file.
///
/// # Errors
///
/// Returns [`GeoError`] if either file cannot be read or parsed, or if
/// ids are duplicated or counts are malformed.
pub fn load_source_regions(
    geojson_path: &Path,
    attributes_csv: Option<&Path>,
    fields: &SourceFieldMapping,
) -> Result<Vec<SourceRegion>, GeoError> {
    let geojson_text = std::fs::read_to_string(geojson_path)?;
    let csv_text = attributes_csv.map(std::fs::read_to_string).transpose()?;

    let regions = parse_source_regions(&geojson_text, csv_text.as_deref(), fields)?;
    log::info!(
        "Loaded {} census tracts from {}",
        regions.len(),
        geojson_path.display()
    );
    Ok(regions)
}

/// Reads response areas from a `GeoJSON` or Esri JSON file.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read or parsed, or if ids
/// are duplicated.
pub fn load_target_regions(
    path: &Path,
    fields: &TargetFieldMapping,
) -> Result<Vec<TargetRegion>, GeoError> {
    let text = std::fs::read_to_string(path)?;
    let regions = parse_target_regions(&text, fields)?;
    log::info!(
        "Loaded {} response areas from {}",
        regions.len(),
        path.display()
    );
    Ok(regions)
}

/// Parses census tracts from `GeoJSON` text, taking attributes from
/// `attributes_csv` when given and from feature properties otherwise.
///
/// Tracts with no CSV row get zero attributes. CSV rows with no matching
/// tract are ignored.
///
/// # Errors
///
/// Returns [`GeoError`] on malformed input, duplicate ids, a missing CSV
/// column, or a malformed count.
pub fn parse_source_regions(
    geojson_text: &str,
    attributes_csv: Option<&str>,
    fields: &SourceFieldMapping,
) -> Result<Vec<SourceRegion>, GeoError> {
    let features = read_geojson_features(geojson_text, &fields.id)?;

    let Some(csv_text) = attributes_csv else {
        return features
            .into_iter()
            .map(|feature| {
                let population = property_count(
                    feature.properties.get(&fields.population),
                    &fields.population,
                    &feature.id,
                )?;
                let mut housing = HousingUnits::new();
                for (category, column) in &fields.housing {
                    let count =
                        property_count(feature.properties.get(column), column, &feature.id)?;
                    housing.insert(category.clone(), count);
                }
                Ok(SourceRegion {
                    id: feature.id,
                    geometry: feature.geometry,
                    population,
                    housing,
                })
            })
            .collect();
    };

    let mut attributes = parse_attribute_table(csv_text, fields)?;
    let mut regions = Vec::with_capacity(features.len());

    for feature in features {
        let row = attributes.remove(&feature.id).unwrap_or_else(|| {
            log::warn!(
                "Census tract {} has no attribute row, using zero population",
                feature.id
            );
            AttributeRow {
                population: 0.0,
                housing: fields.housing.keys().map(|k| (k.clone(), 0.0)).collect(),
            }
        });

        regions.push(SourceRegion {
            id: feature.id,
            geometry: feature.geometry,
            population: row.population,
            housing: row.housing,
        });
    }

    if !attributes.is_empty() {
        log::warn!(
            "{} attribute rows have no matching tract geometry (e.g. {})",
            attributes.len(),
            attributes.keys().next().map_or("", String::as_str)
        );
    }

    Ok(regions)
}

/// Parses response areas from `GeoJSON` or Esri JSON text.
///
/// # Errors
///
/// Returns [`GeoError`] on malformed input or duplicate ids.
pub fn parse_target_regions(
    text: &str,
    fields: &TargetFieldMapping,
) -> Result<Vec<TargetRegion>, GeoError> {
    let features = match fields.format {
        GeometryFormat::Geojson => read_geojson_features(text, &fields.id)?,
        GeometryFormat::EsriRings => read_esri_features(text, &fields.id)?,
    };

    Ok(features
        .into_iter()
        .map(|feature| TargetRegion {
            id: feature.id,
            geometry: feature.geometry,
        })
        .collect())
}

/// Reads polygon features from a `GeoJSON` `FeatureCollection` (or a
/// single `Feature`).
///
/// Features with a missing id, null geometry or a non-polygon geometry
/// are skipped with a warning.
fn read_geojson_features(text: &str, id_field: &str) -> Result<Vec<RawFeature>, GeoError> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(GeoError::conversion(
                "expected a GeoJSON FeatureCollection, found a bare geometry",
            ));
        }
    };

    let total = features.len();
    let mut raw = Vec::with_capacity(total);

    for (index, feature) in features.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();

        let Some(id) = property_id(properties.get(id_field)) else {
            log::warn!("Feature {index} has no '{id_field}' property, skipping");
            continue;
        };

        let Some(geometry) = feature
            .geometry
            .and_then(fire_resource_spatial::geojson_to_multipolygon)
        else {
            log::warn!("Feature {id} has no polygon geometry, skipping");
            continue;
        };

        raw.push(RawFeature {
            id,
            properties,
            geometry,
        });
    }

    log::debug!("Read {} of {total} GeoJSON features", raw.len());
    check_unique_ids(&raw)?;
    Ok(raw)
}

/// Reads polygon features from an Esri JSON feature set.
fn read_esri_features(text: &str, id_field: &str) -> Result<Vec<RawFeature>, GeoError> {
    let json: serde_json::Value = serde_json::from_str(text)?;

    let features = json["features"]
        .as_array()
        .ok_or_else(|| GeoError::conversion("No features array in Esri JSON"))?;

    let mut raw = Vec::with_capacity(features.len());

    for (index, feature) in features.iter().enumerate() {
        let properties = feature
            .get("attributes")
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default();

        let Some(id) = property_id(properties.get(id_field)) else {
            log::warn!("Feature {index} has no '{id_field}' attribute, skipping");
            continue;
        };

        let Some(geometry) = feature.get("geometry").and_then(esri_rings_to_multipolygon) else {
            log::warn!("Feature {id} has no ring geometry, skipping");
            continue;
        };

        raw.push(RawFeature {
            id,
            properties,
            geometry,
        });
    }

    check_unique_ids(&raw)?;
    Ok(raw)
}

fn check_unique_ids(features: &[RawFeature]) -> Result<(), GeoError> {
    let mut seen = BTreeSet::new();
    for feature in features {
        if !seen.insert(feature.id.as_str()) {
            return Err(GeoError::conversion(format!(
                "duplicate region id: {}",
                feature.id
            )));
        }
    }
    Ok(())
}

/// Parses an ACS attribute CSV into rows keyed by tract id.
fn parse_attribute_table(
    csv_text: &str,
    fields: &SourceFieldMapping,
) -> Result<BTreeMap<String, AttributeRow>, GeoError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GeoError::conversion(format!("attribute CSV has no '{name}' column")))
    };

    let id_col = column(&fields.id)?;
    let population_col = column(&fields.population)?;
    let housing_cols: Vec<(&str, &str, usize)> = fields
        .housing
        .iter()
        .map(|(category, name)| column(name).map(|col| (category.as_str(), name.as_str(), col)))
        .collect::<Result<_, _>>()?;

    let mut rows = BTreeMap::new();

    for result in reader.records() {
        let record = result?;

        let id = record.get(id_col).unwrap_or("").trim().to_owned();
        if id.is_empty() {
            continue;
        }

        let population = parse_count(
            record.get(population_col).unwrap_or(""),
            &fields.population,
            &id,
        )?;

        let mut housing = HousingUnits::new();
        for &(category, name, col) in &housing_cols {
            housing.insert(category, parse_count(record.get(col).unwrap_or(""), name, &id)?);
        }

        if rows
            .insert(id.clone(), AttributeRow { population, housing })
            .is_some()
        {
            return Err(GeoError::conversion(format!(
                "duplicate attribute row for tract {id}"
            )));
        }
    }

    log::debug!("Parsed {} attribute rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use geo::Area;

    use super::*;

    const TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "GEOID": "48453000101", "population": 1200, "sf": 300, "mf": "100" },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "GEOID": "48453000102", "population": null },
                "geometry": { "type": "MultiPolygon", "coordinates": [[[[2,0],[4,0],[4,2],[2,2],[2,0]]]] }
            },
            {
                "type": "Feature",
                "properties": { "GEOID": "48453000103" },
                "geometry": null
            },
            {
                "type": "Feature",
                "properties": { "NAME": "no id" },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] }
            }
        ]
    }"#;

    fn source_fields() -> SourceFieldMapping {
        SourceFieldMapping {
            housing: [
                ("single_family".to_string(), "sf".to_string()),
                ("multi_family".to_string(), "mf".to_string()),
            ]
            .into_iter()
            .collect(),
            ..SourceFieldMapping::default()
        }
    }

    #[test]
    fn tracts_from_properties() {
        let regions = parse_source_regions(TRACTS, None, &source_fields()).unwrap();
        assert_eq!(regions.len(), 2);

        let first = &regions[0];
        assert_eq!(first.id, "48453000101");
        assert!((first.population - 1200.0).abs() < 1e-9);
        assert!((first.housing.get("single_family") - 300.0).abs() < 1e-9);
        assert!((first.housing.get("multi_family") - 100.0).abs() < 1e-9);
        assert!((first.geometry.unsigned_area() - 4.0).abs() < 1e-9);

        assert!(regions[1].population.abs() < 1e-9);
    }

    #[test]
    fn tracts_join_csv_attributes() {
        let csv = "GEOID,population,sf,mf\n\
                   48453000101,900,200,50\n\
                   48453000102,\"1,100\",10,\n\
                   48453999999,5,1,1\n";
        let regions = parse_source_regions(TRACTS, Some(csv), &source_fields()).unwrap();
        assert_eq!(regions.len(), 2);
        assert!((regions[0].population - 900.0).abs() < 1e-9);
        assert!((regions[1].population - 1100.0).abs() < 1e-9);
        assert!(regions[1].housing.get("multi_family").abs() < 1e-9);
    }

    #[test]
    fn tract_without_csv_row_gets_zero() {
        let csv = "GEOID,population,sf,mf\n48453000101,900,200,50\n";
        let regions = parse_source_regions(TRACTS, Some(csv), &source_fields()).unwrap();
        assert!(regions[1].population.abs() < 1e-9);
        assert!(regions[1].housing.get("single_family").abs() < 1e-9);
    }

    #[test]
    fn csv_missing_column_is_an_error() {
        let csv = "GEOID,population,sf\n48453000101,900,200\n";
        let err = parse_source_regions(TRACTS, Some(csv), &source_fields()).unwrap_err();
        assert!(err.to_string().contains("'mf'"), "{err}");
    }

    #[test]
    fn csv_duplicate_row_is_an_error() {
        let csv = "GEOID,population,sf,mf\n48453000101,1,1,1\n48453000101,2,2,2\n";
        assert!(parse_source_regions(TRACTS, Some(csv), &source_fields()).is_err());
    }

    #[test]
    fn negative_population_is_an_error() {
        let csv = "GEOID,population,sf,mf\n48453000101,-4,1,1\n";
        assert!(parse_source_regions(TRACTS, Some(csv), &source_fields()).is_err());
    }

    #[test]
    fn duplicate_feature_ids_are_an_error() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "response_area_id": "A" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } },
                { "type": "Feature", "properties": { "response_area_id": "A" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } }
            ]
        }"#;
        let err = parse_target_regions(text, &TargetFieldMapping::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate region id: A"));
    }

    #[test]
    fn response_areas_from_esri_json() {
        let text = r#"{
            "features": [
                { "attributes": { "RESPONSE_AREA": 101 },
                  "geometry": { "rings": [[[0,0],[0,3],[3,3],[3,0],[0,0]]] } },
                { "attributes": { "RESPONSE_AREA": 102 },
                  "geometry": null }
            ]
        }"#;
        let fields = TargetFieldMapping {
            id: "RESPONSE_AREA".to_string(),
            format: GeometryFormat::EsriRings,
        };
        let regions = parse_target_regions(text, &fields).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, "101");
        assert!((regions[0].geometry.unsigned_area() - 9.0).abs() < 1e-9);
    }

    #[test]
    fn bare_geometry_is_rejected() {
        let text = r#"{ "type": "Point", "coordinates": [0, 0] }"#;
        assert!(parse_target_regions(text, &TargetFieldMapping::default()).is_err());
    }

    #[test]
    fn loads_from_files() {
        let dir = std::env::temp_dir().join(format!("fire_resource_load_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let tracts_path = dir.join("tracts.geojson");
        std::fs::write(&tracts_path, TRACTS).unwrap();

        let regions = load_source_regions(&tracts_path, None, &source_fields()).unwrap();
        assert_eq!(regions.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
