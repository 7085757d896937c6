//! Normalizes raw feature properties and geometries.
//!
//! Boundary files from city portals and the Census Bureau disagree on
//! whether ids are strings or numbers, whether counts are numbers or
//! numeric strings, and whether geometry is `GeoJSON` or Esri `rings`.
//! Everything here converts those into one shape.

use geo::{Contains, LineString, MultiPolygon, Point, Polygon, Winding};

use crate::GeoError;

/// Extracts an identifier from a property value.
///
/// Strings are trimmed; numbers are rendered without a fractional part
/// when they are whole. Empty strings and other types yield `None`.
#[must_use]
pub fn property_id(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract().abs() < f64::EPSILON && f.abs() < 9.0e15 => {
                format!("{f:.0}")
            }
            _ => n.to_string(),
        }),
        _ => None,
    }
}

/// Extracts a non-negative count from a property value.
///
/// Missing, `null` and empty-string values count as zero.
///
/// # Errors
///
/// Returns [`GeoError::Conversion`] for negative, non-finite or
/// non-numeric values.
pub fn property_count(
    value: Option<&serde_json::Value>,
    field: &str,
    region_id: &str,
) -> Result<f64, GeoError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(0.0),
        Some(serde_json::Value::Number(n)) => {
            let count = n.as_f64().ok_or_else(|| {
                GeoError::conversion(format!("{region_id}: {field} is not representable: {n}"))
            })?;
            check_count(count, field, region_id)
        }
        Some(serde_json::Value::String(s)) => parse_count(s, field, region_id),
        Some(other) => Err(GeoError::conversion(format!(
            "{region_id}: {field} is not a number: {other}"
        ))),
    }
}

/// Parses a non-negative count from text (e.g. a CSV cell).
///
/// Empty cells count as zero. Thousands separators are tolerated.
///
/// # Errors
///
/// Returns [`GeoError::Conversion`] for negative, non-finite or
/// non-numeric text.
pub fn parse_count(raw: &str, field: &str, region_id: &str) -> Result<f64, GeoError> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return Ok(0.0);
    }

    let count: f64 = cleaned.parse().map_err(|_| {
        GeoError::conversion(format!("{region_id}: {field} is not a number: {raw:?}"))
    })?;
    check_count(count, field, region_id)
}

fn check_count(count: f64, field: &str, region_id: &str) -> Result<f64, GeoError> {
    if !count.is_finite() || count < 0.0 {
        return Err(GeoError::conversion(format!(
            "{region_id}: {field} must be a non-negative number, got {count}"
        )));
    }
    Ok(count)
}

/// Converts Esri JSON geometry (`{ "rings": [...] }`) into a
/// [`MultiPolygon`].
///
/// Esri marks exterior rings clockwise and holes counter-clockwise. Each
/// hole is attached to the first exterior that contains it; a hole with
/// no containing exterior is kept as an exterior of its own.
#[must_use]
pub fn esri_rings_to_multipolygon(esri_geom: &serde_json::Value) -> Option<MultiPolygon<f64>> {
    let rings = esri_geom.get("rings")?.as_array()?;

    let mut exteriors: Vec<Polygon<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        let coords: Vec<(f64, f64)> = ring
            .as_array()?
            .iter()
            .filter_map(|position| {
                let position = position.as_array()?;
                Some((position.first()?.as_f64()?, position.get(1)?.as_f64()?))
            })
            .collect();

        if coords.len() < 3 {
            continue;
        }

        let mut line = LineString::from(coords);
        line.close();
        if line.is_ccw() {
            holes.push(line);
        } else {
            exteriors.push(Polygon::new(line, Vec::new()));
        }
    }

    for hole in holes {
        let container = hole
            .0
            .first()
            .map(|c| Point::from(*c))
            .and_then(|p| exteriors.iter_mut().find(|poly| poly.contains(&p)));

        match container {
            Some(polygon) => polygon.interiors_push(hole),
            None => exteriors.push(Polygon::new(hole, Vec::new())),
        }
    }

    (!exteriors.is_empty()).then(|| MultiPolygon(exteriors))
}

#[cfg(test)]
mod tests {
    use geo::Area;
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_from_strings_and_numbers() {
        assert_eq!(
            property_id(Some(&json!(" 48453001100 "))),
            Some("48453001100".to_string())
        );
        assert_eq!(property_id(Some(&json!(42))), Some("42".to_string()));
        assert_eq!(property_id(Some(&json!(17.0))), Some("17".to_string()));
        assert_eq!(property_id(Some(&json!(""))), None);
        assert_eq!(property_id(Some(&json!(null))), None);
        assert_eq!(property_id(None), None);
    }

    #[test]
    fn counts_accept_numbers_and_numeric_strings() {
        assert!((property_count(Some(&json!(1200)), "pop", "t").unwrap() - 1200.0).abs() < 1e-9);
        assert!((property_count(Some(&json!("1,250")), "pop", "t").unwrap() - 1250.0).abs() < 1e-9);
        assert!(property_count(Some(&json!(null)), "pop", "t").unwrap().abs() < 1e-9);
        assert!(property_count(None, "pop", "t").unwrap().abs() < 1e-9);
        assert!(parse_count("  ", "pop", "t").unwrap().abs() < 1e-9);
    }

    #[test]
    fn counts_reject_negative_and_garbage() {
        assert!(property_count(Some(&json!(-5)), "pop", "t").is_err());
        assert!(property_count(Some(&json!("n/a")), "pop", "t").is_err());
        assert!(property_count(Some(&json!([1])), "pop", "t").is_err());
        assert!(parse_count("NaN", "pop", "t").is_err());
    }

    #[test]
    fn esri_single_ring() {
        let geom = json!({
            "rings": [[[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0], [0.0, 0.0]]]
        });
        let mp = esri_rings_to_multipolygon(&geom).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn esri_hole_is_attached_to_its_exterior() {
        let geom = json!({
            "rings": [
                // clockwise exterior
                [[0.0, 0.0], [0.0, 4.0], [4.0, 4.0], [4.0, 0.0], [0.0, 0.0]],
                // counter-clockwise hole
                [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0]],
                // second clockwise exterior
                [[10.0, 10.0], [10.0, 11.0], [11.0, 11.0], [11.0, 10.0], [10.0, 10.0]]
            ]
        });
        let mp = esri_rings_to_multipolygon(&geom).unwrap();
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!((mp.unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn esri_without_rings_is_none() {
        assert!(esri_rings_to_multipolygon(&json!({ "x": 1.0, "y": 2.0 })).is_none());
        assert!(esri_rings_to_multipolygon(&json!({ "rings": [] })).is_none());
    }
}
