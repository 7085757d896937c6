//! Polygon validation and repair.
//!
//! Real-world boundary files carry winding-order inconsistencies,
//! self-touching rings and the occasional bow-tie. Every polygon is run
//! through [`validate`] before intersection, which returns a tagged
//! [`GeometryStatus`] instead of an error so a batch can keep going and
//! report the failures afterwards.

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, CoordsIter, MultiPolygon, Validation, unary_union};

/// Outcome of validating one polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryStatus {
    /// Valid as given. Rings are re-oriented (exterior counter-clockwise,
    /// interiors clockwise).
    Valid(MultiPolygon<f64>),
    /// Invalid as given, made valid by a zero-width overlay.
    Repaired(MultiPolygon<f64>),
    /// Could not be made into a polygon with positive area.
    Invalid {
        /// Why the geometry was rejected.
        reason: String,
    },
}

impl GeometryStatus {
    /// The usable geometry, if any.
    #[must_use]
    pub const fn geometry(&self) -> Option<&MultiPolygon<f64>> {
        match self {
            Self::Valid(mp) | Self::Repaired(mp) => Some(mp),
            Self::Invalid { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_repaired(&self) -> bool {
        matches!(self, Self::Repaired(_))
    }
}

/// Validates `geometry`, repairing it if needed.
///
/// Non-finite coordinates are rejected outright since no overlay can fix
/// them. Otherwise geometry failing OGC validity (self-intersections,
/// overlapping parts, degenerate rings) is passed through
/// [`zero_width_overlay`]. Anything left with no positive area is
/// [`GeometryStatus::Invalid`].
#[must_use]
pub fn validate(geometry: &MultiPolygon<f64>) -> GeometryStatus {
    if geometry.0.is_empty() {
        return GeometryStatus::Invalid {
            reason: "geometry has no polygons".to_string(),
        };
    }

    if !geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
    {
        return GeometryStatus::Invalid {
            reason: "geometry has non-finite coordinates".to_string(),
        };
    }

    let (candidate, repaired) = if geometry.is_valid() {
        (geometry.orient(Direction::Default), false)
    } else {
        let fixed = zero_width_overlay(geometry).orient(Direction::Default);
        (fixed, true)
    };

    let area = candidate.unsigned_area();
    if candidate.0.is_empty() || !area.is_finite() || area <= 0.0 {
        return GeometryStatus::Invalid {
            reason: if repaired {
                "geometry has no area after repair".to_string()
            } else {
                "geometry has no area".to_string()
            },
        };
    }

    if repaired {
        GeometryStatus::Repaired(candidate)
    } else {
        GeometryStatus::Valid(candidate)
    }
}

/// The polygon equivalent of a zero-distance buffer.
///
/// Each part is first re-noded on its own through the overlay engine
/// against an empty clip, which splits self-crossing rings into simple
/// ones. The re-noded parts are then oriented and merged with
/// [`unary_union`], so parts that overlap or repeat each other add up to
/// their combined footprint instead of cancelling out.
#[must_use]
pub fn zero_width_overlay(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let empty = MultiPolygon::<f64>::new(Vec::new());
    let parts: Vec<MultiPolygon<f64>> = geometry
        .iter()
        .map(|part| part.union(&empty).orient(Direction::Default))
        .filter(|part| !part.0.is_empty())
        .collect();

    unary_union(&parts)
}
