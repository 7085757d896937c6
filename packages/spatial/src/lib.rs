#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial helpers for the tract-to-response-area crosswalk.
//!
//! Builds an R-tree over polygon bounding boxes so only pairs whose
//! envelopes intersect are handed to the (expensive) polygon overlay,
//! converts `GeoJSON` geometries into [`MultiPolygon`]s, and validates
//! and repairs polygons before they are intersected (see [`repair`]).

pub mod repair;

use geo::{BoundingRect, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};

/// A polygon's bounding box stored in the R-tree, pointing back at the
/// polygon's position in the caller's slice.
struct EnvelopeEntry {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EnvelopeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box index over a fixed collection of polygons.
///
/// Constructed once per crosswalk build. Lookups return positions into
/// the collection the index was built from.
pub struct EnvelopeIndex {
    tree: RTree<EnvelopeEntry>,
}

impl EnvelopeIndex {
    /// Bulk-loads the envelopes of `polygons`. Polygons without a bounding
    /// box (no coordinates) are left out.
    pub fn build<'a>(polygons: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let entries: Vec<EnvelopeEntry> = polygons
            .into_iter()
            .enumerate()
            .filter_map(|(position, polygon)| {
                compute_envelope(polygon).map(|envelope| EnvelopeEntry { position, envelope })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions of every indexed polygon whose envelope intersects the
    /// envelope of `polygon`, in ascending order.
    ///
    /// Envelopes that merely touch count as intersecting; the overlay
    /// step discards the resulting zero-area intersections.
    #[must_use]
    pub fn candidates(&self, polygon: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(query_env) = compute_envelope(polygon) else {
            return Vec::new();
        };

        let mut positions: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();
        positions
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn geojson_to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}
