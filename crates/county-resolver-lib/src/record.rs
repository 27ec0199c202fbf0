//! Polygon record storage
//!
//! This module provides the `PolygonRecord` struct holding one county boundary
//! with precomputed metadata like bounding box, centroid and counts.

use crate::geometry;
use crate::loader::CountyBoundary;
use geo::{BoundingRect, Centroid, Contains, MultiPolygon, Point, Rect};
use std::fmt;

/// Opaque county identifier: state code followed by county code (e.g. `"06037"`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(state_code: &str, county_code: &str) -> Self {
        Self(format!("{state_code}{county_code}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single county boundary with raw geometry and precomputed metadata
#[derive(Clone, Debug)]
pub struct PolygonRecord {
    region_id: RegionId,
    state_code: String,
    county_code: String,
    name: String,
    /// Rings in (lon, lat), possibly multi-part, possibly with holes
    boundary: MultiPolygon<f64>,
    /// Precomputed bounding box in (lon, lat)
    bounding_box: Rect<f64>,
    /// Precomputed centroid used by degraded lookups
    centroid: Point<f64>,
    /// Cached bounding-box area in square degrees (tie-break key)
    bounding_box_area: f64,
    /// Cached ring count (exteriors + holes)
    cached_ring_count: usize,
    /// Cached total number of positions
    cached_coordinate_count: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PolygonRecord {
    /// Create a record from a validated boundary.
    ///
    /// Returns `None` when the boundary is degenerate (no coordinates), which the
    /// loader already rejects; such a record would have no bounding box to index.
    pub fn new(source: CountyBoundary) -> Option<Self> {
        let CountyBoundary {
            state_code,
            county_code,
            name,
            boundary,
        } = source;

        // Compute all metadata in a single pass
        let bounding_box = boundary.bounding_rect()?;
        let centroid = boundary
            .centroid()
            .unwrap_or_else(|| geometry::rect_center(&bounding_box).into());
        let (ring_count, coordinate_count) = Self::count_rings_and_coords(&boundary);

        Some(Self {
            region_id: RegionId::new(&state_code, &county_code),
            state_code,
            county_code,
            name,
            boundary,
            bounding_box,
            centroid,
            bounding_box_area: geometry::rect_area(&bounding_box),
            cached_ring_count: ring_count,
            cached_coordinate_count: coordinate_count,
        })
    }

    fn count_rings_and_coords(boundary: &MultiPolygon<f64>) -> (usize, usize) {
        boundary
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
            .fold((0, 0), |(rings, coords), ring| (rings + 1, coords + ring.0.len()))
    }

    /// Exact containment test honoring holes.
    ///
    /// Points exactly on a boundary edge are not contained.
    #[inline]
    pub fn contains(&self, point: Point<f64>) -> bool {
        geometry::rect_contains_point(&self.bounding_box, point) && self.boundary.contains(&point)
    }

    #[inline]
    pub fn region_id(&self) -> &RegionId {
        &self.region_id
    }

    #[inline]
    pub fn state_code(&self) -> &str {
        &self.state_code
    }

    #[inline]
    pub fn county_code(&self) -> &str {
        &self.county_code
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn boundary(&self) -> &MultiPolygon<f64> {
        &self.boundary
    }

    /// Get the bounding box in (lon, lat)
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box
    }

    #[inline]
    pub fn bounding_box_area(&self) -> f64 {
        self.bounding_box_area
    }

    #[inline]
    pub fn centroid(&self) -> Point<f64> {
        self.centroid
    }

    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn ring_count(&self) -> usize {
        self.cached_ring_count
    }

    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn coordinate_count(&self) -> usize {
        self.cached_coordinate_count
    }
}
