//! Utility functions for coordinate validation and bounding-box operations
//!
//! All geometry in this crate uses WGS84 degrees with `x = longitude` and
//! `y = latitude`, matching the GeoJSON axis order.

use geo::{Coord, Point, Rect};

/// Valid latitude range in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Valid longitude range in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Mean Earth radius in meters, used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Check that a latitude/longitude pair is finite and within WGS84 bounds
#[inline(always)]
pub fn is_valid_wgs84(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
        && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon)
}

/// Build a `geo::Point` from latitude and longitude (x = lon, y = lat)
#[inline(always)]
pub fn point_from_lat_lon(lat: f64, lon: f64) -> Point<f64> {
    Point::new(lon, lat)
}

/// Build a rectangle from `[min_lon, min_lat, max_lon, max_lat]`
#[inline]
pub fn rect_from_array(bbox: [f64; 4]) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bbox[0],
            y: bbox[1],
        },
        Coord {
            x: bbox[2],
            y: bbox[3],
        },
    )
}

/// Flatten a rectangle into `[min_lon, min_lat, max_lon, max_lat]`
#[inline]
pub fn rect_to_array(rect: &Rect<f64>) -> [f64; 4] {
    [rect.min().x, rect.min().y, rect.max().x, rect.max().y]
}

/// Inclusive point-in-rectangle test.
///
/// Points lying exactly on an edge count as inside, so a polygon's bounding box
/// never rejects a point on the polygon boundary.
#[inline(always)]
pub fn rect_contains_point(rect: &Rect<f64>, point: Point<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();
    point.x() >= min.x && point.x() <= max.x && point.y() >= min.y && point.y() <= max.y
}

/// Returns true if `outer` fully encloses `inner` (edges may touch)
#[inline]
pub fn rect_encloses(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

/// Smallest rectangle covering both inputs
#[inline]
pub fn rect_union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Planar area of a rectangle in square degrees
#[inline(always)]
pub fn rect_area(rect: &Rect<f64>) -> f64 {
    rect.width() * rect.height()
}

/// Center of a rectangle
#[inline(always)]
pub fn rect_center(rect: &Rect<f64>) -> Coord<f64> {
    Coord {
        x: (rect.min().x + rect.max().x) / 2.0,
        y: (rect.min().y + rect.max().y) / 2.0,
    }
}

/// Haversine distance between two WGS84 points in meters
#[inline]
pub fn haversine_distance(p1: Point<f64>, p2: Point<f64>) -> f64 {
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();
    let delta_lat = (p2.y() - p1.y()).to_radians();
    let delta_lon = (p2.x() - p1.x()).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
