//! Degraded-mode provider
//!
//! Best-effort answers for when neither the bundled lookup nor the remote
//! authority produced a county: the record whose centroid is closest to the
//! query point. Results are never authoritative.

use crate::{GeometryStore, RegionId, geometry};
use geo::Point;

/// Nearest record by great-circle distance to its precomputed centroid.
///
/// Ties go to the earliest record in load order; `None` for an empty store.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn nearest(point: Point<f64>, store: &GeometryStore) -> Option<&RegionId> {
    nearest_slot(point, store).and_then(|slot| store.by_slot(slot).map(|r| r.region_id()))
}

fn nearest_slot(point: Point<f64>, store: &GeometryStore) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (slot, record) in store.all().iter().enumerate() {
        let distance = geometry::haversine_distance(point, record.centroid());
        // Strict comparison keeps the earliest record on ties
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((slot, distance));
        }
    }
    best.map(|(slot, _)| slot)
}
