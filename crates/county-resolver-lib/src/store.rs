//! GeometryStore - Owner of every county boundary
//!
//! This module turns a [`NormalizedDataset`] into immutable [`PolygonRecord`]s,
//! computing per-record metadata in parallel while preserving load order.

use crate::loader::NormalizedDataset;
use crate::{LoadError, PolygonRecord, RegionId, Result, geometry};

use geo::Rect;
use rayon::prelude::*;
use std::collections::HashMap;

/// Summary of the loaded geometry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreInfo {
    /// Number of county records
    pub record_count: usize,
    /// Total rings (exteriors + holes)
    pub ring_count: usize,
    /// Total boundary positions
    pub coordinate_count: usize,
    /// Union of all bounding boxes in (lon, lat), `None` if empty
    pub extent: Option<Rect<f64>>,
}

/// Exclusive owner of all polygon records
///
/// Other components refer to records by [`RegionId`] or by slot (position in
/// load order), never by copying boundary geometry.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    /// Records in load order
    records: Vec<PolygonRecord>,
    /// Region id -> slot
    slots: HashMap<RegionId, usize>,
    /// Aggregate statistics, computed once at build
    info: StoreInfo,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryStore {
    /// Build the store from a loaded dataset
    ///
    /// Bounding boxes, centroids and counts are computed here exactly once.
    pub fn build(dataset: NormalizedDataset) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("store::build");

        // Compute metadata in parallel; collect preserves input order
        let records: Vec<PolygonRecord> = dataset
            .records
            .into_par_iter()
            .enumerate()
            .map(|(index, boundary)| {
                PolygonRecord::new(boundary).ok_or_else(|| LoadError::Corrupt {
                    record: index,
                    reason: "boundary has no coordinates".to_string(),
                })
            })
            .collect::<Result<_>>()?;

        let mut slots = HashMap::with_capacity(records.len());
        for (slot, record) in records.iter().enumerate() {
            if slots.insert(record.region_id().clone(), slot).is_some() {
                return Err(LoadError::Corrupt {
                    record: slot,
                    reason: format!("duplicate region id {}", record.region_id()),
                });
            }
        }

        let info = Self::compute_info(&records);
        tracing::debug!(
            records = info.record_count,
            rings = info.ring_count,
            coordinates = info.coordinate_count,
            "Geometry store built"
        );

        Ok(Self {
            records,
            slots,
            info,
        })
    }

    fn compute_info(records: &[PolygonRecord]) -> StoreInfo {
        let mut info = StoreInfo {
            record_count: records.len(),
            ..Default::default()
        };
        for record in records {
            info.ring_count += record.ring_count();
            info.coordinate_count += record.coordinate_count();

            let bbox = record.bounding_box();
            info.extent = Some(match info.extent {
                Some(extent) => geometry::rect_union(&extent, &bbox),
                None => bbox,
            });
        }
        info
    }

    /// Get a record by region id
    #[inline]
    pub fn get(&self, region_id: &RegionId) -> Option<&PolygonRecord> {
        self.slot(region_id).and_then(|slot| self.records.get(slot))
    }

    /// Get a record by its two identifier parts
    #[inline]
    pub fn get_by_codes(&self, state_code: &str, county_code: &str) -> Option<&PolygonRecord> {
        self.get(&RegionId::new(state_code, county_code))
    }

    /// Position of a record in load order
    #[inline]
    pub fn slot(&self, region_id: &RegionId) -> Option<usize> {
        self.slots.get(region_id).copied()
    }

    #[inline]
    pub fn by_slot(&self, slot: usize) -> Option<&PolygonRecord> {
        self.records.get(slot)
    }

    /// All records in load order
    #[inline]
    pub fn all(&self) -> &[PolygonRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get store information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn info(&self) -> &StoreInfo {
        &self.info
    }
}
