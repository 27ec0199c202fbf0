//! R-tree spatial index over county bounding boxes
//!
//! The tree is bulk-loaded once from the [`GeometryStore`] and never modified
//! afterwards. Each [`IndexEntry`] points back at a record slot in the store.

use crate::{GeometryStore, RegionId};
use geo::{Point, Rect};
use rstar::{AABB, ParentNode, RTree, RTreeNode, RTreeObject};

/// One indexed bounding box with a back-reference into the store
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Copy of the record's bounding box in (lon, lat)
    pub bounding_box: Rect<f64>,
    pub region_id: RegionId,
    /// Position of the record in the store
    pub slot: usize,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        let (min, max) = (self.bounding_box.min(), self.bounding_box.max());
        AABB::from_corners([min.x, min.y], [max.x, max.y])
    }
}

/// Immutable bulk-loaded R-tree
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexEntry>,
    depth: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Bulk-load the index from every record in the store
    pub fn build(store: &GeometryStore) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let entries: Vec<IndexEntry> = store
            .all()
            .iter()
            .enumerate()
            .map(|(slot, record)| IndexEntry {
                bounding_box: record.bounding_box(),
                region_id: record.region_id().clone(),
                slot,
            })
            .collect();

        if entries.is_empty() {
            return Self {
                tree: RTree::new(),
                depth: 0,
            };
        }

        let tree = RTree::bulk_load(entries);
        let depth = node_depth(tree.root());

        tracing::debug!(entries = tree.size(), depth, "Spatial index built");

        Self { tree, depth }
    }

    /// Region ids whose bounding box contains the point (edges inclusive)
    ///
    /// Results are ordered by store slot. An empty result is a normal outcome.
    pub fn query_candidates(&self, point: Point<f64>) -> Vec<&RegionId> {
        self.candidate_entries(point)
            .into_iter()
            .map(|entry| &entry.region_id)
            .collect()
    }

    /// Store slots whose bounding box contains the point, ascending
    pub(crate) fn candidate_slots(&self, point: Point<f64>) -> Vec<usize> {
        self.candidate_entries(point)
            .into_iter()
            .map(|entry| entry.slot)
            .collect()
    }

    fn candidate_entries(&self, point: Point<f64>) -> Vec<&IndexEntry> {
        // Non-finite coordinates match nothing
        if !(point.x().is_finite() && point.y().is_finite()) {
            return Vec::new();
        }
        let probe = AABB::from_point([point.x(), point.y()]);
        let mut results: Vec<&IndexEntry> = self.tree.locate_in_envelope_intersecting(&probe).collect();
        results.sort_unstable_by_key(|entry| entry.slot);
        results
    }

    /// All entries, in tree order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.tree.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Number of node levels (0 for an empty index)
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Bounding box of the root node, `None` if empty
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        let envelope = self.tree.root().envelope();
        let (lower, upper) = (envelope.lower(), envelope.upper());
        Some(Rect::new((lower[0], lower[1]), (upper[0], upper[1])))
    }
}

/// Levels of parent nodes from `node` down to the deepest leaf
fn node_depth(node: &ParentNode<IndexEntry>) -> usize {
    1 + node
        .children()
        .iter()
        .filter_map(|child| match child {
            RTreeNode::Parent(parent) => Some(node_depth(parent)),
            RTreeNode::Leaf(_) => None,
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NormalizedDataset;
    use crate::geometry;
    use crate::test_support::{Lcg, county, grid_dataset, scattered_dataset, square};

    fn grid_index(cols: usize, rows: usize) -> (GeometryStore, SpatialIndex) {
        let store = GeometryStore::build(grid_dataset(cols, rows)).unwrap();
        let index = SpatialIndex::build(&store);
        (store, index)
    }

    #[test]
    fn test_entry_count_matches_store() {
        let (store, index) = grid_index(40, 25);
        assert_eq!(index.len(), store.len());
        assert!(!index.is_empty());

        let mut slots: Vec<usize> = index.entries().map(|e| e.slot).collect();
        slots.sort_unstable();
        assert_eq!(slots, (0..store.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_depth() {
        let (_, single) = grid_index(1, 1);
        assert_eq!(single.depth(), 1);

        let (_, small) = grid_index(2, 2);
        assert_eq!(small.depth(), 1);

        let (_, large) = grid_index(40, 25);
        assert!(large.depth() > small.depth());
    }

    #[test]
    fn test_root_bbox_matches_extent() {
        let (store, index) = grid_index(40, 25);
        assert_eq!(index.bounding_box(), store.info().extent);
    }

    #[test]
    fn test_soundness_on_grid() {
        let (store, index) = grid_index(40, 25);

        for record in store.all() {
            let c = record.centroid();
            let candidates = index.query_candidates(c);
            assert!(
                candidates.contains(&record.region_id()),
                "{} missing from candidates at {:?}",
                record.region_id(),
                c
            );
        }
    }

    #[test]
    fn test_soundness_on_overlapping_irregular_polygons() {
        let store = GeometryStore::build(scattered_dataset(0x5eed, 400)).unwrap();
        let index = SpatialIndex::build(&store);
        let mut rng = Lcg::new(42);
        let mut contained_hits = 0;

        for _ in 0..5000 {
            let point = Point::new(rng.range(-123.0, -72.0), rng.range(25.0, 50.0));
            let candidates = index.candidate_slots(point);

            // Exactly the records whose bounding box covers the point
            let expected: Vec<usize> = store
                .all()
                .iter()
                .enumerate()
                .filter(|(_, record)| geometry::rect_contains_point(&record.bounding_box(), point))
                .map(|(slot, _)| slot)
                .collect();
            assert_eq!(candidates, expected, "candidate mismatch at {point:?}");

            for (slot, record) in store.all().iter().enumerate() {
                if record.contains(point) {
                    contained_hits += 1;
                    assert!(
                        candidates.contains(&slot),
                        "{} contains {point:?} but was not a candidate",
                        record.region_id()
                    );
                }
            }
        }

        // Make sure the layout produces real hits
        assert!(contained_hits > 500, "only {contained_hits} containing hits");
    }

    #[test]
    fn test_shared_edge_is_inclusive() {
        let (_, index) = grid_index(2, 1);
        // x = -99 is the border between county 001 and 002
        let candidates = index.query_candidates(Point::new(-99.0, 30.5));
        let ids: Vec<&str> = candidates.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["48001", "48002"]);
    }

    #[test]
    fn test_miss_is_empty() {
        let (_, index) = grid_index(3, 3);
        assert!(index.query_candidates(Point::new(0.0, 0.0)).is_empty());
        assert!(index.candidate_slots(Point::new(f64::NAN, 30.5)).is_empty());
    }

    #[test]
    fn test_overlapping_boxes() {
        let dataset = NormalizedDataset {
            records: vec![
                county("01", "001", "Big", vec![square(0.0, 0.0, 10.0)]),
                county("01", "002", "Small", vec![square(4.0, 4.0, 2.0)]),
            ],
        };
        let store = GeometryStore::build(dataset).unwrap();
        let index = SpatialIndex::build(&store);

        assert_eq!(index.candidate_slots(Point::new(5.0, 5.0)), vec![0, 1]);
        assert_eq!(index.candidate_slots(Point::new(1.0, 1.0)), vec![0]);
    }

    #[test]
    fn test_empty_index() {
        let store = GeometryStore::default();
        let index = SpatialIndex::build(&store);
        assert!(index.is_empty());
        assert_eq!(index.depth(), 0);
        assert_eq!(index.bounding_box(), None);
        assert!(index.query_candidates(Point::new(0.0, 0.0)).is_empty());
    }
}
