//! Bounding-box spatial index over building footprints.
//!
//! The index is the coarse half of the two-stage filter: it cheaply rules
//! out every record whose envelope cannot touch the query buffer, leaving
//! the exact (and expensive) intersection test to run on a handful of
//! candidates instead of the whole dataset.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::Geometry;
use rstar::{RTree, RTreeObject, AABB};

/// Record envelope stored in the R-tree. Carries only the position of the
/// record in the dataset; the geometry itself stays in the store.
#[derive(Debug, Clone, PartialEq)]
struct IndexedEnvelope {
    id: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Immutable R-tree over record bounding boxes, built once at dataset load.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<IndexedEnvelope>,
}

impl SpatialIndex {
    /// Bulk-load the index from record geometries. Records without a
    /// computable bounding box (empty geometries) are skipped.
    pub fn bulk_load<'a>(geometries: impl IntoIterator<Item = (usize, &'a Geometry<f64>)>) -> Self {
        let indexed: Vec<IndexedEnvelope> = geometries
            .into_iter()
            .filter_map(|(id, geometry)| {
                geometry.bounding_rect().map(|rect| IndexedEnvelope {
                    id,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self { tree: RTree::bulk_load(indexed) }
    }

    /// Record ids whose envelope intersects the given bounding box.
    pub fn candidates(&self, min: [f64; 2], max: [f64; 2]) -> Vec<usize> {
        let query = AABB::from_corners(min, max);
        self.tree.locate_in_envelope_intersecting(&query).map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
