//! Point-in-polygon lookup over one layer.
//!
//! Each polygon of every feature gets its bounding box in an R-tree. A query
//! collects the boxes covering the point, then runs an exact, boundary-inclusive
//! ring test. When several features contain the point the one ingested first
//! wins, which keeps answers identical across rebuilds from the same input.

use crate::types::{LayerFeature, Properties};
use geo::{BoundingRect, Intersects, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::debug;

// One entry per polygon, pointing back at its feature.
struct PolygonEntry {
    feature: usize,
    polygon: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Read-only spatial index built once per layer.
pub struct AdminLookup {
    features: Vec<LayerFeature>,
    tree: RTree<PolygonEntry>,
}

impl AdminLookup {
    /// Builds the index. An empty collection yields an index that never matches.
    pub fn build(features: Vec<LayerFeature>) -> Self {
        let entries: Vec<PolygonEntry> = features
            .iter()
            .enumerate()
            .flat_map(|(feature, f)| {
                f.geometry
                    .0
                    .iter()
                    .enumerate()
                    .filter_map(move |(polygon, p)| {
                        // Empty rings have no extent and can never contain a point.
                        let rect = p.bounding_rect()?;
                        Some(PolygonEntry {
                            feature,
                            polygon,
                            aabb: AABB::from_corners(
                                [rect.min().x, rect.min().y],
                                [rect.max().x, rect.max().y],
                            ),
                        })
                    })
            })
            .collect();

        debug!(
            features = features.len(),
            polygons = entries.len(),
            "building spatial index"
        );

        Self {
            features,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the feature whose geometry contains the point, if any.
    pub fn containing(&self, longitude: f64, latitude: f64) -> Option<&LayerFeature> {
        let point = Point::new(longitude, latitude);
        let envelope = AABB::from_point([longitude, latitude]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| {
                point.intersects(&self.features[entry.feature].geometry.0[entry.polygon])
            })
            .map(|entry| entry.feature)
            .min()
            .map(|feature| &self.features[feature])
    }

    /// Minimal properties of the containing feature, or an empty map on no match.
    pub fn search(&self, longitude: f64, latitude: f64) -> Properties {
        self.containing(longitude, latitude)
            .map(|feature| feature.properties.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
