//! Candidate selection over the ingested points.

use tracing::debug;

use super::quadtree::{QuadTree, QuadTreeConfig};
use crate::models::{BoundingBox, GeoPoint};

/// Builds a quadtree over a run's points and enumerates the resolution candidates.
///
/// Without a radius the candidate query covers the tree's own bounding box, so every
/// point comes back once in tree order. With a radius, points within `radius_m` meters of
/// an earlier kept point are dropped and the survivors keep input order.
#[derive(Debug, Clone, Default)]
pub struct SpatialDeduplicator {
    config: QuadTreeConfig,
    radius_m: Option<f64>,
}

impl SpatialDeduplicator {
    pub fn new(config: QuadTreeConfig, radius_m: Option<f64>) -> Self {
        Self {
            config,
            radius_m: radius_m.filter(|r| *r > 0.0),
        }
    }

    /// Index points by their position in `points`. `None` for empty input.
    pub fn build_index(&self, points: &[GeoPoint]) -> Option<QuadTree<usize>> {
        let bbox = BoundingBox::enclosing(points)?;
        let mut tree = QuadTree::new(bbox, self.config);
        for (i, p) in points.iter().enumerate() {
            tree.insert(*p, i);
        }
        Some(tree)
    }

    pub fn candidates(&self, points: &[GeoPoint]) -> Vec<GeoPoint> {
        let Some(tree) = self.build_index(points) else {
            return Vec::new();
        };

        let selected = match self.radius_m {
            None => {
                let mut found = Vec::with_capacity(points.len());
                tree.query_in_box(&tree.bounding_box(), &mut found);
                found
            }
            Some(radius) => collapse_within(&tree, points, radius),
        };

        debug!(
            "Spatial index depth {}, {} of {} points selected",
            tree.depth(),
            selected.len(),
            points.len()
        );

        selected.into_iter().map(|i| points[i]).collect()
    }
}

fn collapse_within(tree: &QuadTree<usize>, points: &[GeoPoint], radius: f64) -> Vec<usize> {
    let mut suppressed = vec![false; points.len()];
    let mut kept = Vec::new();
    let mut nearby = Vec::new();

    for (i, p) in points.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        kept.push(i);

        nearby.clear();
        tree.query_in_box(&p.surrounding_box(radius), &mut nearby);
        for &j in &nearby {
            if j > i && !suppressed[j] && p.distance_meters(&points[j]) <= radius {
                suppressed[j] = true;
            }
        }
    }

    kept
}
