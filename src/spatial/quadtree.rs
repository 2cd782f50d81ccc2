//! Point quadtree with capacity-driven subdivision.
//!
//! Leaves hold up to `capacity` points. A full leaf splits into four quadrants at its
//! midpoint and hands its points down. Children are created on first use. When a split
//! cannot separate a leaf's points (they all coincide, or the leaf sits at [`MAX_DEPTH`])
//! the leaf keeps the extra point and raises its own capacity by `1 / fill_factor`, so
//! repeated duplicates stop triggering split attempts.

use serde::Deserialize;

use crate::models::{BoundingBox, GeoPoint};

/// Maximum depth of the quadtree to prevent runaway subdivision
const MAX_DEPTH: u32 = 20;

const NW: usize = 0;
const NE: usize = 1;
const SW: usize = 2;
const SE: usize = 3;

/// Subdivision parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuadTreeConfig {
    /// Points a leaf holds before it tries to split
    pub capacity: usize,
    /// Capacity growth factor after a split that could not separate points (0, 1]
    pub fill_factor: f64,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            fill_factor: 0.55,
        }
    }
}

/// Spatial index over points carrying a payload `T`
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    root: QuadTreeNode<T>,
    fill_factor: f64,
    len: usize,
}

#[derive(Debug, Clone)]
struct QuadTreeNode<T> {
    bounding_box: BoundingBox,
    level: u32,
    /// Effective capacity; grows when a split would not separate anything
    capacity: usize,
    items: Vec<(GeoPoint, T)>,
    /// NW, NE, SW, SE
    children: [Option<Box<QuadTreeNode<T>>>; 4],
    split: bool,
}

impl<T: Clone> QuadTree<T> {
    pub fn new(bounding_box: BoundingBox, config: QuadTreeConfig) -> Self {
        Self {
            root: QuadTreeNode::new(bounding_box, 0, config.capacity.max(1)),
            fill_factor: config.fill_factor.clamp(f64::EPSILON, 1.0),
            len: 0,
        }
    }

    /// Insert a point. Returns `false` if it lies outside the tree's box.
    pub fn insert(&mut self, point: GeoPoint, item: T) -> bool {
        if !self.root.bounding_box.contains(&point) {
            return false;
        }
        self.root.insert(point, item, self.fill_factor);
        self.len += 1;
        true
    }

    /// Append every item whose point lies in `query` to `out`.
    pub fn query_in_box(&self, query: &BoundingBox, out: &mut Vec<T>) {
        self.root.query(query, out);
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.root.bounding_box
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Deepest level holding a node (root = 0)
    pub fn depth(&self) -> u32 {
        self.root.depth()
    }
}

impl<T: Clone> QuadTreeNode<T> {
    fn new(bounding_box: BoundingBox, level: u32, capacity: usize) -> Self {
        Self {
            bounding_box,
            level,
            capacity,
            items: Vec::new(),
            children: [None, None, None, None],
            split: false,
        }
    }

    fn insert(&mut self, point: GeoPoint, item: T, fill_factor: f64) {
        if self.split {
            self.child_for(&point).insert(point, item, fill_factor);
            return;
        }

        if self.items.len() < self.capacity {
            self.items.push((point, item));
            return;
        }

        if self.level >= MAX_DEPTH || !self.would_separate(&point) {
            self.items.push((point, item));
            self.capacity = grown_capacity(self.capacity, fill_factor);
            return;
        }

        self.subdivide();
        self.child_for(&point).insert(point, item, fill_factor);
    }

    /// A split helps only if the leaf's points are not all the same coordinate
    fn would_separate(&self, point: &GeoPoint) -> bool {
        self.items.iter().any(|(p, _)| p != point)
    }

    fn subdivide(&mut self) {
        self.split = true;
        for (point, item) in std::mem::take(&mut self.items) {
            self.child_for(&point).items.push((point, item));
        }
    }

    fn quadrant_of(&self, point: &GeoPoint) -> usize {
        let mid = self.bounding_box.center();
        match (point.lat >= mid.lat, point.lon >= mid.lon) {
            (true, false) => NW,
            (true, true) => NE,
            (false, false) => SW,
            (false, true) => SE,
        }
    }

    fn child_for(&mut self, point: &GeoPoint) -> &mut QuadTreeNode<T> {
        let quadrant = self.quadrant_of(point);
        let bounding_box = self.bounding_box.quadrants()[quadrant];
        let (level, capacity) = (self.level + 1, self.capacity);
        self.children[quadrant]
            .get_or_insert_with(|| Box::new(QuadTreeNode::new(bounding_box, level, capacity)))
    }

    fn query(&self, query: &BoundingBox, out: &mut Vec<T>) {
        if !self.bounding_box.intersects(query) {
            return;
        }

        out.extend(
            self.items
                .iter()
                .filter(|(p, _)| query.contains(p))
                .map(|(_, item)| item.clone()),
        );

        for child in self.children.iter().flatten() {
            child.query(query, out);
        }
    }

    fn depth(&self) -> u32 {
        self.children
            .iter()
            .flatten()
            .map(|c| c.depth())
            .max()
            .unwrap_or(self.level)
    }
}

fn grown_capacity(capacity: usize, fill_factor: f64) -> usize {
    let grown = (capacity as f64 / fill_factor).ceil() as usize;
    grown.max(capacity + 1)
}
