//! Region quadtree over a bounded area.
//!
//! A leaf splits into four quadrants once it holds more than `capacity` units
//! and is above `max_depth`; all of its units move down at that point, so units
//! always live in leaves. Units outside the root bounds are kept in a separate
//! overflow bucket and stay queryable. Removing units collapses a subtree back
//! into a single leaf once it holds `capacity` units or fewer.
//!
//! The location handle of a unit is its cached position: descending from the
//! root by position always reaches the leaf that owns it.
//!
//! Pairing is exact: one pruned range query per unit.

use super::{exact_pairs, PairMap, Rect, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct QuadNode {
    bounds: Rect,
    depth: u32,
    /// Units in this subtree.
    count: usize,
    items: Vec<SpatialEntry>,
    children: Option<Box<[QuadNode; 4]>>,
}

/// Quadrant index: bit 0 = east half, bit 1 = north half.
#[inline]
fn quadrant(bounds: &Rect, p: Position) -> usize {
    let c = bounds.center();
    usize::from(p.x >= c.x) | (usize::from(p.y >= c.y) << 1)
}

fn child_bounds(bounds: &Rect, q: usize) -> Rect {
    let c = bounds.center();
    let (min_x, max_x) = if q & 1 == 0 { (bounds.min_x, c.x) } else { (c.x, bounds.max_x) };
    let (min_y, max_y) = if q & 2 == 0 { (bounds.min_y, c.y) } else { (c.y, bounds.max_y) };
    Rect::new(min_x, min_y, max_x, max_y)
}

impl QuadNode {
    fn leaf(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            count: 0,
            items: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, entry: SpatialEntry, capacity: usize, max_depth: u32) {
        let q = quadrant(&self.bounds, entry.position);
        self.count += 1;
        if let Some(children) = self.children.as_mut() {
            children[q].insert(entry, capacity, max_depth);
            return;
        }
        self.items.push(entry);
        if self.items.len() > capacity && self.depth < max_depth {
            self.split(capacity, max_depth);
        }
    }

    fn split(&mut self, capacity: usize, max_depth: u32) {
        let bounds = self.bounds;
        let depth = self.depth + 1;
        let mut children = Box::new([0, 1, 2, 3].map(|q| QuadNode::leaf(child_bounds(&bounds, q), depth)));
        for item in self.items.drain(..) {
            children[quadrant(&bounds, item.position)].insert(item, capacity, max_depth);
        }
        self.children = Some(children);
    }

    fn remove(&mut self, id: UnitId, at: Position, capacity: usize) -> Option<SpatialEntry> {
        let q = quadrant(&self.bounds, at);
        let Some(children) = self.children.as_mut() else {
            let idx = self.items.iter().position(|e| e.id == id)?;
            self.count -= 1;
            return Some(self.items.swap_remove(idx));
        };
        let removed = children[q].remove(id, at, capacity)?;
        self.count -= 1;
        if self.count <= capacity {
            self.collapse();
        }
        Some(removed)
    }

    fn collapse(&mut self) {
        let mut gathered = Vec::new();
        self.collect(&mut gathered);
        self.children = None;
        self.items = gathered;
    }

    fn leaf_bounds(&self, p: Position) -> Rect {
        match &self.children {
            Some(children) => children[quadrant(&self.bounds, p)].leaf_bounds(p),
            None => self.bounds,
        }
    }

    fn item_mut(&mut self, id: UnitId, at: Position) -> Option<&mut SpatialEntry> {
        let q = quadrant(&self.bounds, at);
        match self.children.as_mut() {
            Some(children) => children[q].item_mut(id, at),
            None => self.items.iter_mut().find(|e| e.id == id),
        }
    }

    fn query(&self, center: Position, radius: f32, out: &mut Vec<SpatialEntry>) {
        if !self.bounds.intersects_circle(center, radius) {
            return;
        }
        let radius_sq = radius * radius;
        out.extend(
            self.items
                .iter()
                .filter(|e| e.position.distance_sq_to(&center) <= radius_sq),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(center, radius, out);
            }
        }
    }

    fn collect(&self, out: &mut Vec<SpatialEntry>) {
        out.extend_from_slice(&self.items);
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect(out);
            }
        }
    }

    fn len(&self) -> usize {
        self.count
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(QuadNode::node_count).sum())
    }

    fn max_depth(&self) -> u32 {
        self.children.as_ref().map_or(self.depth, |children| {
            children.iter().map(QuadNode::max_depth).max().unwrap_or(self.depth)
        })
    }
}

/// Quadtree spatial index.
#[derive(Debug, Clone)]
pub struct Quadtree {
    root: QuadNode,
    /// Units whose position lies outside the root bounds.
    outside: Vec<SpatialEntry>,
    capacity: usize,
    max_depth: u32,
    /// Location handle per unit: the position it was placed with.
    locations: HashMap<UnitId, Position>,
}

impl Quadtree {
    pub fn new(bounds: Rect, capacity: usize, max_depth: u32) -> Self {
        Self {
            root: QuadNode::leaf(bounds, 0),
            outside: Vec::new(),
            capacity: capacity.max(1),
            max_depth,
            locations: HashMap::new(),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.root.bounds
    }

    /// Number of tree nodes, leaves included.
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Depth of the deepest leaf.
    pub fn depth(&self) -> u32 {
        self.root.max_depth()
    }

    /// Units held in the overflow bucket outside the root bounds.
    pub fn outside_len(&self) -> usize {
        self.outside.len()
    }

    fn detach(&mut self, id: UnitId) -> Option<SpatialEntry> {
        let at = self.locations.remove(&id)?;
        if self.root.bounds.contains(at) {
            self.root.remove(id, at, self.capacity)
        } else {
            let idx = self.outside.iter().position(|e| e.id == id)?;
            Some(self.outside.swap_remove(idx))
        }
    }

    fn place(&mut self, entry: SpatialEntry) {
        self.locations.insert(entry.id, entry.position);
        if self.root.bounds.contains(entry.position) {
            self.root.insert(entry, self.capacity, self.max_depth);
        } else {
            self.outside.push(entry);
        }
    }

    /// Leaf bounds owning `p`, `None` for the overflow bucket.
    fn region_of(&self, p: Position) -> Option<Rect> {
        self.root
            .bounds
            .contains(p)
            .then(|| self.root.leaf_bounds(p))
    }
}

impl SpatialIndex for Quadtree {
    fn insert(&mut self, entry: SpatialEntry) {
        self.detach(entry.id);
        self.place(entry);
    }

    fn remove(&mut self, id: UnitId) -> bool {
        self.detach(id).is_some()
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        let Some(&old) = self.locations.get(&id) else {
            return false;
        };
        if self.region_of(old) == self.region_of(position) {
            let item = if self.root.bounds.contains(old) {
                self.root.item_mut(id, old)
            } else {
                self.outside.iter_mut().find(|e| e.id == id)
            };
            if let Some(item) = item {
                item.position = position;
                self.locations.insert(id, position);
                return true;
            }
        }
        match self.detach(id) {
            Some(mut entry) => {
                entry.position = position;
                self.place(entry);
                true
            }
            None => false,
        }
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        if radius < 0.0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.root.query(center, radius, &mut out);
        let radius_sq = radius * radius;
        out.extend(
            self.outside
                .iter()
                .filter(|e| e.position.distance_sq_to(&center) <= radius_sq),
        );
        out
    }

    fn potential_pairs(&self) -> PairMap {
        exact_pairs(self)
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        let mut out = Vec::with_capacity(self.locations.len());
        self.root.collect(&mut out);
        out.extend_from_slice(&self.outside);
        out
    }

    fn len(&self) -> usize {
        self.locations.len()
    }

    fn clear(&mut self) {
        self.root = QuadNode::leaf(self.root.bounds, 0);
        self.outside.clear();
        self.locations.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.root.len() + self.outside.len()
    }
}
