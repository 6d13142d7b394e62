//! Spatial partitioning for range and pair queries.
//!
//! Every strategy implements [`SpatialIndex`] and can be swapped at runtime by
//! the [`IndexManager`]. Each strategy keeps its own side table from unit id
//! to the bucket the unit currently lives in, so removal never recomputes a
//! location from a stale position.
//!
//! ## Strategies
//!
//! | Strategy | Module | Pairing |
//! |---|---|---|
//! | Uniform grid | [`uniform`] | same-cell only (approximate) |
//! | Quadtree | [`quadtree`] | exact |
//! | Two-tier static grid | [`hierarchical`] | exact |
//! | Density-adaptive grids | [`adaptive`] | exact |
//! | Dynamic hysteresis grid | [`dynamic`] | exact |
//!
//! ## Single-bucket invariant
//!
//! An indexed unit occupies exactly one bucket (grid cell, sub-grid cell or
//! tree node) after every mutation. [`SpatialIndex::bucket_memberships`]
//! exposes the number of occupied slots so tests can check it equals
//! [`SpatialIndex::len`].

pub mod adaptive;
pub mod dynamic;
pub mod hierarchical;
pub mod manager;
pub mod quadtree;
pub mod uniform;

pub use adaptive::AdaptiveGrid;
pub use dynamic::DynamicGrid;
pub use hierarchical::HierarchicalGrid;
pub use manager::{IndexManager, IndexStats, Strategy, StrategyKind};
pub use quadtree::Quadtree;
pub use uniform::UniformGrid;

use crate::components::{Faction, Position, UnitId, UnitSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Attacker id to the hostile ids within the attacker's own range.
pub type PairMap = BTreeMap<UnitId, Vec<UnitId>>;

/// What the index caches about a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialEntry {
    pub id: UnitId,
    pub position: Position,
    pub faction: Faction,
    pub attack_range: f32,
}

impl SpatialEntry {
    pub fn new(id: UnitId, position: Position, faction: Faction, attack_range: f32) -> Self {
        Self {
            id,
            position,
            faction,
            attack_range,
        }
    }

    /// True when `other` is hostile and inside this entry's attack range.
    #[inline]
    pub fn reaches(&self, other: &SpatialEntry) -> bool {
        self.attack_range > 0.0
            && self.id != other.id
            && self.faction.is_hostile_to(other.faction)
            && self.position.distance_sq_to(&other.position)
                <= self.attack_range * self.attack_range
    }
}

impl From<&UnitSpec> for SpatialEntry {
    fn from(spec: &UnitSpec) -> Self {
        Self::new(spec.id, spec.position, spec.faction, spec.attack_range)
    }
}

/// Axis-aligned rectangle, `min` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn center(&self) -> Position {
        Position::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    /// Does the circle touch this rectangle?
    pub fn intersects_circle(&self, center: Position, radius: f32) -> bool {
        let cx = center.x.clamp(self.min_x, self.max_x);
        let cy = center.y.clamp(self.min_y, self.max_y);
        let dx = center.x - cx;
        let dy = center.y - cy;
        dx * dx + dy * dy <= radius * radius
    }
}

/// The contract every spatial strategy satisfies.
pub trait SpatialIndex {
    /// Index a unit. Re-inserting an indexed id relocates it.
    fn insert(&mut self, entry: SpatialEntry);

    /// Returns false when the id was not indexed.
    fn remove(&mut self, id: UnitId) -> bool;

    /// Move an indexed unit. Returns false when the id was not indexed.
    fn update(&mut self, id: UnitId, position: Position) -> bool;

    /// Entries whose position lies within `radius` of `center` (exact circle test).
    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry>;

    /// Hostile pairs close enough to interact, each unordered pair reported once.
    fn potential_pairs(&self) -> PairMap;

    /// Every indexed entry, in no particular order.
    fn entries(&self) -> Vec<SpatialEntry>;

    fn len(&self) -> usize;

    fn clear(&mut self);

    /// Total bucket slots in use. Equals [`len`](Self::len) while the
    /// single-bucket invariant holds.
    fn bucket_memberships(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids within `radius` of `center`, ascending and without duplicates.
    fn query_range(&self, center: Position, radius: f32) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = self
            .query_entries(center, radius)
            .into_iter()
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Canonical unordered pair key.
#[inline]
pub fn canonical_pair(a: UnitId, b: UnitId) -> (UnitId, UnitId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Exact pairing through one range query per unit.
///
/// Each found pair is canonicalized and recorded in a per-query dedup set
/// before emission, so a pair reachable from both members is reported once,
/// from the perspective of the lower-id unit whose range covers the other.
pub fn exact_pairs<I>(index: &I) -> PairMap
where
    I: SpatialIndex + Sync + ?Sized,
{
    let mut units = index.entries();
    units.retain(|e| e.attack_range > 0.0 && e.faction != Faction::Neutral);
    units.sort_unstable_by_key(|e| e.id);

    let neighbor_lists = neighbor_lists(index, &units);

    let mut seen = HashSet::new();
    let mut pairs = PairMap::new();
    for (unit, mut neighbors) in units.iter().zip(neighbor_lists) {
        neighbors.sort_unstable();
        for other in neighbors {
            if !seen.insert(canonical_pair(unit.id, other)) {
                continue;
            }
            pairs.entry(unit.id).or_default().push(other);
        }
    }
    pairs
}

#[cfg(not(feature = "parallel"))]
fn neighbor_lists<I>(index: &I, units: &[SpatialEntry]) -> Vec<Vec<UnitId>>
where
    I: SpatialIndex + Sync + ?Sized,
{
    units.iter().map(|unit| reachable(index, unit)).collect()
}

#[cfg(feature = "parallel")]
fn neighbor_lists<I>(index: &I, units: &[SpatialEntry]) -> Vec<Vec<UnitId>>
where
    I: SpatialIndex + Sync + ?Sized,
{
    units.par_iter().map(|unit| reachable(index, unit)).collect()
}

fn reachable<I>(index: &I, unit: &SpatialEntry) -> Vec<UnitId>
where
    I: SpatialIndex + ?Sized,
{
    index
        .query_entries(unit.position, unit.attack_range)
        .into_iter()
        .filter(|other| unit.reaches(other))
        .map(|other| other.id)
        .collect()
}
