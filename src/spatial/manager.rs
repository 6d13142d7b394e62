//! Active spatial strategy and runtime switching.
//!
//! The [`IndexManager`] resource owns exactly one [`Strategy`]. Switching
//! builds the new structure off to the side, fills it with every live unit and
//! only then replaces the active value, so queries never observe an empty or
//! partially built index.

use super::adaptive::AdaptiveGrid;
use super::dynamic::{DynamicGrid, RefinementStats};
use super::hierarchical::HierarchicalGrid;
use super::quadtree::Quadtree;
use super::uniform::UniformGrid;
use super::{PairMap, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use crate::config::SpatialConfig;
use crate::error::CombatError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Names of the available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    UniformGrid,
    Quadtree,
    Hierarchical,
    Adaptive,
    DynamicHierarchical,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::UniformGrid,
        StrategyKind::Quadtree,
        StrategyKind::Hierarchical,
        StrategyKind::Adaptive,
        StrategyKind::DynamicHierarchical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::UniformGrid => "uniform_grid",
            StrategyKind::Quadtree => "quadtree",
            StrategyKind::Hierarchical => "hierarchical",
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::DynamicHierarchical => "dynamic_hierarchical",
        }
    }

    /// Whether `potential_pairs` reports every in-range hostile pair.
    ///
    /// Only the uniform grid is approximate: it pairs within a cell and misses
    /// pairs split across a cell border.
    pub fn exact_pairs(self) -> bool {
        !matches!(self, StrategyKind::UniformGrid)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = CombatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CombatError::UnknownStrategy(s.to_string()))
    }
}

/// Tagged union of every spatial structure.
#[derive(Debug, Clone)]
pub enum Strategy {
    Uniform(UniformGrid),
    Quadtree(Quadtree),
    Hierarchical(HierarchicalGrid),
    Adaptive(AdaptiveGrid),
    Dynamic(DynamicGrid),
}

macro_rules! dispatch {
    ($strategy:expr, $index:ident => $body:expr) => {
        match $strategy {
            Strategy::Uniform($index) => $body,
            Strategy::Quadtree($index) => $body,
            Strategy::Hierarchical($index) => $body,
            Strategy::Adaptive($index) => $body,
            Strategy::Dynamic($index) => $body,
        }
    };
}

impl Strategy {
    /// Empty structure of the given kind.
    pub fn build(kind: StrategyKind, config: &SpatialConfig) -> Self {
        match kind {
            StrategyKind::UniformGrid => Strategy::Uniform(UniformGrid::new(config.uniform.cell_size)),
            StrategyKind::Quadtree => Strategy::Quadtree(Quadtree::new(
                config.quadtree.bounds,
                config.quadtree.capacity,
                config.quadtree.max_depth,
            )),
            StrategyKind::Hierarchical => Strategy::Hierarchical(HierarchicalGrid::new(
                config.hierarchical.coarse_cell_size,
                config.hierarchical.fine_cell_size,
            )),
            StrategyKind::Adaptive => Strategy::Adaptive(AdaptiveGrid::new(
                config.adaptive.base_cell_size,
                config.adaptive.levels,
                config.adaptive.density_threshold,
            )),
            StrategyKind::DynamicHierarchical => Strategy::Dynamic(DynamicGrid::new(
                config.dynamic.coarse_cell_size,
                config.dynamic.fine_cell_size,
                config.dynamic.refine_threshold,
                config.dynamic.unrefine_threshold,
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Uniform(_) => StrategyKind::UniformGrid,
            Strategy::Quadtree(_) => StrategyKind::Quadtree,
            Strategy::Hierarchical(_) => StrategyKind::Hierarchical,
            Strategy::Adaptive(_) => StrategyKind::Adaptive,
            Strategy::Dynamic(_) => StrategyKind::DynamicHierarchical,
        }
    }

    pub fn as_dynamic(&self) -> Option<&DynamicGrid> {
        match self {
            Strategy::Dynamic(grid) => Some(grid),
            _ => None,
        }
    }
}

impl SpatialIndex for Strategy {
    fn insert(&mut self, entry: SpatialEntry) {
        dispatch!(self, index => index.insert(entry))
    }

    fn remove(&mut self, id: UnitId) -> bool {
        dispatch!(self, index => index.remove(id))
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        dispatch!(self, index => index.update(id, position))
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        dispatch!(self, index => index.query_entries(center, radius))
    }

    fn potential_pairs(&self) -> PairMap {
        dispatch!(self, index => index.potential_pairs())
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        dispatch!(self, index => index.entries())
    }

    fn len(&self) -> usize {
        dispatch!(self, index => index.len())
    }

    fn clear(&mut self) {
        dispatch!(self, index => index.clear())
    }

    fn bucket_memberships(&self) -> usize {
        dispatch!(self, index => index.bucket_memberships())
    }
}

/// Index diagnostics. Field set carries no stability guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub strategy: StrategyKind,
    pub exact_pairs: bool,
    pub indexed_units: usize,
    pub bucket_memberships: usize,
    pub migrations: u64,
    /// Present only while the dynamic grid is active
    pub refinement: Option<RefinementStats>,
}

/// Holds the active strategy.
#[derive(Resource, Debug, Clone)]
pub struct IndexManager {
    active: Strategy,
    config: SpatialConfig,
    migrations: u64,
}

impl IndexManager {
    pub fn new(kind: StrategyKind, config: SpatialConfig) -> Self {
        Self {
            active: Strategy::build(kind, &config),
            config,
            migrations: 0,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.active.kind()
    }

    pub fn active(&self) -> &Strategy {
        &self.active
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Completed strategy switches.
    pub fn migrations(&self) -> u64 {
        self.migrations
    }

    /// Replace the active strategy with a fresh `kind` holding `entries`.
    ///
    /// Returns how many units the new structure indexes.
    pub fn switch_strategy<I>(&mut self, kind: StrategyKind, entries: I) -> usize
    where
        I: IntoIterator<Item = SpatialEntry>,
    {
        let mut fresh = Strategy::build(kind, &self.config);
        for entry in entries {
            fresh.insert(entry);
        }
        let migrated = fresh.len();
        let previous = std::mem::replace(&mut self.active, fresh);
        self.migrations += 1;
        tracing::info!(
            from = %previous.kind(),
            to = %kind,
            units = migrated,
            "switched spatial strategy"
        );
        migrated
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            strategy: self.kind(),
            exact_pairs: self.kind().exact_pairs(),
            indexed_units: self.active.len(),
            bucket_memberships: self.active.bucket_memberships(),
            migrations: self.migrations,
            refinement: self.active.as_dynamic().map(DynamicGrid::stats),
        }
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new(StrategyKind::default(), SpatialConfig::default())
    }
}

impl SpatialIndex for IndexManager {
    fn insert(&mut self, entry: SpatialEntry) {
        self.active.insert(entry);
    }

    fn remove(&mut self, id: UnitId) -> bool {
        self.active.remove(id)
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        self.active.update(id, position)
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        self.active.query_entries(center, radius)
    }

    fn potential_pairs(&self) -> PairMap {
        self.active.potential_pairs()
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        self.active.entries()
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn clear(&mut self) {
        self.active.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.active.bucket_memberships()
    }
}
