//! Density-adaptive multi-grid.
//!
//! A family of uniform grids with cell sizes `base * 2^k`. Each insert samples
//! the occupancy of the destination cell in every level, coarsest first, and
//! places the unit in the coarsest level that keeps that cell under the
//! density threshold. When every level is saturated the unit goes to the
//! finest one. The chosen level is recorded per id.

use super::uniform::UniformGrid;
use super::{exact_pairs, PairMap, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AdaptiveGrid {
    /// Index 0 is the finest level.
    levels: Vec<UniformGrid>,
    density_threshold: usize,
    placements: HashMap<UnitId, usize>,
}

impl AdaptiveGrid {
    /// `levels` is clamped to at least one grid.
    pub fn new(base_cell_size: f32, levels: usize, density_threshold: usize) -> Self {
        let levels = (0..levels.max(1))
            .map(|k| UniformGrid::new(base_cell_size * (1u32 << k.min(30)) as f32))
            .collect();
        Self {
            levels,
            density_threshold: density_threshold.max(1),
            placements: HashMap::new(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn cell_size_of_level(&self, level: usize) -> Option<f32> {
        self.levels.get(level).map(UniformGrid::cell_size)
    }

    /// Level the unit was placed in, 0 being the finest.
    pub fn level_of(&self, id: UnitId) -> Option<usize> {
        self.placements.get(&id).copied()
    }

    pub fn level_len(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, UniformGrid::len)
    }

    fn choose_level(&self, position: Position) -> usize {
        self.levels
            .iter()
            .enumerate()
            .rev()
            .find(|(_, grid)| grid.cell_len(grid.cell_of(position)) < self.density_threshold)
            .map_or(0, |(level, _)| level)
    }
}

impl SpatialIndex for AdaptiveGrid {
    fn insert(&mut self, entry: SpatialEntry) {
        self.remove(entry.id);
        let level = self.choose_level(entry.position);
        self.levels[level].insert(entry);
        self.placements.insert(entry.id, level);
    }

    fn remove(&mut self, id: UnitId) -> bool {
        match self.placements.remove(&id) {
            Some(level) => self.levels[level].remove(id),
            None => false,
        }
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        match self.placements.get(&id) {
            Some(&level) => self.levels[level].update(id, position),
            None => false,
        }
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        let mut merged: Vec<SpatialEntry> = self
            .levels
            .iter()
            .filter(|grid| !grid.is_empty())
            .flat_map(|grid| grid.query_entries(center, radius))
            .collect();
        merged.sort_unstable_by_key(|e| e.id);
        merged.dedup_by_key(|e| e.id);
        merged
    }

    fn potential_pairs(&self) -> PairMap {
        exact_pairs(self)
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        self.levels.iter().flat_map(UniformGrid::entries).collect()
    }

    fn len(&self) -> usize {
        self.placements.len()
    }

    fn clear(&mut self) {
        self.levels.iter_mut().for_each(UniformGrid::clear);
        self.placements.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.levels.iter().map(UniformGrid::bucket_memberships).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Faction;
    use crate::spatial::test_support::{assert_pairs_well_formed, assert_single_bucket, entry};

    #[test]
    fn test_level_sizes_double() {
        let grid = AdaptiveGrid::new(25.0, 4, 16);
        assert_eq!(grid.level_count(), 4);
        assert_eq!(grid.cell_size_of_level(0), Some(25.0));
        assert_eq!(grid.cell_size_of_level(3), Some(200.0));
        assert_eq!(grid.cell_size_of_level(4), None);
    }

    #[test]
    fn test_saturated_levels_push_units_finer() {
        let mut grid = AdaptiveGrid::new(10.0, 3, 2);
        for i in 0..7u32 {
            grid.insert(entry(i, 1.0, 1.0, Faction::Red, 0.0));
        }
        assert_eq!(grid.level_of(UnitId(0)), Some(2));
        assert_eq!(grid.level_of(UnitId(1)), Some(2));
        assert_eq!(grid.level_of(UnitId(2)), Some(1));
        assert_eq!(grid.level_of(UnitId(3)), Some(1));
        assert_eq!(grid.level_of(UnitId(4)), Some(0));
        assert_eq!(grid.level_of(UnitId(5)), Some(0));
        // Every level saturated: falls back to the finest
        assert_eq!(grid.level_of(UnitId(6)), Some(0));
        assert_eq!(grid.level_len(0), 3);
        assert_single_bucket(&grid);
    }

    #[test]
    fn test_update_and_remove_target_recorded_level() {
        let mut grid = AdaptiveGrid::new(10.0, 2, 1);
        grid.insert(entry(1, 1.0, 1.0, Faction::Red, 0.0));
        grid.insert(entry(2, 2.0, 1.0, Faction::Red, 0.0));
        assert_eq!(grid.level_of(UnitId(1)), Some(1));
        assert_eq!(grid.level_of(UnitId(2)), Some(0));

        assert!(grid.update(UnitId(2), Position::new(500.0, 500.0)));
        assert_eq!(grid.level_of(UnitId(2)), Some(0));
        assert_eq!(grid.query_range(Position::new(500.0, 500.0), 0.0), vec![UnitId(2)]);

        assert!(grid.remove(UnitId(1)));
        assert!(!grid.remove(UnitId(1)));
        assert!(!grid.update(UnitId(1), Position::new(0.0, 0.0)));
        assert_eq!(grid.len(), 1);
        assert_single_bucket(&grid);
    }

    #[test]
    fn test_pairs_span_levels() {
        let mut grid = AdaptiveGrid::new(10.0, 2, 1);
        grid.insert(entry(1, 19.0, 5.0, Faction::Red, 4.0));
        grid.insert(entry(2, 21.0, 5.0, Faction::Blue, 4.0));
        grid.insert(entry(3, 19.5, 5.0, Faction::Green, 0.0));
        let pairs = grid.potential_pairs();
        assert_eq!(pairs.get(&UnitId(1)), Some(&vec![UnitId(2), UnitId(3)]));
        assert_eq!(pairs.get(&UnitId(2)), Some(&vec![UnitId(3)]));
        assert_pairs_well_formed(&grid, &pairs);
    }
}
