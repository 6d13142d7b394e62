//! Uniform grid: fixed-size square cells.
//!
//! Provides O(1) cell lookup and O(k) range queries where k is the number of
//! units in the cells overlapped by the query circle's bounding box.
//!
//! ## Pairing is approximate
//!
//! [`potential_pairs`](SpatialIndex::potential_pairs) only pairs units that
//! share the *same* cell. A hostile pair within range but split across a cell
//! border is missed. This trades recall for O(occupancy²) work per cell instead
//! of a range query per unit, and is acceptable when attack ranges are well
//! below the cell size. Callers that need exact recall should pick one of the
//! other strategies.

use super::{PairMap, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use std::collections::HashMap;

/// Integer cell coordinates.
pub type CellKey = (i32, i32);

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: SpatialEntry,
    cell: CellKey,
}

/// Grid-based spatial partitioning structure.
///
/// Divides the plane into cells and tracks which units are in each cell.
#[derive(Debug, Clone)]
pub struct UniformGrid {
    cell_size: f32,
    /// Map from cell coordinates to the ids in that cell.
    cells: HashMap<CellKey, Vec<UnitId>>,
    /// Reverse lookup: id to its entry and the cell it was placed in.
    slots: HashMap<UnitId, Slot>,
}

impl UniformGrid {
    /// Create a new grid with the given cell size.
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        Self {
            cell_size,
            cells: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert world coordinates to cell coordinates.
    #[inline]
    pub fn cell_of(&self, p: Position) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
        )
    }

    /// Number of units in a cell.
    pub fn cell_len(&self, cell: CellKey) -> usize {
        self.cells.get(&cell).map_or(0, Vec::len)
    }

    /// Entries placed in a cell.
    pub fn cell_entries(&self, cell: CellKey) -> impl Iterator<Item = &SpatialEntry> + '_ {
        self.cells
            .get(&cell)
            .into_iter()
            .flatten()
            .filter_map(|id| self.slots.get(id).map(|slot| &slot.entry))
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: UnitId) -> Option<&SpatialEntry> {
        self.slots.get(&id).map(|slot| &slot.entry)
    }

    /// Cell recorded for `id` at its last insert or move.
    pub fn cell_for(&self, id: UnitId) -> Option<CellKey> {
        self.slots.get(&id).map(|slot| slot.cell)
    }

    /// Remove every unit of a cell and hand the entries back.
    pub fn drain_cell(&mut self, cell: CellKey) -> Vec<SpatialEntry> {
        let Some(ids) = self.cells.remove(&cell) else {
            return Vec::new();
        };
        ids.into_iter()
            .filter_map(|id| self.slots.remove(&id).map(|slot| slot.entry))
            .collect()
    }

    /// Cells overlapped by the bounding box of a circle.
    ///
    /// When the box spans more cells than are occupied, only occupied cells are
    /// visited, so very large radii stay cheap.
    pub(crate) fn cells_overlapping(&self, center: Position, radius: f32) -> Vec<CellKey> {
        let (x0, y0) = self.cell_of(Position::new(center.x - radius, center.y - radius));
        let (x1, y1) = self.cell_of(Position::new(center.x + radius, center.y + radius));
        // Saturated keys make each side up to 2^32 cells wide
        let span = (i64::from(x1) - i64::from(x0) + 1)
            .checked_mul(i64::from(y1) - i64::from(y0) + 1)
            .and_then(|span| usize::try_from(span).ok());
        let Some(span) = span.filter(|&span| span <= self.cells.len()) else {
            return self
                .cells
                .keys()
                .filter(|(cx, cy)| (x0..=x1).contains(cx) && (y0..=y1).contains(cy))
                .copied()
                .collect();
        };
        let mut out = Vec::with_capacity(span);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if self.cells.contains_key(&(cx, cy)) {
                    out.push((cx, cy));
                }
            }
        }
        out
    }

    fn detach(&mut self, id: UnitId) -> Option<Slot> {
        let slot = self.slots.remove(&id)?;
        Self::remove_from_bucket(&mut self.cells, slot.cell, id);
        Some(slot)
    }

    fn remove_from_bucket(cells: &mut HashMap<CellKey, Vec<UnitId>>, cell: CellKey, id: UnitId) {
        if let Some(ids) = cells.get_mut(&cell) {
            if let Some(pos) = ids.iter().position(|&other| other == id) {
                ids.swap_remove(pos);
            }
            if ids.is_empty() {
                cells.remove(&cell);
            }
        }
    }
}

impl SpatialIndex for UniformGrid {
    fn insert(&mut self, entry: SpatialEntry) {
        self.detach(entry.id);
        let cell = self.cell_of(entry.position);
        self.cells.entry(cell).or_default().push(entry.id);
        self.slots.insert(entry.id, Slot { entry, cell });
    }

    fn remove(&mut self, id: UnitId) -> bool {
        self.detach(id).is_some()
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        let new_cell = self.cell_of(position);
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        slot.entry.position = position;
        if slot.cell != new_cell {
            let old_cell = slot.cell;
            slot.cell = new_cell;
            Self::remove_from_bucket(&mut self.cells, old_cell, id);
            self.cells.entry(new_cell).or_default().push(id);
        }
        true
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        if radius < 0.0 {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let mut results = Vec::new();
        for cell in self.cells_overlapping(center, radius) {
            for entry in self.cell_entries(cell) {
                if entry.position.distance_sq_to(&center) <= radius_sq {
                    results.push(*entry);
                }
            }
        }
        results
    }

    fn potential_pairs(&self) -> PairMap {
        let mut pairs = PairMap::new();
        for ids in self.cells.values() {
            for (i, a) in ids.iter().enumerate() {
                let Some(a) = self.get(*a) else { continue };
                for b in &ids[i + 1..] {
                    let Some(b) = self.get(*b) else { continue };
                    if a.reaches(b) {
                        pairs.entry(a.id).or_default().push(b.id);
                    } else if b.reaches(a) {
                        pairs.entry(b.id).or_default().push(a.id);
                    }
                }
            }
        }
        for defenders in pairs.values_mut() {
            defenders.sort_unstable();
        }
        pairs
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        self.slots.values().map(|slot| slot.entry).collect()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.slots.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Faction;
    use crate::spatial::test_support::{assert_pairs_well_formed, assert_single_bucket, entry};

    #[test]
    fn test_grid_insert_query() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 5.0, 5.0, Faction::Red, 0.0));
        grid.insert(entry(2, 15.0, 5.0, Faction::Red, 0.0));
        grid.insert(entry(3, 100.0, 100.0, Faction::Blue, 0.0));

        assert_eq!(grid.query_range(Position::new(5.0, 5.0), 15.0), vec![UnitId(1), UnitId(2)]);
        assert_eq!(grid.query_range(Position::new(5.0, 5.0), 5.0), vec![UnitId(1)]);
        assert_eq!(grid.query_range(Position::new(100.0, 100.0), 10.0), vec![UnitId(3)]);
        assert!(grid.query_range(Position::new(-500.0, 40.0), 10.0).is_empty());
    }

    #[test]
    fn test_range_query_is_circular() {
        let mut grid = UniformGrid::new(10.0);
        // Inside the bounding box of the circle, outside the circle itself
        grid.insert(entry(1, 9.0, 9.0, Faction::Red, 0.0));
        assert!(grid.query_range(Position::new(0.0, 0.0), 10.0).is_empty());
        assert_eq!(grid.query_range(Position::new(0.0, 0.0), 12.8), vec![UnitId(1)]);
    }

    #[test]
    fn test_pairs_same_cell_within_range() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 0.0, 0.0, Faction::Red, 5.0));
        grid.insert(entry(2, 3.0, 0.0, Faction::Blue, 5.0));

        let pairs = grid.potential_pairs();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.get(&UnitId(1)), Some(&vec![UnitId(2)]));
        assert_pairs_well_formed(&grid, &pairs);

        assert!(grid.update(UnitId(2), Position::new(100.0, 100.0)));
        assert!(grid.potential_pairs().is_empty());
    }

    #[test]
    fn test_pairs_miss_cross_border_neighbours() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 9.0, 0.0, Faction::Red, 5.0));
        grid.insert(entry(2, 11.0, 0.0, Faction::Blue, 5.0));
        // Within range, different cells: approximate pairing skips it
        assert!(grid.potential_pairs().is_empty());
    }

    #[test]
    fn test_pairs_direction_follows_covering_range() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 0.0, 0.0, Faction::Red, 1.0));
        grid.insert(entry(2, 4.0, 0.0, Faction::Blue, 6.0));
        grid.insert(entry(3, 2.0, 0.0, Faction::Red, 6.0));

        let pairs = grid.potential_pairs();
        // Only 2 covers the 1-2 distance, so it reports both pairs
        assert_eq!(pairs.get(&UnitId(2)), Some(&vec![UnitId(1), UnitId(3)]));
        assert_eq!(pairs.get(&UnitId(1)), None);
        assert_pairs_well_formed(&grid, &pairs);
        let total: usize = pairs.values().map(Vec::len).sum();
        assert_eq!(total, 2); // never the friendly 1-3
    }

    #[test]
    fn test_neutral_and_zero_range_never_pair() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 0.0, 0.0, Faction::Neutral, 5.0));
        grid.insert(entry(2, 1.0, 0.0, Faction::Blue, 0.0));
        grid.insert(entry(3, 2.0, 0.0, Faction::Green, -1.0));
        assert!(grid.potential_pairs().is_empty());
    }

    #[test]
    fn test_update_and_remove_track_recorded_cell() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 1.0, 1.0, Faction::Red, 0.0));
        assert!(grid.update(UnitId(1), Position::new(2.0, 2.0)));
        assert_eq!(grid.cell_for(UnitId(1)), Some((0, 0)));

        assert!(grid.update(UnitId(1), Position::new(-3.0, 25.0)));
        assert_eq!(grid.cell_for(UnitId(1)), Some((-1, 2)));
        assert_eq!(grid.cell_len((0, 0)), 0);
        assert_single_bucket(&grid);

        assert!(grid.remove(UnitId(1)));
        assert!(!grid.remove(UnitId(1)));
        assert!(!grid.update(UnitId(1), Position::new(0.0, 0.0)));
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn test_reinsert_relocates() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 1.0, 1.0, Faction::Red, 0.0));
        grid.insert(entry(1, 51.0, 1.0, Faction::Red, 0.0));
        assert_eq!(grid.len(), 1);
        assert_single_bucket(&grid);
        assert!(grid.query_range(Position::new(1.0, 1.0), 1.0).is_empty());
    }

    #[test]
    fn test_huge_radius_visits_only_occupied_cells() {
        let mut grid = UniformGrid::new(1.0);
        grid.insert(entry(1, -40_000.0, 40_000.0, Faction::Red, 0.0));
        grid.insert(entry(2, 40_000.0, -40_000.0, Faction::Blue, 0.0));
        let everything = grid.query_range(Position::new(0.0, 0.0), 1.0e6);
        assert_eq!(everything, vec![UnitId(1), UnitId(2)]);
    }

    #[test]
    fn test_unbounded_radius_returns_everyone() {
        let mut grid = UniformGrid::new(1.0);
        grid.insert(entry(1, -40_000.0, 40_000.0, Faction::Red, 0.0));
        grid.insert(entry(2, 3.0, 3.0, Faction::Blue, 0.0));
        for radius in [f32::MAX, f32::INFINITY] {
            assert_eq!(
                grid.query_range(Position::new(0.0, 0.0), radius),
                vec![UnitId(1), UnitId(2)]
            );
        }
    }

    #[test]
    fn test_drain_cell() {
        let mut grid = UniformGrid::new(10.0);
        grid.insert(entry(1, 1.0, 1.0, Faction::Red, 0.0));
        grid.insert(entry(2, 2.0, 2.0, Faction::Red, 0.0));
        grid.insert(entry(3, 12.0, 2.0, Faction::Red, 0.0));
        let mut drained: Vec<UnitId> = grid.drain_cell((0, 0)).into_iter().map(|e| e.id).collect();
        drained.sort();
        assert_eq!(drained, vec![UnitId(1), UnitId(2)]);
        assert_eq!(grid.len(), 1);
        assert!(grid.drain_cell((0, 0)).is_empty());
    }
}
