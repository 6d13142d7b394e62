//! Dynamic hysteresis hierarchical grid.
//!
//! A coarse uniform grid is the default home of every unit. When a coarse
//! cell's occupancy reaches the refine threshold, the cell is promoted: a fine
//! sub-grid is allocated for it and every unit in the coarse bucket migrates
//! into it. From then on units landing in that coarse cell go straight to the
//! sub-grid. When the sub-grid drops to the unrefine threshold or below it is
//! drained back into the coarse bucket and discarded.
//!
//! The two thresholds differ (`unrefine < refine`), so a cell whose occupancy
//! hovers between them never migrates.
//!
//! ```text
//!            len >= refine
//!   Coarse ────────────────▶ Refined
//!          ◀────────────────
//!            len <= unrefine
//! ```

use super::uniform::{CellKey, UniformGrid};
use super::{exact_pairs, PairMap, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a unit currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Home {
    /// The coarse bucket of its cell.
    Coarse,
    /// The sub-grid owned by its (refined) coarse cell.
    Refined,
}

/// Refinement counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementStats {
    pub refine_events: u64,
    pub unrefine_events: u64,
    pub refined_cells: usize,
}

#[derive(Debug, Clone)]
pub struct DynamicGrid {
    coarse: UniformGrid,
    fine_cell_size: f32,
    refined: HashMap<CellKey, UniformGrid>,
    /// id -> (coarse cell, home). The cell is the key of the owning sub-grid
    /// when the home is `Refined`.
    homes: HashMap<UnitId, (CellKey, Home)>,
    refine_threshold: usize,
    unrefine_threshold: usize,
    refine_events: u64,
    unrefine_events: u64,
}

impl DynamicGrid {
    /// Thresholds are clamped so that `1 <= refine` and `unrefine < refine`.
    pub fn new(
        coarse_cell_size: f32,
        fine_cell_size: f32,
        refine_threshold: usize,
        unrefine_threshold: usize,
    ) -> Self {
        let refine_threshold = refine_threshold.max(1);
        Self {
            coarse: UniformGrid::new(coarse_cell_size),
            fine_cell_size,
            refined: HashMap::new(),
            homes: HashMap::new(),
            refine_threshold,
            unrefine_threshold: unrefine_threshold.min(refine_threshold - 1),
            refine_events: 0,
            unrefine_events: 0,
        }
    }

    pub fn refine_threshold(&self) -> usize {
        self.refine_threshold
    }

    pub fn unrefine_threshold(&self) -> usize {
        self.unrefine_threshold
    }

    pub fn refine_events(&self) -> u64 {
        self.refine_events
    }

    pub fn unrefine_events(&self) -> u64 {
        self.unrefine_events
    }

    pub fn refined_cells(&self) -> usize {
        self.refined.len()
    }

    pub fn stats(&self) -> RefinementStats {
        RefinementStats {
            refine_events: self.refine_events,
            unrefine_events: self.unrefine_events,
            refined_cells: self.refined.len(),
        }
    }

    pub fn coarse_cell_of(&self, p: Position) -> CellKey {
        self.coarse.cell_of(p)
    }

    pub fn is_refined(&self, cell: CellKey) -> bool {
        self.refined.contains_key(&cell)
    }

    pub fn home_of(&self, id: UnitId) -> Option<Home> {
        self.homes.get(&id).map(|&(_, home)| home)
    }

    /// Units living in a coarse cell, whichever bucket holds them.
    pub fn cell_occupancy(&self, cell: CellKey) -> usize {
        match self.refined.get(&cell) {
            Some(sub) => sub.len(),
            None => self.coarse.cell_len(cell),
        }
    }

    fn entry_of(&self, id: UnitId) -> Option<SpatialEntry> {
        let &(cell, home) = self.homes.get(&id)?;
        match home {
            Home::Coarse => self.coarse.get(id).copied(),
            Home::Refined => self.refined.get(&cell)?.get(id).copied(),
        }
    }

    /// Place a unit that is not currently indexed, honoring the refined status
    /// of its destination cell.
    fn place(&mut self, entry: SpatialEntry) {
        let cell = self.coarse.cell_of(entry.position);
        if let Some(sub) = self.refined.get_mut(&cell) {
            sub.insert(entry);
            self.homes.insert(entry.id, (cell, Home::Refined));
            return;
        }
        self.coarse.insert(entry);
        self.homes.insert(entry.id, (cell, Home::Coarse));
        self.maybe_refine(cell);
    }

    fn detach(&mut self, id: UnitId) -> bool {
        let Some((cell, home)) = self.homes.remove(&id) else {
            return false;
        };
        match home {
            Home::Coarse => {
                self.coarse.remove(id);
            }
            Home::Refined => {
                if let Some(sub) = self.refined.get_mut(&cell) {
                    sub.remove(id);
                }
                self.maybe_unrefine(cell);
            }
        }
        true
    }

    fn maybe_refine(&mut self, cell: CellKey) {
        if self.coarse.cell_len(cell) < self.refine_threshold {
            return;
        }
        let mut sub = UniformGrid::new(self.fine_cell_size);
        for entry in self.coarse.drain_cell(cell) {
            sub.insert(entry);
            self.homes.insert(entry.id, (cell, Home::Refined));
        }
        tracing::debug!(cell = ?cell, units = sub.len(), "refined coarse cell");
        self.refined.insert(cell, sub);
        self.refine_events += 1;
    }

    fn maybe_unrefine(&mut self, cell: CellKey) {
        let sparse = self
            .refined
            .get(&cell)
            .is_some_and(|sub| sub.len() <= self.unrefine_threshold);
        if !sparse {
            return;
        }
        let Some(sub) = self.refined.remove(&cell) else {
            return;
        };
        let entries = sub.entries();
        tracing::debug!(cell = ?cell, units = entries.len(), "unrefined coarse cell");
        for entry in entries {
            self.coarse.insert(entry);
            self.homes.insert(entry.id, (cell, Home::Coarse));
        }
        self.unrefine_events += 1;
    }
}

impl SpatialIndex for DynamicGrid {
    fn insert(&mut self, entry: SpatialEntry) {
        self.detach(entry.id);
        self.place(entry);
    }

    fn remove(&mut self, id: UnitId) -> bool {
        self.detach(id)
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        let Some(&(cell, home)) = self.homes.get(&id) else {
            return false;
        };
        let new_cell = self.coarse.cell_of(position);
        if new_cell == cell {
            return match home {
                Home::Coarse => self.coarse.update(id, position),
                Home::Refined => self
                    .refined
                    .get_mut(&cell)
                    .is_some_and(|sub| sub.update(id, position)),
            };
        }
        let Some(mut entry) = self.entry_of(id) else {
            return false;
        };
        entry.position = position;
        self.detach(id);
        self.place(entry);
        true
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        let mut results = self.coarse.query_entries(center, radius);
        if radius < 0.0 || self.refined.is_empty() {
            return results;
        }
        let (x0, y0) = self
            .coarse
            .cell_of(Position::new(center.x - radius, center.y - radius));
        let (x1, y1) = self
            .coarse
            .cell_of(Position::new(center.x + radius, center.y + radius));
        for (&(cx, cy), sub) in &self.refined {
            if (x0..=x1).contains(&cx) && (y0..=y1).contains(&cy) {
                results.extend(sub.query_entries(center, radius));
            }
        }
        results
    }

    fn potential_pairs(&self) -> PairMap {
        exact_pairs(self)
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        let mut all = self.coarse.entries();
        for sub in self.refined.values() {
            all.extend(sub.entries());
        }
        all
    }

    fn len(&self) -> usize {
        self.homes.len()
    }

    /// Drops every unit and sub-grid. Event counters are kept.
    fn clear(&mut self) {
        self.coarse.clear();
        self.refined.clear();
        self.homes.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.coarse.bucket_memberships()
            + self
                .refined
                .values()
                .map(UniformGrid::bucket_memberships)
                .sum::<usize>()
    }
}
