//! Two-tier static hierarchical grid.
//!
//! Two independent uniform grids of different cell sizes live side by side.
//! On insert a unit goes to whichever tier currently holds fewer units inside
//! the unit's coarse cell (ties go to the coarse tier). The choice is made once
//! and is not revisited when the unit moves; there is no restructuring.
//!
//! Queries union both tiers and merge-deduplicate by id. Pairing is exact.

use super::uniform::{CellKey, UniformGrid};
use super::{exact_pairs, PairMap, SpatialEntry, SpatialIndex};
use crate::components::{Position, UnitId};
use std::collections::HashMap;

/// Which of the two grids a unit was placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Coarse,
    Fine,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    tier: Tier,
    /// Coarse cell of the unit's current position, also tracked for fine units.
    coarse_cell: CellKey,
}

#[derive(Debug, Clone)]
pub struct HierarchicalGrid {
    coarse: UniformGrid,
    fine: UniformGrid,
    placements: HashMap<UnitId, Placement>,
    /// Fine-tier occupancy per coarse cell, for O(1) placement decisions.
    fine_per_coarse: HashMap<CellKey, usize>,
}

impl HierarchicalGrid {
    pub fn new(coarse_cell_size: f32, fine_cell_size: f32) -> Self {
        Self {
            coarse: UniformGrid::new(coarse_cell_size),
            fine: UniformGrid::new(fine_cell_size),
            placements: HashMap::new(),
            fine_per_coarse: HashMap::new(),
        }
    }

    pub fn tier_of(&self, id: UnitId) -> Option<Tier> {
        self.placements.get(&id).map(|p| p.tier)
    }

    pub fn tier_len(&self, tier: Tier) -> usize {
        match tier {
            Tier::Coarse => self.coarse.len(),
            Tier::Fine => self.fine.len(),
        }
    }

    fn fine_occupancy(&self, cell: CellKey) -> usize {
        self.fine_per_coarse.get(&cell).copied().unwrap_or(0)
    }

    fn adjust_fine(&mut self, cell: CellKey, added: bool) {
        if added {
            *self.fine_per_coarse.entry(cell).or_insert(0) += 1;
        } else if let Some(count) = self.fine_per_coarse.get_mut(&cell) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.fine_per_coarse.remove(&cell);
            }
        }
    }
}

impl SpatialIndex for HierarchicalGrid {
    fn insert(&mut self, entry: SpatialEntry) {
        self.remove(entry.id);
        let coarse_cell = self.coarse.cell_of(entry.position);
        let tier = if self.fine_occupancy(coarse_cell) < self.coarse.cell_len(coarse_cell) {
            Tier::Fine
        } else {
            Tier::Coarse
        };
        match tier {
            Tier::Coarse => self.coarse.insert(entry),
            Tier::Fine => {
                self.fine.insert(entry);
                self.adjust_fine(coarse_cell, true);
            }
        }
        self.placements.insert(entry.id, Placement { tier, coarse_cell });
    }

    fn remove(&mut self, id: UnitId) -> bool {
        let Some(placement) = self.placements.remove(&id) else {
            return false;
        };
        match placement.tier {
            Tier::Coarse => self.coarse.remove(id),
            Tier::Fine => {
                self.adjust_fine(placement.coarse_cell, false);
                self.fine.remove(id)
            }
        }
    }

    fn update(&mut self, id: UnitId, position: Position) -> bool {
        let Some(placement) = self.placements.get(&id).copied() else {
            return false;
        };
        let coarse_cell = self.coarse.cell_of(position);
        let moved = match placement.tier {
            Tier::Coarse => self.coarse.update(id, position),
            Tier::Fine => {
                if coarse_cell != placement.coarse_cell {
                    self.adjust_fine(placement.coarse_cell, false);
                    self.adjust_fine(coarse_cell, true);
                }
                self.fine.update(id, position)
            }
        };
        self.placements.insert(
            id,
            Placement {
                tier: placement.tier,
                coarse_cell,
            },
        );
        moved
    }

    fn query_entries(&self, center: Position, radius: f32) -> Vec<SpatialEntry> {
        let mut merged = self.coarse.query_entries(center, radius);
        merged.extend(self.fine.query_entries(center, radius));
        merged.sort_unstable_by_key(|e| e.id);
        merged.dedup_by_key(|e| e.id);
        merged
    }

    fn potential_pairs(&self) -> PairMap {
        exact_pairs(self)
    }

    fn entries(&self) -> Vec<SpatialEntry> {
        let mut all = self.coarse.entries();
        all.extend(self.fine.entries());
        all
    }

    fn len(&self) -> usize {
        self.placements.len()
    }

    fn clear(&mut self) {
        self.coarse.clear();
        self.fine.clear();
        self.placements.clear();
        self.fine_per_coarse.clear();
    }

    fn bucket_memberships(&self) -> usize {
        self.coarse.bucket_memberships() + self.fine.bucket_memberships()
    }
}
