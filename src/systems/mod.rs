//! ECS systems for the combat detection loop.
//!
//! One detection pass runs three systems, chained in this order:
//!
//! 1. `detection_system` - asks the active index for potential pairs, engages
//!    each qualifying pair, opens or refreshes its session and seeds threat.
//! 2. `engagement_system` - expires idle sessions, then lets every ready unit
//!    attack its highest-threat valid opponent through the [`DamageModel`].
//! 3. `unit_state_system` - syncs moved units into the index, recomputes each
//!    unit's [`CombatState`](crate::components::CombatState) and removes the dead.
//!
//! Shared resources live here: the simulation clock, the unit registry and the
//! buffers that carry per-pass results back to the caller.

pub mod detection;
pub mod engagement;
pub mod sessions;
pub mod state;

pub use detection::detection_system;
pub use engagement::{engagement_system, DamageModel};
pub use sessions::{CombatSession, SessionKey, SessionTable};
pub use state::unit_state_system;

use crate::components::*;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Simulation time and completed passes.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CombatClock {
    /// Simulation seconds at the current pass.
    pub now: f32,
    pub tick: u64,
}

impl CombatClock {
    pub fn advance(&mut self, elapsed: f32) {
        self.now += elapsed;
        self.tick = self.tick.wrapping_add(1);
    }
}

/// Live units by id.
#[derive(Resource, Debug, Clone, Default)]
pub struct UnitRegistry {
    by_id: BTreeMap<UnitId, Entity>,
}

impl UnitRegistry {
    pub fn entity(&self, id: UnitId) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn register(&mut self, id: UnitId, entity: Entity) {
        self.by_id.insert(id, entity);
    }

    pub fn unregister(&mut self, id: UnitId) -> Option<Entity> {
        self.by_id.remove(&id)
    }

    /// Ids ascending with their entities.
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, Entity)> + '_ {
        self.by_id.iter().map(|(&id, &entity)| (id, entity))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// One applied attack, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatEffect {
    pub attacker: UnitId,
    pub defender: UnitId,
    pub damage: f32,
    pub time: f32,
}

/// Attacks applied during the current pass.
#[derive(Resource, Debug, Clone, Default)]
pub struct CombatEffects(pub Vec<CombatEffect>);

/// Units removed because they died during the current pass.
#[derive(Resource, Debug, Clone, Default)]
pub struct FallenUnits(pub Vec<UnitId>);

/// Query data of a combat unit. Read-only access through `Query::get`
/// yields plain references.
pub(crate) type CombatantQuery = (
    &'static UnitId,
    &'static Position,
    &'static Faction,
    &'static AttackRange,
    &'static mut Health,
    &'static mut AttackCooldown,
    &'static mut Engagement,
    &'static mut ThreatTable,
    &'static mut CombatState,
);

/// Snapshot of a unit's combat data, or `None` for a stale entity.
pub(crate) fn view_of(units: &Query<CombatantQuery>, entity: Entity) -> Option<UnitView> {
    let (id, position, faction, range, health, _, engagement, _, state) = units.get(entity).ok()?;
    Some(UnitView {
        id: *id,
        position: *position,
        faction: *faction,
        attack_range: range.0,
        health: *health,
        state: *state,
        current_target: engagement.current_target,
    })
}
