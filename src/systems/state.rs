//! Pass 3: index sync, per-unit state and death cleanup.

use super::{view_of, CombatantQuery, FallenUnits, SessionTable, UnitRegistry};
use crate::components::*;
use crate::spatial::{IndexManager, SpatialIndex};
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// Sync units moved directly through the world into the index, recompute
/// every unit's [`CombatState`]
/// and remove the dead from the registry, the index, every threat table,
/// engaged set and session.
pub fn unit_state_system(
    mut commands: Commands,
    mut index: ResMut<IndexManager>,
    mut registry: ResMut<UnitRegistry>,
    mut sessions: ResMut<SessionTable>,
    mut fallen: ResMut<FallenUnits>,
    moved: Query<(&UnitId, &Position), Changed<Position>>,
    mut units: Query<CombatantQuery>,
) {
    for (id, position) in &moved {
        if registry.contains(*id) {
            index.update(*id, *position);
        }
    }

    let views: BTreeMap<UnitId, (Entity, UnitView)> = registry
        .iter()
        .filter_map(|(id, entity)| Some((id, (entity, view_of(&units, entity)?))))
        .collect();

    let dead: Vec<(UnitId, Entity)> = views
        .iter()
        .filter(|(_, (_, view))| !view.is_alive())
        .map(|(&id, &(entity, _))| (id, entity))
        .collect();

    for (&id, &(entity, view)) in &views {
        let Ok((.., mut engagement, mut threat, mut state)) = units.get_mut(entity) else {
            continue;
        };
        if !view.is_alive() {
            *state = CombatState::Dead;
            continue;
        }
        for &(dead_id, _) in &dead {
            engagement.forget(dead_id);
            threat.forget(dead_id);
        }
        let valid = |opponent: &UnitId| {
            views
                .get(opponent)
                .is_some_and(|(_, other)| view.can_attack(other))
        };
        engagement.engaged.retain(|opponent| valid(opponent));
        if engagement.current_target.is_some_and(|target| !valid(&target)) {
            engagement.current_target = None;
        }
        let next = if engagement.engaged.is_empty() {
            CombatState::Idle
        } else {
            CombatState::Engaging
        };
        if *state != next {
            tracing::trace!(unit = %id, from = state.as_str(), to = next.as_str(), "state change");
            *state = next;
        }
    }

    for (id, entity) in dead {
        let closed = sessions.purge(id);
        index.remove(id);
        registry.unregister(id);
        commands.entity(entity).despawn();
        fallen.0.push(id);
        tracing::debug!(unit = %id, sessions_closed = closed, "unit died");
    }
}
