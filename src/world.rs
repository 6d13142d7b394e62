//! Serializable snapshot of the combat state.
//!
//! The `Snapshot` struct is what a host hands to a renderer, a log or a
//! debugging overlay. Units and sessions are ordered by id.

use crate::components::*;
use crate::spatial::IndexManager;
use crate::systems::SessionTable;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single unit's state for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u32,
    pub faction: String,
    pub x: f32,
    pub y: f32,
    pub attack_range: f32,
    pub health: f32,
    pub health_max: f32,
    pub state: String,
    pub target: Option<u32>,
    pub engaged: Vec<u32>,
}

/// Snapshot of a combat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub participants: Vec<u32>,
    pub started_at: f32,
    pub last_activity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Completed detection passes.
    pub tick: u64,
    /// Simulation time in seconds.
    pub time: f32,
    /// Active spatial strategy name.
    pub strategy: String,
    pub units: Vec<UnitSnapshot>,
    pub sessions: Vec<SessionSnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut query = world.query::<(
            &UnitId,
            &Faction,
            &Position,
            &AttackRange,
            &Health,
            &CombatState,
            &Engagement,
        )>();

        let mut units: Vec<UnitSnapshot> = query
            .iter(world)
            .map(|(id, faction, pos, range, health, state, engagement)| UnitSnapshot {
                id: id.0,
                faction: faction.as_str().to_string(),
                x: pos.x,
                y: pos.y,
                attack_range: range.0,
                health: health.current,
                health_max: health.max,
                state: state.as_str().to_string(),
                target: engagement.current_target.map(|t| t.0),
                engaged: engagement.engaged.iter().map(|e| e.0).collect(),
            })
            .collect();
        units.sort_by_key(|u| u.id);

        let sessions = world
            .get_resource::<SessionTable>()
            .map(|table| {
                table
                    .iter()
                    .map(|s| SessionSnapshot {
                        id: s.key.to_string(),
                        participants: s.participants.iter().map(|p| p.0).collect(),
                        started_at: s.started_at,
                        last_activity: s.last_activity,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let strategy = world
            .get_resource::<IndexManager>()
            .map(|index| index.kind().name().to_string())
            .unwrap_or_default();

        Self {
            tick,
            time,
            strategy,
            units,
            sessions,
        }
    }

    /// Serialize snapshot to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
