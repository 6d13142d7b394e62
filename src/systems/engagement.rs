//! Pass 2: session bookkeeping and attacks.
//!
//! Sessions idle past the timeout are dropped first. Every unit still sharing
//! a session with someone then gets one chance to attack, in ascending id
//! order: if it is alive and its cooldown is ready, it picks the valid
//! opponent it is most threatened by and deals whatever the [`DamageModel`]
//! returns.

use super::{
    view_of, CombatClock, CombatEffect, CombatEffects, CombatantQuery, SessionTable, UnitRegistry,
};
use crate::components::*;
use crate::config::CombatConfig;
use bevy_ecs::prelude::*;

/// Damage callback signature: `(attacker, defender) -> damage`.
pub type DamageFn = dyn Fn(&UnitView, &UnitView) -> f32 + Send + Sync;

/// Host-supplied combat math. The core only clamps the result to be
/// non-negative and finite.
#[derive(Resource)]
pub struct DamageModel(Box<DamageFn>);

impl DamageModel {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&UnitView, &UnitView) -> f32 + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    /// Every attack deals `amount`.
    pub fn flat(amount: f32) -> Self {
        Self::new(move |_, _| amount)
    }

    pub fn damage(&self, attacker: &UnitView, defender: &UnitView) -> f32 {
        let damage = (self.0)(attacker, defender);
        if damage.is_finite() && damage > 0.0 {
            damage
        } else {
            0.0
        }
    }
}

impl Default for DamageModel {
    fn default() -> Self {
        Self::flat(10.0)
    }
}

impl std::fmt::Debug for DamageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DamageModel(..)")
    }
}

pub fn engagement_system(
    config: Res<CombatConfig>,
    clock: Res<CombatClock>,
    damage_model: Res<DamageModel>,
    registry: Res<UnitRegistry>,
    mut sessions: ResMut<SessionTable>,
    mut effects: ResMut<CombatEffects>,
    mut units: Query<CombatantQuery>,
) {
    let now = clock.now;
    for key in sessions.expire(now, config.session_timeout) {
        tracing::debug!(session = %key, time = now, "combat session expired");
    }

    for (attacker_id, opponents) in sessions.opponents() {
        let Some(attacker_entity) = registry.entity(attacker_id) else {
            continue;
        };
        let Some(attacker) = view_of(&units, attacker_entity) else {
            continue;
        };
        if !attacker.is_alive() {
            continue;
        }
        let ready = units
            .get(attacker_entity)
            .is_ok_and(|(_, _, _, _, _, cooldown, ..)| cooldown.is_ready(now));
        if !ready {
            continue;
        }

        let valid: Vec<(UnitView, Entity)> = opponents
            .into_iter()
            .filter_map(|id| {
                let entity = registry.entity(id)?;
                let view = view_of(&units, entity)?;
                attacker.can_attack(&view).then_some((view, entity))
            })
            .collect();
        let Ok((.., threat, _)) = units.get(attacker_entity) else {
            continue;
        };
        let Some(target_id) = threat.highest(valid.iter().map(|(view, _)| view.id)) else {
            continue;
        };
        let Some(&(target, target_entity)) = valid.iter().find(|(view, _)| view.id == target_id)
        else {
            continue;
        };

        let damage = damage_model.damage(&attacker, &target);
        if let Ok((_, _, _, _, mut health, _, _, mut threat, _)) = units.get_mut(target_entity) {
            health.damage(damage);
            threat.raise(attacker_id, damage);
        }
        if let Ok((_, _, _, _, _, mut cooldown, mut engagement, _, _)) =
            units.get_mut(attacker_entity)
        {
            cooldown.trigger(now);
            engagement.current_target = Some(target_id);
        }
        tracing::trace!(attacker = %attacker_id, defender = %target_id, damage, "attack");
        effects.0.push(CombatEffect {
            attacker: attacker_id,
            defender: target_id,
            damage,
            time: now,
        });
    }
}
