//! Pass 1: detection.
//!
//! The active index proposes potential pairs. Each proposal is re-checked
//! against the registry's current data (both alive, hostile, defender within
//! the attacker's own range) before the two units are engaged with each other,
//! their session refreshed and their mutual threat raised.

use super::{view_of, CombatClock, CombatantQuery, SessionTable, UnitRegistry};
use crate::components::*;
use crate::config::CombatConfig;
use crate::spatial::{IndexManager, SpatialIndex};
use bevy_ecs::prelude::*;

struct Contact {
    attacker: (UnitId, Entity),
    defender: (UnitId, Entity),
}

pub fn detection_system(
    index: Res<IndexManager>,
    config: Res<CombatConfig>,
    clock: Res<CombatClock>,
    registry: Res<UnitRegistry>,
    mut sessions: ResMut<SessionTable>,
    mut units: Query<CombatantQuery>,
) {
    // Gather: validate proposals without touching any component.
    let mut contacts = Vec::new();
    for (attacker_id, defenders) in index.potential_pairs() {
        let Some(attacker_entity) = registry.entity(attacker_id) else {
            continue;
        };
        let Some(attacker) = view_of(&units, attacker_entity) else {
            continue;
        };
        for defender_id in defenders {
            let Some(defender_entity) = registry.entity(defender_id) else {
                continue;
            };
            let Some(defender) = view_of(&units, defender_entity) else {
                continue;
            };
            if attacker.can_attack(&defender) {
                contacts.push(Contact {
                    attacker: (attacker_id, attacker_entity),
                    defender: (defender_id, defender_entity),
                });
            }
        }
    }

    // Apply
    for contact in contacts {
        let (a, b) = (contact.attacker, contact.defender);
        for ((_, entity), (opponent, _)) in [(a, b), (b, a)] {
            if let Ok((.., mut engagement, mut threat, _)) = units.get_mut(entity) {
                engagement.engage(opponent);
                threat.raise(opponent, config.initial_threat);
            }
        }
        if sessions.touch(a.0, b.0, clock.now) {
            tracing::debug!(attacker = %a.0, defender = %b.0, time = clock.now, "combat session opened");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::SpatialEntry;
    use crate::systems::CombatEffects;

    fn world_with(specs: &[UnitSpec]) -> World {
        let mut world = World::new();
        let config = CombatConfig::default();
        let mut index = IndexManager::new(config.strategy, config.spatial.clone());
        let mut registry = UnitRegistry::default();
        for spec in specs {
            let entity = world.spawn(UnitBundle::from(*spec)).id();
            registry.register(spec.id, entity);
            index.insert(SpatialEntry::from(spec));
        }
        world.insert_resource(config);
        world.insert_resource(index);
        world.insert_resource(registry);
        world.insert_resource(CombatClock { now: 2.0, tick: 1 });
        world.insert_resource(SessionTable::default());
        world.insert_resource(CombatEffects::default());
        world
    }

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(detection_system);
        schedule.run(world);
    }

    fn unit(world: &World, id: u32) -> EntityRef<'_> {
        let entity = world.resource::<UnitRegistry>().entity(UnitId(id)).unwrap();
        world.entity(entity)
    }

    #[test]
    fn test_detection_engages_both_and_seeds_threat() {
        let mut world = world_with(&[
            UnitSpec::new(1, 0.0, 0.0, Faction::Red).with_range(5.0),
            UnitSpec::new(2, 3.0, 0.0, Faction::Blue).with_range(5.0),
        ]);
        run(&mut world);

        let sessions = world.resource::<SessionTable>();
        let session = sessions.get(UnitId(1), UnitId(2)).unwrap();
        assert_eq!(session.started_at, 2.0);

        let red = unit(&world, 1);
        assert!(red.get::<Engagement>().unwrap().is_engaged_with(UnitId(2)));
        assert_eq!(red.get::<ThreatTable>().unwrap().get(UnitId(2)), 10.0);
        let blue = unit(&world, 2);
        assert!(blue.get::<Engagement>().unwrap().is_engaged_with(UnitId(1)));
        assert_eq!(blue.get::<ThreatTable>().unwrap().get(UnitId(1)), 10.0);
    }

    #[test]
    fn test_repeat_detection_accumulates_threat() {
        let mut world = world_with(&[
            UnitSpec::new(1, 0.0, 0.0, Faction::Red).with_range(5.0),
            UnitSpec::new(2, 3.0, 0.0, Faction::Blue).with_range(5.0),
        ]);
        run(&mut world);
        world.resource_mut::<CombatClock>().advance(0.1);
        run(&mut world);

        let session = world.resource::<SessionTable>().get(UnitId(1), UnitId(2)).unwrap();
        assert!(session.last_activity > session.started_at);
        let red = unit(&world, 1);
        assert_eq!(red.get::<ThreatTable>().unwrap().get(UnitId(2)), 20.0);
    }

    #[test]
    fn test_dead_or_zero_range_units_do_not_detect() {
        let mut world = world_with(&[
            UnitSpec::new(1, 0.0, 0.0, Faction::Red).with_range(0.0),
            UnitSpec::new(2, 3.0, 0.0, Faction::Blue).with_range(0.0),
            UnitSpec::new(3, 1.0, 1.0, Faction::Green).with_range(5.0).with_health(0.0),
        ]);
        run(&mut world);
        assert!(world.resource::<SessionTable>().is_empty());
    }
}
