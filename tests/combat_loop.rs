//! End-to-end behaviour of the detection loop through the public API.

use skirmish::{
    CombatConfig, CombatError, CombatState, CombatWorld, DamageModel, Faction, Position,
    StrategyKind, UnitId, UnitSpec,
};

fn sturdy(id: u32, x: f32, y: f32, faction: Faction) -> UnitSpec {
    UnitSpec::new(id, x, y, faction).with_range(5.0).with_health(1.0e6)
}

fn world_with_timeout(timeout: f32) -> CombatWorld {
    CombatWorld::new(CombatConfig {
        session_timeout: timeout,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn session_lives_while_in_contact_and_expires_after_timeout() {
    let mut world = world_with_timeout(1.0);
    world.add_unit(sturdy(1, 10.0, 10.0, Faction::Red)).unwrap();
    world.add_unit(sturdy(2, 13.0, 10.0, Faction::Blue)).unwrap();

    for _ in 0..10 {
        assert!(world.tick(0.1).ran);
        let session = world.sessions().get(UnitId(1), UnitId(2)).unwrap();
        assert_eq!(session.last_activity, world.current_time());
        assert_eq!(world.unit(UnitId(1)).unwrap().state, CombatState::Engaging);
    }
    let contact_lost_at = world.current_time();

    world.move_unit(UnitId(2), Position::new(400.0, 400.0)).unwrap();
    let mut expired_at = None;
    for _ in 0..30 {
        world.tick(0.1);
        if world.sessions().is_empty() {
            expired_at = Some(world.current_time());
            break;
        }
        assert_eq!(
            world.sessions().get(UnitId(1), UnitId(2)).unwrap().last_activity,
            contact_lost_at
        );
    }

    let expired_at = expired_at.expect("session never expired");
    let idle = expired_at - contact_lost_at;
    assert!(idle > 1.0 && idle <= 1.0 + 0.1 + 1e-3, "expired after {idle}s");
    assert_eq!(world.unit(UnitId(1)).unwrap().state, CombatState::Idle);
}

#[test]
fn death_purges_the_unit_everywhere() {
    let mut world = CombatWorld::default();
    world.add_unit(UnitSpec::new(1, 0.0, 0.0, Faction::Red).with_range(10.0)).unwrap();
    world
        .add_unit(UnitSpec::new(2, 4.0, 0.0, Faction::Blue).with_range(10.0).with_health(5.0))
        .unwrap();
    world.add_unit(UnitSpec::new(3, 0.0, 4.0, Faction::Green).with_range(10.0)).unwrap();

    let report = world.tick(0.1);

    // Threat ties resolve to the lowest id, so 1 finishes off 2 first
    assert_eq!(report.fallen, vec![UnitId(2)]);
    assert_eq!(report.effects[0].attacker, UnitId(1));
    assert_eq!(report.effects[0].defender, UnitId(2));
    assert!(report.effects.iter().all(|e| e.attacker != UnitId(2)));

    assert!(matches!(world.unit(UnitId(2)), Err(CombatError::UnknownUnit(_))));
    for survivor in [1, 3] {
        let id = UnitId(survivor);
        assert!(!world.engaged_with(id).unwrap().contains(&UnitId(2)));
        assert_eq!(world.threat(id, UnitId(2)).unwrap(), 0.0);
        assert_ne!(world.unit(id).unwrap().current_target, Some(UnitId(2)));
    }
    assert!(world.sessions().iter().all(|s| !s.key.involves(UnitId(2))));
    assert!(world.sessions().get(UnitId(1), UnitId(3)).is_some());
    assert_eq!(world.units_in_range(Position::new(4.0, 0.0), 0.5), Vec::<UnitId>::new());
    assert_eq!(world.unit_count(), 2);
}

#[test]
fn accumulator_runs_exactly_one_pass_per_interval() {
    let mut world = CombatWorld::default();
    for _ in 0..3 {
        assert!(!world.tick(0.03).ran);
    }
    assert_eq!(world.current_tick(), 0);
    assert!(world.tick(0.03).ran);
    assert_eq!(world.current_tick(), 1);

    // Non-finite or negative time is ignored
    assert!(!world.tick(f32::NAN).ran);
    assert!(!world.tick(-5.0).ran);
    assert_eq!(world.current_tick(), 1);
}

#[test]
fn neutral_and_friendly_units_never_fight() {
    let mut world = CombatWorld::default();
    world.add_unit(sturdy(1, 10.0, 10.0, Faction::Red)).unwrap();
    world.add_unit(sturdy(2, 11.0, 10.0, Faction::Red)).unwrap();
    world.add_unit(sturdy(3, 10.0, 11.0, Faction::Neutral)).unwrap();
    world.add_unit(sturdy(4, 30.0, 30.0, Faction::Blue).with_range(0.0)).unwrap();

    for _ in 0..5 {
        assert!(world.tick(0.1).effects.is_empty());
    }
    assert!(world.sessions().is_empty());
    assert!(world.potential_pairs().is_empty());
}

#[test]
fn outcome_does_not_depend_on_strategy() {
    let mut outcomes = Vec::new();
    for kind in StrategyKind::ALL {
        let mut world = CombatWorld::default().with_damage_model(DamageModel::new(|attacker, _| {
            attacker.attack_range
        }));
        world.switch_to(kind);
        // Everyone shares one uniform cell so approximate pairing is complete
        for i in 0..12u32 {
            let faction = [Faction::Red, Faction::Blue, Faction::Green][i as usize % 3];
            let spec = UnitSpec::new(i, 10.0 + (i % 4) as f32 * 8.0, 10.0 + (i / 4) as f32 * 8.0, faction)
                .with_range(9.0 + i as f32)
                .with_health(60.0);
            world.add_unit(spec).unwrap();
        }
        let mut effects = Vec::new();
        for _ in 0..40 {
            effects.extend(world.tick(0.25).effects);
        }
        outcomes.push((kind, effects, world.snapshot().units));
    }
    for (kind, effects, units) in &outcomes[1..] {
        assert_eq!(effects, &outcomes[0].1, "{kind} effects differ");
        assert_eq!(units, &outcomes[0].2, "{kind} final units differ");
    }
}

#[test]
fn switching_mid_fight_keeps_sessions_and_units() {
    let mut world = CombatWorld::default();
    world.add_unit(sturdy(1, 10.0, 10.0, Faction::Red)).unwrap();
    world.add_unit(sturdy(2, 13.0, 10.0, Faction::Blue)).unwrap();
    world.add_unit(sturdy(3, 900.0, 900.0, Faction::Green)).unwrap();
    world.tick(0.1);

    for kind in StrategyKind::ALL {
        assert_eq!(world.switch_to(kind), 3);
        assert_eq!(world.units_in_range(Position::new(900.0, 900.0), 1.0), vec![UnitId(3)]);
        assert!(world.tick(0.1).ran);
        assert_eq!(world.sessions().len(), 1);
        assert_eq!(world.potential_pairs().len(), 1);
    }
    assert_eq!(world.performance_stats().index.migrations, 5);
}

#[test]
fn unknown_ids_and_strategies_are_errors() {
    let mut world = CombatWorld::default();
    world.add_unit(sturdy(1, 0.0, 0.0, Faction::Red)).unwrap();

    assert!(matches!(world.remove_unit(UnitId(9)), Err(CombatError::UnknownUnit(UnitId(9)))));
    assert!(matches!(
        world.move_unit(UnitId(9), Position::new(1.0, 1.0)),
        Err(CombatError::UnknownUnit(_))
    ));
    assert!(world.threat(UnitId(9), UnitId(1)).is_err());
    assert!(world.engaged_with(UnitId(9)).is_err());
    assert!(world.force_combat(UnitId(1), UnitId(9)).is_err());
    assert!(matches!(
        world.add_unit(sturdy(1, 5.0, 5.0, Faction::Blue)),
        Err(CombatError::DuplicateUnit(UnitId(1)))
    ));

    let err = world.switch_strategy("octree").unwrap_err();
    assert!(matches!(err, CombatError::UnknownStrategy(ref name) if name == "octree"));
    assert_eq!(world.current_strategy(), StrategyKind::UniformGrid);
    assert_eq!(world.switch_strategy("QuadTree").unwrap(), 1);
    assert_eq!(world.current_strategy(), StrategyKind::Quadtree);
}

#[test]
fn configuration_drives_construction() {
    let config = CombatConfig::from_toml_str(
        r#"
        tick_interval = 0.5
        strategy = "dynamic_hierarchical"

        [spatial.dynamic]
        coarse_cell_size = 10.0
        fine_cell_size = 1.0
        refine_threshold = 5
        unrefine_threshold = 2
        "#,
    )
    .unwrap();
    let mut world = CombatWorld::new(config).unwrap();
    assert_eq!(world.current_strategy(), StrategyKind::DynamicHierarchical);
    assert!(!world.tick(0.3).ran);
    assert!(world.tick(0.3).ran);

    for i in 0..6u32 {
        world.add_unit(sturdy(i, 1.0 + i as f32, 1.0, Faction::Red)).unwrap();
    }
    let refinement = world.performance_stats().index.refinement.unwrap();
    assert_eq!(refinement.refine_events, 1);
    assert_eq!(refinement.refined_cells, 1);

    let bad = CombatConfig {
        session_timeout: -1.0,
        ..Default::default()
    };
    assert!(matches!(CombatWorld::new(bad), Err(CombatError::Config(_))));
}
