//! Two lines of units close in on each other while the spatial strategy is
//! swapped mid-fight.
//!
//! Run with: RUST_LOG=skirmish=debug cargo run --example skirmish_demo [config.toml]

use skirmish::{CombatConfig, CombatWorld, Faction, Position, StrategyKind, UnitId, UnitSpec};
use tracing_subscriber::prelude::*;

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CombatConfig::from_file(std::path::Path::new(&path)).unwrap(),
        None => CombatConfig::default(),
    };
    let mut combat = CombatWorld::new(config).unwrap();
    combat.set_effect_sink(|effect| {
        tracing::info!(
            attacker = %effect.attacker,
            defender = %effect.defender,
            damage = effect.damage,
            "hit"
        );
    });

    println!("=== Skirmish - Combat Detection Demo ===\n");

    // Blue holds x = 0, Red starts at x = 120 and advances
    for i in 0..8u32 {
        let y = i as f32 * 8.0;
        combat
            .add_unit(UnitSpec::new(i, 0.0, y, Faction::Blue).with_range(25.0))
            .unwrap();
        combat
            .add_unit(UnitSpec::new(100 + i, 120.0, y, Faction::Red).with_range(20.0).with_health(80.0))
            .unwrap();
    }

    let strategies = [
        StrategyKind::Quadtree,
        StrategyKind::DynamicHierarchical,
        StrategyKind::Adaptive,
    ];
    for step in 0..120u32 {
        if step < 60 {
            for i in 0..8u32 {
                let id = UnitId(100 + i);
                if let Ok(unit) = combat.unit(id) {
                    let position = Position::new(unit.position.x - 1.5, unit.position.y);
                    combat.move_unit(id, position).unwrap();
                }
            }
        }
        if step % 40 == 39 {
            let kind = strategies[(step / 40) as usize % strategies.len()];
            let migrated = combat.switch_to(kind);
            println!("--- switched to {kind} ({migrated} units) ---");
        }

        let report = combat.tick(0.05);
        if report.ran && report.tick % 10 == 0 {
            println!(
                "tick {:>3} t={:>5.2}s units={:>2} sessions={:>2} pairs={:>2}",
                report.tick,
                combat.current_time(),
                combat.unit_count(),
                combat.sessions().len(),
                combat.potential_pairs().values().map(Vec::len).sum::<usize>(),
            );
        }
        for id in report.fallen {
            println!("    unit {id} fell");
        }
    }

    combat.profiler().print_summary();
    println!("=== Performance ===\n");
    println!("{}", serde_json::to_string_pretty(&combat.performance_stats()).unwrap());
    println!("\n=== Final State (JSON) ===\n");
    println!("{}", combat.snapshot().to_json_pretty().unwrap());
}
