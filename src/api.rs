//! Public API for the combat core.
//!
//! [`CombatWorld`] is the explicit context object a host drives: it owns the
//! ECS world (unit registry, active spatial index, sessions) and the schedule
//! of the three detection-loop systems.
//!
//! ## Fixed interval
//!
//! `tick(dt)` accumulates time. Once the accumulator reaches the configured
//! tick interval, exactly one full pass runs and the accumulator is reset to
//! zero, so a call never runs more than one pass and a pass never runs
//! partially. A host calling `tick` more often than the interval only changes
//! pacing.
//!
//! ## Threading
//!
//! Everything here is synchronous and single-threaded. Unit spawns, despawns
//! and strategy switches happen between ticks, never during one.

use crate::components::*;
use crate::config::CombatConfig;
use crate::error::{CombatError, Result};
use crate::profiler::{PerformanceStats, Profiler, MIGRATION_SECTION, TICK_SECTION};
use crate::spatial::{IndexManager, PairMap, SpatialEntry, SpatialIndex, StrategyKind};
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Host callback for presentation of applied attacks.
pub type EffectSink = Box<dyn FnMut(&CombatEffect) + Send>;

/// Outcome of one `tick` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Whether a detection pass ran during this call.
    pub ran: bool,
    /// Completed passes after this call.
    pub tick: u64,
    pub effects: Vec<CombatEffect>,
    /// Units that died and were removed during the pass.
    pub fallen: Vec<UnitId>,
}

/// The main combat world container.
pub struct CombatWorld {
    world: World,
    schedule: Schedule,
    tick_interval: f32,
    /// Accumulated time for the fixed interval.
    time_accumulator: f32,
    profiler: Profiler,
    effect_sink: Option<EffectSink>,
}

impl CombatWorld {
    /// Create a combat world from a validated configuration.
    pub fn new(config: CombatConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CombatConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(IndexManager::new(config.strategy, config.spatial.clone()));
        world.insert_resource(UnitRegistry::default());
        world.insert_resource(SessionTable::default());
        world.insert_resource(CombatClock::default());
        world.insert_resource(CombatEffects::default());
        world.insert_resource(FallenUnits::default());
        world.insert_resource(DamageModel::default());
        let tick_interval = config.tick_interval;
        world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems((detection_system, engagement_system, unit_state_system).chain());

        Self {
            world,
            schedule,
            tick_interval,
            time_accumulator: 0.0,
            profiler: Profiler::new(),
            effect_sink: None,
        }
    }

    /// Replace the combat math.
    pub fn with_damage_model(mut self, model: DamageModel) -> Self {
        self.world.insert_resource(model);
        self
    }

    /// Swap the combat math between ticks.
    pub fn set_damage_model(&mut self, model: DamageModel) {
        self.world.insert_resource(model);
    }

    /// Install the callback that receives every applied attack after a pass.
    pub fn set_effect_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&CombatEffect) + Send + 'static,
    {
        self.effect_sink = Some(Box::new(sink));
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// Register a unit and index it.
    pub fn add_unit(&mut self, spec: UnitSpec) -> Result<UnitId> {
        if self.registry().contains(spec.id) {
            return Err(CombatError::DuplicateUnit(spec.id));
        }
        let entity = self.world.spawn(UnitBundle::from(spec)).id();
        self.world
            .resource_mut::<UnitRegistry>()
            .register(spec.id, entity);
        self.world
            .resource_mut::<IndexManager>()
            .insert(SpatialEntry::from(&spec));
        tracing::debug!(unit = %spec.id, faction = spec.faction.as_str(), "unit added");
        Ok(spec.id)
    }

    /// Unregister a unit and erase it from the index, every session, threat
    /// table and engaged set.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<()> {
        let entity = self
            .world
            .resource_mut::<UnitRegistry>()
            .unregister(id)
            .ok_or(CombatError::UnknownUnit(id))?;
        self.world.resource_mut::<IndexManager>().remove(id);
        self.world.resource_mut::<SessionTable>().purge(id);
        self.world.despawn(entity);

        let mut others = self.world.query::<(&mut Engagement, &mut ThreatTable)>();
        for (mut engagement, mut threat) in others.iter_mut(&mut self.world) {
            engagement.forget(id);
            threat.forget(id);
        }
        tracing::debug!(unit = %id, "unit removed");
        Ok(())
    }

    /// Move a unit. The index sees the new position right away, so the next
    /// pass detects against it.
    pub fn move_unit(&mut self, id: UnitId, position: Position) -> Result<()> {
        let entity = self.entity(id)?;
        *self
            .world
            .get_mut::<Position>(entity)
            .ok_or(CombatError::UnknownUnit(id))? = position;
        self.world.resource_mut::<IndexManager>().update(id, position);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loop
    // ------------------------------------------------------------------

    /// Advance time by `dt` seconds, running at most one detection pass.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        if dt.is_finite() && dt > 0.0 {
            self.time_accumulator += dt;
        }
        if self.time_accumulator < self.tick_interval {
            return TickReport {
                tick: self.current_tick(),
                ..TickReport::default()
            };
        }
        let elapsed = std::mem::take(&mut self.time_accumulator);
        self.world.resource_mut::<CombatClock>().advance(elapsed);

        self.profiler.begin_section(TICK_SECTION);
        self.schedule.run(&mut self.world);
        self.profiler.end_section();

        let effects = std::mem::take(&mut self.world.resource_mut::<CombatEffects>().0);
        let fallen = std::mem::take(&mut self.world.resource_mut::<FallenUnits>().0);
        if let Some(sink) = self.effect_sink.as_mut() {
            for effect in &effects {
                sink(effect);
            }
        }
        TickReport {
            ran: true,
            tick: self.current_tick(),
            effects,
            fallen,
        }
    }

    /// Engage a hostile pair immediately, as if detection had found it.
    ///
    /// Returns false when neither unit can reach the other.
    pub fn force_combat(&mut self, a: UnitId, b: UnitId) -> Result<bool> {
        let first = self.unit(a)?;
        let second = self.unit(b)?;
        if !(first.can_attack(&second) || second.can_attack(&first)) {
            return Ok(false);
        }
        let initial_threat = self.world.resource::<CombatConfig>().initial_threat;
        for (me, opponent) in [(a, b), (b, a)] {
            let entity = self.entity(me)?;
            let mut unit = self.world.entity_mut(entity);
            if let Some(mut engagement) = unit.get_mut::<Engagement>() {
                engagement.engage(opponent);
            }
            if let Some(mut threat) = unit.get_mut::<ThreatTable>() {
                threat.raise(opponent, initial_threat);
            }
        }
        let now = self.current_time();
        self.world.resource_mut::<SessionTable>().touch(a, b, now);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Ids within `radius` of `center`, ascending.
    pub fn units_in_range(&self, center: Position, radius: f32) -> Vec<UnitId> {
        self.index().query_range(center, radius)
    }

    pub fn potential_pairs(&self) -> PairMap {
        self.index().potential_pairs()
    }

    pub fn unit(&self, id: UnitId) -> Result<UnitView> {
        let entity = self.entity(id)?;
        view_from(id, self.world.entity(entity)).ok_or(CombatError::UnknownUnit(id))
    }

    /// Threat `id` holds for `opponent` (zero when none).
    pub fn threat(&self, id: UnitId, opponent: UnitId) -> Result<f32> {
        let entity = self.entity(id)?;
        self.world
            .get::<ThreatTable>(entity)
            .map(|threat| threat.get(opponent))
            .ok_or(CombatError::UnknownUnit(id))
    }

    /// Opponents `id` is engaged with, ascending.
    pub fn engaged_with(&self, id: UnitId) -> Result<Vec<UnitId>> {
        let entity = self.entity(id)?;
        self.world
            .get::<Engagement>(entity)
            .map(|engagement| engagement.engaged.iter().copied().collect())
            .ok_or(CombatError::UnknownUnit(id))
    }

    pub fn sessions(&self) -> &SessionTable {
        self.world.resource::<SessionTable>()
    }

    pub fn unit_count(&self) -> usize {
        self.registry().len()
    }

    /// Completed detection passes.
    pub fn current_tick(&self) -> u64 {
        self.world.resource::<CombatClock>().tick
    }

    /// Simulation time of the last pass, in seconds.
    pub fn current_time(&self) -> f32 {
        self.world.resource::<CombatClock>().now
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let (tick, time) = (self.current_tick(), self.current_time());
        Snapshot::from_world(&mut self.world, tick, time)
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    // ------------------------------------------------------------------
    // Strategy
    // ------------------------------------------------------------------

    /// Switch the active index by name. Returns the number of migrated units.
    pub fn switch_strategy(&mut self, name: &str) -> Result<usize> {
        let kind: StrategyKind = name.parse()?;
        Ok(self.switch_to(kind))
    }

    /// Rebuild every live unit into a fresh `kind` index, then swap it in.
    pub fn switch_to(&mut self, kind: StrategyKind) -> usize {
        let entries = self.live_entries();
        self.profiler.begin_section(MIGRATION_SECTION);
        let migrated = self
            .world
            .resource_mut::<IndexManager>()
            .switch_strategy(kind, entries);
        self.profiler.end_section();
        migrated
    }

    pub fn current_strategy(&self) -> StrategyKind {
        self.index().kind()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        let index = self.index().stats();
        PerformanceStats {
            unit_count: self.unit_count(),
            strategy: index.strategy,
            exact_pairs: index.exact_pairs,
            ticks: self.current_tick(),
            avg_tick_us: self
                .profiler
                .get_section(TICK_SECTION)
                .map_or(0.0, |s| s.avg_time().as_secs_f64() * 1e6),
            active_sessions: self.sessions().len(),
            index,
            sections: self.profiler.summaries(),
        }
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    // ------------------------------------------------------------------

    fn index(&self) -> &IndexManager {
        self.world.resource::<IndexManager>()
    }

    fn registry(&self) -> &UnitRegistry {
        self.world.resource::<UnitRegistry>()
    }

    fn entity(&self, id: UnitId) -> Result<Entity> {
        self.registry().entity(id).ok_or(CombatError::UnknownUnit(id))
    }

    /// Index entries for every registered unit, from current component data.
    fn live_entries(&self) -> Vec<SpatialEntry> {
        self.registry()
            .iter()
            .filter_map(|(id, entity)| {
                let unit = self.world.entity(entity);
                Some(SpatialEntry::new(
                    id,
                    *unit.get::<Position>()?,
                    *unit.get::<Faction>()?,
                    unit.get::<AttackRange>()?.0,
                ))
            })
            .collect()
    }
}

fn view_from(id: UnitId, unit: EntityRef<'_>) -> Option<UnitView> {
    Some(UnitView {
        id,
        position: *unit.get::<Position>()?,
        faction: *unit.get::<Faction>()?,
        attack_range: unit.get::<AttackRange>()?.0,
        health: *unit.get::<Health>()?,
        state: *unit.get::<CombatState>()?,
        current_target: unit.get::<Engagement>()?.current_target,
    })
}

impl Default for CombatWorld {
    fn default() -> Self {
        Self::build(CombatConfig::default())
    }
}
