//! Skirmish - Combat Detection Core
//!
//! Discovers which hostile units are close enough to fight, keeps per-pair
//! combat sessions alive while they keep interacting, and drives a fixed
//! interval attack loop. Proximity comes from a pluggable spatial index that
//! can be swapped at runtime without losing a unit.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod profiler;
pub mod spatial;
pub mod systems;
pub mod world;

pub use api::{CombatWorld, EffectSink, TickReport};
pub use components::*;
pub use config::CombatConfig;
pub use error::{CombatError, ConfigError, Result};
pub use profiler::PerformanceStats;
pub use spatial::{IndexManager, PairMap, SpatialEntry, SpatialIndex, StrategyKind};
pub use systems::{CombatEffect, CombatSession, DamageModel, SessionKey, SessionTable};
pub use world::Snapshot;
