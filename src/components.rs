//! ECS Components for the Skirmish combat core.
//!
//! Components are pure data containers attached to unit entities.
//! All combat logic lives in systems that query these components; the
//! spatial layer only ever sees the [`SpatialEntry`](crate::spatial::SpatialEntry)
//! projection of a unit.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 2D position on the map.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        self.distance_sq_to(other).sqrt()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Unique identifier for a unit, stable for the unit's lifetime.
#[derive(
    Component, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Faction/side identifier. `Neutral` never takes part in combat.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    Red,
    Blue,
    Green,
    Neutral,
}

impl Faction {
    /// Two units are hostile when they belong to different, non-neutral factions.
    #[inline]
    pub fn is_hostile_to(self, other: Faction) -> bool {
        self != other && self != Faction::Neutral && other != Faction::Neutral
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Faction::Red => "Red",
            Faction::Blue => "Blue",
            Faction::Green => "Green",
            Faction::Neutral => "Neutral",
        }
    }
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Maximum distance at which a unit detects and attacks opponents.
/// Zero or negative means the unit never initiates detection.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackRange(pub f32);

/// Health of a unit.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Gate that limits how often a unit may deal damage.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackCooldown {
    /// Minimum simulation seconds between two attacks.
    pub interval: f32,
    /// Simulation time of the last attack, if any.
    pub last_attack: Option<f32>,
}

impl AttackCooldown {
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            last_attack: None,
        }
    }

    pub fn is_ready(&self, now: f32) -> bool {
        self.last_attack.map_or(true, |t| now - t >= self.interval)
    }

    pub fn trigger(&mut self, now: f32) {
        self.last_attack = Some(now);
    }
}

impl Default for AttackCooldown {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Opponents this unit is currently engaged with.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Engagement {
    pub engaged: BTreeSet<UnitId>,
    /// Opponent attacked most recently.
    pub current_target: Option<UnitId>,
}

impl Engagement {
    pub fn engage(&mut self, opponent: UnitId) -> bool {
        self.engaged.insert(opponent)
    }

    /// Drop every trace of `opponent`. Returns true if anything changed.
    pub fn forget(&mut self, opponent: UnitId) -> bool {
        let removed = self.engaged.remove(&opponent);
        if self.current_target == Some(opponent) {
            self.current_target = None;
            return true;
        }
        removed
    }

    pub fn is_engaged_with(&self, opponent: UnitId) -> bool {
        self.engaged.contains(&opponent)
    }
}

/// Accumulated threat per opponent; the highest valid entry is attacked first.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatTable(pub HashMap<UnitId, f32>);

impl ThreatTable {
    pub fn get(&self, opponent: UnitId) -> f32 {
        self.0.get(&opponent).copied().unwrap_or(0.0)
    }

    pub fn raise(&mut self, opponent: UnitId, amount: f32) {
        *self.0.entry(opponent).or_insert(0.0) += amount;
    }

    pub fn forget(&mut self, opponent: UnitId) -> bool {
        self.0.remove(&opponent).is_some()
    }

    /// Highest-threat opponent among `candidates`.
    /// Ties keep the earliest candidate.
    pub fn highest<I>(&self, candidates: I) -> Option<UnitId>
    where
        I: IntoIterator<Item = UnitId>,
    {
        let mut best: Option<(UnitId, f32)> = None;
        for id in candidates {
            let threat = self.get(id);
            match best {
                Some((_, best_threat)) if threat <= best_threat => {}
                _ => best = Some((id, threat)),
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// STATE COMPONENTS
// ============================================================================

/// Per-unit combat state machine.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombatState {
    /// No valid opponent.
    #[default]
    Idle,
    /// At least one engaged opponent is alive, hostile and in range.
    Engaging,
    /// Terminal.
    Dead,
}

impl CombatState {
    pub fn as_str(self) -> &'static str {
        match self {
            CombatState::Idle => "Idle",
            CombatState::Engaging => "Engaging",
            CombatState::Dead => "Dead",
        }
    }
}

// ============================================================================
// SPAWNING
// ============================================================================

/// Description of a unit handed over by the host on spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: UnitId,
    pub position: Position,
    pub faction: Faction,
    pub attack_range: f32,
    pub health: f32,
    /// Seconds between two attacks.
    pub attack_cooldown: f32,
}

impl UnitSpec {
    pub fn new(id: u32, x: f32, y: f32, faction: Faction) -> Self {
        Self {
            id: UnitId(id),
            position: Position::new(x, y),
            faction,
            attack_range: 30.0,
            health: 100.0,
            attack_cooldown: 1.0,
        }
    }

    pub fn with_range(mut self, attack_range: f32) -> Self {
        self.attack_range = attack_range;
        self
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health;
        self
    }

    pub fn with_cooldown(mut self, attack_cooldown: f32) -> Self {
        self.attack_cooldown = attack_cooldown;
        self
    }
}

/// Bundle for spawning a complete unit entity.
#[derive(Bundle)]
pub struct UnitBundle {
    pub id: UnitId,
    pub position: Position,
    pub faction: Faction,
    pub attack_range: AttackRange,
    pub health: Health,
    pub cooldown: AttackCooldown,
    pub engagement: Engagement,
    pub threat: ThreatTable,
    pub state: CombatState,
}

impl From<UnitSpec> for UnitBundle {
    fn from(spec: UnitSpec) -> Self {
        Self {
            id: spec.id,
            position: spec.position,
            faction: spec.faction,
            attack_range: AttackRange(spec.attack_range),
            health: Health::new(spec.health),
            cooldown: AttackCooldown::new(spec.attack_cooldown),
            engagement: Engagement::default(),
            threat: ThreatTable::default(),
            state: CombatState::Idle,
        }
    }
}

/// Read-only copy of the combat-relevant parts of a unit.
///
/// Handed to the damage callback and returned by the public API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: UnitId,
    pub position: Position,
    pub faction: Faction,
    pub attack_range: f32,
    pub health: Health,
    pub state: CombatState,
    pub current_target: Option<UnitId>,
}

impl UnitView {
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Alive, hostile and within this unit's attack range.
    pub fn can_attack(&self, target: &UnitView) -> bool {
        self.attack_range > 0.0
            && self.id != target.id
            && self.is_alive()
            && target.is_alive()
            && self.faction.is_hostile_to(target.faction)
            && self.position.distance_sq_to(&target.position)
                <= self.attack_range * self.attack_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostility_excludes_neutral_and_same_faction() {
        assert!(Faction::Red.is_hostile_to(Faction::Blue));
        assert!(Faction::Green.is_hostile_to(Faction::Red));
        assert!(!Faction::Red.is_hostile_to(Faction::Red));
        assert!(!Faction::Red.is_hostile_to(Faction::Neutral));
        assert!(!Faction::Neutral.is_hostile_to(Faction::Neutral));
    }

    #[test]
    fn test_cooldown_gate() {
        let mut cooldown = AttackCooldown::new(1.0);
        assert!(cooldown.is_ready(0.0));
        cooldown.trigger(0.5);
        assert!(!cooldown.is_ready(1.0));
        assert!(cooldown.is_ready(1.5));
    }

    #[test]
    fn test_threat_highest_prefers_larger_then_earlier() {
        let mut threat = ThreatTable::default();
        threat.raise(UnitId(2), 5.0);
        threat.raise(UnitId(3), 12.0);
        threat.raise(UnitId(2), 4.0);
        assert_eq!(threat.get(UnitId(2)), 9.0);
        assert_eq!(threat.highest([UnitId(2), UnitId(3)]), Some(UnitId(3)));

        // Equal (zero) threat: first candidate wins
        assert_eq!(threat.highest([UnitId(7), UnitId(8)]), Some(UnitId(7)));
        assert_eq!(threat.highest(Vec::new()), None);
    }

    #[test]
    fn test_engagement_forget_clears_target() {
        let mut engagement = Engagement::default();
        engagement.engage(UnitId(4));
        engagement.current_target = Some(UnitId(4));
        assert!(engagement.forget(UnitId(4)));
        assert!(engagement.engaged.is_empty());
        assert_eq!(engagement.current_target, None);
        assert!(!engagement.forget(UnitId(4)));
    }

    #[test]
    fn test_health_never_negative() {
        let mut health = Health::new(10.0);
        health.damage(25.0);
        assert_eq!(health.current, 0.0);
        assert!(!health.is_alive());
    }
}
