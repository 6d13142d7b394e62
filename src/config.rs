//! Configuration for the combat core.
//!
//! Every setting has a default, so an empty TOML document is a valid
//! configuration. Thresholds that would break structural invariants are
//! rejected by [`CombatConfig::validate`].

use crate::error::ConfigError;
use crate::spatial::{Rect, StrategyKind};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete combat configuration, inserted into the world as a resource.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Seconds between detection passes
    pub tick_interval: f32,
    /// Seconds without contact before a session is dropped
    pub session_timeout: f32,
    /// Threat both units gain for each other on every detection
    pub initial_threat: f32,
    /// Strategy the index starts with
    pub strategy: StrategyKind,
    pub spatial: SpatialConfig,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tick_interval: 0.1,
            session_timeout: 5.0,
            initial_threat: 10.0,
            strategy: StrategyKind::UniformGrid,
            spatial: SpatialConfig::default(),
        }
    }
}

impl CombatConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tick_interval", self.tick_interval)?;
        if !(self.session_timeout >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "session_timeout must be non-negative, got {}",
                self.session_timeout
            )));
        }
        if !(self.initial_threat >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_threat must be non-negative, got {}",
                self.initial_threat
            )));
        }
        self.spatial.validate()
    }
}

/// Construction parameters for every spatial strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub uniform: UniformConfig,
    pub quadtree: QuadtreeConfig,
    pub hierarchical: HierarchicalConfig,
    pub adaptive: AdaptiveConfig,
    pub dynamic: DynamicConfig,
}

impl SpatialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("uniform.cell_size", self.uniform.cell_size)?;

        let b = &self.quadtree.bounds;
        if !(b.max_x > b.min_x && b.max_y > b.min_y) {
            return Err(ConfigError::Invalid(
                "quadtree.bounds must have positive width and height".into(),
            ));
        }
        if self.quadtree.capacity == 0 {
            return Err(ConfigError::Invalid("quadtree.capacity must be at least 1".into()));
        }

        positive("hierarchical.coarse_cell_size", self.hierarchical.coarse_cell_size)?;
        positive("hierarchical.fine_cell_size", self.hierarchical.fine_cell_size)?;

        positive("adaptive.base_cell_size", self.adaptive.base_cell_size)?;
        if self.adaptive.levels == 0 || self.adaptive.levels > 16 {
            return Err(ConfigError::Invalid(format!(
                "adaptive.levels must be in 1..=16, got {}",
                self.adaptive.levels
            )));
        }
        if self.adaptive.density_threshold == 0 {
            return Err(ConfigError::Invalid(
                "adaptive.density_threshold must be at least 1".into(),
            ));
        }

        let d = &self.dynamic;
        positive("dynamic.coarse_cell_size", d.coarse_cell_size)?;
        positive("dynamic.fine_cell_size", d.fine_cell_size)?;
        if d.refine_threshold == 0 {
            return Err(ConfigError::Invalid(
                "dynamic.refine_threshold must be at least 1".into(),
            ));
        }
        if d.unrefine_threshold >= d.refine_threshold {
            return Err(ConfigError::Invalid(format!(
                "dynamic.unrefine_threshold ({}) must be below refine_threshold ({})",
                d.unrefine_threshold, d.refine_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformConfig {
    pub cell_size: f32,
}

impl Default for UniformConfig {
    fn default() -> Self {
        Self { cell_size: 50.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadtreeConfig {
    /// Units a leaf holds before it splits
    pub capacity: usize,
    pub max_depth: u32,
    /// Region covered by the root node. Units outside stay in the root.
    pub bounds: Rect,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            max_depth: 8,
            bounds: Rect::new(0.0, 0.0, 10_000.0, 10_000.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalConfig {
    pub coarse_cell_size: f32,
    pub fine_cell_size: f32,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            coarse_cell_size: 100.0,
            fine_cell_size: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Finest cell size; level `k` uses `base_cell_size * 2^k`
    pub base_cell_size: f32,
    pub levels: usize,
    /// A level is acceptable while the destination cell holds fewer units
    pub density_threshold: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_cell_size: 25.0,
            levels: 4,
            density_threshold: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    pub coarse_cell_size: f32,
    pub fine_cell_size: f32,
    /// Coarse occupancy at which a cell is refined
    pub refine_threshold: usize,
    /// Sub-grid occupancy at or below which a cell is unrefined
    pub unrefine_threshold: usize,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            coarse_cell_size: 100.0,
            fine_cell_size: 25.0,
            refine_threshold: 50,
            unrefine_threshold: 30,
        }
    }
}

fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
