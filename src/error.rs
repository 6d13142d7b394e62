//! Error types.
//!
//! Only caller-side invariant violations are errors. Empty query results are
//! empty collections and degenerate attack ranges simply never detect anything.

use crate::components::UnitId;
use thiserror::Error;

/// Errors returned by the public combat API.
#[derive(Debug, Error)]
pub enum CombatError {
    /// The id is not (or no longer) present in the unit registry.
    #[error("unit {0} is not registered")]
    UnknownUnit(UnitId),
    /// A unit with this id is already registered.
    #[error("unit {0} is already registered")]
    DuplicateUnit(UnitId),
    /// The requested spatial strategy name is not recognised.
    #[error(
        "unknown spatial strategy `{0}` (expected one of: uniform_grid, quadtree, hierarchical, adaptive, dynamic_hierarchical)"
    )]
    UnknownStrategy(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T, E = CombatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = CombatError::UnknownUnit(UnitId(7));
        assert_eq!(err.to_string(), "unit #7 is not registered");

        let err = CombatError::UnknownStrategy("kd_tree".to_string());
        assert!(err.to_string().contains("`kd_tree`"));

        let err: CombatError = ConfigError::Invalid("tick_interval must be positive".into()).into();
        assert!(err.to_string().contains("tick_interval"));
    }
}
