//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod entities;
pub mod error;
pub mod hierarchy;
pub mod network;

pub use arena::NetworkArena;
pub use entities::*;
pub use error::{CycleError, DomainError, DomainResult};
pub use hierarchy::{
    expected_level, level_for, validate_and_level, LevelPolicy, ParentLinks, PendingLinks,
};
pub use network::{LevelDrift, Network, NetworkSnapshot};

/// Expand `~`, `$VAR` and `${VAR}` in a path-like string.
///
/// Unknown variables leave the input untouched.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
