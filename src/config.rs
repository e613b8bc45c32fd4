//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/salesnet/salesnet.toml`
//! 3. Local config: `<dir>/.salesnet.toml`
//! 4. Environment variables: `SALESNET_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{expand_env_vars, LevelPolicy};

/// Hierarchy maintenance settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Whether descendants are relevelled when an element moves.
    pub level_policy: LevelPolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawHierarchyConfig {
    pub level_policy: Option<LevelPolicy>,
}

/// Raw settings for intermediate parsing (`None` means "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_file: Option<PathBuf>,
    pub hierarchy: RawHierarchyConfig,
}

/// Unified configuration for salesnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// JSON document holding elements and products
    pub data_file: PathBuf,
    pub hierarchy: HierarchyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            hierarchy: HierarchyConfig::default(),
        }
    }
}

/// Default data file in the platform data directory.
fn default_data_file() -> PathBuf {
    ProjectDirs::from("", "", "salesnet")
        .map(|dirs| dirs.data_dir().join("network.json"))
        .unwrap_or_else(|| PathBuf::from("~/.salesnet/network.json"))
}

/// Get the XDG config directory for salesnet.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "salesnet").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("salesnet.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".salesnet.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand shell variables and tilde in `data_file`.
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.data_file.to_string_lossy().as_ref());
        self.data_file = PathBuf::from(expanded);
    }

    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            data_file: overlay
                .data_file
                .clone()
                .unwrap_or_else(|| self.data_file.clone()),
            hierarchy: HierarchyConfig {
                level_policy: overlay
                    .hierarchy
                    .level_policy
                    .unwrap_or(self.hierarchy.level_policy),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.salesnet.toml`
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply SALESNET_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("SALESNET").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("data_file") {
            settings.data_file = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("hierarchy.level_policy") {
            settings.hierarchy.level_policy = parse_level_policy(&val)?;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# salesnet configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/salesnet/salesnet.toml
#   Local:  <dir>/.salesnet.toml          (dir given with -C, default cwd)
#   Env:    SALESNET_* environment variables, nested keys joined by "__"
#           e.g. SALESNET_HIERARCHY__LEVEL_POLICY=drift

# JSON document holding the network
# data_file = "~/.local/share/salesnet/network.json"

[hierarchy]
# What happens to descendants when an element gets a new parent:
#   "cascade" - recompute their network_lvl (default)
#   "drift"   - leave stored levels untouched; `salesnet check` reports them
# level_policy = "cascade"
"#
        .to_string()
    }
}

fn parse_level_policy(value: &str) -> Result<LevelPolicy, ApplicationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "cascade" => Ok(LevelPolicy::Cascade),
        "drift" => Ok(LevelPolicy::Drift),
        other => Err(ApplicationError::Config {
            message: format!("unknown level_policy '{other}' (expected cascade or drift)"),
        }),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
