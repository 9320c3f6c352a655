//! # Project Configuration
//!
//! Loads and validates the project YAML: database DSN, the layer set, and
//! global exclude paths. Structural layer-DAG rules (dependency resolution,
//! cycle and canonical checks) live in [`crate::layers`]; this module only
//! verifies the file is shaped correctly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoreError;

/// Top-level project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: String,
    pub version: u32,
    pub database: DatabaseConfig,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Database connection settings.
///
/// The DSN scheme selects the backend: `postgres://…` or `sqlite://…`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

/// A named partition of entities drawn from a set of filesystem paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub canonical: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Load the project configuration from a YAML file.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig, LoreError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| LoreError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
    let cfg: ProjectConfig = serde_yaml::from_str(&data)
        .map_err(|e| LoreError::ConfigInvalid(format!("parsing {}: {e}", path.display())))?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &ProjectConfig) -> Result<(), LoreError> {
    if cfg.project.trim().is_empty() {
        return Err(LoreError::ConfigInvalid("project name is required".into()));
    }
    if cfg.version != 1 {
        return Err(LoreError::ConfigInvalid(format!(
            "unsupported version: {}",
            cfg.version
        )));
    }
    if cfg.database.dsn.trim().is_empty() {
        return Err(LoreError::ConfigInvalid("database dsn is required".into()));
    }
    if cfg.layers.is_empty() {
        return Err(LoreError::ConfigInvalid(
            "at least one layer is required".into(),
        ));
    }

    for (i, layer) in cfg.layers.iter().enumerate() {
        if layer.name.trim().is_empty() {
            return Err(LoreError::ConfigInvalid(format!(
                "layer {i} name is required"
            )));
        }
        if layer.paths.is_empty() {
            return Err(LoreError::ConfigInvalid(format!(
                "layer {i} paths are required"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
