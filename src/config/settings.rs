//! TOML-based configuration for ontomap.
//!
//! Supports a config file (ontomap.toml) with environment variable
//! expansion.
//!
//! Example configuration:
//! ```toml
//! [orchestrator]
//! max_node_retries = 3
//! lease_staleness_secs = 90
//! heartbeat_secs = 30
//! batch_size = 4
//!
//! [classification]
//! batch_size = 8
//! histogram_limit = 50
//! max_item_retries = 2
//!
//! [discovery]
//! sample_size = 50
//! min_overlap = 0.3
//! auto_accept = 0.85
//! auto_reject = 0.3
//!
//! [store]
//! path = "${ONTOMAP_STATE_DB}"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::ClassifyConfig;
use crate::dag::{LeaseConfig, OrchestratorConfig};
use crate::discovery::{DiscoveryConfig, ReviewPolicy};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub orchestrator: OrchestratorSettings,
    pub classification: ClassificationSettings,
    pub discovery: DiscoverySettings,
    pub store: StoreSettings,
}

/// Orchestrator section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub max_node_retries: i32,
    pub lease_staleness_secs: i64,
    pub heartbeat_secs: i64,
    pub batch_size: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_node_retries: 3,
            lease_staleness_secs: crate::dag::DEFAULT_STALENESS_SECS,
            heartbeat_secs: crate::dag::DEFAULT_HEARTBEAT_SECS,
            batch_size: 4,
        }
    }
}

/// Classification section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassificationSettings {
    pub batch_size: usize,
    pub histogram_limit: usize,
    pub max_item_retries: u32,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        let defaults = ClassifyConfig::default();
        Self {
            batch_size: defaults.batch_size,
            histogram_limit: defaults.histogram_limit,
            max_item_retries: defaults.max_item_retries,
        }
    }
}

/// Discovery section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub sample_size: usize,
    pub min_overlap: f64,
    pub auto_accept: f64,
    pub auto_reject: f64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            sample_size: defaults.sample_size,
            min_overlap: defaults.min_overlap,
            auto_accept: defaults.review.auto_accept,
            auto_reject: defaults.review.auto_reject,
        }
    }
}

/// Store section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Override for the state database path.
    pub path: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file with `${ENV}` expansion.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse settings from a TOML string with `${ENV}` expansion.
    pub fn from_toml(raw: &str) -> Result<Self, SettingsError> {
        let expanded = expand_env(raw)?;
        let settings: Settings = toml::from_str(&expanded)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.discovery.auto_reject >= self.discovery.auto_accept {
            return Err(SettingsError::InvalidConfig(format!(
                "auto_reject ({}) must be below auto_accept ({})",
                self.discovery.auto_reject, self.discovery.auto_accept
            )));
        }
        if !(0.0..=1.0).contains(&self.discovery.auto_accept)
            || !(0.0..=1.0).contains(&self.discovery.auto_reject)
        {
            return Err(SettingsError::InvalidConfig(
                "review thresholds must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the orchestrator configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_node_retries: self.orchestrator.max_node_retries,
            lease: LeaseConfig {
                staleness_secs: self.orchestrator.lease_staleness_secs,
                heartbeat_secs: self.orchestrator.heartbeat_secs,
            },
            batch_size: self.orchestrator.batch_size,
            classify: ClassifyConfig {
                batch_size: self.classification.batch_size,
                histogram_limit: self.classification.histogram_limit,
                max_item_retries: self.classification.max_item_retries,
            },
            discovery: DiscoveryConfig {
                sample_size: self.discovery.sample_size,
                min_overlap: self.discovery.min_overlap,
                review: ReviewPolicy {
                    auto_accept: self.discovery.auto_accept,
                    auto_reject: self.discovery.auto_reject,
                },
            },
        }
    }
}

/// Expand `${VAR}` references from the environment.
fn expand_env(raw: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(SettingsError::InvalidConfig(
                "unterminated ${ in config".to_string(),
            ));
        };
        let name = &after[..end];
        let value =
            env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
