use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// File name looked up in the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "zoo.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub reconstruct: ReconstructConfig,
    #[serde(default)]
    pub reasons: ReasonRules,
}

/// Tuning for the point-in-time reconstructor. Affects memory and round
/// trips only, never results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Which reason codes denote loans into and out of the institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonRules {
    #[serde(default = "default_deponation_in")]
    pub deponation_in: Vec<String>,
    #[serde(default = "default_deponation_out")]
    pub deponation_out: Vec<String>,
}

impl Default for ReasonRules {
    fn default() -> Self {
        Self {
            deponation_in: default_deponation_in(),
            deponation_out: default_deponation_out(),
        }
    }
}

impl ReasonRules {
    #[must_use]
    pub fn is_deponation_in(&self, reason: &str) -> bool {
        self.deponation_in.iter().any(|code| code == reason)
    }

    #[must_use]
    pub fn is_deponation_out(&self, reason: &str) -> bool {
        self.deponation_out.iter().any(|code| code == reason)
    }
}

fn default_page_size() -> usize {
    7_500
}

fn default_deponation_in() -> Vec<String> {
    vec!["DEPONATION_IN".to_string()]
}

fn default_deponation_out() -> Vec<String> {
    vec!["DEPONATION_OUT".to_string()]
}

/// Parse and validate a config document.
///
/// # Errors
///
/// Returns [`EngineError::ConfigParse`] if the TOML is malformed or
/// `page_size` is zero.
pub fn parse_config(content: &str) -> Result<EngineConfig, EngineError> {
    let config = toml::from_str::<EngineConfig>(content)
        .map_err(|err| EngineError::ConfigParse(err.message().to_string()))?;
    if config.reconstruct.page_size == 0 {
        return Err(EngineError::ConfigParse(
            "reconstruct.page_size must be greater than zero".to_string(),
        ));
    }
    Ok(config)
}

/// Load the engine config.
///
/// Resolution order: `explicit` path, then [`LOCAL_CONFIG_FILE`] in
/// `working_dir`, then `<config_dir>/zoo/config.toml`, then defaults.
///
/// # Errors
///
/// Returns an error if an explicit path is missing, or if a located file
/// cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>, working_dir: &Path) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let local = working_dir.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return read_config(&local);
    }

    if let Some(user) = user_config_path().filter(|path| path.exists()) {
        return read_config(&user);
    }

    Ok(EngineConfig::default())
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zoo/config.toml"))
}

fn read_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
