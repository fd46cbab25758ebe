//! Desired-state configuration.
//!
//! The built-in default reproduces the workstation baseline; a JSON file can
//! replace it. Configs are validated before anything is read from the store.
use crate::risk::RiskCategory;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// One extension that must belong to exactly one risk category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRule {
    pub extension: String,
    pub category: RiskCategory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub download_assessment: Vec<ExtensionRule>,
    /// Desired Citrix `AutoUpdateState`; `None` leaves it alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citrix_auto_update_state: Option<String>,
    /// Desired Safari `AutoOpenSafeDownloads`; `None` leaves it alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safari_auto_open_safe_downloads: Option<bool>,
}

pub fn default_config() -> ReconcileConfig {
    ReconcileConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        download_assessment: vec![ExtensionRule {
            extension: "ica".to_string(),
            category: RiskCategory::Safe,
        }],
        citrix_auto_update_state: Some("Manual".to_string()),
        safari_auto_open_safe_downloads: Some(true),
    }
}

/// Pretty JSON rendering of the default config.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

pub fn load_config(path: &Path) -> Result<ReconcileConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ReconcileConfig =
        serde_json::from_slice(&bytes).context("parse reconcile config JSON")?;
    Ok(config)
}

/// Load `path` when given, else the default; validated either way.
pub fn resolve_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => default_config(),
    };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ReconcileConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    let mut seen: BTreeMap<&str, RiskCategory> = BTreeMap::new();
    for rule in &config.download_assessment {
        let extension = rule.extension.as_str();
        if extension.trim().is_empty() {
            return Err(anyhow!("download_assessment extensions must be non-empty"));
        }
        if extension.starts_with('.') {
            return Err(anyhow!(
                "download_assessment extensions are written without a leading dot (got {extension:?})"
            ));
        }
        if let Some(previous) = seen.insert(extension, rule.category) {
            if previous != rule.category {
                return Err(anyhow!(
                    "extension {extension:?} is mapped to both {previous} and {}",
                    rule.category
                ));
            }
        }
    }
    if let Some(state) = config.citrix_auto_update_state.as_deref() {
        if state.trim().is_empty() {
            return Err(anyhow!("citrix_auto_update_state must be non-empty"));
        }
    }
    Ok(())
}
