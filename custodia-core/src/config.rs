//! # Engine configuration — TOML-backed tunables.
//!
//! Decision expiry windows, audit ceilings, anomaly thresholds, and the
//! retention sweep interval are policy knobs, not hard-coded business law.

use crate::error::{CustodiaError, CustodiaResult};
use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Per-action grant validity windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub create_expiry_secs: i64,
    pub read_expiry_secs: i64,
    pub update_expiry_secs: i64,
    pub delete_expiry_secs: i64,
    pub export_expiry_secs: i64,
    pub share_expiry_secs: i64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            create_expiry_secs: 3_600,
            read_expiry_secs: 3_600,
            update_expiry_secs: 7_200,
            delete_expiry_secs: 1_800,
            export_expiry_secs: 3_600,
            share_expiry_secs: 3_600,
        }
    }
}

impl DecisionConfig {
    pub fn expiry_secs(&self, action: Action) -> i64 {
        match action {
            Action::Create => self.create_expiry_secs,
            Action::Read => self.read_expiry_secs,
            Action::Update => self.update_expiry_secs,
            Action::Delete => self.delete_expiry_secs,
            Action::Export => self.export_expiry_secs,
            Action::Share => self.share_expiry_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Ceiling on retained entries; the oldest half is trimmed on overflow.
    pub max_entries: usize,
    /// Same-actor requests within the rolling window that trigger an
    /// "excessive access" alert when exceeded.
    pub excessive_access_threshold: usize,
    pub excessive_window_secs: i64,
    /// UTC hours; High/Critical access outside this window raises an
    /// "after-hours access" alert.
    pub business_hours_start: u8,
    pub business_hours_end: u8,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            excessive_access_threshold: 100,
            excessive_window_secs: 3_600,
            business_hours_start: 8,
            business_hours_end: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { sweep_interval_secs: 3_600 }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> CustodiaResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CustodiaError::Config(format!("read {}: {}", path.as_ref().display(), e)))?;
        let config: EngineConfig =
            toml::from_str(&raw).map_err(|e| CustodiaError::Config(e.to_string()))?;
        info!(path = %path.as_ref().display(), "Engine config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CustodiaResult<()> {
        let raw = toml::to_string_pretty(self).map_err(|e| CustodiaError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), raw)
            .map_err(|e| CustodiaError::Config(format!("write {}: {}", path.as_ref().display(), e)))
    }
}
