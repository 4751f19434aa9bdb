//! Engine settings loaded from YAML with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::authoring::{BatchSettings, ReconcileOptions};
use crate::error::SettingsError;

/// Overrides `batchSize`.
pub const ENV_BATCH_SIZE: &str = "DECKHAND_BATCH_SIZE";
/// Overrides `batchDelayMs`.
pub const ENV_BATCH_DELAY_MS: &str = "DECKHAND_BATCH_DELAY_MS";

/// Settings shared by every deploy and fetch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Remote calls issued concurrently per wave.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between two waves, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Plan only, never mutate.
    #[serde(default)]
    pub dry_run: bool,

    /// Act on entries that exist on one side only.
    #[serde(default)]
    pub reconcile: bool,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

fn default_batch_size() -> usize {
    crate::authoring::batching::DEFAULT_BATCH_SIZE
}

fn default_batch_delay_ms() -> u64 {
    crate::authoring::batching::DEFAULT_BATCH_DELAY.as_millis() as u64
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            dry_run: false,
            reconcile: false,
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

impl EngineSettings {
    /// Parses settings from YAML. Missing keys take their defaults; an empty
    /// document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, SettingsError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = parse_env(ENV_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_BATCH_DELAY_MS) {
            self.batch_delay_ms = parse_env(ENV_BATCH_DELAY_MS, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_size == 0 {
            return Err(SettingsError::Validation {
                message: "batchSize must be at least 1".to_string(),
            });
        }
        if self.log_filter.trim().is_empty() {
            return Err(SettingsError::Validation {
                message: "logFilter must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            delay: Duration::from_millis(self.batch_delay_ms),
        }
    }

    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            dry_run: self.dry_run,
            reconcile: self.reconcile,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// Loads settings from a YAML file, then applies environment overrides.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<EngineSettings, SettingsError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut settings = EngineSettings::from_yaml_str(&content)?;
    settings.apply_env()?;
    settings.validate()?;
    log::debug!(
        "Loaded settings from {}: batch size {}, delay {}ms",
        path.display(),
        settings.batch_size,
        settings.batch_delay_ms
    );
    Ok(settings)
}
