//! Tool configuration.
//!
//! Loaded from a single sparse `renewal.toml`; every field has a stock
//! default, so the file is optional and may override just the values that
//! matter. Run `site-renewal gen-config` for a documented stock file.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! store_dir = ".site-renewal"   # Root of the per-domain state store
//!
//! [builder]
//! max_workers = 4               # Parallel artifact workers (omit for auto)
//! framework = "bootstrap"       # Framework label for fresh css bundles
//!
//! [preview]
//! write = true                  # Write preview.html next to each build
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenewalConfig {
    /// Root directory of the per-domain state store.
    pub store_dir: PathBuf,
    pub builder: BuilderConfig,
    pub preview: PreviewConfig,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".site-renewal"),
            builder: BuilderConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    /// Cap on parallel artifact regeneration workers. `None` means one per
    /// available CPU core; values above the core count are clamped down.
    pub max_workers: Option<usize>,
    /// Framework label stamped on css bundles created at init.
    pub framework: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            framework: "bootstrap".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Write `preview.html` alongside each build.
    pub write: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { write: true }
    }
}

impl RenewalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "store_dir must not be empty".to_string(),
            ));
        }
        if self.builder.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "builder.max_workers must be at least 1".to_string(),
            ));
        }
        if self.builder.framework.trim().is_empty() {
            return Err(ConfigError::Validation(
                "builder.framework must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load config from `path`, or stock defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<RenewalConfig, ConfigError> {
    let config: RenewalConfig = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        RenewalConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Effective worker count: the configured cap, clamped to available cores.
///
/// Users can constrain down, not up.
pub fn effective_workers(config: &BuilderConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    match config.max_workers {
        Some(requested) => requested.min(cores).max(1),
        None => cores,
    }
}

/// Documented stock config, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r#"# site-renewal configuration
# All options are optional - defaults shown below.

# Root of the per-domain state store. Each domain gets a subdirectory
# holding state.json, the change-set history, and build outputs.
store_dir = ".site-renewal"

[builder]
# Parallel artifact regeneration workers. Omit for one per CPU core;
# values above the core count are clamped down.
#max_workers = 4

# Framework label stamped on css bundles created at init.
framework = "bootstrap"

[preview]
# Write preview.html alongside each build, comparing it to the previous one.
write = true
"#
}
