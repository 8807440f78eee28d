//! Application configuration.
//!
//! Global core/archive options plus per-grain-type overrides, loaded from
//! YAML files and environment variables.

mod options;

pub use options::{ArchiveOptions, CoreOptions, EventArchiveType};

use std::collections::HashMap;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "grainlog.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "GRAINLOG_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "GRAINLOG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "GRAINLOG_LOG";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: String, reason: &'static str },
}

/// Overrides for one grain type. A present section replaces the global one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GrainOverrides {
    pub core: Option<CoreOptions>,
    pub archive: Option<ArchiveOptions>,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Core options applied to every grain type.
    pub core: CoreOptions,
    /// Archive options applied to every grain type.
    pub archive: ArchiveOptions,
    /// Per-grain-type overrides keyed by grain type name.
    pub grains: HashMap<String, GrainOverrides>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `grainlog.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let config: Config = ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Effective options for one grain type.
    pub fn options_for(&self, grain_type: &str) -> (CoreOptions, ArchiveOptions) {
        let overrides = self.grains.get(grain_type);
        let core = overrides
            .and_then(|o| o.core.clone())
            .unwrap_or_else(|| self.core.clone());
        let archive = overrides
            .and_then(|o| o.archive.clone())
            .unwrap_or_else(|| self.archive.clone());
        (core, archive)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_core("core", &self.core)?;
        validate_archive("archive", &self.archive)?;
        for (name, overrides) in &self.grains {
            if let Some(core) = &overrides.core {
                validate_core(&format!("grains.{name}.core"), core)?;
            }
            if let Some(archive) = &overrides.archive {
                validate_archive(&format!("grains.{name}.archive"), archive)?;
            }
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

fn invalid(section: &str, field: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        field: format!("{section}.{field}"),
        reason,
    }
}

fn validate_core(section: &str, core: &CoreOptions) -> Result<(), ConfigError> {
    if core.number_of_events_per_read <= 0 {
        return Err(invalid(section, "number_of_events_per_read", "must be positive"));
    }
    if core.snapshot_version_interval <= 0 {
        return Err(invalid(section, "snapshot_version_interval", "must be positive"));
    }
    if core.max_batch_size == 0 {
        return Err(invalid(section, "max_batch_size", "must be positive"));
    }
    Ok(())
}

fn validate_archive(section: &str, archive: &ArchiveOptions) -> Result<(), ConfigError> {
    if archive.version_interval <= 0 {
        return Err(invalid(section, "version_interval", "must be positive"));
    }
    if archive.seconds_interval <= 0 {
        return Err(invalid(section, "seconds_interval", "must be positive"));
    }
    if archive.max_snapshot_archive_records == 0 {
        return Err(invalid(section, "max_snapshot_archive_records", "must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
