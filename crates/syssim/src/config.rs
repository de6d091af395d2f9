//! Driver settings.
//!
//! Settings are merged from, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--settings <path>`)
//! 3. Environment variables (`SYSSIM_*`, e.g. `SYSSIM_WARMUP_FRACTION=0.5`)
//!
//! The engine configuration file is separate and opaque to the driver.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::SlotPolicy;
use crate::error::ConfigError;

/// Tunables of a replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Fraction of `max_requests` discarded as warm-up.
    pub warmup_fraction: f64,
    /// Bytes per trace sector.
    pub sector_size: u64,
    /// Bytes per page; the weight unit of the page buckets.
    pub page_size: u64,
    pub slot_policy: SlotPolicy,
    /// Cap on internal events pumped for one request. Unbounded if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_events_per_request: Option<u64>,
    /// Per-request wall-clock timing log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing_log: Option<PathBuf>,
    /// Per-request latency log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_log: Option<PathBuf>,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            warmup_fraction: 0.6,
            sector_size: 512,
            page_size: 4096,
            slot_policy: SlotPolicy::Strict,
            max_events_per_request: None,
            timing_log: None,
            request_log: None,
        }
    }
}

impl ReplaySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.warmup_fraction) {
            return Err(ConfigError::Invalid(format!(
                "warmup_fraction must be within [0, 1], got {}",
                self.warmup_fraction
            )));
        }
        if self.sector_size == 0 {
            return Err(ConfigError::Invalid("sector_size must be positive".to_string()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        if self.max_events_per_request == Some(0) {
            return Err(ConfigError::Invalid(
                "max_events_per_request must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Completions numbered at or below this are warm-up and not recorded.
    pub fn warmup_threshold(&self, max_requests: u64) -> u64 {
        (max_requests as f64 * self.warmup_fraction).floor() as u64
    }
}

/// Layered settings loader.
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    env_vars: Option<config::Map<String, String>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: "SYSSIM".to_string(),
            env_vars: None,
        }
    }

    /// Adds a TOML settings file. A missing file is an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the environment variable prefix (default: `SYSSIM`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env_vars(mut self, vars: config::Map<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    pub fn load(self) -> Result<ReplaySettings, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&ReplaySettings::default())?);

        if let Some(file) = &self.file {
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .try_parsing(true)
                .source(self.env_vars),
        );

        let settings: ReplaySettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_case::test_case;

    fn isolated() -> SettingsLoader {
        SettingsLoader::new().with_env_vars(config::Map::new())
    }

    #[test]
    fn defaults_load_without_sources() {
        let settings = isolated().load().expect("defaults");
        assert_eq!(settings, ReplaySettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
warmup_fraction = 0.5
page_size = 8192
slot_policy = "supersede"
max_events_per_request = 64
timing_log = "timing.log"
"#,
        )
        .unwrap();

        let settings = isolated().with_file(&path).load().expect("load");
        assert_eq!(settings.warmup_fraction, 0.5);
        assert_eq!(settings.page_size, 8192);
        assert_eq!(settings.sector_size, 512);
        assert_eq!(settings.slot_policy, SlotPolicy::Supersede);
        assert_eq!(settings.max_events_per_request, Some(64));
        assert_eq!(settings.timing_log, Some(PathBuf::from("timing.log")));
        assert_eq!(settings.request_log, None);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "warmup_fraction = 0.5\n").unwrap();

        let mut vars = config::Map::new();
        vars.insert("SYSSIM_WARMUP_FRACTION".to_string(), "0.25".to_string());

        let settings = SettingsLoader::new()
            .with_file(&path)
            .with_env_vars(vars)
            .load()
            .expect("load");
        assert_eq!(settings.warmup_fraction, 0.25);
    }

    #[test]
    fn custom_env_prefix_ignores_default_prefix() {
        let mut vars = config::Map::new();
        vars.insert("REPLAY_PAGE_SIZE".to_string(), "8192".to_string());
        vars.insert("SYSSIM_PAGE_SIZE".to_string(), "1024".to_string());

        let settings = SettingsLoader::new()
            .with_env_prefix("REPLAY")
            .with_env_vars(vars)
            .load()
            .expect("load");
        assert_eq!(settings.page_size, 8192);
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = isolated().with_file(dir.path().join("absent.toml")).load();
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn out_of_range_fraction_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "warmup_fraction = 1.5\n").unwrap();

        let result = isolated().with_file(&path).load();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_sizes_are_invalid() {
        let settings = ReplaySettings {
            sector_size: 0,
            ..ReplaySettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ReplaySettings {
            page_size: 0,
            ..ReplaySettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ReplaySettings {
            max_events_per_request: Some(0),
            ..ReplaySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test_case(1 => 0; "single request")]
    #[test_case(2 => 1; "two requests")]
    #[test_case(5 => 3; "five requests")]
    #[test_case(10 => 6; "ten requests")]
    #[test_case(0 => 0; "no requests")]
    fn default_warmup_threshold(max_requests: u64) -> u64 {
        ReplaySettings::default().warmup_threshold(max_requests)
    }
}
