//! Settings loader

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::Settings,
};

/// Environment prefix, e.g. `BUILDRIG_HARNESS__DEBUG=true`
pub const ENV_PREFIX: &str = "BUILDRIG";

/// Loads [`Settings`] from defaults, an optional TOML file and the environment
pub struct SettingsManager {
    /// Settings file path
    config_path: PathBuf,
    /// Fail when the file is missing
    required: bool,
    /// Environment prefix
    env_prefix: String,
}

impl SettingsManager {
    /// Defaults plus environment, looking for `buildrig.toml` in the current dir
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::from("buildrig.toml"),
            required: false,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read an explicit settings file (it must exist)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            required: true,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<Settings> {
        let builder = Config::builder()
            .add_source(File::from(self.config_path.clone()).required(self.required))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        // Plain KEEP_ON_FAIL=true is honoured for existing CI setups.
        if std::env::var("KEEP_ON_FAIL").is_ok_and(|v| v == "true") {
            settings.harness.keep_on_fail = true;
        }

        self.validate(&settings)?;
        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings, path: &Path) -> Result<()> {
        let toml = toml::to_string(settings)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn validate(&self, settings: &Settings) -> Result<()> {
        if settings.poll.backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "poll.backoff_ms must be greater than 0".to_string(),
            ));
        }
        if settings.poll.max_attempts == Some(0) {
            return Err(ConfigError::Validation(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }
        if settings.harness.reap_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "harness.reap_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}
