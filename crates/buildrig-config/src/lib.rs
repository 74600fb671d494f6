//! buildrig settings
//!
//! Defaults, overridden by an optional `buildrig.toml`, overridden by
//! `BUILDRIG_*` environment variables (`__` separates nested keys).

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::{SettingsManager, ENV_PREFIX};
pub use types::{HarnessSettings, PollSettings, Settings};
