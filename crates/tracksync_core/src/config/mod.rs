//! Configuration management.
//!
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only the changed table is rewritten)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use tracksync_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("tracksync.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().sampling.seed = Some(7);
//! config.update_section(ConfigSection::Sampling).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AnalysisSettings, ConfigSection, LoggingSettings, PathSettings, SamplingSettings, Settings,
    ToolSettings,
};
