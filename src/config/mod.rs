//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    load_config, parse_config, Config, ConfigError, LoggingSection, RecorderSection, RECORDER_PATH_ENV,
};
