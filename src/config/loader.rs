//! Configuration Loader
//!
//! Parses TOML configuration files and validates every section before any
//! component is built. Validation failures are the only fatal startup errors.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::adapters::replay::levels::SwingConfig;
use crate::adapters::replay::ReplaySettings;
use crate::adapters::risk::RiskConfig;
use crate::application::{EngineConfig, ExitConfig};
use crate::domain::SymbolSpec;
use crate::execution::OrderConfig;
use crate::strategy::params::{GateConfig, ParamError, RegimeConfig};

/// Environment variable that replaces `[recorder].path`
pub const RECORDER_PATH_ENV: &str = "REGIME_TRADER_RECORDER_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instrument: SymbolSpec,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub orders: OrderConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Open position exits and trailing stops
    #[serde(default)]
    pub exits: ExitConfig,
    /// Swing-point key level detection
    #[serde(default)]
    pub levels: SwingConfig,
    #[serde(default)]
    pub replay: ReplaySettings,
    #[serde(default)]
    pub recorder: RecorderSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Decision recorder section
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderSection {
    /// JSON-lines output file, `~` expanded
    pub path: String,
}

impl Default for RecorderSection {
    fn default() -> Self {
        Self {
            path: "logs/decisions.jsonl".to_string(),
        }
    }
}

impl RecorderSection {
    /// Recorder path with `~` expanded to the home directory
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Default filter when neither `--verbose` nor `--debug` is given
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl From<ParamError> for ConfigError {
    fn from(err: ParamError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

/// Load configuration from a TOML file, apply environment overrides and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    config.override_recorder_path(std::env::var(RECORDER_PATH_ENV).ok());
    config.validate()?;
    Ok(config)
}

/// Parse configuration text without touching the environment
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

impl Config {
    /// Replace the recorder path when `value` is set and non-empty
    pub fn override_recorder_path(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|p| !p.trim().is_empty()) {
            tracing::debug!("Recorder path overridden by {}: {}", RECORDER_PATH_ENV, path);
            self.recorder.path = path;
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.regime.validate()?;
        self.gate.validate()?;
        self.validate_instrument()?;
        self.validate_risk()?;
        self.validate_exits()?;

        if self.engine.regime_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "regime_interval_secs must be > 0".to_string(),
            ));
        }

        if self.replay.adx_period == 0 {
            return Err(ConfigError::ValidationError(
                "replay adx_period must be > 0".to_string(),
            ));
        }

        if self.replay.base > self.regime.primary {
            return Err(ConfigError::ValidationError(format!(
                "replay base timeframe {} is longer than primary {}",
                self.replay.base, self.regime.primary
            )));
        }

        if self.recorder.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "recorder path cannot be empty".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    fn validate_instrument(&self) -> Result<(), ConfigError> {
        let spec = &self.instrument;
        if spec.symbol.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "instrument symbol cannot be empty".to_string(),
            ));
        }

        if spec.point <= 0.0 || spec.pip_size <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "point and pip_size must be > 0, got {} and {}",
                spec.point, spec.pip_size
            )));
        }

        if spec.volume_step <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "volume_step must be > 0, got {}",
                spec.volume_step
            )));
        }

        if spec.volume_min <= 0.0 || spec.volume_min > spec.volume_max {
            return Err(ConfigError::ValidationError(format!(
                "volume_min must be > 0 and <= volume_max, got {} / {}",
                spec.volume_min, spec.volume_max
            )));
        }

        Ok(())
    }

    fn validate_exits(&self) -> Result<(), ConfigError> {
        if !self.exits.enabled {
            return Ok(());
        }
        self.exits.validate()?;

        let regime = &self.regime;
        if ![regime.primary, regime.secondary, regime.tertiary].contains(&self.exits.timeframe) {
            return Err(ConfigError::ValidationError(format!(
                "exits timeframe {} must be one of the regime timeframes",
                self.exits.timeframe
            )));
        }

        Ok(())
    }

    fn validate_risk(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        if risk.risk_percent <= 0.0 || risk.risk_percent > 100.0 {
            return Err(ConfigError::ValidationError(format!(
                "risk_percent must be 0-100, got {}",
                risk.risk_percent
            )));
        }

        if risk.stop_atr_multiple <= 0.0 || risk.reward_ratio <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "stop_atr_multiple and reward_ratio must be > 0, got {} and {}",
                risk.stop_atr_multiple, risk.reward_ratio
            )));
        }

        if risk.value_per_price_unit <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "value_per_price_unit must be > 0, got {}",
                risk.value_per_price_unit
            )));
        }

        Ok(())
    }
}
