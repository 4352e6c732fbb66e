//! Configuration loading with defaults, TOML files, environment overrides,
//! and validation.

use crate::errors::{CoreError, CoreResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level configuration for a casino deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CasinoConfig {
    pub platform: PlatformConfig,
    pub games: Vec<GameEntry>,
    pub analytics: AnalyticsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub currency: String,
    /// Demo-only seed balance for freshly created players.
    pub starting_balance: Decimal,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            starting_balance: dec!(1000),
        }
    }
}

/// One catalog entry to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEntry {
    pub name: String,
    pub engine: String,
    #[serde(default)]
    pub engine_config: Option<toml::Value>,
    pub min_bet: Decimal,
    pub max_bet: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Loader: defaults, then file, then `WAGERMILL_*` environment overrides,
/// then validation.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> CoreResult<CasinoConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => CasinoConfig::default(),
        };
        Self::apply_env_overrides(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn load_from_file(path: &str) -> CoreResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Validation(format!("failed to read {}: {}", path, e)))?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Validation(format!("failed to parse {}: {}", path, e)))
    }

    fn apply_env_overrides(config: &mut CasinoConfig) -> CoreResult<()> {
        if let Ok(currency) = env::var("WAGERMILL_CURRENCY") {
            config.platform.currency = currency;
        }
        if let Ok(balance) = env::var("WAGERMILL_STARTING_BALANCE") {
            config.platform.starting_balance = balance.parse().map_err(|_| {
                CoreError::Validation(format!(
                    "WAGERMILL_STARTING_BALANCE: invalid amount {:?}",
                    balance
                ))
            })?;
        }
        if let Ok(enabled) = env::var("WAGERMILL_ANALYTICS_ENABLED") {
            config.analytics.enabled = enabled.parse().map_err(|_| {
                CoreError::Validation(format!(
                    "WAGERMILL_ANALYTICS_ENABLED: invalid boolean {:?}",
                    enabled
                ))
            })?;
        }
        if let Ok(level) = env::var("WAGERMILL_LOG_LEVEL") {
            config.logging.level = level;
        }
        Ok(())
    }

    fn validate(config: &CasinoConfig) -> CoreResult<()> {
        if config.platform.currency.is_empty() {
            return Err(CoreError::Validation(
                "platform.currency cannot be empty".to_string(),
            ));
        }
        if config.platform.starting_balance < Decimal::ZERO {
            return Err(CoreError::Validation(
                "platform.starting_balance cannot be negative".to_string(),
            ));
        }
        for game in &config.games {
            game.engine
                .parse::<crate::engines::EngineType>()
                .map_err(|_| {
                    CoreError::Validation(format!(
                        "games.{}: unknown engine {:?}",
                        game.name, game.engine
                    ))
                })?;
            if game.min_bet <= Decimal::ZERO || game.max_bet < game.min_bet {
                return Err(CoreError::Validation(format!(
                    "games.{}: invalid bet bounds {}-{}",
                    game.name, game.min_bet, game.max_bet
                )));
            }
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
