//! Configuration for perp-bot.
//!
//! Loaded from a TOML file, overridden by environment variables for
//! credentials, then validated. TOML-facing structs use plain numbers; the
//! typed config converts them into `Decimal` / `Duration` for the engine.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::risk::RiskConfig;
use crate::signal::ProviderConfig;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Operating mode; dry-run is the default.
    pub mode: TradingMode,
    /// Symbols the provider builds signals for. The first is traded.
    pub symbols: Vec<String>,
    pub log_level: String,
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskSettings,
    pub sources: SourcesConfig,
}

/// Operating mode. Affects only the dispatcher's order emission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Orders are synthesized as immediately filled; the exchange order path
    /// is never called.
    DryRun,
    /// Orders are submitted to the exchange.
    Live,
}

impl TradingMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dry-run" | "dry_run" | "paper" => Some(TradingMode::DryRun),
            "live" => Some(TradingMode::Live),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::DryRun => write!(f, "dry-run"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

/// Exchange connection settings.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

/// Strategy selection plus its loose option table.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub params: toml::value::Table,
}

/// Risk settings as configured; converted into `RiskConfig` for the gate.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub max_position_size: Decimal,
    pub max_daily_loss: Decimal,
    pub max_consecutive_losses: u32,
    pub cooldown_secs: u64,
}

/// Data source credentials and tuning. A source with an empty key is
/// disabled.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub derivatives_api_key: String,
    pub whale_api_key: String,
    pub whale_min_value: Decimal,
    pub sentiment_api_key: String,
    pub macro_api_key: String,
}

impl BotConfig {
    /// Load from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(file.into())
    }

    /// Credential overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("EXCHANGE_API_KEY") {
            self.exchange.api_key = v;
        }
        if let Ok(v) = std::env::var("EXCHANGE_API_SECRET") {
            self.exchange.api_secret = v;
        }
        if let Ok(v) = std::env::var("EXCHANGE_BASE_URL") {
            self.exchange.base_url = v;
        }
        if let Ok(v) = std::env::var("EXCHANGE_WS_URL") {
            self.exchange.ws_url = v;
        }
        if let Ok(v) = std::env::var("DERIVATIVES_API_KEY") {
            self.sources.derivatives_api_key = v;
        }
        if let Ok(v) = std::env::var("WHALE_API_KEY") {
            self.sources.whale_api_key = v;
        }
        if let Ok(v) = std::env::var("SENTIMENT_API_KEY") {
            self.sources.sentiment_api_key = v;
        }
        if let Ok(v) = std::env::var("MACRO_API_KEY") {
            self.sources.macro_api_key = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
    }

    /// CLI overrides applied after env overrides.
    pub fn apply_cli_overrides(&mut self, mode: Option<String>, symbols: Option<Vec<String>>) {
        if let Some(mode) = mode.and_then(|m| TradingMode::from_str(&m)) {
            self.mode = mode;
        }
        if let Some(symbols) = symbols {
            if !symbols.is_empty() {
                self.symbols = symbols;
            }
        }
    }

    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("at least one symbol is required");
        }
        if self.strategy.name.is_empty() {
            bail!("strategy.name is required");
        }
        if self.risk.max_daily_loss <= Decimal::ZERO {
            bail!("risk.max_daily_loss must be positive");
        }
        if self.risk.max_position_size <= Decimal::ZERO {
            bail!("risk.max_position_size must be positive");
        }
        if self.mode == TradingMode::Live {
            if self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty() {
                bail!("live mode requires exchange.api_key and exchange.api_secret");
            }
        }
        Ok(())
    }

    /// The symbol the dispatcher trades.
    pub fn primary_symbol(&self) -> &str {
        &self.symbols[0]
    }

    /// Risk gate configuration.
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_position_size: self.risk.max_position_size,
            max_daily_loss: self.risk.max_daily_loss,
            max_consecutive_losses: self.risk.max_consecutive_losses,
            cooldown_duration: Duration::from_secs(self.risk.cooldown_secs),
        }
    }

    /// Signal provider configuration.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            symbols: self.symbols.clone(),
            whale_min_value: self.sources.whale_min_value,
            ..ProviderConfig::default()
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        TomlConfig::default().into()
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    exchange: ExchangeToml,
    #[serde(default)]
    strategy: StrategyToml,
    #[serde(default)]
    risk: RiskToml,
    #[serde(default)]
    sources: SourcesToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    mode: String,
    symbols: Vec<String>,
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            mode: "dry-run".to_string(),
            symbols: vec!["BTC".to_string(), "ETH".to_string()],
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExchangeToml {
    base_url: String,
    ws_url: String,
    api_key: String,
    api_secret: String,
    testnet: bool,
}

impl Default for ExchangeToml {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.example".to_string(),
            ws_url: "wss://api.exchange.example/ws".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            testnet: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StrategyToml {
    name: String,
    params: toml::value::Table,
}

impl Default for StrategyToml {
    fn default() -> Self {
        Self {
            name: "signal".to_string(),
            params: toml::value::Table::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RiskToml {
    max_position_size: f64,
    max_daily_loss: f64,
    max_consecutive_losses: u32,
    cooldown_secs: u64,
}

impl Default for RiskToml {
    fn default() -> Self {
        Self {
            max_position_size: 1.0,
            max_daily_loss: 0.05,
            max_consecutive_losses: 3,
            cooldown_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SourcesToml {
    derivatives_api_key: String,
    whale_api_key: String,
    whale_min_value: f64,
    sentiment_api_key: String,
    macro_api_key: String,
}

impl Default for SourcesToml {
    fn default() -> Self {
        Self {
            derivatives_api_key: String::new(),
            whale_api_key: String::new(),
            whale_min_value: 1_000_000.0,
            sentiment_api_key: String::new(),
            macro_api_key: String::new(),
        }
    }
}

fn f64_to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

impl From<TomlConfig> for BotConfig {
    fn from(file: TomlConfig) -> Self {
        Self {
            mode: TradingMode::from_str(&file.general.mode).unwrap_or(TradingMode::DryRun),
            symbols: file.general.symbols,
            log_level: file.general.log_level,
            exchange: ExchangeConfig {
                base_url: file.exchange.base_url,
                ws_url: file.exchange.ws_url,
                api_key: file.exchange.api_key,
                api_secret: file.exchange.api_secret,
                testnet: file.exchange.testnet,
            },
            strategy: StrategyConfig {
                name: file.strategy.name,
                params: file.strategy.params,
            },
            risk: RiskSettings {
                max_position_size: f64_to_decimal(file.risk.max_position_size),
                max_daily_loss: f64_to_decimal(file.risk.max_daily_loss),
                max_consecutive_losses: file.risk.max_consecutive_losses,
                cooldown_secs: file.risk.cooldown_secs,
            },
            sources: SourcesConfig {
                derivatives_api_key: file.sources.derivatives_api_key,
                whale_api_key: file.sources.whale_api_key,
                whale_min_value: f64_to_decimal(file.sources.whale_min_value),
                sentiment_api_key: file.sources.sentiment_api_key,
                macro_api_key: file.sources.macro_api_key,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.mode, TradingMode::DryRun);
        assert_eq!(config.symbols, vec!["BTC", "ETH"]);
        assert_eq!(config.strategy.name, "signal");
        assert_eq!(config.risk.max_consecutive_losses, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let config = BotConfig::from_toml_str(
            r#"
            [general]
            mode = "live"
            symbols = ["SOL"]
            log_level = "debug"

            [exchange]
            api_key = "k"
            api_secret = "s"

            [strategy]
            name = "mean_reversion"
            [strategy.params]
            rsi_period = 10

            [risk]
            max_position_size = 2.5
            max_daily_loss = 0.10

            [sources]
            whale_min_value = 500000.0
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, TradingMode::Live);
        assert_eq!(config.symbols, vec!["SOL"]);
        assert_eq!(config.strategy.name, "mean_reversion");
        assert!(config.strategy.params.contains_key("rsi_period"));
        assert_eq!(config.risk.max_position_size, dec!(2.5));
        assert_eq!(config.sources.whale_min_value, dec!(500000));
        config.validate().unwrap();
    }

    #[test]
    fn test_live_mode_requires_credentials() {
        let mut config = BotConfig::default();
        config.mode = TradingMode::Live;
        assert!(config.validate().is_err());

        config.exchange.api_key = "k".to_string();
        config.exchange.api_secret = "s".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_symbols_rejected() {
        let mut config = BotConfig::default();
        config.symbols.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = BotConfig::default();
        config.apply_cli_overrides(Some("live".to_string()), Some(vec!["XRP".to_string()]));
        assert_eq!(config.mode, TradingMode::Live);
        assert_eq!(config.symbols, vec!["XRP"]);

        // Unknown mode strings are ignored.
        config.apply_cli_overrides(Some("replay".to_string()), None);
        assert_eq!(config.mode, TradingMode::Live);
    }

    #[test]
    fn test_risk_config_conversion() {
        let config = BotConfig::default();
        let risk = config.risk_config();
        assert_eq!(risk.max_position_size, Decimal::ONE);
        assert_eq!(risk.max_daily_loss, dec!(0.05));
        assert_eq!(risk.cooldown_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_provider_config_conversion() {
        let config = BotConfig::default();
        let provider = config.provider_config();
        assert_eq!(provider.symbols, config.symbols);
        assert_eq!(provider.whale_min_value, dec!(1000000));
    }
}
