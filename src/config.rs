//! Runtime configuration
//!
//! Loaded from a TOML/JSON file and layered with `LIVETRADER__*` environment
//! variables, e.g. `LIVETRADER__EXCHANGE__API_KEY`.

use std::collections::BTreeMap;

use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::models::PnlPriceSource;
use crate::strategy::StrategyKind;
use crate::{Error, Result};

const ENV_PREFIX: &str = "LIVETRADER";

const KLINE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Traded symbols
    pub pairs: BTreeMap<String, PairConfig>,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Per-symbol trading parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PairConfig {
    /// Kline interval, e.g. "1m"
    pub interval: String,
    /// Nominal order size in base asset
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub ws_url: String,
    /// Route orders to the validation endpoint instead of the matching engine
    pub test_mode: bool,
    pub request_timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443".to_string(),
            test_mode: true,
            request_timeout_secs: 10,
            requests_per_minute: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Connection URL for redis/postgres
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candles kept per symbol
    pub lookback: usize,
    pub reconnect_cooldown_secs: u64,
    pub renewal_period_mins: i64,
    pub pnl_price_source: PnlPriceSource,
    pub strategy: StrategyKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback: 500,
            reconnect_cooldown_secs: 30,
            renewal_period_mins: 30,
            pnl_price_source: PnlPriceSource::default(),
            strategy: StrategyKind::default(),
        }
    }
}

impl Settings {
    /// Load configuration from file and environment
    ///
    /// # Arguments
    /// * `path` - Config file path; the format follows the extension
    pub fn load(path: &str) -> Result<Self> {
        let builder = config::Config::builder().add_source(config::File::with_name(path));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let settings = settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Keys come back lowercased from the config layer; venue symbols are uppercase
    fn normalize(mut self) -> Self {
        self.pairs = self
            .pairs
            .into_iter()
            .map(|(symbol, pair)| (symbol.to_uppercase(), pair))
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(Error::Config("no trading pairs configured".to_string()));
        }

        for (symbol, pair) in &self.pairs {
            if !KLINE_INTERVALS.contains(&pair.interval.as_str()) {
                return Err(Error::Config(format!(
                    "{}: unsupported interval '{}'",
                    symbol, pair.interval
                )));
            }
            if !pair.quantity.is_finite() || pair.quantity <= 0.0 {
                return Err(Error::Config(format!(
                    "{}: quantity must be positive",
                    symbol
                )));
            }
        }

        if self.exchange.api_key.is_empty() || self.exchange.secret_key.is_empty() {
            return Err(Error::Config(
                "exchange.api_key and exchange.secret_key are required".to_string(),
            ));
        }

        if self.exchange.requests_per_minute == 0 {
            return Err(Error::Config(
                "exchange.requests_per_minute must be positive".to_string(),
            ));
        }

        if self.engine.lookback == 0 {
            return Err(Error::Config("engine.lookback must be positive".to_string()));
        }

        if self.engine.renewal_period_mins <= 0 {
            return Err(Error::Config(
                "engine.renewal_period_mins must be positive".to_string(),
            ));
        }

        match self.storage.backend {
            StorageBackend::Memory => {}
            StorageBackend::Redis | StorageBackend::Postgres => {
                if self.storage.url.is_none() {
                    return Err(Error::Config(format!(
                        "storage.url is required for the {:?} backend",
                        self.storage.backend
                    )));
                }
            }
        }

        Ok(())
    }
}
