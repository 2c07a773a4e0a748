// Trading strategy module
pub mod double_bollinger;
pub mod ma_cross;
pub mod macd;
pub mod rsi_macd;

use serde::Deserialize;

use crate::models::{Candle, Signal};
use crate::Result;

pub use double_bollinger::DoubleBollingerStrategy;
pub use ma_cross::MovingAverageCrossStrategy;
pub use macd::MacdStrategy;
pub use rsi_macd::RsiMacdStrategy;

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal for the last candle of `candles`
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// Strategy selectable from configuration
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    DoubleBollinger,
    Macd,
    MaCross,
    RsiMacd,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::DoubleBollinger => Box::new(DoubleBollingerStrategy::default()),
            StrategyKind::Macd => Box::new(MacdStrategy::default()),
            StrategyKind::MaCross => Box::new(MovingAverageCrossStrategy::default()),
            StrategyKind::RsiMacd => Box::new(RsiMacdStrategy::default()),
        }
    }
}

/// Indicators run on open prices: final as soon as a candle opens
pub(crate) fn open_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.open).collect()
}

pub(crate) fn ensure_history(strategy: &dyn Strategy, candles: &[Candle]) -> Result<()> {
    if candles.len() < strategy.min_candles_required() {
        return Err(crate::Error::Strategy(format!(
            "Insufficient data: {} candles, need {}",
            candles.len(),
            strategy.min_candles_required()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::Candle;
    use chrono::{Duration, TimeZone, Utc};

    /// Minute candles opening at the given prices
    pub fn create_test_candles(opens: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        opens
            .iter()
            .enumerate()
            .map(|(i, &open)| Candle {
                open_time: start + Duration::minutes(i as i64),
                open,
                high: open * 1.01,
                low: open * 0.99,
                close: open,
                volume: 1000.0,
            })
            .collect()
    }
}
