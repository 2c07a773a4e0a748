use super::{ensure_history, open_prices, Strategy};
use crate::indicators::calculate_macd;
use crate::models::{Candle, Signal};
use crate::Result;

/// MACD line above its signal line means `Long`
#[derive(Debug, Clone)]
pub struct MacdStrategy {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl MacdStrategy {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }
}

impl Default for MacdStrategy {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Strategy for MacdStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        ensure_history(self, candles)?;

        let macd = calculate_macd(&open_prices(candles), self.fast, self.slow, self.signal)
            .ok_or_else(|| crate::Error::Strategy("Failed to compute MACD".to_string()))?;

        if macd.macd > macd.signal {
            Ok(Signal::Long)
        } else {
            Ok(Signal::Flat)
        }
    }

    fn name(&self) -> &str {
        "MacdStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.slow + self.signal - 1
    }
}
