use super::{ensure_history, open_prices, Strategy};
use crate::indicators::calculate_bollinger;
use crate::models::{Candle, Signal};
use crate::Result;

/// Double Bollinger band trend strategy
///
/// Two bands share one moving average:
/// - inner band at `inner_std` deviations
/// - outer band at `outer_std` deviations
///
/// Price above the inner upper band is the buy zone and yields `Long`.
/// The outer band is reported for logging only.
#[derive(Debug, Clone)]
pub struct DoubleBollingerStrategy {
    period: usize,
    inner_std: f64,
    outer_std: f64,
}

impl DoubleBollingerStrategy {
    pub fn new(period: usize, inner_std: f64, outer_std: f64) -> Self {
        Self {
            period,
            inner_std,
            outer_std,
        }
    }
}

impl Default for DoubleBollingerStrategy {
    fn default() -> Self {
        Self::new(20, 1.0, 2.0)
    }
}

impl Strategy for DoubleBollingerStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        ensure_history(self, candles)?;

        let prices = open_prices(candles);
        let price = prices[prices.len() - 1];

        let inner = calculate_bollinger(&prices, self.period, self.inner_std)
            .ok_or_else(|| crate::Error::Strategy("Failed to compute inner band".to_string()))?;
        let outer = calculate_bollinger(&prices, self.period, self.outer_std)
            .ok_or_else(|| crate::Error::Strategy("Failed to compute outer band".to_string()))?;

        tracing::debug!(
            price,
            inner_upper = inner.upper,
            outer_upper = outer.upper,
            "double bollinger"
        );

        if price > inner.upper {
            Ok(Signal::Long)
        } else {
            Ok(Signal::Flat)
        }
    }

    fn name(&self) -> &str {
        "DoubleBollingerStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.period
    }
}
