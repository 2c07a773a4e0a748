use super::{ensure_history, open_prices, Strategy};
use crate::indicators::calculate_sma;
use crate::models::{Candle, Signal};
use crate::Result;

/// Fast SMA above slow SMA means `Long`
#[derive(Debug, Clone)]
pub struct MovingAverageCrossStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl MovingAverageCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
        }
    }
}

impl Default for MovingAverageCrossStrategy {
    fn default() -> Self {
        Self::new(10, 20)
    }
}

impl Strategy for MovingAverageCrossStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        ensure_history(self, candles)?;

        let prices = open_prices(candles);
        let fast = calculate_sma(&prices, self.fast_period);
        let slow = calculate_sma(&prices, self.slow_period);

        match (fast, slow) {
            (Some(fast), Some(slow)) if fast > slow => Ok(Signal::Long),
            (Some(_), Some(_)) => Ok(Signal::Flat),
            _ => Err(crate::Error::Strategy(
                "Failed to compute moving averages".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "MovingAverageCrossStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.slow_period.max(self.fast_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::create_test_candles;

    #[test]
    fn test_uptrend_is_long() {
        let opens: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let signal = MovingAverageCrossStrategy::default()
            .generate_signal(&create_test_candles(&opens))
            .unwrap();
        assert_eq!(signal, Signal::Long);
    }

    #[test]
    fn test_downtrend_is_flat() {
        let opens: Vec<f64> = (0..30).map(|i| 200.0 - i as f64 * 2.0).collect();
        let signal = MovingAverageCrossStrategy::default()
            .generate_signal(&create_test_candles(&opens))
            .unwrap();
        assert_eq!(signal, Signal::Flat);
    }

    #[test]
    fn test_custom_periods() {
        let strategy = MovingAverageCrossStrategy::new(5, 15);
        assert_eq!(strategy.min_candles_required(), 15);
        assert!(strategy
            .generate_signal(&create_test_candles(&[1.0; 10]))
            .is_err());
    }
}
