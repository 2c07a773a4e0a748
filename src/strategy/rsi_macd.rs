use super::{ensure_history, open_prices, Strategy};
use crate::indicators::{calculate_macd_series, calculate_rsi_series, Macd};
use crate::models::{Candle, Signal};
use crate::Result;

const RSI_LOW: f64 = 33.0;
const RSI_LOW_LOW: f64 = 20.0;
const RSI_HIGH: f64 = 66.0;
const RSI_HIGH_HIGH: f64 = 80.0;

/// Indicator that opened the current position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrySource {
    Rsi,
    Macd,
}

/// RSI threshold re-crossings combined with MACD crossovers
///
/// Buys when RSI climbs back above 20 or 33, or when MACD crosses above its
/// signal line. A MACD cross down always exits; an RSI fall back below 80
/// or 66 exits only positions RSI opened. A MACD cross up takes over a
/// position RSI opened.
///
/// The state machine is replayed over the whole window on every call.
#[derive(Debug, Clone)]
pub struct RsiMacdStrategy {
    rsi_period: usize,
    fast: usize,
    slow: usize,
    signal: usize,
}

impl RsiMacdStrategy {
    pub fn new(rsi_period: usize, fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            rsi_period,
            fast,
            slow,
            signal,
        }
    }
}

impl Default for RsiMacdStrategy {
    fn default() -> Self {
        Self::new(14, 12, 26, 9)
    }
}

#[derive(Debug, Default)]
struct Replay {
    low: bool,
    low_low: bool,
    high: bool,
    high_high: bool,
    /// Whether MACD was last seen above (true) or below its signal
    macd_above: Option<bool>,
    entry: Option<EntrySource>,
}

impl Replay {
    fn step(&mut self, rsi: f64, macd: &Macd) {
        if rsi < RSI_LOW {
            self.low = true;
        }
        if rsi < RSI_LOW_LOW {
            self.low_low = true;
        }
        if rsi > RSI_HIGH {
            self.high = true;
        }
        if rsi > RSI_HIGH_HIGH {
            self.high_high = true;
        }

        if rsi > RSI_LOW_LOW && self.low_low {
            self.low_low = false;
            self.enter_on_rsi();
        }
        if rsi > RSI_LOW && self.low {
            self.low = false;
            self.enter_on_rsi();
        }
        if rsi < RSI_HIGH_HIGH && self.high_high {
            self.high_high = false;
            self.exit_on_rsi();
        }
        if rsi < RSI_HIGH && self.high {
            self.high = false;
            self.exit_on_rsi();
        }

        if macd.macd > macd.signal && self.macd_above != Some(true) {
            self.macd_above = Some(true);
            self.entry = Some(EntrySource::Macd);
        }
        if macd.macd < macd.signal && self.macd_above != Some(false) {
            self.macd_above = Some(false);
            self.entry = None;
        }
    }

    fn enter_on_rsi(&mut self) {
        if self.entry.is_none() {
            self.entry = Some(EntrySource::Rsi);
        }
    }

    fn exit_on_rsi(&mut self) {
        if self.entry == Some(EntrySource::Rsi) {
            self.entry = None;
        }
    }
}

fn replay<'a>(rows: impl IntoIterator<Item = (f64, &'a Macd)>) -> Option<EntrySource> {
    let mut state = Replay::default();
    for (rsi, macd) in rows {
        state.step(rsi, macd);
    }
    state.entry
}

impl Strategy for RsiMacdStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal> {
        ensure_history(self, candles)?;

        let prices = open_prices(candles);
        let rsi = calculate_rsi_series(&prices, self.rsi_period)
            .ok_or_else(|| crate::Error::Strategy("Failed to compute RSI".to_string()))?;
        let macd = calculate_macd_series(&prices, self.fast, self.slow, self.signal)
            .ok_or_else(|| crate::Error::Strategy("Failed to compute MACD".to_string()))?;

        // Both series end at the latest candle; replay their common tail
        let rows = rsi.len().min(macd.len());
        let entry = replay(
            rsi[rsi.len() - rows..]
                .iter()
                .copied()
                .zip(&macd[macd.len() - rows..]),
        );

        match entry {
            Some(_) => Ok(Signal::Long),
            None => Ok(Signal::Flat),
        }
    }

    fn name(&self) -> &str {
        "RsiMacdStrategy"
    }

    fn min_candles_required(&self) -> usize {
        (self.rsi_period + 1).max(self.slow + self.signal - 1)
    }
}
