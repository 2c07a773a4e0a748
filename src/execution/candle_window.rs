use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::models::Candle;

/// Outcome of applying one kline update to a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleUpdate {
    /// A newer candle opened; the previous current candle (if any) is now sealed
    Opened { sealed: Option<DateTime<Utc>> },
    /// The current candle was updated in place
    Updated,
    /// Older than the current candle; ignored
    Stale,
}

/// Rolling window of candles for one symbol
///
/// Ordered by `open_time`. The last entry is the current candle and is the
/// only one partial updates may touch.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleWindow {
    /// Create an empty window
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_candles.max(1)),
            max_candles: max_candles.max(1),
        }
    }

    /// Seed from historical candles; duplicates keep the later row
    pub fn from_history(mut history: Vec<Candle>, max_candles: usize) -> Self {
        history.sort_by_key(|c| c.open_time);

        let mut window = Self::new(max_candles);
        for candle in history {
            window.apply(candle);
        }
        window
    }

    pub fn apply(&mut self, candle: Candle) -> CandleUpdate {
        let Some(current_time) = self.candles.back().map(|c| c.open_time) else {
            self.candles.push_back(candle);
            return CandleUpdate::Opened { sealed: None };
        };

        if candle.open_time > current_time {
            self.candles.push_back(candle);
            while self.candles.len() > self.max_candles {
                self.candles.pop_front();
            }
            CandleUpdate::Opened {
                sealed: Some(current_time),
            }
        } else if candle.open_time == current_time {
            if let Some(current) = self.candles.back_mut() {
                *current = candle;
            }
            CandleUpdate::Updated
        } else {
            CandleUpdate::Stale
        }
    }

    pub fn current(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn get(&self, open_time: DateTime<Utc>) -> Option<&Candle> {
        let (front, back) = self.candles.as_slices();
        let find = |slice: &[Candle]| {
            slice
                .binary_search_by_key(&open_time, |c| c.open_time)
                .ok()
        };
        find(front)
            .map(|i| &front[i])
            .or_else(|| find(back).map(|i| &back[i]))
    }

    /// Candles up to and including the one opened at `open_time`
    pub fn up_to(&mut self, open_time: DateTime<Utc>) -> Option<&[Candle]> {
        let candles = self.candles.make_contiguous();
        let idx = candles
            .binary_search_by_key(&open_time, |c| c.open_time)
            .ok()?;
        Some(&candles[..=idx])
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}
