use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::candle_window::{CandleUpdate, CandleWindow};
use super::position_book::PositionBook;
use crate::api::ExchangeApi;
use crate::config::{EngineConfig, PairConfig};
use crate::models::{Candle, Signal};
use crate::persistence::OrderStore;
use crate::strategy::Strategy;
use crate::Result;

/// Candle window, strategy and position book of one traded symbol
pub struct SymbolTicker {
    symbol: String,
    interval: String,
    window: CandleWindow,
    strategy: Box<dyn Strategy>,
    book: PositionBook,
    /// No entry until the strategy has been flat once
    startup: bool,
}

impl SymbolTicker {
    pub fn new(
        symbol: &str,
        interval: &str,
        window: CandleWindow,
        strategy: Box<dyn Strategy>,
        book: PositionBook,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            window,
            strategy,
            book,
            startup: true,
        }
    }

    /// Cold-start a ticker from the venue's recent candles
    pub async fn bootstrap(
        api: Arc<dyn ExchangeApi>,
        store: Arc<dyn OrderStore>,
        symbol: &str,
        pair: &PairConfig,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let history = api
            .get_candles(symbol, &pair.interval, engine.lookback)
            .await?;
        tracing::info!(
            symbol = %symbol,
            "📊 Loaded {} {} candles",
            history.len(),
            pair.interval
        );

        let window = CandleWindow::from_history(history, engine.lookback);
        let book = PositionBook::new(api, store, symbol, pair.quantity, engine.pnl_price_source).await;

        Ok(Self::new(
            symbol,
            &pair.interval,
            window,
            engine.strategy.build(),
            book,
        ))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut PositionBook {
        &mut self.book
    }

    /// Apply a kline update; a newly opened candle triggers one evaluation
    pub async fn update_price(&mut self, candle: Candle) -> CandleUpdate {
        let open_time = candle.open_time;
        let open = candle.open;

        let update = self.window.apply(candle);
        match update {
            CandleUpdate::Opened { .. } => {
                if let Some(current) = self.window.current() {
                    tracing::info!(
                        symbol = %self.symbol,
                        "OPEN {} HIGH {} LOW {} CLOSE {}",
                        current.open,
                        current.high,
                        current.low,
                        current.close
                    );
                }
                self.act(open_time, open).await;
            }
            CandleUpdate::Updated => {}
            CandleUpdate::Stale => {
                tracing::debug!(symbol = %self.symbol, "Ignoring late kline for {}", open_time);
            }
        }

        update
    }

    /// Evaluate the strategy at `time` and let the book act on it
    ///
    /// Returns true iff an order was accepted.
    pub async fn act(&mut self, time: DateTime<Utc>, price: f64) -> bool {
        let Some(candles) = self.window.up_to(time) else {
            tracing::warn!(symbol = %self.symbol, "No candle at {}", time);
            return false;
        };

        let signal = match self.strategy.generate_signal(candles) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, "{}: {}", self.strategy.name(), e);
                return false;
            }
        };

        match signal {
            Signal::Long if self.startup => {
                tracing::debug!(symbol = %self.symbol, "Waiting for a flat signal before buying");
                false
            }
            Signal::Long => {
                tracing::info!(symbol = %self.symbol, "BUY signal at {}", price);
                self.book.buy(price).await
            }
            Signal::Flat => {
                tracing::info!(symbol = %self.symbol, "SELL signal at {}", price);
                self.startup = false;
                self.book.sell(price).await
            }
        }
    }
}
