use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::supervisor::EventHandler;
use super::ticker::SymbolTicker;
use crate::api::ExchangeApi;
use crate::config::{EngineConfig, PairConfig};
use crate::models::{datetime_from_millis, ExecutionReport, KlineEvent, StreamEvent};
use crate::persistence::OrderStore;
use crate::Result;

/// Demultiplexes stream events to the per-symbol tickers and books
///
/// Also keeps the session key alive, timed by event timestamps rather
/// than the local clock.
pub struct EventRouter {
    api: Arc<dyn ExchangeApi>,
    tickers: HashMap<String, SymbolTicker>,
    session_key: String,
    last_renewal: Option<DateTime<Utc>>,
    renewal_period: Duration,
}

impl EventRouter {
    pub fn new(
        api: Arc<dyn ExchangeApi>,
        tickers: Vec<SymbolTicker>,
        session_key: String,
        renewal_period: Duration,
    ) -> Self {
        let tickers = tickers
            .into_iter()
            .map(|ticker| (ticker.symbol().to_string(), ticker))
            .collect();

        Self {
            api,
            tickers,
            session_key,
            last_renewal: None,
            renewal_period,
        }
    }

    /// Build one ticker per configured pair
    pub async fn bootstrap(
        api: Arc<dyn ExchangeApi>,
        store: Arc<dyn OrderStore>,
        pairs: &BTreeMap<String, PairConfig>,
        engine: &EngineConfig,
        session_key: String,
    ) -> Result<Self> {
        let mut tickers = Vec::with_capacity(pairs.len());
        for (symbol, pair) in pairs {
            let ticker =
                SymbolTicker::bootstrap(api.clone(), store.clone(), symbol, pair, engine).await?;
            tickers.push(ticker);
        }

        Ok(Self::new(
            api,
            tickers,
            session_key,
            Duration::minutes(engine.renewal_period_mins),
        ))
    }

    pub fn ticker(&self, symbol: &str) -> Option<&SymbolTicker> {
        self.tickers.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tickers.keys().map(String::as_str)
    }

    pub fn last_renewal(&self) -> Option<DateTime<Utc>> {
        self.last_renewal
    }

    /// Route one stream message; never fails, bad events are logged and dropped
    pub async fn route(&mut self, stream: &str, payload: Value) {
        let event_time = payload.get("E").and_then(Value::as_i64);
        let event_type = payload
            .get("e")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match event_type.as_deref() {
            Some("kline") => self.route_kline(stream, payload).await,
            Some("executionReport") => self.route_execution_report(payload).await,
            Some(other) => tracing::info!("Unhandled event {} on {}", other, stream),
            None => tracing::warn!("Event without type on {}: {}", stream, payload),
        }

        if let Some(ms) = event_time {
            self.maybe_renew(ms).await;
        }
    }

    async fn route_kline(&mut self, stream: &str, payload: Value) {
        let symbol = stream
            .split('@')
            .next()
            .unwrap_or_default()
            .to_uppercase();

        let Some(ticker) = self.tickers.get_mut(&symbol) else {
            tracing::error!("Unrecognized stream {}", stream);
            return;
        };

        let candle = serde_json::from_value::<KlineEvent>(payload)
            .map_err(crate::Error::from)
            .and_then(|event| event.to_candle());
        match candle {
            Ok(candle) => {
                ticker.update_price(candle).await;
            }
            Err(e) => tracing::warn!(symbol = %symbol, "Dropping bad kline: {}", e),
        }
    }

    async fn route_execution_report(&mut self, payload: Value) {
        let report: ExecutionReport = match serde_json::from_value(payload) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Dropping bad execution report: {}", e);
                return;
            }
        };

        match self.tickers.get_mut(&report.symbol) {
            Some(ticker) => ticker.book_mut().update_order(report).await,
            None => tracing::warn!("Execution report for unconfigured symbol {}", report.symbol),
        }
    }

    async fn maybe_renew(&mut self, event_ms: i64) {
        let event_time = match datetime_from_millis(event_ms) {
            Ok(time) => time,
            Err(e) => {
                tracing::warn!("Bad event time: {}", e);
                return;
            }
        };

        let Some(last) = self.last_renewal else {
            self.last_renewal = Some(event_time);
            return;
        };

        if event_time - last > self.renewal_period {
            tracing::info!("Updating listen key");
            match self.api.renew_session(&self.session_key).await {
                Ok(()) => self.last_renewal = Some(event_time),
                Err(e) => tracing::warn!("Could not update listen key: {}", e),
            }
        }
    }
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn handle(&mut self, event: StreamEvent) {
        self.route(&event.stream, event.data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::candle_window::CandleWindow;
    use crate::execution::position_book::PositionBook;
    use crate::execution::test_support::{execution_report, history, kline, minute_time, FakeExchange};
    use crate::models::{OrderStatus, PnlPriceSource};
    use crate::persistence::MemoryOrderStore;
    use crate::strategy::StrategyKind;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const T0: i64 = 1_700_000_000_000;
    const MINUTE_MS: i64 = 60_000;

    async fn create_test_router() -> (EventRouter, Arc<FakeExchange>) {
        let api = Arc::new(FakeExchange::new());
        let store = Arc::new(MemoryOrderStore::new());
        let book = PositionBook::new(api.clone(), store, "BTCUSDT", 0.1, PnlPriceSource::Filled).await;
        let window = CandleWindow::from_history(history(&[100.0, 100.0]), 500);
        let ticker = SymbolTicker::new(
            "BTCUSDT",
            "1m",
            window,
            StrategyKind::DoubleBollinger.build(),
            book,
        );

        let router = EventRouter::new(
            api.clone(),
            vec![ticker],
            "listen-key".to_string(),
            Duration::minutes(30),
        );
        (router, api)
    }

    #[tokio::test]
    async fn test_kline_reaches_ticker() {
        let (mut router, _api) = create_test_router().await;

        router
            .route("btcusdt@kline_1m", kline("BTCUSDT", 1, 100.0, 105.0, T0))
            .await;

        let ticker = router.ticker("BTCUSDT").unwrap();
        assert_eq!(ticker.window().get(minute_time(1)).unwrap().close, 105.0);
    }

    #[tokio::test]
    async fn test_unconfigured_symbol_is_dropped() {
        let (mut router, api) = create_test_router().await;

        router
            .route("ethusdt@kline_1m", kline("ETHUSDT", 5, 2000.0, 2001.0, T0))
            .await;
        let stranger = crate::models::Order {
            symbol: "ETHUSDT".to_string(),
            side: crate::models::OrderSide::Buy,
            order_type: crate::models::OrderType::Limit,
            status: OrderStatus::New,
            price: 2000.0,
            quantity: 1.0,
            filled_quantity: 0.0,
            avg_fill_price: None,
            order_id: 5,
            client_order_id: None,
            transact_time: Utc::now(),
        };
        router
            .route("listen-key", execution_report(&stranger, "FILLED", 1.0, 2000.0, T0))
            .await;

        assert!(router.ticker("ETHUSDT").is_none());
        assert_eq!(router.ticker("BTCUSDT").unwrap().window().len(), 2);
        assert!(api.placed().is_empty());
    }

    #[tokio::test]
    async fn test_execution_report_reaches_book() {
        let (mut router, api) = create_test_router().await;
        api.set_ack_status(OrderStatus::New);
        let id = {
            let ticker = router.tickers.get_mut("BTCUSDT").unwrap();
            assert!(ticker.book_mut().buy(100.0).await);
            ticker.book().last_buy_order_id().unwrap()
        };
        let order = router.ticker("BTCUSDT").unwrap().book().order(id).unwrap().clone();

        router
            .route("listen-key", execution_report(&order, "FILLED", 0.1, 100.0, T0))
            .await;

        assert!(router.ticker("BTCUSDT").unwrap().book().holding());
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let (mut router, api) = create_test_router().await;

        router
            .route(
                "listen-key",
                json!({"e": "outboundAccountPosition", "E": T0, "u": T0, "B": []}),
            )
            .await;
        router.route("listen-key", json!({"garbage": true})).await;
        router
            .route("btcusdt@kline_1m", json!({"e": "kline", "E": T0, "k": "bad"}))
            .await;

        assert!(api.placed().is_empty());
        assert_eq!(api.renewals(), 0);
    }

    #[tokio::test]
    async fn test_renews_once_per_window_on_event_time() {
        let (mut router, api) = create_test_router().await;

        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0}))
            .await;
        assert_eq!(router.last_renewal(), Some(datetime_from_millis(T0).unwrap()));

        // Exactly 30 minutes is not yet overdue
        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 30 * MINUTE_MS}))
            .await;
        assert_eq!(api.renewals(), 0);

        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 31 * MINUTE_MS}))
            .await;
        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 32 * MINUTE_MS}))
            .await;
        assert_eq!(api.renewals(), 1);

        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 62 * MINUTE_MS}))
            .await;
        assert_eq!(api.renewals(), 2);
    }

    #[tokio::test]
    async fn test_failed_renewal_retries_on_next_event() {
        let (mut router, api) = create_test_router().await;
        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0}))
            .await;

        api.fail_renew.store(true, Ordering::SeqCst);
        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 31 * MINUTE_MS}))
            .await;
        assert_eq!(router.last_renewal(), Some(datetime_from_millis(T0).unwrap()));

        api.fail_renew.store(false, Ordering::SeqCst);
        router
            .route("listen-key", json!({"e": "balanceUpdate", "E": T0 + 32 * MINUTE_MS}))
            .await;
        assert_eq!(api.renewals(), 1);
        assert_eq!(
            router.last_renewal(),
            Some(datetime_from_millis(T0 + 32 * MINUTE_MS).unwrap())
        );
    }

    #[tokio::test]
    async fn test_bootstrap_builds_configured_pairs() {
        let api = Arc::new(FakeExchange::new().with_candles(history(&[100.0; 40])));
        let store = Arc::new(MemoryOrderStore::new());
        let mut pairs = BTreeMap::new();
        pairs.insert(
            "BTCUSDT".to_string(),
            PairConfig {
                interval: "1m".to_string(),
                quantity: 0.1,
            },
        );
        pairs.insert(
            "ETHUSDT".to_string(),
            PairConfig {
                interval: "5m".to_string(),
                quantity: 1.0,
            },
        );

        let router = EventRouter::bootstrap(
            api,
            store,
            &pairs,
            &EngineConfig::default(),
            "listen-key".to_string(),
        )
        .await
        .unwrap();

        let mut symbols: Vec<&str> = router.symbols().collect();
        symbols.sort();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(router.ticker("ETHUSDT").unwrap().interval(), "5m");
    }
}
