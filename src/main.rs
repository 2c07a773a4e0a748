use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use livetrader::api::{BinanceClient, BinanceEventSource, ExchangeApi};
use livetrader::config::{Settings, StorageBackend, StorageConfig};
use livetrader::db::PostgresOrderStore;
use livetrader::execution::{EventRouter, StreamSupervisor};
use livetrader::persistence::{MemoryOrderStore, OrderStore, RedisOrderStore};

#[derive(Parser, Debug)]
#[command(name = "livetrader", about = "Live spot trading engine for Binance")]
struct Cli {
    /// Config file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Send orders to the matching engine instead of the test endpoint
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;
    if cli.live {
        settings.exchange.test_mode = false;
    }

    tracing::info!("🚀 LiveTrader starting");

    let binance = BinanceClient::new(&settings.exchange)?;
    if binance.is_test_mode() {
        tracing::info!("🧪 Test mode: orders are validated but never executed");
    } else {
        tracing::warn!("💸 LIVE mode: orders will be executed");
    }
    let client: Arc<dyn ExchangeApi> = Arc::new(binance);
    let store = connect_store(&settings.storage).await?;

    let session_key = client
        .create_session()
        .await
        .context("failed to obtain listen key")?;
    tracing::info!("🔑 Listen key acquired");

    let mut router = EventRouter::bootstrap(
        client.clone(),
        store,
        &settings.pairs,
        &settings.engine,
        session_key.clone(),
    )
    .await
    .context("failed to bootstrap tickers")?;

    let source = BinanceEventSource::new(
        &settings.exchange.ws_url,
        settings
            .pairs
            .iter()
            .map(|(symbol, pair)| (symbol.as_str(), pair.interval.as_str())),
    );
    let supervisor = StreamSupervisor::new(
        source,
        session_key,
        Duration::from_secs(settings.engine.reconnect_cooldown_secs),
    );

    tracing::info!(
        "📡 Streaming {} pair(s): {}",
        settings.pairs.len(),
        settings.pairs.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    tokio::select! {
        result = supervisor.run(&mut router) => {
            result.context("event stream terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 Shutting down");
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("livetrader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn OrderStore>> {
    let url = storage.url.as_deref().unwrap_or_default();

    let store: Arc<dyn OrderStore> = match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory order store, state is lost on restart");
            Arc::new(MemoryOrderStore::new())
        }
        StorageBackend::Redis => {
            let store = RedisOrderStore::new(url)
                .await
                .with_context(|| format!("failed to connect to Redis at {}", url))?;
            tracing::info!("Redis order store enabled at {}", url);
            Arc::new(store)
        }
        StorageBackend::Postgres => {
            let store = PostgresOrderStore::new(url)
                .await
                .context("failed to connect to Postgres")?;
            tracing::info!("Postgres order store enabled");
            Arc::new(store)
        }
    };

    Ok(store)
}
