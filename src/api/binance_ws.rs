use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{EventSource, EventSubscription};
use crate::models::StreamEvent;
use crate::Result;

/// Combined-stream source: one kline stream per traded pair plus the user data stream
#[derive(Debug, Clone)]
pub struct BinanceEventSource {
    ws_url: String,
    streams: Vec<String>,
}

impl BinanceEventSource {
    /// # Arguments
    /// * `ws_url` - Stream host, e.g. "wss://stream.binance.com:9443"
    /// * `pairs` - (symbol, interval) for each kline subscription
    pub fn new<'a>(ws_url: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let streams = pairs
            .into_iter()
            .map(|(symbol, interval)| format!("{}@kline_{}", symbol.to_lowercase(), interval))
            .collect();

        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            streams,
        }
    }

    pub fn stream_url(&self, session_key: &str) -> String {
        let mut names = self.streams.clone();
        names.push(session_key.to_string());
        format!("{}/stream?streams={}", self.ws_url, names.join("/"))
    }
}

#[async_trait]
impl EventSource for BinanceEventSource {
    async fn connect(&self, session_key: &str) -> Result<Box<dyn EventSubscription>> {
        let url = self.stream_url(session_key);
        let (ws, _response) = connect_async(url.as_str()).await?;

        tracing::info!("Connected to event stream ({} kline streams)", self.streams.len());

        Ok(Box::new(BinanceSubscription { ws }))
    }
}

pub struct BinanceSubscription {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl EventSubscription for BinanceSubscription {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        while let Some(message) = self.ws.next().await {
            match message? {
                Message::Text(text) => match serde_json::from_str::<StreamEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        tracing::warn!("Skipping undecodable frame: {} ({})", e, text);
                    }
                },
                Message::Ping(payload) => {
                    self.ws.send(Message::Pong(payload)).await?;
                }
                Message::Close(frame) => {
                    tracing::info!("Event stream closed by remote: {:?}", frame);
                    return Ok(None);
                }
                Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let source = BinanceEventSource::new(
            "wss://stream.binance.com:9443/",
            [("BTCUSDT", "1m"), ("ETHUSDT", "5m")],
        );

        assert_eq!(
            source.stream_url("listenkey123"),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1m/ethusdt@kline_5m/listenkey123"
        );
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_transient() {
        let source = BinanceEventSource::new("ws://127.0.0.1:1", [("BTCUSDT", "1m")]);

        match source.connect("key").await {
            Err(e) => assert!(e.is_transient()),
            Ok(_) => panic!("connection to a closed port should fail"),
        }
    }

    #[tokio::test]
    async fn test_bad_url_is_fatal() {
        let source = BinanceEventSource::new("http://not-a-websocket", [("BTCUSDT", "1m")]);

        match source.connect("key").await {
            Err(e) => assert!(!e.is_transient()),
            Ok(_) => panic!("non-websocket scheme should fail"),
        }
    }
}
