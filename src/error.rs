use tokio_tungstenite::tungstenite;

/// Errors surfaced by the trading engine and its collaborators.
///
/// The variants follow how the engine reacts to them:
/// - transport failures (`Transport`, `StreamClosed`) are retried by the stream supervisor
/// - `Rejected` is a non-success answer from the venue; callers log it and report failure
/// - `Auth` and `Config` abort startup
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("event stream closed by remote")]
    StreamClosed,

    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("order store error: {0}")]
    Store(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("strategy error: {0}")]
    Strategy(String),
}

impl Error {
    /// Whether the failure is a network hiccup worth reconnecting for.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) | Error::StreamClosed => true,
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Rejected { .. }
            | Error::Auth(_)
            | Error::Config(_)
            | Error::Json(_)
            | Error::Store(_)
            | Error::Decode(_)
            | Error::Strategy(_) => false,
        }
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                match status {
                    401 | 403 => Error::Auth(format!("stream handshake refused ({})", status)),
                    400..=499 => Error::Config(format!("stream handshake rejected ({})", status)),
                    _ => Error::Transport(format!("stream handshake failed ({})", status)),
                }
            }
            tungstenite::Error::Url(e) => Error::Config(format!("invalid stream url: {}", e)),
            // Resets, IO and DNS failures, protocol violations from a dropped peer
            other => Error::Transport(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Error::Store(format!("migration failed: {}", e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_transient() {
        assert!(Error::Transport("connection reset".to_string()).is_transient());
        assert!(Error::StreamClosed.is_transient());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(!Error::Auth("bad key".to_string()).is_transient());
        assert!(!Error::Config("no pairs".to_string()).is_transient());
        assert!(!Error::Rejected {
            status: 400,
            body: "{}".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_websocket_io_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: Error = tungstenite::Error::Io(io).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_websocket_closed_is_transient() {
        let err: Error = tungstenite::Error::ConnectionClosed.into();
        assert!(err.is_transient());
    }
}
