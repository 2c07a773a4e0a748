use std::time::Duration;

use async_trait::async_trait;

use crate::api::EventSource;
use crate::models::StreamEvent;
use crate::{Error, Result};

/// Consumer of stream events, called strictly in arrival order
#[async_trait]
pub trait EventHandler: Send {
    async fn handle(&mut self, event: StreamEvent);
}

/// Keeps one event subscription alive across transport failures
///
/// Transient failures (resets, IO errors, remote closes) are retried after a
/// fixed cooldown, forever. Anything else is returned to the caller.
pub struct StreamSupervisor<S> {
    source: S,
    session_key: String,
    cooldown: Duration,
}

impl<S: EventSource> StreamSupervisor<S> {
    pub fn new(source: S, session_key: String, cooldown: Duration) -> Self {
        Self {
            source,
            session_key,
            cooldown,
        }
    }

    /// Run until a non-transient failure
    pub async fn run<H>(&self, handler: &mut H) -> Result<()>
    where
        H: EventHandler + ?Sized,
    {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let e = self.pump(handler).await;
            if !e.is_transient() {
                tracing::error!("❌ Event stream fatal error: {}", e);
                return Err(e);
            }

            tracing::error!(
                "❌ Event stream failed (attempt {}): {}; reconnecting in {}s",
                attempt,
                e,
                self.cooldown.as_secs()
            );
            tokio::time::sleep(self.cooldown).await;
        }
    }

    /// Connect once and deliver events until the subscription ends
    ///
    /// Always ends in an error; a clean remote close is `StreamClosed`.
    async fn pump<H>(&self, handler: &mut H) -> Error
    where
        H: EventHandler + ?Sized,
    {
        let mut subscription = match self.source.connect(&self.session_key).await {
            Ok(subscription) => subscription,
            Err(e) => return e,
        };
        tracing::info!("✅ Event stream connected");

        loop {
            match subscription.next_event().await {
                Ok(Some(event)) => handler.handle(event).await,
                Ok(None) => return Error::StreamClosed,
                Err(e) => return e,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EventSubscription;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted connection: either a connect failure or a frame sequence
    enum Session {
        Refuse(Error),
        Frames(Vec<Result<Option<StreamEvent>>>),
    }

    struct ScriptedSource {
        sessions: Mutex<VecDeque<Session>>,
        connects: Arc<Mutex<u32>>,
    }

    struct ScriptedSubscription {
        frames: VecDeque<Result<Option<StreamEvent>>>,
    }

    #[async_trait]
    impl EventSubscription for ScriptedSubscription {
        async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
            self.frames.pop_front().unwrap_or(Ok(None))
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn connect(&self, _session_key: &str) -> Result<Box<dyn EventSubscription>> {
            *self.connects.lock().unwrap() += 1;
            match self.sessions.lock().unwrap().pop_front() {
                Some(Session::Frames(frames)) => Ok(Box::new(ScriptedSubscription {
                    frames: frames.into(),
                })),
                Some(Session::Refuse(e)) => Err(e),
                None => Err(Error::Auth("script exhausted".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        streams: Vec<String>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&mut self, event: StreamEvent) {
            self.streams.push(event.stream);
        }
    }

    fn event(stream: &str) -> Result<Option<StreamEvent>> {
        Ok(Some(StreamEvent {
            stream: stream.to_string(),
            data: json!({}),
        }))
    }

    fn supervisor(sessions: Vec<Session>) -> (StreamSupervisor<ScriptedSource>, Arc<Mutex<u32>>) {
        let connects = Arc::new(Mutex::new(0));
        let source = ScriptedSource {
            sessions: Mutex::new(sessions.into()),
            connects: connects.clone(),
        };
        (
            StreamSupervisor::new(source, "key".to_string(), Duration::from_secs(30)),
            connects,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_transient_failures() {
        let (supervisor, connects) = supervisor(vec![
            Session::Frames(vec![
                event("a"),
                event("b"),
                Err(Error::Transport("connection reset".to_string())),
            ]),
            Session::Refuse(Error::Transport("name resolution failed".to_string())),
            Session::Frames(vec![event("c"), Ok(None)]),
            Session::Frames(vec![event("d")]),
        ]);
        let mut recorder = Recorder::default();

        let start = tokio::time::Instant::now();
        let result = supervisor.run(&mut recorder).await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(recorder.streams, vec!["a", "b", "c", "d"]);
        assert_eq!(*connects.lock().unwrap(), 5);
        // One cooldown between each of the five attempts
        assert_eq!(start.elapsed(), Duration::from_secs(4 * 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_connect_error_stops_immediately() {
        let (supervisor, connects) =
            supervisor(vec![Session::Refuse(Error::Config("bad url".to_string()))]);
        let mut recorder = Recorder::default();

        let start = tokio::time::Instant::now();
        let result = supervisor.run(&mut recorder).await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(*connects.lock().unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_full_cooldown_before_reconnect() {
        let (supervisor, connects) = supervisor(vec![
            Session::Refuse(Error::StreamClosed),
            Session::Frames(vec![event("late")]),
        ]);
        let connect_count = connects.clone();

        let handle = tokio::spawn(async move {
            let mut recorder = Recorder::default();
            let _ = supervisor.run(&mut recorder).await;
            recorder.streams
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(*connect_count.lock().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(*connect_count.lock().unwrap() >= 2);

        assert_eq!(handle.await.unwrap(), vec!["late"]);
    }
}
