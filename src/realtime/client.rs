//! Subscriber side of the realtime channel.
//!
//! The client keeps a registry of handlers per event name and a background task
//! that holds the WebSocket open. When the connection cannot be established it
//! retries a bounded number of times with a fixed delay, then gives up and stays
//! disconnected until [`RealtimeClient::reconnect`] is called.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Pseudo-events dispatched by the client itself.
pub const CONNECT: &str = "connect";
pub const DISCONNECT: &str = "disconnect";
pub const CONNECT_ERROR: &str = "connect_error";

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retries are exhausted; only a manual reconnect leaves this state.
    GaveUp,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Default)]
struct Registry {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl Registry {
    fn add(&self, event: &str, handler: Handler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(event.to_string()).or_default().push(handler);
    }

    fn remove(&self, event: &str) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.remove(event);
    }

    fn count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(event).map_or(0, Vec::len)
    }

    /// Handlers run outside the lock so they may register or remove handlers.
    fn dispatch(&self, event: &str, data: &Value) {
        let targets: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(event).cloned().unwrap_or_default()
        };
        for handler in targets {
            handler(data);
        }
    }
}

/// Connection state tagged with the generation of the task allowed to change it.
struct Tracked {
    epoch: u64,
    state: ConnectionState,
}

struct Shared {
    registry: Registry,
    tracked: Mutex<Tracked>,
}

impl Shared {
    /// Retires any running task and moves to `state`. Returns the new epoch.
    fn reset(&self, state: ConnectionState) -> u64 {
        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
        tracked.epoch += 1;
        tracked.state = state;
        tracked.epoch
    }

    /// Applies `state` only while `epoch` is current. A retired task gets
    /// `false` back and must stop without touching anything else.
    fn advance(&self, epoch: u64, state: ConnectionState) -> bool {
        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
        if tracked.epoch != epoch {
            return false;
        }
        tracked.state = state;
        true
    }

    fn state(&self) -> ConnectionState {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner).state
    }
}

pub struct RealtimeClient {
    url: String,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_policy(url, ReconnectPolicy::default())
    }

    pub fn with_policy(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            shared: Arc::new(Shared {
                registry: Registry::default(),
                tracked: Mutex::new(Tracked {
                    epoch: 0,
                    state: ConnectionState::Disconnected,
                }),
            }),
            task: Mutex::new(None),
        }
    }

    /// Registers `handler` for `event`. Several handlers may share an event name.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.registry.add(event, Arc::new(handler));
    }

    /// Drops every handler registered for `event`.
    pub fn off(&self, event: &str) {
        self.shared.registry.remove(event);
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.shared.registry.count(event)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Starts the connection task. Does nothing if one is already running.
    pub fn connect(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let epoch = self.shared.reset(ConnectionState::Connecting);
        *task = Some(tokio::spawn(run(
            self.url.clone(),
            self.policy,
            Arc::clone(&self.shared),
            epoch,
        )));
    }

    /// Stops the connection task. A task still mid-step on another worker
    /// finds its epoch retired and cannot change the state afterwards.
    pub fn disconnect(&self) {
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.shared.reset(ConnectionState::Disconnected);
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Manual reconnect: drops the current task and starts over with a fresh
    /// attempt budget.
    pub fn reconnect(&self) {
        self.disconnect();
        self.connect();
    }

    /// Waits for the connection task to stop on its own, which only happens
    /// once the retry budget is spent.
    pub async fn join(&self) {
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

async fn run(url: String, policy: ReconnectPolicy, shared: Arc<Shared>, epoch: u64) {
    let mut failures: u32 = 0;
    loop {
        if !shared.advance(epoch, ConnectionState::Connecting) {
            return;
        }
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                failures = 0;
                if !shared.advance(epoch, ConnectionState::Connected) {
                    return;
                }
                shared.registry.dispatch(CONNECT, &Value::Null);

                let (_sink, mut frames) = stream.split();
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if !shared.advance(epoch, ConnectionState::Connected) {
                                return;
                            }
                            deliver(&shared.registry, text.as_str());
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            tracing::debug!(error = %err, "realtime stream error");
                            break;
                        }
                    }
                }

                if !shared.advance(epoch, ConnectionState::Disconnected) {
                    return;
                }
                shared.registry.dispatch(DISCONNECT, &Value::Null);
            }
            Err(err) => {
                failures += 1;
                if !shared.advance(epoch, ConnectionState::Connecting) {
                    return;
                }
                tracing::warn!(attempt = failures, error = %err, "realtime connection failed");
                shared
                    .registry
                    .dispatch(CONNECT_ERROR, &Value::String(err.to_string()));
                if failures >= policy.max_attempts {
                    shared.advance(epoch, ConnectionState::GaveUp);
                    return;
                }
            }
        }
        tokio::time::sleep(policy.delay).await;
    }
}

fn deliver(registry: &Registry, text: &str) {
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => registry.dispatch(&envelope.event, &envelope.data),
        Err(err) => tracing::debug!(error = %err, "ignoring malformed realtime frame"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in_handler = Arc::clone(&hits);
        (hits, move |_: &Value| {
            hits_in_handler.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn multiple_handlers_per_event() {
        let client = RealtimeClient::new("ws://127.0.0.1:1/ws");
        let (first, h1) = counter();
        let (second, h2) = counter();
        client.on("newOrder", h1);
        client.on("newOrder", h2);
        assert_eq!(client.handler_count("newOrder"), 2);

        deliver(&client.shared.registry, r#"{"event":"newOrder","data":{"id":1}}"#);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_all_handlers_for_event() {
        let client = RealtimeClient::new("ws://127.0.0.1:1/ws");
        let (hits, handler) = counter();
        client.on("productsUpdate", handler);
        client.off("productsUpdate");

        deliver(&client.shared.registry, r#"{"event":"productsUpdate","data":{}}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(client.handler_count("productsUpdate"), 0);
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        let client = RealtimeClient::new("ws://127.0.0.1:1/ws");
        let (hits, handler) = counter();
        client.on("newOrder", handler);

        deliver(&client.shared.registry, "not json");
        deliver(&client.shared.registry, r#"{"event":"somethingElse","data":1}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        // Port 1 is never listening, so every attempt is refused immediately.
        let client = RealtimeClient::with_policy(
            "ws://127.0.0.1:1/ws",
            ReconnectPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
        );
        let (errors, handler) = counter();
        client.on(CONNECT_ERROR, handler);

        client.connect();
        tokio::time::timeout(Duration::from_secs(10), client.join())
            .await
            .expect("client should stop retrying");

        assert_eq!(errors.load(Ordering::SeqCst), 3);
        assert_eq!(client.state(), ConnectionState::GaveUp);
    }

    #[tokio::test]
    async fn manual_reconnect_resets_the_budget() {
        let client = RealtimeClient::with_policy(
            "ws://127.0.0.1:1/ws",
            ReconnectPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            },
        );
        let (errors, handler) = counter();
        client.on(CONNECT_ERROR, handler);

        client.connect();
        client.join().await;
        assert_eq!(client.state(), ConnectionState::GaveUp);

        client.reconnect();
        client.join().await;
        assert_eq!(errors.load(Ordering::SeqCst), 4);
        assert_eq!(client.state(), ConnectionState::GaveUp);
    }

    #[tokio::test]
    async fn disconnect_stops_the_task() {
        let client = RealtimeClient::with_policy(
            "ws://127.0.0.1:1/ws",
            ReconnectPolicy {
                max_attempts: 1000,
                delay: Duration::from_millis(50),
            },
        );
        client.connect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn retired_task_cannot_change_state() {
        let client = RealtimeClient::with_policy(
            "ws://127.0.0.1:1/ws",
            ReconnectPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            },
        );
        let (errors, handler) = counter();
        client.on(CONNECT_ERROR, handler);

        // A task spawned before a disconnect keeps running to completion.
        let stale = client.shared.reset(ConnectionState::Connecting);
        client.disconnect();
        run(
            "ws://127.0.0.1:1/ws".into(),
            client.policy,
            Arc::clone(&client.shared),
            stale,
        )
        .await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
