use super::envelope::{ApiRequest, Envelope, Method};
use super::transport::Transport;
use crate::error::{BoothError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Canned answer for one route
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Raw JSON body, run through the same envelope handling as HTTP
    Body(Value),
    /// Network-level failure
    Unreachable(String),
}

impl MockReply {
    pub fn success(data: Value) -> Self {
        MockReply::Body(json!({ "status": "success", "message": "OK", "data": data }))
    }

    pub fn ok() -> Self {
        MockReply::Body(json!({ "status": "success", "message": "OK" }))
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        MockReply::Body(json!({ "status": "error", "message": message.into() }))
    }
}

/// Scripted backend for tests and offline runs.
///
/// Routes are keyed by `METHOD /path`. Queued replies are consumed first,
/// in call order, then the route's standing reply, then a plain success
/// envelope.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<(MockReply, Option<Duration>)>>>,
    standing: Mutex<HashMap<String, MockReply>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(method: Method, path: &str) -> String {
        format!("{} {}", method, path)
    }

    /// Answer every call to the route with `reply`
    pub fn on(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.standing.lock().insert(Self::key(method, path), reply);
        self
    }

    /// Answer the next call to the route with `reply`
    pub fn once(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.enqueue(method, path, reply, None)
    }

    /// Answer the next call to the route with `reply` after `delay`,
    /// overriding the route's delay for that call only
    pub fn once_after(&self, method: Method, path: &str, delay: Duration, reply: MockReply) -> &Self {
        self.enqueue(method, path, reply, Some(delay))
    }

    fn enqueue(&self, method: Method, path: &str, reply: MockReply, delay: Option<Duration>) -> &Self {
        self.queued
            .lock()
            .entry(Self::key(method, path))
            .or_default()
            .push_back((reply, delay));
        self
    }

    /// Hold every call to the route for `delay` before answering
    pub fn delay(&self, method: Method, path: &str, delay: Duration) -> &Self {
        self.delays.lock().insert(Self::key(method, path), delay);
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    /// Calls whose path starts with `prefix`
    pub fn calls_to(&self, prefix: &str) -> Vec<ApiRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.path.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls_to(prefix).len()
    }

    pub fn routes_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(ApiRequest::route).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Envelope> {
        let key = request.route();
        self.calls.lock().push(request);

        let queued = self
            .queued
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let (reply, call_delay) = match queued {
            Some((reply, delay)) => (reply, delay),
            None => (
                self.standing
                    .lock()
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(MockReply::ok),
                None,
            ),
        };

        let delay = call_delay.or_else(|| self.delays.lock().get(&key).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        debug!("Mock reply for {}: {:?}", key, reply);

        match reply {
            MockReply::Body(body) => Envelope::from_value(body)?.into_result(),
            MockReply::Unreachable(message) => Err(BoothError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            ))),
        }
    }
}
