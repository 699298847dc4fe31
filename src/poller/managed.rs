use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, EventBus};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Operation run on every tick
pub type PollOperation = Arc<dyn Fn(PollTicket) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`PollOperation`]
pub fn poll_operation<F, Fut>(f: F) -> PollOperation
where
    F: Fn(PollTicket) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ticket| Box::pin(f(ticket)))
}

/// Gates shared with the owner of a poller
#[derive(Debug, Clone)]
pub struct PollerFlags {
    enabled: Arc<AtomicBool>,
    visible: Arc<AtomicBool>,
}

impl PollerFlags {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            visible: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Background surfaces suppress ticks
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn should_run(&self) -> bool {
        self.is_enabled() && self.is_visible()
    }
}

impl Default for PollerFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle passed to one invocation.
///
/// `generation` increases with every invocation; results from a ticket that
/// is no longer current must not be applied.
#[derive(Debug, Clone)]
pub struct PollTicket {
    pub generation: u64,
    pub token: CancellationToken,
    current: Arc<AtomicU64>,
}

impl PollTicket {
    pub fn is_current(&self) -> bool {
        !self.token.is_cancelled() && self.current.load(Ordering::SeqCst) == self.generation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollerStats {
    pub invocations: u64,
    /// Ticks dropped because an invocation was still in flight
    pub skipped: u64,
    /// Ticks dropped because the poller was disabled or hidden
    pub suppressed: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

struct PollerShared {
    name: String,
    in_flight: AtomicBool,
    generation: Arc<AtomicU64>,
    current_token: Mutex<Option<CancellationToken>>,
    stats: Mutex<PollerStats>,
}

impl PollerShared {
    fn issue(&self, parent: &CancellationToken) -> PollTicket {
        let token = parent.child_token();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current_token.lock() = Some(token.clone());
        PollTicket {
            generation,
            token,
            current: Arc::clone(&self.generation),
        }
    }
}

/// Interval runner with at-most-one invocation in flight
pub struct ManagedPoller {
    shared: Arc<PollerShared>,
    flags: PollerFlags,
    root: CancellationToken,
    event_bus: Option<Arc<EventBus>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ManagedPoller {
    pub fn new<S: Into<String>>(name: S, flags: PollerFlags) -> Self {
        Self::with_parent(name, flags, &CancellationToken::new())
    }

    /// Poller whose work is also cancelled when `parent` is
    pub fn with_parent<S: Into<String>>(
        name: S,
        flags: PollerFlags,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                name: name.into(),
                in_flight: AtomicBool::new(false),
                generation: Arc::new(AtomicU64::new(0)),
                current_token: Mutex::new(None),
                stats: Mutex::new(PollerStats::default()),
            }),
            flags,
            root: parent.child_token(),
            event_bus: None,
            task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Report soft failures on the bus as well as in the log
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.set_event_bus(event_bus);
        self
    }

    pub fn set_event_bus(&mut self, event_bus: Arc<EventBus>) {
        self.event_bus = Some(event_bus);
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn flags(&self) -> &PollerFlags {
        &self.flags
    }

    pub fn stats(&self) -> PollerStats {
        self.shared.stats.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some() && !self.root.is_cancelled()
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Start ticking. The first tick fires immediately.
    pub fn start(&self, period: Duration, operation: PollOperation) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) || self.root.is_cancelled() {
            return Err(BoothError::component(
                self.shared.name.clone(),
                "poller already stopped".to_string(),
            ));
        }

        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Poller '{}' already started", self.shared.name);
            return Ok(());
        }

        info!("Starting poller '{}' every {:?}", self.shared.name, period);

        let shared = Arc::clone(&self.shared);
        let flags = self.flags.clone();
        let root = self.root.clone();
        let event_bus = self.event_bus.clone();

        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !flags.should_run() {
                    shared.stats.lock().suppressed += 1;
                    continue;
                }

                if shared
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!("Poller '{}' tick skipped, previous call in flight", shared.name);
                    shared.stats.lock().skipped += 1;
                    continue;
                }

                let ticket = shared.issue(&root);
                shared.stats.lock().invocations += 1;

                let shared = Arc::clone(&shared);
                let operation = Arc::clone(&operation);
                let event_bus = event_bus.clone();
                tokio::spawn(async move {
                    let token = ticket.token.clone();
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(BoothError::Cancelled),
                        result = operation(ticket) => result,
                    };

                    match outcome {
                        Ok(()) => {}
                        Err(BoothError::Cancelled) => {
                            debug!("Poller '{}' call cancelled", shared.name);
                        }
                        Err(e) => {
                            warn!("Poller '{}' tick failed: {}", shared.name, e);
                            {
                                let mut stats = shared.stats.lock();
                                stats.failures += 1;
                                stats.last_error = Some(e.to_string());
                            }
                            if let Some(bus) = event_bus {
                                let _ = bus.publish(BoothEvent::PollFailed {
                                    poller: shared.name.clone(),
                                    error: e.to_string(),
                                });
                            }
                        }
                    }

                    shared.in_flight.store(false, Ordering::SeqCst);
                });
            }

            debug!("Poller '{}' loop exited", shared.name);
        }));

        Ok(())
    }

    /// Ticket for a call made outside the timer.
    ///
    /// It takes the next generation, so a tick still in flight is no longer
    /// current when it lands, and a later tick supersedes it in turn.
    pub fn ticket(&self) -> PollTicket {
        self.shared.issue(&self.root)
    }

    /// Clear the timer and abort the in-flight call. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.root.cancel();
        if let Some(token) = self.shared.current_token.lock().take() {
            token.cancel();
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }

        info!("Stopped poller '{}'", self.shared.name);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for ManagedPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
