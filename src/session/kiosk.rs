use super::context::{FlowContext, SessionHandle};
use super::gate::{SessionGate, SessionPhase};
use super::navigation::{Navigator, Route};
use super::watchdog::SessionWatchdog;
use crate::api::BoothApi;
use crate::config::SessionConfig;
use crate::error::{BoothError, Result};
use crate::events::EventBus;
use crate::poller::{poll_operation, ManagedPoller, PollerFlags, PollerStats};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ActiveSession {
    handle: SessionHandle,
    gate: Arc<SessionGate>,
    watchdog: SessionWatchdog,
    capture: ManagedPoller,
}

impl ActiveSession {
    fn stop(&self) {
        self.capture.stop();
        self.watchdog.stop();
    }
}

/// Selfie kiosk session: a capture wait racing a TTL watchdog
pub struct KioskFlow {
    api: BoothApi,
    config: SessionConfig,
    context: FlowContext,
    navigator: Arc<dyn Navigator>,
    event_bus: Option<Arc<EventBus>>,
    flags: PollerFlags,
    active: Mutex<Option<ActiveSession>>,
}

impl KioskFlow {
    pub fn new(
        api: BoothApi,
        config: SessionConfig,
        context: FlowContext,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            config,
            context,
            navigator,
            event_bus: None,
            flags: PollerFlags::new(),
            active: Mutex::new(None),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn flags(&self) -> &PollerFlags {
        &self.flags
    }

    /// Create a session on the backend, begin it and start waiting for a capture
    pub async fn begin(&self, token: &CancellationToken) -> Result<SessionHandle> {
        let session_uuid = self
            .api
            .create_session(&self.config.station_code, token)
            .await?;
        self.api.begin_session(&session_uuid, token).await?;
        self.start(&session_uuid)
    }

    /// Start the pollers for an already-begun session
    pub fn start(&self, session_uuid: &str) -> Result<SessionHandle> {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            debug!("Replacing session {}", previous.handle.session_uuid);
            previous.gate.end();
            previous.stop();
        }

        self.context.begin(session_uuid);
        let gate = Arc::new(SessionGate::new(
            session_uuid,
            self.context.clone(),
            Arc::clone(&self.navigator),
            self.event_bus.clone(),
        ));

        let mut watchdog = SessionWatchdog::new(
            &gate,
            self.flags.clone(),
            Duration::from_millis(self.config.ttl_poll_ms),
        );
        let mut capture = ManagedPoller::with_parent(
            format!("capture:{}", session_uuid),
            self.flags.clone(),
            gate.token(),
        );
        if let Some(bus) = &self.event_bus {
            watchdog = watchdog.with_event_bus(Arc::clone(bus));
            capture = capture.with_event_bus(Arc::clone(bus));
        }

        self.navigator.navigate(Route::Capture);
        watchdog.start(self.api.clone(), Arc::clone(&gate))?;
        capture.start(
            Duration::from_millis(self.config.capture_poll_ms),
            capture_operation(self.api.clone(), Arc::clone(&gate)),
        )?;

        let handle = SessionHandle {
            session_uuid: session_uuid.to_string(),
            station_code: self.config.station_code.clone(),
            remaining_seconds: None,
        };

        info!("Kiosk session {} started", session_uuid);

        *active = Some(ActiveSession {
            handle: handle.clone(),
            gate,
            watchdog,
            capture,
        });
        Ok(handle)
    }

    /// End the session on the backend and stop its pollers
    pub async fn end(&self, token: &CancellationToken) -> Result<()> {
        let Some(session) = self.active.lock().take() else {
            return Ok(());
        };

        session.stop();
        let was_live = session.gate.end();

        if was_live {
            if let Err(e) = self
                .api
                .end_session(&session.handle.session_uuid, token)
                .await
            {
                warn!(
                    "Ending session {} failed: {}",
                    session.handle.session_uuid, e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Current session with its last observed time-to-live
    pub fn session(&self) -> Option<SessionHandle> {
        self.active.lock().as_ref().map(|session| SessionHandle {
            remaining_seconds: session.gate.remaining_seconds(),
            ..session.handle.clone()
        })
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.active.lock().as_ref().map(|session| session.gate.phase())
    }

    pub fn gate(&self) -> Option<Arc<SessionGate>> {
        self.active
            .lock()
            .as_ref()
            .map(|session| Arc::clone(&session.gate))
    }

    pub fn watchdog_stats(&self) -> Option<PollerStats> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.watchdog.stats())
    }

    pub fn capture_stats(&self) -> Option<PollerStats> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.capture.stats())
    }

    /// Wait until the session leaves `Active`
    pub async fn wait_for_capture(&self) -> Result<SessionPhase> {
        let gate = self
            .gate()
            .ok_or_else(|| BoothError::system("no kiosk session is active"))?;

        let mut phase = gate.watch_phase();
        if let Err(e) = phase.wait_for(|phase| *phase != SessionPhase::Active).await {
            debug!("Phase channel closed: {}", e);
        }

        match gate.phase() {
            SessionPhase::Expired => Err(BoothError::SessionExpired {
                session_uuid: gate.session_uuid().to_string(),
            }),
            phase => Ok(phase),
        }
    }
}

impl Drop for KioskFlow {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            session.stop();
        }
    }
}

/// Check for a captured file, move it out of the device and hand it to the gate
fn capture_operation(api: BoothApi, gate: Arc<SessionGate>) -> crate::poller::PollOperation {
    poll_operation(move |ticket| {
        let api = api.clone();
        let gate = Arc::clone(&gate);
        async move {
            if !gate.is_active() {
                return Ok(());
            }

            let Some(file) = api.check_capture_image(&ticket.token).await? else {
                return Ok(());
            };

            if !gate.is_active() || !ticket.is_current() {
                debug!("Dropping capture {} for a settled session", file);
                return Ok(());
            }

            api.move_capture_image(&file, &ticket.token).await?;
            gate.commit_media_found(&file);
            Ok(())
        }
    })
}
