use super::context::FlowContext;
use super::navigation::{Navigator, Route};
use crate::events::{BoothEvent, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a capture
    Active,
    /// A captured file was accepted; the session is still alive
    MediaFound,
    /// Terminal: time ran out or the session could not be read
    Expired,
    /// Terminal: ended by the flow itself
    Ended,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Expired | SessionPhase::Ended)
    }
}

struct GateState {
    phase: SessionPhase,
    remaining_seconds: Option<i64>,
}

/// Arbitrates between the pollers of one session.
///
/// Every transition goes through the phase lock, and expiry is accepted from
/// any non-terminal phase, so it wins against a capture result landing in the
/// same tick. Once terminal, no further navigation is issued.
pub struct SessionGate {
    session_uuid: String,
    token: CancellationToken,
    state: Mutex<GateState>,
    phase_tx: watch::Sender<SessionPhase>,
    context: FlowContext,
    navigator: Arc<dyn Navigator>,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionGate {
    pub fn new(
        session_uuid: &str,
        context: FlowContext,
        navigator: Arc<dyn Navigator>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Active);
        Self {
            session_uuid: session_uuid.to_string(),
            token: CancellationToken::new(),
            state: Mutex::new(GateState {
                phase: SessionPhase::Active,
                remaining_seconds: None,
            }),
            phase_tx,
            context,
            navigator,
            event_bus,
        }
    }

    pub fn session_uuid(&self) -> &str {
        &self.session_uuid
    }

    /// Parent of every poller and request bound to this session
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// Receiver that observes every phase transition
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        self.state.lock().remaining_seconds
    }

    pub fn record_remaining(&self, seconds: i64) {
        self.state.lock().remaining_seconds = Some(seconds);
    }

    /// Accept a captured file. Refused once the session left `Active`.
    pub fn commit_media_found(&self, file: &str) -> bool {
        let mut state = self.state.lock();
        if state.phase != SessionPhase::Active {
            debug!(
                "Ignoring capture {} for session {} in phase {:?}",
                file, self.session_uuid, state.phase
            );
            return false;
        }

        state.phase = SessionPhase::MediaFound;
        self.phase_tx.send_replace(SessionPhase::MediaFound);
        self.context.select_file(file);
        self.context.advance_step();
        // Navigate under the lock so an expiry cannot slip in between
        self.navigator.navigate(Route::CapturePreview {
            file: file.to_string(),
        });
        drop(state);

        info!("Session {} captured {}", self.session_uuid, file);
        self.emit(BoothEvent::MediaFound {
            session_uuid: self.session_uuid.clone(),
            file: file.to_string(),
        });
        true
    }

    /// Terminal path: stop every session poller, forget the session and go
    /// back to the entry screen. Returns false if already terminal.
    pub fn expire(&self, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return false;
            }
            state.phase = SessionPhase::Expired;
            self.phase_tx.send_replace(SessionPhase::Expired);
        }

        warn!("Session {} expired: {}", self.session_uuid, reason);
        self.token.cancel();
        self.context.clear();
        self.navigator.navigate(Route::SessionStart);
        self.emit(BoothEvent::SessionExpired {
            session_uuid: self.session_uuid.clone(),
            timestamp: SystemTime::now(),
        });
        true
    }

    /// Close the session from the flow's side; no navigation
    pub fn end(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return false;
            }
            state.phase = SessionPhase::Ended;
            self.phase_tx.send_replace(SessionPhase::Ended);
        }

        info!("Session {} ended", self.session_uuid);
        self.token.cancel();
        self.context.clear();
        true
    }

    fn emit(&self, event: BoothEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}
