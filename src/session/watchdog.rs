use super::gate::SessionGate;
use crate::api::BoothApi;
use crate::error::{BoothError, Result};
use crate::events::EventBus;
use crate::poller::{poll_operation, ManagedPoller, PollerFlags, PollerStats};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Polls a session's time-to-live and expires it when it runs out.
///
/// Fails closed: an unreadable session is treated as expired.
pub struct SessionWatchdog {
    poller: ManagedPoller,
    interval: Duration,
}

impl SessionWatchdog {
    pub fn new(gate: &SessionGate, flags: PollerFlags, interval: Duration) -> Self {
        Self {
            poller: ManagedPoller::with_parent(
                format!("session-ttl:{}", gate.session_uuid()),
                flags,
                gate.token(),
            ),
            interval,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.poller = self.poller.with_event_bus(event_bus);
        self
    }

    pub fn start(&self, api: BoothApi, gate: Arc<SessionGate>) -> Result<()> {
        let operation = poll_operation(move |ticket| {
            let api = api.clone();
            let gate = Arc::clone(&gate);
            async move {
                let session_uuid = gate.session_uuid().to_string();
                match api.read_session_remaining(&session_uuid, &ticket.token).await {
                    Ok(seconds) if seconds > 0 => {
                        debug!("Session {} has {}s left", session_uuid, seconds);
                        gate.record_remaining(seconds);
                    }
                    Ok(seconds) => {
                        gate.record_remaining(seconds);
                        gate.expire("time is up");
                    }
                    Err(BoothError::Cancelled) => return Err(BoothError::Cancelled),
                    Err(e) => {
                        warn!("Session {} could not be read: {}", session_uuid, e);
                        gate.expire("session could not be read");
                    }
                }
                Ok(())
            }
        });

        self.poller.start(self.interval, operation)
    }

    pub fn stop(&self) {
        self.poller.stop();
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn stats(&self) -> PollerStats {
        self.poller.stats()
    }
}
