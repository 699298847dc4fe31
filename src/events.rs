use crate::error::EventBusError;
use crate::pipeline::{StepKey, StepState};
use crate::session::Route;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted by the gallery, pipeline and session engines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BoothEvent {
    /// A poll produced a new renderable media batch
    MediaUpdated {
        event_code: String,
        count: usize,
        timestamp: SystemTime,
    },
    /// The rotation cursor moved
    CursorMoved { index: usize, total: usize },
    /// The media surface was asked to play or pause a video item
    PlaybackChanged { item_id: String, playing: bool },
    /// A background poll failed softly
    PollFailed { poller: String, error: String },
    /// A pipeline step changed state
    StepChanged {
        run_id: String,
        step: StepKey,
        state: StepState,
    },
    /// Every pipeline step reached success
    PipelineCompleted {
        run_id: String,
        qrcode: Option<String>,
        result_url: Option<String>,
    },
    /// A pipeline step failed and halted the run
    PipelineFailed {
        run_id: String,
        step: StepKey,
        message: String,
    },
    /// The best-effort follow-up after a completed run failed
    SideEffectFailed { run_id: String, message: String },
    /// A kiosk capture poll found a fresh file
    MediaFound { session_uuid: String, file: String },
    /// A kiosk session ran out of time or could not be read
    SessionExpired {
        session_uuid: String,
        timestamp: SystemTime,
    },
    /// The flow asked the front end to move to another screen
    Navigate { route: Route },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl BoothEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            BoothEvent::MediaUpdated {
                event_code, count, ..
            } => format!("Gallery {} updated with {} items", event_code, count),
            BoothEvent::CursorMoved { index, total } => {
                format!("Cursor moved to {}/{}", index + 1, total)
            }
            BoothEvent::PlaybackChanged { item_id, playing } => format!(
                "Video {} {}",
                item_id,
                if *playing { "playing" } else { "paused" }
            ),
            BoothEvent::PollFailed { poller, error } => {
                format!("Poll '{}' failed: {}", poller, error)
            }
            BoothEvent::StepChanged { step, state, .. } => {
                format!("Step {} is now {}", step, state)
            }
            BoothEvent::PipelineCompleted { run_id, .. } => {
                format!("Pipeline run {} completed", run_id)
            }
            BoothEvent::PipelineFailed { step, message, .. } => {
                format!("Pipeline failed at {}: {}", step, message)
            }
            BoothEvent::SideEffectFailed { message, .. } => {
                format!("Follow-up failed: {}", message)
            }
            BoothEvent::MediaFound { file, .. } => format!("Captured file found: {}", file),
            BoothEvent::SessionExpired { session_uuid, .. } => {
                format!("Session {} expired", session_uuid)
            }
            BoothEvent::Navigate { route } => format!("Navigate to {:?}", route),
            BoothEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BoothEvent::MediaUpdated { .. } => "media_updated",
            BoothEvent::CursorMoved { .. } => "cursor_moved",
            BoothEvent::PlaybackChanged { .. } => "playback_changed",
            BoothEvent::PollFailed { .. } => "poll_failed",
            BoothEvent::StepChanged { .. } => "step_changed",
            BoothEvent::PipelineCompleted { .. } => "pipeline_completed",
            BoothEvent::PipelineFailed { .. } => "pipeline_failed",
            BoothEvent::SideEffectFailed { .. } => "side_effect_failed",
            BoothEvent::MediaFound { .. } => "media_found",
            BoothEvent::SessionExpired { .. } => "session_expired",
            BoothEvent::Navigate { .. } => "navigate",
            BoothEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<BoothEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing with no subscribers is not an error for the engines; they
    /// call this from inside timer callbacks and ignore the count.
    pub fn publish(&self, event: BoothEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            BoothEvent::PipelineFailed { step, message, .. } => {
                error!("Pipeline step {} failed: {}", step, message);
            }
            BoothEvent::SideEffectFailed { message, .. } => {
                warn!("Pipeline follow-up failed: {}", message);
            }
            BoothEvent::SessionExpired { session_uuid, .. } => {
                warn!("Session {} expired", session_uuid);
            }
            BoothEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            BoothEvent::MediaUpdated { .. } | BoothEvent::PipelineCompleted { .. } => {
                info!("{}", event.description());
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept poll failures from specific pollers
    Pollers(Vec<String>),
    /// Custom filter function
    Custom(fn(&BoothEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &BoothEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Pollers(pollers) => {
                if let BoothEvent::PollFailed { poller, .. } = event {
                    pollers.contains(poller)
                } else {
                    false
                }
            }
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<BoothEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<BoothEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<BoothEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<BoothEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(BoothEvent::CursorMoved { index: 2, total: 5 })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            BoothEvent::CursorMoved { index, total } => {
                assert_eq!(index, 2);
                assert_eq!(total, 5);
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus
            .publish(BoothEvent::CursorMoved { index: 0, total: 1 })
            .is_err());
    }

    #[test]
    fn test_poller_filter() {
        let filter = EventFilter::Pollers(vec!["gallery".to_string()]);

        let gallery_failure = BoothEvent::PollFailed {
            poller: "gallery".to_string(),
            error: "timeout".to_string(),
        };
        let ttl_failure = BoothEvent::PollFailed {
            poller: "session-ttl".to_string(),
            error: "timeout".to_string(),
        };

        assert!(filter.matches(&gallery_failure));
        assert!(!filter.matches(&ttl_failure));
        assert!(!filter.matches(&BoothEvent::CursorMoved { index: 0, total: 1 }));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let receiver = event_bus.subscribe();
        let filter = EventFilter::EventTypes(vec!["session_expired"]);
        let mut filtered_receiver = EventReceiver::new(receiver, filter, "test".to_string());

        event_bus
            .publish(BoothEvent::CursorMoved { index: 0, total: 3 })
            .unwrap();
        event_bus
            .publish(BoothEvent::SessionExpired {
                session_uuid: "abc".to_string(),
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let event = timeout(Duration::from_millis(100), filtered_receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "session_expired");
    }
}
