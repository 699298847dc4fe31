use crate::events::{BoothEvent, EventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Screens the kiosk flow can send the front end to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Route {
    /// Session entry point
    SessionStart,
    /// Live capture, waiting for a file
    Capture,
    /// A captured file is ready for review
    CapturePreview { file: String },
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Publishes navigation requests on the event bus
pub struct EventNavigator {
    event_bus: Arc<EventBus>,
}

impl EventNavigator {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }
}

impl Navigator for EventNavigator {
    fn navigate(&self, route: Route) {
        info!("Navigating to {:?}", route);
        let _ = self.event_bus.publish(BoothEvent::Navigate { route });
    }
}

/// Keeps every route it was sent, for tests
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().push(route);
    }
}
