use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A kiosk session as the client sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_uuid: String,
    pub station_code: String,
    /// Last observed time-to-live; unknown until the first watchdog read
    pub remaining_seconds: Option<i64>,
}

/// Values threaded through every screen of one kiosk flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub session_uuid: Option<String>,
    pub selected_file: Option<String>,
    pub step_index: usize,
}

/// Shared, explicitly passed flow state.
///
/// Built once per flow entry and handed to each component that needs it;
/// clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    inner: Arc<Mutex<FlowSnapshot>>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, session_uuid: &str) {
        let mut inner = self.inner.lock();
        *inner = FlowSnapshot {
            session_uuid: Some(session_uuid.to_string()),
            selected_file: None,
            step_index: 0,
        };
    }

    pub fn session_uuid(&self) -> Option<String> {
        self.inner.lock().session_uuid.clone()
    }

    pub fn select_file(&self, file: &str) {
        self.inner.lock().selected_file = Some(file.to_string());
    }

    pub fn selected_file(&self) -> Option<String> {
        self.inner.lock().selected_file.clone()
    }

    pub fn step_index(&self) -> usize {
        self.inner.lock().step_index
    }

    pub fn advance_step(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.step_index += 1;
        inner.step_index
    }

    /// Forget the session and everything selected during it
    pub fn clear(&self) {
        *self.inner.lock() = FlowSnapshot::default();
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.inner.lock().clone()
    }
}
