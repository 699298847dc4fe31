use super::{BoothApp, ComponentState};
use crate::poller::PollerStats;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Point-in-time view of the running app, logged on shutdown
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub components: BTreeMap<String, String>,
    pub gallery_items: Option<usize>,
    pub gallery_poller: Option<PollerStats>,
    pub session_phase: Option<String>,
    pub pipeline_step: Option<String>,
}

impl BoothApp {
    pub fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states
            .lock()
            .insert(component.to_string(), state.clone());
        debug!("Component '{}' is now {:?}", component, state);
    }

    pub fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().get(component).cloned()
    }

    pub fn get_all_component_states(&self) -> BTreeMap<String, ComponentState> {
        self.component_states.lock().clone()
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            components: self
                .get_all_component_states()
                .into_iter()
                .map(|(name, state)| (name, format!("{:?}", state)))
                .collect(),
            gallery_items: self.gallery.as_ref().map(|g| g.engine().items().len()),
            gallery_poller: self.gallery.as_ref().map(|g| g.poller_stats()),
            session_phase: self
                .kiosk
                .as_ref()
                .and_then(|k| k.phase())
                .map(|phase| format!("{:?}", phase)),
            pipeline_step: self
                .pipeline
                .as_ref()
                .and_then(|p| p.snapshot())
                .and_then(|run| run.running_step())
                .map(|step| step.to_string()),
        }
    }
}
