use super::types::{ComponentState, RunMode, ShutdownReason};
use crate::api::{BoothApi, HttpTransport, Transport};
use crate::config::BoothConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::gallery::{GallerySync, LogSurface, MediaSurface};
use crate::keyboard_input::KeyboardInputHandler;
use crate::pipeline::PipelineOrchestrator;
use crate::session::KioskFlow;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires configuration, transport and event bus into the engines a run mode needs
pub struct BoothApp {
    pub(super) config: BoothConfig,
    pub(super) mode: RunMode,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) api: BoothApi,
    pub(super) surface: Arc<dyn MediaSurface>,

    // Components, built by `initialize`
    pub(super) gallery: Option<Arc<GallerySync>>,
    pub(super) pipeline: Option<Arc<PipelineOrchestrator>>,
    pub(super) kiosk: Option<Arc<KioskFlow>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) recipient_phone: Option<String>,

    // Lifecycle management
    pub(super) component_states: Mutex<BTreeMap<String, ComponentState>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BoothApp {
    /// Create an app talking to the configured backend over HTTP
    pub fn new(config: BoothConfig, mode: RunMode) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.api)?);
        Ok(Self::with_transport(config, mode, transport))
    }

    pub fn with_transport(config: BoothConfig, mode: RunMode, transport: Arc<dyn Transport>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            mode,
            event_bus,
            api: BoothApi::new(transport),
            surface: Arc::new(LogSurface),
            gallery: None,
            pipeline: None,
            kiosk: None,
            keyboard_handler: None,
            keyboard_enabled: false,
            recipient_phone: None,
            component_states: Mutex::new(BTreeMap::new()),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Render gallery frames somewhere other than the log
    pub fn with_surface(mut self, surface: Arc<dyn MediaSurface>) -> Self {
        self.surface = surface;
        self
    }

    /// Enable or disable terminal key control of the gallery
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Phone number of the person a run's promotion code is linked to
    pub fn set_recipient_phone(&mut self, phone: Option<String>) {
        self.recipient_phone = phone.filter(|phone| !phone.trim().is_empty());
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn config(&self) -> &BoothConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn gallery(&self) -> Option<&Arc<GallerySync>> {
        self.gallery.as_ref()
    }

    pub fn pipeline(&self) -> Option<&Arc<PipelineOrchestrator>> {
        self.pipeline.as_ref()
    }

    pub fn kiosk(&self) -> Option<&Arc<KioskFlow>> {
        self.kiosk.as_ref()
    }

    /// Ask the run loop to shut down; only the first request counts
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        request_shutdown(&self.shutdown_sender, reason)
    }
}

pub(super) fn request_shutdown(
    sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    reason: ShutdownReason,
) -> bool {
    match sender.lock().take() {
        Some(sender) => sender.send(reason).is_ok(),
        None => false,
    }
}
