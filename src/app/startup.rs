use super::orchestrator::request_shutdown;
use super::{BoothApp, ComponentState, RunMode, ShutdownReason};
use crate::error::{BoothError, Result};
use crate::gallery::{
    Classifier, ClassifierRules, EngineOptions, GalleryEngine, GallerySync, TileGrid, ViewerLayout,
};
use crate::keyboard_input::{KeyboardInputHandler, ViewerCommand};
use crate::pipeline::{best_match, PipelineOrchestrator, Recipient, RecipientSearch, RunOutcome};
use crate::poller::PollerFlags;
use crate::session::{EventNavigator, FlowContext, KioskFlow, SessionPhase};
use crate::settings::SettingsStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl BoothApp {
    /// Build the components of the selected run mode
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing {:?} mode", self.mode);

        for component in self.mode.components() {
            if *component == "keyboard" && !self.keyboard_enabled {
                continue;
            }
            self.set_component_state(component, ComponentState::Stopped);
        }

        match self.mode {
            RunMode::Gallery { tiles } => {
                self.gallery = Some(Arc::new(self.build_gallery(tiles)?));
                if self.keyboard_enabled {
                    self.keyboard_handler =
                        Some(KeyboardInputHandler::new(Arc::clone(&self.event_bus)));
                }
            }
            RunMode::Capture => {
                self.pipeline = Some(Arc::new(self.build_pipeline()));
            }
            RunMode::Kiosk => {
                self.pipeline = Some(Arc::new(self.build_pipeline()));
                let navigator = Arc::new(EventNavigator::new(Arc::clone(&self.event_bus)));
                self.kiosk = Some(Arc::new(
                    KioskFlow::new(
                        self.api.clone(),
                        self.config.session.clone(),
                        FlowContext::new(),
                        navigator,
                    )
                    .with_event_bus(Arc::clone(&self.event_bus)),
                ));
            }
        }

        info!("All components initialized successfully");
        Ok(())
    }

    fn build_gallery(&self, tiles: bool) -> Result<GallerySync> {
        let gallery = &self.config.gallery;
        if gallery.event_code.trim().is_empty() {
            return Err(BoothError::component(
                "gallery".to_string(),
                "no event code configured (gallery.event_code)".to_string(),
            ));
        }

        let store = SettingsStore::file(&self.config.session.store_dir, self.config.viewer);
        let viewer = store.load().unwrap_or_else(|e| {
            warn!("Using default viewer settings: {}", e);
            store.defaults()
        });

        let layout = if tiles {
            ViewerLayout::Tiles(TileGrid::new(viewer))
        } else {
            ViewerLayout::Slideshow
        };

        let engine = Arc::new(
            GalleryEngine::new(
                layout,
                EngineOptions {
                    randomize: gallery.randomize,
                    show_qr: gallery.show_qr,
                },
                Arc::clone(&self.surface),
            )
            .with_event_bus(Arc::clone(&self.event_bus)),
        );

        let classifier = Classifier::new(
            ClassifierRules::from_config(gallery),
            self.config.api.media_base_url.clone(),
        );

        let sync = GallerySync::new(
            self.api.clone(),
            gallery,
            classifier,
            engine,
            PollerFlags::new(),
        )
        .with_event_bus(Arc::clone(&self.event_bus));

        // The tile viewer polls on its own tunable cadence
        Ok(if tiles {
            sync.with_poll_interval(Duration::from_millis(viewer.poll_ms))
        } else {
            sync
        })
    }

    fn recipient_lookup(&self) -> Option<Arc<RecipientLookup>> {
        let phone = self.recipient_phone.clone()?;
        if !self.config.pipeline.promo_enabled {
            warn!("Ignoring recipient {}: promotion codes are disabled", phone);
            return None;
        }
        Some(Arc::new(RecipientLookup {
            search: RecipientSearch::new(
                self.api.clone(),
                Duration::from_millis(self.config.system.search_debounce_ms),
            ),
            phone,
        }))
    }

    fn build_pipeline(&self) -> PipelineOrchestrator {
        PipelineOrchestrator::new(self.api.clone(), self.config.pipeline.clone())
            .with_event_bus(Arc::clone(&self.event_bus))
    }

    /// Start the components built by `initialize`
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting boothsync in {:?} mode", self.mode);

        if let Some(gallery) = self.gallery.clone() {
            self.set_component_state("gallery", ComponentState::Starting);
            gallery.start().map_err(|e| {
                error!("Failed to start gallery sync: {}", e);
                self.set_component_state("gallery", ComponentState::Failed);
                e
            })?;
            self.set_component_state("gallery", ComponentState::Running);
        }

        if self.keyboard_enabled {
            if let (Some(handler), Some(gallery)) = (&self.keyboard_handler, self.gallery.clone()) {
                self.set_component_state("keyboard", ComponentState::Starting);
                handler.start().await?;

                if let Some(mut commands) = handler.take_commands() {
                    let token = self.cancellation_token.clone();
                    self.tasks.lock().push(tokio::spawn(async move {
                        loop {
                            let command = tokio::select! {
                                _ = token.cancelled() => break,
                                command = commands.recv() => command,
                            };
                            match command {
                                Some(command) => apply_command(&gallery, command, &token).await,
                                None => break,
                            }
                        }
                    }));
                }
                self.set_component_state("keyboard", ComponentState::Running);
            }
        }

        match self.mode {
            RunMode::Capture => self.spawn_capture_run(),
            RunMode::Kiosk => self.spawn_kiosk_flow(),
            RunMode::Gallery { .. } => {}
        }

        info!("boothsync started successfully");
        Ok(())
    }

    fn spawn_capture_run(&self) {
        let Some(pipeline) = self.pipeline.clone() else {
            return;
        };
        self.set_component_state("pipeline", ComponentState::Running);

        let recipient = self.recipient_lookup();
        let token = self.cancellation_token.clone();
        let shutdown = Arc::clone(&self.shutdown_sender);
        self.tasks.lock().push(tokio::spawn(async move {
            let reason = tokio::select! {
                _ = token.cancelled() => return,
                reason = process_once(&pipeline, recipient.as_deref()) => reason,
            };
            request_shutdown(&shutdown, reason);
        }));
    }

    fn spawn_kiosk_flow(&self) {
        let (Some(kiosk), Some(pipeline)) = (self.kiosk.clone(), self.pipeline.clone()) else {
            return;
        };
        self.set_component_state("kiosk", ComponentState::Running);
        self.set_component_state("pipeline", ComponentState::Running);

        let recipient = self.recipient_lookup();
        let token = self.cancellation_token.clone();
        let shutdown = Arc::clone(&self.shutdown_sender);
        self.tasks.lock().push(tokio::spawn(async move {
            let reason = tokio::select! {
                _ = token.cancelled() => return,
                reason = kiosk_once(&kiosk, &pipeline, recipient.as_deref(), &token) => reason,
            };
            request_shutdown(&shutdown, reason);
        }));
    }
}

async fn apply_command(gallery: &GallerySync, command: ViewerCommand, token: &CancellationToken) {
    match command {
        ViewerCommand::Next => {
            gallery.next();
        }
        ViewerCommand::Previous => {
            gallery.previous();
        }
        ViewerCommand::ToggleAutoplay => {
            let enabled = gallery.toggle_autoplay();
            info!("Autoplay {}", if enabled { "on" } else { "off" });
        }
        ViewerCommand::Refresh => {
            if let Err(e) = gallery.refresh(token).await {
                warn!("Manual refresh failed: {}", e);
            }
        }
        ViewerCommand::Quit => {}
    }
}

/// Debounced phone search for the run's promotion recipient
struct RecipientLookup {
    search: RecipientSearch,
    phone: String,
}

impl RecipientLookup {
    async fn find(&self) -> Option<Recipient> {
        self.search.input(&self.phone);
        let results = self.search.settled().await;
        if let Some(message) = self.search.last_error() {
            warn!("Recipient search for {} failed: {}", self.phone, message);
            return None;
        }

        let found = best_match(&self.phone, &results);
        match &found {
            Some(recipient) => info!("Promotion code goes to {} ({})", recipient.name, recipient.id),
            None => warn!(
                "No single recipient matches {} ({} results)",
                self.phone,
                results.len()
            ),
        }
        found
    }
}

/// One open/run/close cycle of the pipeline
async fn process_once(
    pipeline: &PipelineOrchestrator,
    recipient: Option<&RecipientLookup>,
) -> ShutdownReason {
    pipeline.open();
    if let Some(lookup) = recipient {
        pipeline.select_recipient(lookup.find().await);
    }
    let outcome = pipeline.run().await;
    pipeline.wait_side_effects().await;

    match outcome {
        RunOutcome::Completed(_) => {
            if let Some(message) = pipeline.snapshot().and_then(|run| run.error_message) {
                warn!("Run completed with a follow-up problem: {}", message);
            }
            match pipeline.close() {
                Some(result) => {
                    info!(
                        "Result code {} ({})",
                        result.qrcode,
                        result.result_url.as_deref().unwrap_or("no url")
                    );
                    ShutdownReason::Completed
                }
                None => ShutdownReason::Error("run finished without a result".to_string()),
            }
        }
        RunOutcome::Failed { step, message } => {
            pipeline.close();
            ShutdownReason::Error(format!("step {} failed: {}", step, message))
        }
        RunOutcome::Cancelled | RunOutcome::Skipped => {
            pipeline.close();
            ShutdownReason::UserRequest
        }
    }
}

async fn kiosk_once(
    kiosk: &KioskFlow,
    pipeline: &PipelineOrchestrator,
    recipient: Option<&RecipientLookup>,
    token: &CancellationToken,
) -> ShutdownReason {
    if let Err(e) = kiosk.begin(token).await {
        error!("Could not start a kiosk session: {}", e);
        return ShutdownReason::Error(e.user_message());
    }
    let Some(gate) = kiosk.gate() else {
        return ShutdownReason::Error("kiosk session closed before it started".to_string());
    };

    match kiosk.wait_for_capture().await {
        Ok(SessionPhase::MediaFound) => {
            // The run belongs to the session: expiry abandons it mid-chain
            let reason = tokio::select! {
                biased;
                _ = gate.token().cancelled() => {
                    info!(
                        "Kiosk session {} expired while processing; abandoning the run",
                        gate.session_uuid()
                    );
                    pipeline.cancel();
                    pipeline.close();
                    ShutdownReason::Completed
                }
                reason = process_once(pipeline, recipient) => reason,
            };
            if let Err(e) = kiosk.end(token).await {
                warn!("Session end failed: {}", e);
            }
            reason
        }
        Ok(phase) => {
            info!("Kiosk session closed in phase {:?}", phase);
            ShutdownReason::Completed
        }
        Err(BoothError::SessionExpired { session_uuid }) => {
            info!("Kiosk session {} expired before a capture", session_uuid);
            ShutdownReason::Completed
        }
        Err(e) => ShutdownReason::Error(e.to_string()),
    }
}
