use super::autoplay::Autoplay;
use super::classify::Classifier;
use super::engine::GalleryEngine;
use super::rotation::Direction;
use crate::api::BoothApi;
use crate::config::GalleryConfig;
use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, EventBus};
use crate::poller::{poll_operation, ManagedPoller, PollerFlags, PollerStats};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Polls an event's media and feeds the rotation engine
pub struct GallerySync {
    api: BoothApi,
    event_code: String,
    classifier: Classifier,
    engine: Arc<GalleryEngine>,
    poller: ManagedPoller,
    autoplay: Autoplay,
    autoplay_on_start: bool,
    poll_interval: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl GallerySync {
    pub fn new(
        api: BoothApi,
        config: &GalleryConfig,
        classifier: Classifier,
        engine: Arc<GalleryEngine>,
        flags: PollerFlags,
    ) -> Self {
        let autoplay_engine = Arc::clone(&engine);
        let autoplay = Autoplay::new(Duration::from_millis(config.autoplay_ms), move || {
            autoplay_engine.step(Direction::Forward);
        });

        Self {
            api,
            event_code: config.event_code.clone(),
            classifier,
            engine,
            poller: ManagedPoller::new(format!("gallery:{}", config.event_code), flags),
            autoplay,
            autoplay_on_start: config.autoplay,
            poll_interval: Duration::from_millis(config.poll_ms),
            event_bus: None,
        }
    }

    /// Override the poll cadence (the tile viewer polls on its own setting)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.poller.set_event_bus(Arc::clone(&event_bus));
        self.event_bus = Some(event_bus);
        self
    }

    pub fn engine(&self) -> &Arc<GalleryEngine> {
        &self.engine
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn flags(&self) -> &PollerFlags {
        self.poller.flags()
    }

    pub fn poller_stats(&self) -> PollerStats {
        self.poller.stats()
    }

    /// Start polling and, if configured, autoplay
    pub fn start(&self) -> Result<()> {
        info!(
            "Starting gallery sync for event '{}' every {:?}",
            self.event_code, self.poll_interval
        );

        let api = self.api.clone();
        let event_code = self.event_code.clone();
        let classifier = self.classifier.clone();
        let engine = Arc::clone(&self.engine);
        let event_bus = self.event_bus.clone();

        let operation = poll_operation(move |ticket| {
            let api = api.clone();
            let event_code = event_code.clone();
            let classifier = classifier.clone();
            let engine = Arc::clone(&engine);
            let event_bus = event_bus.clone();
            async move {
                let records = api.gallery_by_event(&event_code, &ticket.token).await?;
                if !ticket.is_current() {
                    debug!("Discarding stale gallery response (generation {})", ticket.generation);
                    return Ok(());
                }
                apply(&classifier, &engine, &event_code, event_bus.as_deref(), &records);
                Ok(())
            }
        });

        self.poller.start(self.poll_interval, operation)?;
        self.autoplay.set_enabled(self.autoplay_on_start);
        Ok(())
    }

    /// One fetch outside the timer; returns whether the sequence changed.
    ///
    /// The fetch shares the poller's generations: whichever of it and a tick
    /// was issued last is the one applied.
    pub async fn refresh(&self, token: &CancellationToken) -> Result<bool> {
        let ticket = self.poller.ticket();
        let records = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(BoothError::Cancelled),
            records = self.api.gallery_by_event(&self.event_code, &ticket.token) => records?,
        };
        if !ticket.is_current() {
            debug!("Discarding stale refresh (generation {})", ticket.generation);
            return Ok(false);
        }
        Ok(apply(
            &self.classifier,
            &self.engine,
            &self.event_code,
            self.event_bus.as_deref(),
            &records,
        ))
    }

    pub fn next(&self) -> usize {
        self.engine.step(Direction::Forward)
    }

    pub fn previous(&self) -> usize {
        self.engine.step(Direction::Backward)
    }

    pub fn set_autoplay(&self, enabled: bool) {
        self.autoplay.set_enabled(enabled);
    }

    pub fn toggle_autoplay(&self) -> bool {
        self.autoplay.toggle()
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay.is_enabled()
    }

    pub fn set_autoplay_period(&self, period: Duration) {
        self.autoplay.set_period(period);
    }

    pub fn stop(&self) {
        self.autoplay.set_enabled(false);
        self.poller.stop();
    }
}

impl Drop for GallerySync {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply(
    classifier: &Classifier,
    engine: &GalleryEngine,
    event_code: &str,
    event_bus: Option<&EventBus>,
    records: &[super::types::MediaRecord],
) -> bool {
    let items = classifier.classify(records);
    let count = items.len();
    let changed = engine.apply_batch(items);

    if changed {
        if let Some(bus) = event_bus {
            let _ = bus.publish(BoothEvent::MediaUpdated {
                event_code: event_code.to_string(),
                count,
                timestamp: SystemTime::now(),
            });
        }
    }

    changed
}
