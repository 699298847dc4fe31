use super::{BoothApp, ComponentState};
use crate::error::{BoothError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl BoothApp {
    /// Stop every component and return the process exit code
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // Reverse dependency order: input first, backend-facing flows last
        if self.keyboard_handler.is_some() {
            if let Err(e) = self.stop_component("keyboard").await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        for component in ["gallery", "pipeline", "kiosk"] {
            if self.get_component_state(component).is_none() {
                continue;
            }
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        match serde_json::to_string(&self.status_report()) {
            Ok(report) => info!("Final status: {}", report),
            Err(e) => error!("Could not encode final status: {}", e),
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping);

        match component {
            "keyboard" => match &self.keyboard_handler {
                Some(handler) => {
                    self.stop_within(component, Duration::from_secs(2), handler.stop())
                        .await
                }
                None => self.stopped(component),
            },
            "gallery" => {
                if let Some(gallery) = &self.gallery {
                    gallery.stop();
                }
                self.stopped(component)
            }
            "pipeline" => {
                if let Some(pipeline) = &self.pipeline {
                    pipeline.cancel();
                    let side_effects = async {
                        pipeline.wait_side_effects().await;
                        Ok(())
                    };
                    self.stop_within(component, Duration::from_secs(5), side_effects)
                        .await?;
                    pipeline.close();
                }
                self.stopped(component)
            }
            "kiosk" => match &self.kiosk {
                Some(kiosk) => {
                    // The app token is already cancelled; ending the session needs its own
                    let token = CancellationToken::new();
                    self.stop_within(component, Duration::from_secs(5), kiosk.end(&token))
                        .await
                }
                None => self.stopped(component),
            },
            _ => self.stopped(component),
        }
    }

    async fn stop_within<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match timeout(limit, stop).await {
            Ok(Ok(())) => self.stopped(component),
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed);
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed);
                error!("{} component stop timeout", component);
                Err(BoothError::system(format!("{} component stop timeout", component)))
            }
        }
    }

    fn stopped(&self, component: &str) -> Result<()> {
        self.set_component_state(component, ComponentState::Stopped);
        info!("{} component stopped", component);
        Ok(())
    }
}
