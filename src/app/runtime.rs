use super::orchestrator::request_shutdown;
use super::{BoothApp, ShutdownReason};
use crate::error::{BoothError, EventBusError, Result};
use crate::events::{BoothEvent, EventFilter, EventReceiver};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

impl BoothApp {
    /// Run until a signal, a quit request or the mode's own completion
    pub async fn run(&mut self) -> Result<i32> {
        info!("boothsync is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| BoothError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();
        self.listen_for_shutdown_requests();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| BoothError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let mut exit_code = self.shutdown().await?;
        if matches!(shutdown_reason, ShutdownReason::Error(_)) {
            exit_code = 1;
        }

        info!("boothsync shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&self.shutdown_sender);
            self.tasks.lock().push(tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    request_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }));
        }

        let sender = Arc::clone(&self.shutdown_sender);
        self.tasks.lock().push(tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                request_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string()));
            }
        }));
    }

    /// Turn `ShutdownRequested` events (the quit key) into a shutdown
    fn listen_for_shutdown_requests(&self) {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown".to_string(),
        );
        let sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.clone();

        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };
                match event {
                    Ok(BoothEvent::ShutdownRequested { reason, .. }) => {
                        info!("Shutdown requested: {}", reason);
                        request_shutdown(&sender, ShutdownReason::UserRequest);
                        break;
                    }
                    Ok(_) => {}
                    Err(EventBusError::ChannelClosed) => break,
                    Err(e) => warn!("Shutdown listener: {}", e),
                }
            }
        }));
    }
}
