use crate::error::Result;
use crate::events::{BoothEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Viewer control produced by a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    Next,
    Previous,
    ToggleAutoplay,
    Refresh,
    Quit,
}

/// Key bindings of the live viewer
pub fn command_for(code: KeyCode) -> Option<ViewerCommand> {
    match code {
        KeyCode::Right | KeyCode::Char('n') => Some(ViewerCommand::Next),
        KeyCode::Left | KeyCode::Char('p') => Some(ViewerCommand::Previous),
        KeyCode::Char(' ') => Some(ViewerCommand::ToggleAutoplay),
        KeyCode::Char('r') => Some(ViewerCommand::Refresh),
        KeyCode::Char('q') | KeyCode::Esc => Some(ViewerCommand::Quit),
        _ => None,
    }
}

/// Terminal key control for the live viewer
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    commands: mpsc::UnboundedSender<ViewerCommand>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ViewerCommand>>>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        Self {
            event_bus,
            commands,
            receiver: Mutex::new(Some(receiver)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Receiver of viewer commands; available once
    pub fn take_commands(&self) -> Option<mpsc::UnboundedReceiver<ViewerCommand>> {
        self.receiver.lock().take()
    }

    /// Route one command: quit goes to the event bus, the rest to the viewer
    pub fn dispatch(&self, command: ViewerCommand) {
        dispatch(&self.event_bus, &self.commands, command);
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input - arrows step, space toggles autoplay, q quits");

        let event_bus = Arc::clone(&self.event_bus);
        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match command_for(key_event.code) {
                            Some(command) => {
                                dispatch(&event_bus, &commands, command);
                                if command == ViewerCommand::Quit {
                                    break;
                                }
                            }
                            None => debug!("Unbound key: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input");
        self.cancellation_token.cancel();

        // Let the blocking task notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

fn dispatch(
    event_bus: &EventBus,
    commands: &mpsc::UnboundedSender<ViewerCommand>,
    command: ViewerCommand,
) {
    if command == ViewerCommand::Quit {
        info!("Quit key pressed - requesting shutdown");
        if let Err(e) = event_bus.publish(BoothEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "User requested via keyboard".to_string(),
        }) {
            warn!("Failed to publish shutdown event: {}", e);
        }
        return;
    }

    if commands.send(command).is_err() {
        debug!("No viewer listening for {:?}", command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(command_for(KeyCode::Right), Some(ViewerCommand::Next));
        assert_eq!(command_for(KeyCode::Left), Some(ViewerCommand::Previous));
        assert_eq!(
            command_for(KeyCode::Char(' ')),
            Some(ViewerCommand::ToggleAutoplay)
        );
        assert_eq!(command_for(KeyCode::Esc), Some(ViewerCommand::Quit));
        assert_eq!(command_for(KeyCode::Char('x')), None);
    }

    #[tokio::test]
    async fn test_quit_publishes_shutdown_request() {
        let event_bus = Arc::new(EventBus::new(8));
        let mut rx = event_bus.subscribe();
        let handler = KeyboardInputHandler::new(Arc::clone(&event_bus));
        let mut commands = handler.take_commands().unwrap();

        handler.dispatch(ViewerCommand::Quit);
        handler.dispatch(ViewerCommand::Next);

        assert!(matches!(
            rx.recv().await.unwrap(),
            BoothEvent::ShutdownRequested { .. }
        ));
        assert_eq!(commands.recv().await, Some(ViewerCommand::Next));
        assert!(handler.take_commands().is_none());
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(Arc::new(EventBus::new(8)));

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
