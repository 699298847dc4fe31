pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod keyboard_input;
pub mod pipeline;
pub mod poller;
pub mod session;
pub mod settings;

pub use api::{BoothApi, HttpTransport, MockTransport, Transport};
pub use app::{BoothApp, ComponentState, RunMode, ShutdownReason, StatusReport};
pub use config::BoothConfig;
pub use error::{BoothError, Result};
pub use events::{BoothEvent, EventBus, EventFilter, EventReceiver};
pub use gallery::{GalleryEngine, GallerySync, MediaItem, MediaKind};
pub use keyboard_input::{KeyboardInputHandler, ViewerCommand};
pub use pipeline::{PipelineOrchestrator, PipelineResult, RunOutcome, StepKey, StepState};
pub use poller::{Debouncer, ManagedPoller, PollerFlags, PollerStats};
pub use session::{KioskFlow, SessionGate, SessionPhase, SessionWatchdog};
pub use settings::{SettingsStore, ViewerSettings};
