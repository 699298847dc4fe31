mod context;
mod gate;
mod kiosk;
mod navigation;
mod watchdog;

pub use context::{FlowContext, FlowSnapshot, SessionHandle};
pub use gate::{SessionGate, SessionPhase};
pub use kiosk::KioskFlow;
pub use navigation::{EventNavigator, Navigator, RecordingNavigator, Route};
pub use watchdog::SessionWatchdog;
