mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::BoothApp;
pub use state::StatusReport;
pub use types::{ComponentState, RunMode, ShutdownReason};
