mod orchestrator;
mod promo;
mod run;
mod steps;
#[cfg(test)]
mod tests;

pub use orchestrator::{PipelineOrchestrator, RunOutcome};
pub use promo::{best_match, Recipient, RecipientSearch};
pub use run::{PipelineResult, PipelineRun};
pub use steps::{PipelineCapabilities, StepKey, StepPlan, StepState};
