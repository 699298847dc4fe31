use super::steps::{StepKey, StepPlan, StepState};
use serde::Serialize;
use uuid::Uuid;

/// What a completed run hands back to its caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub qrcode: String,
    pub result_url: Option<String>,
}

/// One execution of the capture/process chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub run_id: String,
    steps: Vec<(StepKey, StepState)>,
    pub error_message: Option<String>,
    pub running: bool,
    pub qrcode: Option<String>,
    pub result_url: Option<String>,
}

impl PipelineRun {
    pub fn new(plan: &StepPlan) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            steps: plan.steps().to_vec(),
            error_message: None,
            running: false,
            qrcode: None,
            result_url: None,
        }
    }

    pub fn steps(&self) -> &[(StepKey, StepState)] {
        &self.steps
    }

    pub fn state(&self, step: StepKey) -> StepState {
        self.steps
            .iter()
            .find(|(key, _)| *key == step)
            .map(|(_, state)| *state)
            .unwrap_or_default()
    }

    pub(crate) fn set_state(&mut self, step: StepKey, state: StepState) {
        if let Some(entry) = self.steps.iter_mut().find(|(key, _)| *key == step) {
            entry.1 = state;
        }
    }

    /// Every step, pre-seeded ones included, reached `Success`
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|(_, state)| *state == StepState::Success)
    }

    pub fn running_step(&self) -> Option<StepKey> {
        self.steps
            .iter()
            .find(|(_, state)| *state == StepState::Running)
            .map(|(key, _)| *key)
    }

    pub fn failed_step(&self) -> Option<StepKey> {
        self.steps
            .iter()
            .find(|(_, state)| *state == StepState::Error)
            .map(|(key, _)| *key)
    }

    /// Mark the first step that has not succeeded as failed
    pub(crate) fn fail(&mut self, message: String) -> Option<StepKey> {
        let failed = self
            .steps
            .iter_mut()
            .find(|(_, state)| *state != StepState::Success)
            .map(|entry| {
                entry.1 = StepState::Error;
                entry.0
            });
        self.error_message = Some(message);
        self.running = false;
        failed
    }

    /// Put live steps back to `Idle` for a fresh attempt; pre-seeded steps stay done
    pub(crate) fn reset(&mut self, plan: &StepPlan) {
        self.steps = plan.steps().to_vec();
        self.error_message = None;
        self.qrcode = None;
        self.result_url = None;
    }

    /// Append a best-effort failure without touching step states
    pub(crate) fn append_error(&mut self, message: &str) {
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, message),
            None => message.to_string(),
        });
    }

    pub fn result(&self) -> Option<PipelineResult> {
        if !self.is_complete() {
            return None;
        }
        self.qrcode.as_ref().map(|qrcode| PipelineResult {
            run_id: self.run_id.clone(),
            qrcode: qrcode.clone(),
            result_url: self.result_url.clone(),
        })
    }
}
