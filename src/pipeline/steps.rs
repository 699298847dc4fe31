use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named step of the capture/process chain, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Clear,
    MakeInput,
    GenerateCode,
    Render,
    DrawText,
    PreUpload,
    Upload,
    PrinterPrepare,
    PrinterPrint,
    Cleanup,
}

impl StepKey {
    pub const ALL: [StepKey; 10] = [
        StepKey::Clear,
        StepKey::MakeInput,
        StepKey::GenerateCode,
        StepKey::Render,
        StepKey::DrawText,
        StepKey::PreUpload,
        StepKey::Upload,
        StepKey::PrinterPrepare,
        StepKey::PrinterPrint,
        StepKey::Cleanup,
    ];

    pub fn is_printer(&self) -> bool {
        matches!(self, StepKey::PrinterPrepare | StepKey::PrinterPrint)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepKey::Clear => "Clearing workspace",
            StepKey::MakeInput => "Staging capture",
            StepKey::GenerateCode => "Generating code",
            StepKey::Render => "Rendering",
            StepKey::DrawText => "Drawing code",
            StepKey::PreUpload => "Preparing upload",
            StepKey::Upload => "Uploading",
            StepKey::PrinterPrepare => "Preparing printer",
            StepKey::PrinterPrint => "Printing",
            StepKey::Cleanup => "Cleaning up",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKey::Clear => "clear",
            StepKey::MakeInput => "make_input",
            StepKey::GenerateCode => "generate_code",
            StepKey::Render => "render",
            StepKey::DrawText => "draw_text",
            StepKey::PreUpload => "pre_upload",
            StepKey::Upload => "upload",
            StepKey::PrinterPrepare => "printer_prepare",
            StepKey::PrinterPrint => "printer_print",
            StepKey::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Idle => "idle",
            StepState::Running => "running",
            StepState::Success => "success",
            StepState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Feature switches resolved once when the orchestrator is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineCapabilities {
    pub print_enabled: bool,
    pub promo_enabled: bool,
}

impl PipelineCapabilities {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            print_enabled: config.print_enabled,
            promo_enabled: config.promo_enabled,
        }
    }

    pub fn is_live(&self, step: StepKey) -> bool {
        !step.is_printer() || self.print_enabled
    }
}

/// Concrete ordered step list with each step's starting state
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    capabilities: PipelineCapabilities,
    steps: Vec<(StepKey, StepState)>,
}

impl StepPlan {
    /// Disabled steps start as `Success` so they never run
    pub fn new(capabilities: PipelineCapabilities) -> Self {
        let steps = StepKey::ALL
            .iter()
            .map(|&step| {
                let state = if capabilities.is_live(step) {
                    StepState::Idle
                } else {
                    StepState::Success
                };
                (step, state)
            })
            .collect();

        Self {
            capabilities,
            steps,
        }
    }

    pub fn capabilities(&self) -> PipelineCapabilities {
        self.capabilities
    }

    pub fn steps(&self) -> &[(StepKey, StepState)] {
        &self.steps
    }

    pub fn live_steps(&self) -> impl Iterator<Item = StepKey> + '_ {
        self.steps
            .iter()
            .filter(|(_, state)| *state != StepState::Success)
            .map(|(step, _)| *step)
    }
}
