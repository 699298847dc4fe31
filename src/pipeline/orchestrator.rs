use super::promo::Recipient;
use super::run::{PipelineResult, PipelineRun};
use super::steps::{PipelineCapabilities, StepKey, StepPlan, StepState};
use crate::api::BoothApi;
use crate::config::PipelineConfig;
use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a call to [`PipelineOrchestrator::run`] ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(PipelineResult),
    Failed { step: StepKey, message: String },
    /// Abandoned by `cancel`, `close` or a newer run
    Cancelled,
    /// Nothing to do: not open, or already running
    Skipped,
}

#[derive(Default)]
struct OrchestratorState {
    run: Option<PipelineRun>,
    token: Option<CancellationToken>,
    generation: u64,
    recipient: Option<Recipient>,
}

/// Values produced by one step and consumed by a later one
#[derive(Default)]
struct StepContext {
    qrcode: Option<String>,
    result_url: Option<String>,
}

impl StepContext {
    fn qrcode(&self) -> Result<&str> {
        self.qrcode
            .as_deref()
            .ok_or_else(|| BoothError::system("no code has been generated for this run"))
    }
}

/// Drives the capture/process chain one step at a time
pub struct PipelineOrchestrator {
    api: BoothApi,
    config: PipelineConfig,
    plan: StepPlan,
    event_bus: Option<Arc<EventBus>>,
    state: Arc<Mutex<OrchestratorState>>,
    side_effects: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineOrchestrator {
    pub fn new(api: BoothApi, config: PipelineConfig) -> Self {
        let plan = StepPlan::new(PipelineCapabilities::from_config(&config));
        Self {
            api,
            config,
            plan,
            event_bus: None,
            state: Arc::new(Mutex::new(OrchestratorState::default())),
            side_effects: Mutex::new(Vec::new()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    /// Start a fresh run, discarding whatever the previous one held
    pub fn open(&self) -> PipelineRun {
        let mut state = self.state.lock();
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.generation += 1;
        let run = PipelineRun::new(&self.plan);
        info!("Opened pipeline run {}", run.run_id);
        state.run = Some(run.clone());
        run
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().run.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .run
            .as_ref()
            .map(|run| run.running)
            .unwrap_or(false)
    }

    /// Snapshot of the open run
    pub fn snapshot(&self) -> Option<PipelineRun> {
        self.state.lock().run.clone()
    }

    /// Recipient linked to the generated code once the run completes
    pub fn select_recipient(&self, recipient: Option<Recipient>) {
        self.state.lock().recipient = recipient;
    }

    /// Abort the in-flight call; completed steps stay completed
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.token.take() {
            info!("Cancelling pipeline run");
            token.cancel();
        }
    }

    /// Close the run. The result is surfaced only when every step succeeded.
    pub fn close(&self) -> Option<PipelineResult> {
        let mut state = self.state.lock();
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.generation += 1;
        state.recipient = None;
        let result = state.run.take().and_then(|run| run.result());
        debug!("Closed pipeline run (result: {})", result.is_some());
        result
    }

    /// Execute the chain from the first live step.
    ///
    /// A rerun restarts every live step; there is no resume from the failed one.
    pub async fn run(&self) -> RunOutcome {
        let (token, generation, run_id, steps) = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(run) = state.run.as_mut() else {
                debug!("Pipeline run requested while closed");
                return RunOutcome::Skipped;
            };
            if run.running {
                debug!("Pipeline run {} already running", run.run_id);
                return RunOutcome::Skipped;
            }

            if let Some(previous) = state.token.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            state.generation += 1;

            run.reset(&self.plan);
            run.running = true;
            let steps: Vec<StepKey> = self.plan.live_steps().collect();
            (token, state.generation, run.run_id.clone(), steps)
        };

        info!("Running pipeline {} ({} live steps)", run_id, steps.len());
        let mut context = StepContext::default();

        for step in steps {
            if !self.transition(generation, step, StepState::Running) {
                return RunOutcome::Cancelled;
            }

            match self.execute(step, &mut context, &token).await {
                Ok(()) => {
                    if !self.transition(generation, step, StepState::Success) {
                        return RunOutcome::Cancelled;
                    }
                }
                Err(e) if e.is_cancelled() => {
                    info!("Pipeline {} cancelled during {}", run_id, step);
                    self.abandon(generation, step);
                    return RunOutcome::Cancelled;
                }
                Err(e) => {
                    let message = e.user_message();
                    error!("Pipeline {} failed at {}: {}", run_id, step, e);
                    return self.fail(generation, &run_id, message);
                }
            }
        }

        self.complete(generation, &run_id, context)
    }

    async fn execute(
        &self,
        step: StepKey,
        context: &mut StepContext,
        token: &CancellationToken,
    ) -> Result<()> {
        let config = &self.config;
        match step {
            StepKey::Clear => self.api.clear_path(&config.work_path, token).await,
            StepKey::MakeInput => self.api.make_input(token).await,
            StepKey::GenerateCode => {
                let code = self
                    .api
                    .generate_qrcode(&config.event_code, &config.station_code, token)
                    .await?;
                debug!("Generated code {}", code);
                context.qrcode = Some(code);
                Ok(())
            }
            StepKey::Render => {
                self.api
                    .render(&config.render_template, context.qrcode()?, token)
                    .await
            }
            StepKey::DrawText => {
                let code = context.qrcode()?;
                self.api.draw_text(code, code, token).await
            }
            StepKey::PreUpload => {
                self.api
                    .pre_upload(context.qrcode()?, &config.event_code, token)
                    .await
            }
            StepKey::Upload => {
                let url = self
                    .api
                    .upload(
                        context.qrcode()?,
                        &config.event_code,
                        &config.station_code,
                        token,
                    )
                    .await?;
                context.result_url = url;
                Ok(())
            }
            StepKey::PrinterPrepare => self.api.pre_print(context.qrcode()?, token).await,
            StepKey::PrinterPrint => {
                self.api
                    .print(&config.printer_name, config.print_copies, token)
                    .await
            }
            StepKey::Cleanup => self.api.clear_all_capture(token).await,
        }
    }

    /// Apply a step transition if the run is still current
    fn transition(&self, generation: u64, step: StepKey, to: StepState) -> bool {
        let run_id = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return false;
            }
            let Some(run) = state.run.as_mut() else {
                return false;
            };
            run.set_state(step, to);
            run.run_id.clone()
        };

        debug!("Step {} -> {}", step, to);
        self.emit(BoothEvent::StepChanged {
            run_id,
            step,
            state: to,
        });
        true
    }

    fn abandon(&self, generation: u64, step: StepKey) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        if let Some(run) = state.run.as_mut() {
            run.set_state(step, StepState::Idle);
            run.running = false;
        }
    }

    fn fail(&self, generation: u64, run_id: &str, message: String) -> RunOutcome {
        let failed = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return RunOutcome::Cancelled;
            }
            match state.run.as_mut() {
                Some(run) => run.fail(message.clone()),
                None => return RunOutcome::Cancelled,
            }
        };

        let Some(step) = failed else {
            return RunOutcome::Cancelled;
        };

        self.emit(BoothEvent::PipelineFailed {
            run_id: run_id.to_string(),
            step,
            message: message.clone(),
        });
        RunOutcome::Failed { step, message }
    }

    fn complete(&self, generation: u64, run_id: &str, context: StepContext) -> RunOutcome {
        let (result, recipient) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return RunOutcome::Cancelled;
            }
            state.token = None;
            let recipient = state.recipient.clone();
            let Some(run) = state.run.as_mut() else {
                return RunOutcome::Cancelled;
            };
            run.running = false;
            run.qrcode = context.qrcode;
            run.result_url = context.result_url;
            (run.result(), recipient)
        };

        let Some(result) = result else {
            warn!("Pipeline {} finished without a code", run_id);
            return RunOutcome::Failed {
                step: StepKey::GenerateCode,
                message: BoothError::system("no code was generated").user_message(),
            };
        };

        info!("Pipeline {} completed with code {}", run_id, result.qrcode);
        self.emit(BoothEvent::PipelineCompleted {
            run_id: run_id.to_string(),
            qrcode: Some(result.qrcode.clone()),
            result_url: result.result_url.clone(),
        });

        if self.plan.capabilities().promo_enabled {
            if let Some(recipient) = recipient {
                self.spawn_link(generation, result.clone(), recipient);
            }
        }

        RunOutcome::Completed(result)
    }

    /// Best-effort: a failure is reported on the run but never fails it
    fn spawn_link(&self, generation: u64, result: PipelineResult, recipient: Recipient) {
        let api = self.api.clone();
        let state = Arc::clone(&self.state);
        let event_bus = self.event_bus.clone();

        let handle = tokio::spawn(async move {
            let token = CancellationToken::new();
            let outcome = api
                .link_promotion_code(&result.qrcode, &recipient.id, &token)
                .await;

            match outcome {
                Ok(()) => info!("Linked code {} to {}", result.qrcode, recipient.id),
                Err(e) => {
                    let message = format!("Promotion code was not linked: {}", e.user_message());
                    warn!("{}", message);
                    {
                        let mut state = state.lock();
                        if state.generation == generation {
                            if let Some(run) = state.run.as_mut() {
                                run.append_error(&message);
                            }
                        }
                    }
                    if let Some(bus) = event_bus {
                        let _ = bus.publish(BoothEvent::SideEffectFailed {
                            run_id: result.run_id.clone(),
                            message,
                        });
                    }
                }
            }
        });

        let mut side_effects = self.side_effects.lock();
        side_effects.retain(|pending| !pending.is_finished());
        side_effects.push(handle);
    }

    /// Side effects started and not yet finished or awaited
    pub fn pending_side_effects(&self) -> usize {
        self.side_effects
            .lock()
            .iter()
            .filter(|pending| !pending.is_finished())
            .count()
    }

    pub(crate) fn tracked_side_effects(&self) -> usize {
        self.side_effects.lock().len()
    }

    /// Wait for every best-effort side effect started so far
    pub async fn wait_side_effects(&self) {
        let handles: Vec<_> = self.side_effects.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn emit(&self, event: BoothEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.publish(event);
        }
    }
}
