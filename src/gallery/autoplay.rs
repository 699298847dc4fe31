use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

type TickHandler = Arc<dyn Fn() + Send + Sync>;

struct AutoplayState {
    period: Duration,
    enabled: bool,
    task: Option<JoinHandle<()>>,
}

/// Timer that advances the rotation cursor.
///
/// A new period restarts the timer from zero, so a change never fires an
/// extra advance.
pub struct Autoplay {
    state: Mutex<AutoplayState>,
    on_tick: TickHandler,
}

impl Autoplay {
    pub fn new<F>(period: Duration, on_tick: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(AutoplayState {
                period,
                enabled: false,
                task: None,
            }),
            on_tick: Arc::new(on_tick),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn period(&self) -> Duration {
        self.state.lock().period
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.enabled == enabled {
            return;
        }
        state.enabled = enabled;

        if enabled {
            state.task = Some(self.spawn(state.period));
            debug!("Autoplay on every {:?}", state.period);
        } else if let Some(task) = state.task.take() {
            task.abort();
            debug!("Autoplay off");
        }
    }

    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    pub fn set_period(&self, period: Duration) {
        let mut state = self.state.lock();
        if state.period == period || period.is_zero() {
            return;
        }
        state.period = period;

        if state.enabled {
            if let Some(task) = state.task.take() {
                task.abort();
            }
            state.task = Some(self.spawn(period));
            debug!("Autoplay restarted every {:?}", period);
        }
    }

    fn spawn(&self, period: Duration) -> JoinHandle<()> {
        let on_tick = Arc::clone(&self.on_tick);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                on_tick();
            }
        })
    }
}

impl Drop for Autoplay {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}
