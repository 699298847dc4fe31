use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs only the last call made within the window
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace any pending call with `make(token)`, started after the window.
    ///
    /// The token is cancelled when a later call replaces this one, so a call
    /// that already started its request aborts it as well.
    pub fn call<F, Fut>(&self, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let window = self.window;
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }
            make(task_token).await;
        });

        if let Some((previous, previous_handle)) = self.pending.lock().replace((token, handle)) {
            debug!("Debounced call replaced");
            previous.cancel();
            if !previous_handle.is_finished() {
                previous_handle.abort();
            }
        }
    }

    /// Drop the pending call, if any
    pub fn cancel(&self) {
        if let Some((token, handle)) = self.pending.lock().take() {
            token.cancel();
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
