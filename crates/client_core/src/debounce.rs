//! Trailing-edge debounce for retry actions.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

pub const DEFAULT_RETRY_QUIET: Duration = Duration::from_millis(650);

type ActionFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type BoxedAction = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

#[derive(Default)]
struct DebounceState {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Collapses bursts of [`DebouncedAction::call`] into one run of the action,
/// fired once `quiet` has passed since the last call.
///
/// Must be called from within a tokio runtime.
pub struct DebouncedAction {
    quiet: Duration,
    action: BoxedAction,
    state: Arc<Mutex<DebounceState>>,
    /// Count of completed runs.
    runs: Arc<watch::Sender<u64>>,
}

impl DebouncedAction {
    pub fn new<F, Fut>(quiet: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            quiet,
            action: Arc::new(move || -> ActionFuture { Box::pin(action()) }),
            state: Arc::new(Mutex::new(DebounceState::default())),
            runs: Arc::new(watch::Sender::new(0)),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Observes completed runs. Subscribe before [`Self::call`] to await the
    /// run it schedules with `changed()`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.runs.subscribe()
    }

    pub fn call(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let shared = Arc::clone(&self.state);
        let action = Arc::clone(&self.action);
        let runs = Arc::clone(&self.runs);
        let quiet = self.quiet;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation != generation {
                    return;
                }
                // From here on the run is committed; later calls schedule a new one.
                state.timer = None;
            }
            debug!(generation, "debounce: quiet window elapsed");
            action().await;
            runs.send_modify(|count| *count += 1);
        }));
    }

    /// Drops a scheduled run that has not started yet.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.timer.is_some()
    }
}

impl Drop for DebouncedAction {
    fn drop(&mut self) {
        self.cancel();
    }
}
