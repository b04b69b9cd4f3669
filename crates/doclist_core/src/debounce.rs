use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};

/// Coalesces bursts of input into a single delayed action.
///
/// Each `schedule` aborts the pending timer and starts a new one. When a
/// timer fires, its action is spawned as its own task, so a later
/// `schedule` never interrupts an action that is already running.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub async fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(action);
        });

        let previous = self.pending.lock().await.replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drops the pending action, if its timer has not fired yet.
    pub async fn cancel(&self) {
        if let Some(pending) = self.pending.lock().await.take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}
