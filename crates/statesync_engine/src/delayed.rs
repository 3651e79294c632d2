use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cancellable delayed action with schedule-or-replace semantics: scheduling
/// again drops the pending action and restarts the delay.
#[derive(Debug, Default)]
pub struct DelayedTask {
    pending: Option<JoinHandle<()>>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay` unless replaced or cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
