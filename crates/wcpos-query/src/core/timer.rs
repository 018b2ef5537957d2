//! Cancellable timers on the tokio runtime
//!
//! A [`TimerHandle`] owns the spawned task and aborts it on `cancel` or drop,
//! so a timer never outlives the object that scheduled it.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::locks::lock;

#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `task` after `delay` on the current runtime.
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn schedule<F>(delay: Duration, task: F) -> Option<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().ok()?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        Some(Self { handle })
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Trailing-edge debouncer: each call replaces the pending action, and only
/// the last one runs once `delay` passes without another call.
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    pending: Mutex<Option<TimerHandle>>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action`, cancelling any pending one.
    ///
    /// Outside a tokio runtime the action runs immediately on the calling
    /// thread.
    pub fn call<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.cancel();
        }

        if Handle::try_current().is_err() {
            drop(pending);
            action();
            return;
        }

        *pending = TimerHandle::schedule(self.delay, async move { action() });
    }

    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}
