use std::future::Future;

use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

/// Stop request observed by a running poll loop.
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolve once a stop was requested or the owning handle was dropped.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Whether a stop was already requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

/// Owner of a background poll loop.
///
/// [`PollHandle::stop`] asks the loop to finish and waits for it. Dropping the
/// handle aborts the task, so a loop never outlives the screen that owns it.
pub struct PollHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Spawn `body` on the runtime, handing it the stop signal.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(body(StopSignal { rx }));
        debug!(poll = name, "poll loop started");
        Self {
            name,
            stop,
            task: Some(task),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the loop already returned on its own.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request a stop and wait for the loop to return.
    pub async fn stop(mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(poll = self.name, "poll loop stopped");
    }

    /// Wait for the loop to finish on its own.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(poll = self.name, "poll loop aborted on drop");
        }
    }
}
