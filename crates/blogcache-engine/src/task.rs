//! Cancellable background tasks.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, warn};

/// Handle for controlling a spawned task.
///
/// Cancellation is cooperative: a deferred task that has not started yet
/// never runs, a periodic task stops before its next tick. Dropping the
/// handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    /// Sender to signal cancellation.
    cancel_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signals the task to stop.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// True once the task body has returned.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task to exit without cancelling it.
    pub async fn wait(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `work` once after `delay` unless cancelled first.
///
/// Returns `None` when called outside a Tokio runtime.
pub fn spawn_deferred<F, Fut>(name: &str, delay: Duration, work: F) -> Option<TaskHandle>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let runtime = runtime_for(name)?;
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let task_name = name.to_string();

    let join = runtime.spawn(async move {
        tokio::select! {
            _ = sleep(delay) => work().await,
            _ = cancel_rx.changed() => {
                debug!(task = %task_name, "Deferred task cancelled before start");
            }
        }
    });

    Some(TaskHandle {
        name: name.to_string(),
        cancel_tx,
        join: Some(join),
    })
}

/// Runs `work` every `period`, first after one full period.
///
/// Returns `None` when called outside a Tokio runtime.
pub fn spawn_periodic<F, Fut>(name: &str, period: Duration, mut work: F) -> Option<TaskHandle>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let runtime = runtime_for(name)?;
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let task_name = name.to_string();

    let join = runtime.spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = %task_name, ?period, "Periodic task started");

        loop {
            tokio::select! {
                _ = timer.tick() => work().await,
                result = cancel_rx.changed() => {
                    if result.is_err() || *cancel_rx.borrow() {
                        debug!(task = %task_name, "Periodic task stopped");
                        break;
                    }
                }
            }
        }
    });

    Some(TaskHandle {
        name: name.to_string(),
        cancel_tx,
        join: Some(join),
    })
}

fn runtime_for(name: &str) -> Option<Handle> {
    match Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            warn!(task = %name, "No Tokio runtime, task not scheduled");
            None
        },
    }
}

/// A collection of task handles owned by one component.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Mutex<Vec<TaskHandle>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a handle, dropping finished ones.
    pub fn push(&self, handle: Option<TaskHandle>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        if let Some(handle) = handle {
            tasks.push(handle);
        }
    }

    /// Number of tasks still running or waiting.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Cancels and forgets every task. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        let tasks: Vec<TaskHandle> = std::mem::take(&mut *self.tasks.lock());
        let pending = tasks.iter().filter(|task| !task.is_finished()).count();
        for task in &tasks {
            task.cancel();
        }
        pending
    }

    /// Waits for every task to exit. Used by tests and orderly shutdown.
    pub async fn wait_all(&self) {
        let tasks: Vec<TaskHandle> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.wait().await;
        }
    }
}
