use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to a spawned background task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Runs `future` once `delay` has elapsed.
    pub fn after<F>(delay: Duration, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            future.await;
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Holds at most one pending task. Scheduling a new one supersedes the old.
#[derive(Debug, Default)]
pub struct TaskSlot {
    task: Mutex<Option<ScheduledTask>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any pending task with `task`.
    pub fn replace(&self, task: ScheduledTask) {
        *self.task.lock() = Some(task);
    }

    /// Starts a task via `start` unless one is still running.
    pub fn ensure_running(&self, start: impl FnOnce() -> ScheduledTask) -> bool {
        let mut slot = self.task.lock();
        match slot.as_ref() {
            Some(task) if !task.is_finished() => false,
            _ => {
                *slot = Some(start());
                true
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn cancel(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }
}
