//! # Task Scheduling
//!
//! The driver and the applications on top of it need two services from the
//! platform: periodic tasks and one-shot delayed tasks. Both are expressed as
//! traits so an embedded port can map them onto its own scheduler;
//! [`TokioScheduler`] provides them on a tokio runtime.
//!
//! Registration happens from the cooperative context only.

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Work run repeatedly by a [`Scheduler`].
pub type RecurringTask = Box<dyn FnMut() + Send + 'static>;

/// Work run once by a [`Timer`].
pub type DelayedTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    #[error("Recurring task '{0}' needs a non-zero period")]
    ZeroPeriod(String),

    #[error("Task '{0}' is already registered")]
    Duplicate(String),

    #[error("No tokio runtime available")]
    NoRuntime,
}

/// Periodic task registration.
pub trait Scheduler {
    /// Run `task` every `period`, first after one period.
    fn register_recurring_task(
        &self,
        name: &str,
        period: Duration,
        task: RecurringTask,
    ) -> Result<TaskId, SchedError>;

    /// Stop a task. Returns false if it was unknown or already finished.
    fn cancel(&self, id: TaskId) -> bool;
}

/// One-shot delayed execution.
pub trait Timer {
    fn post_delayed(&self, task: DelayedTask, delay: Duration) -> TaskId;
}

struct Entry {
    name: String,
    join: JoinHandle<()>,
}

/// [`Scheduler`] and [`Timer`] on top of a tokio runtime.
///
/// Tasks are aborted when the scheduler is dropped.
pub struct TokioScheduler {
    handle: Handle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, Entry>>,
}

impl TokioScheduler {
    /// Use the runtime of the calling context.
    pub fn new() -> Result<Self, SchedError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|_| SchedError::NoRuntime)
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tasks that are still scheduled.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, entry| !entry.join.is_finished());
        tasks.len()
    }

    fn insert(&self, name: &str, join: JoinHandle<()>) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, entry| !entry.join.is_finished());
        tasks.insert(
            id,
            Entry {
                name: name.to_string(),
                join,
            },
        );
        id
    }
}

impl Scheduler for TokioScheduler {
    fn register_recurring_task(
        &self,
        name: &str,
        period: Duration,
        mut task: RecurringTask,
    ) -> Result<TaskId, SchedError> {
        if period.is_zero() {
            return Err(SchedError::ZeroPeriod(name.to_string()));
        }
        {
            let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            if tasks
                .values()
                .any(|entry| entry.name == name && !entry.join.is_finished())
            {
                return Err(SchedError::Duplicate(name.to_string()));
            }
        }

        let join = self.handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        debug!("Registered recurring task '{name}' every {period:?}");
        Ok(self.insert(name, join))
    }

    fn cancel(&self, id: TaskId) -> bool {
        let entry = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        match entry {
            Some(entry) if !entry.join.is_finished() => {
                entry.join.abort();
                debug!("Cancelled task '{}'", entry.name);
                true
            }
            Some(_) | None => false,
        }
    }
}

impl Timer for TokioScheduler {
    fn post_delayed(&self, task: DelayedTask, delay: Duration) -> TaskId {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        self.insert("delayed", join)
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        let pending = tasks.len();
        for (_, entry) in tasks.drain() {
            entry.join.abort();
        }
        if pending > 0 {
            debug!("Scheduler dropped with {pending} tasks");
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recurring_task_runs_until_cancelled() {
        let scheduler = TokioScheduler::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let id = scheduler
            .register_recurring_task(
                "count",
                Duration::from_millis(10),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(scheduler.cancel(id));

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "only {seen} runs");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
        assert!(!scheduler.cancel(id));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_tasks() {
        let scheduler = TokioScheduler::new().unwrap();
        assert_eq!(
            scheduler.register_recurring_task("zero", Duration::ZERO, Box::new(|| {})),
            Err(SchedError::ZeroPeriod("zero".into()))
        );

        scheduler
            .register_recurring_task("poll", Duration::from_secs(1), Box::new(|| {}))
            .unwrap();
        assert_eq!(
            scheduler.register_recurring_task("poll", Duration::from_secs(1), Box::new(|| {})),
            Err(SchedError::Duplicate("poll".into()))
        );
        assert_eq!(scheduler.active_tasks(), 1);
    }

    #[tokio::test]
    async fn test_post_delayed_runs_once() {
        let scheduler = TokioScheduler::new().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        scheduler.post_delayed(
            Box::new(move || {
                let _ = tx.send(42u8);
            }),
            Duration::from_millis(5),
        );
        let value = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("delayed task did not run")
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_new_without_runtime() {
        assert_eq!(TokioScheduler::new().unwrap_err(), SchedError::NoRuntime);
    }
}
