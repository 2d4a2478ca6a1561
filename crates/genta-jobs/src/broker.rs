//! Broker abstraction and the in-memory broker.
//!
//! A broker owns task storage and state transitions. Retry policy lives in
//! the worker pool: the broker only applies the transition it is told to.
//!
//! Claimed tasks hold no lease. A task whose outcome is never recorded stays
//! `Active` and is not handed out again, so the pool archives a task whose
//! `ack` fails.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::task::{NewTask, QueueName, TaskInfo, TaskState};

#[async_trait]
pub trait Broker: Send + Sync {
    /// Store a new task and return its snapshot.
    async fn enqueue(&self, task: NewTask) -> Result<TaskInfo, QueueError>;

    /// Claim the oldest ready task in `queue`, moving it to `Active`.
    async fn dequeue(&self, queue: QueueName) -> Result<Option<TaskInfo>, QueueError>;

    /// Mark an active task completed.
    async fn ack(&self, id: &str) -> Result<(), QueueError>;

    /// Record a failure. `Some(delay)` schedules another attempt and bumps the
    /// retry counter; `None` archives the task. Returns the new state.
    async fn retry(
        &self,
        id: &str,
        error: &str,
        delay: Option<Duration>,
    ) -> Result<TaskState, QueueError>;

    /// Look up a task in one queue. Expired tasks are `NotFound`.
    async fn inspect(&self, queue: QueueName, id: &str) -> Result<TaskInfo, QueueError>;

    /// Reclaim tasks whose retention window has elapsed. Returns how many
    /// were dropped. Brokers that expire tasks on their own keep the default.
    async fn prune(&self) -> Result<usize, QueueError> {
        Ok(0)
    }
}

struct Entry {
    info: TaskInfo,
    ready_at: Instant,
    finished_at: Option<Instant>,
}

impl Entry {
    fn is_ready(&self, now: Instant) -> bool {
        matches!(
            self.info.state,
            TaskState::Pending | TaskState::Scheduled | TaskState::Retry
        ) && self.ready_at <= now
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.finished_at
            .is_some_and(|at| now >= at + self.info.retention)
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Entry>,
    /// Task ids per queue in enqueue order.
    queues: HashMap<QueueName, VecDeque<String>>,
}

/// Process-local broker. Tasks are lost when the process exits.
#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, QueueError> {
        self.inner
            .lock()
            .map_err(|_| QueueError::Broker("memory broker lock poisoned".into()))
    }

    /// Number of tasks in `queue` that are not yet finished.
    pub fn backlog(&self, queue: QueueName) -> Result<usize, QueueError> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .values()
            .filter(|e| e.info.queue == queue && !e.info.state.is_terminal())
            .count())
    }

    fn entry_mut<'a>(inner: &'a mut Inner, id: &str) -> Result<&'a mut Entry, QueueError> {
        inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, task: NewTask) -> Result<TaskInfo, QueueError> {
        let now = Instant::now();
        let (state, ready_at) = match task.process_in {
            Some(delay) if !delay.is_zero() => (TaskState::Scheduled, now + delay),
            _ => (TaskState::Pending, now),
        };
        let info = TaskInfo {
            id: Uuid::new_v4().to_string(),
            task_type: task.task_type,
            payload: task.payload,
            queue: task.queue,
            state,
            retry_count: 0,
            max_retry: task.max_retry,
            timeout: task.timeout,
            retention: task.retention,
            last_error: None,
            enqueued_at: Utc::now(),
            completed_at: None,
        };

        let mut inner = self.lock()?;
        inner
            .queues
            .entry(info.queue)
            .or_default()
            .push_back(info.id.clone());
        inner.tasks.insert(
            info.id.clone(),
            Entry {
                info: info.clone(),
                ready_at,
                finished_at: None,
            },
        );
        Ok(info)
    }

    async fn dequeue(&self, queue: QueueName) -> Result<Option<TaskInfo>, QueueError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(ids) = inner.queues.get(&queue) else {
            return Ok(None);
        };
        let ready = ids
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|e| e.is_ready(now))
            .min_by_key(|e| e.ready_at)
            .map(|e| e.info.id.clone());

        let Some(id) = ready else {
            return Ok(None);
        };
        let entry = Self::entry_mut(inner, &id)?;
        entry.info.state = TaskState::Active;
        Ok(Some(entry.info.clone()))
    }

    async fn ack(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        let entry = Self::entry_mut(&mut inner, id)?;
        entry.info.state = TaskState::Completed;
        entry.info.completed_at = Some(Utc::now());
        entry.finished_at = Some(Instant::now());
        Ok(())
    }

    async fn retry(
        &self,
        id: &str,
        error: &str,
        delay: Option<Duration>,
    ) -> Result<TaskState, QueueError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let entry = Self::entry_mut(&mut inner, id)?;
        entry.info.last_error = Some(error.to_string());

        match delay {
            Some(delay) => {
                entry.info.state = TaskState::Retry;
                entry.info.retry_count += 1;
                entry.ready_at = now + delay;
            }
            None => {
                entry.info.state = TaskState::Archived;
                entry.info.completed_at = Some(Utc::now());
                entry.finished_at = Some(now);
            }
        }
        Ok(entry.info.state)
    }

    async fn inspect(&self, queue: QueueName, id: &str) -> Result<TaskInfo, QueueError> {
        let now = Instant::now();
        let inner = self.lock()?;
        inner
            .tasks
            .get(id)
            .filter(|e| e.info.queue == queue && !e.is_expired(now))
            .map(|e| e.info.clone())
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    async fn prune(&self) -> Result<usize, QueueError> {
        let now = Instant::now();
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let expired: Vec<String> = inner
            .tasks
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = inner.tasks.remove(id) {
                if let Some(ids) = inner.queues.get_mut(&entry.info.queue) {
                    ids.retain(|queued| queued != id);
                }
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "pruned expired tasks");
        }
        Ok(expired.len())
    }
}
