//! Task, queue, and lifecycle types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Priority queues known to the broker, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Critical,
    Default,
    Low,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Critical, QueueName::Default, QueueName::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Critical => "critical",
            QueueName::Default => "default",
            QueueName::Low => "low",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| QueueError::UnknownQueue(s.to_string()))
    }
}

/// Broker-side lifecycle of a task.
///
/// ```text
/// Pending/Scheduled -> Active -> Completed
///                        |  \
///                        v   -> Archived   (permanent error or retries exhausted)
///                      Retry -> Active ...
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Ready to be dequeued.
    Pending,
    /// Waiting for a future dispatch time.
    Scheduled,
    /// Claimed by a worker.
    Active,
    /// Failed and waiting for its backoff to elapse.
    Retry,
    Completed,
    /// Terminal failure; `last_error` holds the final error.
    Archived,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Archived)
    }
}

/// A unit of work handed to a broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    pub payload: serde_json::Value,
    pub queue: QueueName,
    pub max_retry: u32,
    pub timeout: Duration,
    pub retention: Duration,
    /// Delay before the task becomes eligible for dequeue.
    #[serde(default)]
    pub process_in: Option<Duration>,
}

/// Snapshot of a task as tracked by a broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub queue: QueueName,
    pub state: TaskState,
    /// Number of retries already scheduled.
    pub retry_count: u32,
    pub max_retry: u32,
    pub timeout: Duration,
    pub retention: Duration,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Whether a failure of this task may be retried under the retry bound.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_parse() {
        assert_eq!("low".parse::<QueueName>().unwrap(), QueueName::Low);
        let err = "urgent".parse::<QueueName>().unwrap_err();
        assert!(matches!(err, QueueError::UnknownQueue(name) if name == "urgent"));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Archived.is_terminal());
        assert!(!TaskState::Retry.is_terminal());
        assert!(!TaskState::Scheduled.is_terminal());
    }
}
