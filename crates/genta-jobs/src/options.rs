use std::time::Duration;

use crate::task::QueueName;

/// Per-task enqueue options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnqueueOptions {
    pub max_retry: u32,
    pub queue: QueueName,
    /// Wall-clock budget for one execution.
    pub timeout: Duration,
    /// How long a finished task stays queryable.
    pub retention: Duration,
    pub process_in: Option<Duration>,
}

impl EnqueueOptions {
    /// Options used for feedback generation tasks.
    pub const FEEDBACK: Self = Self {
        max_retry: 3,
        queue: QueueName::Default,
        timeout: Duration::from_secs(60),
        retention: Duration::from_secs(24 * 60 * 60),
        process_in: None,
    };

    #[must_use]
    pub fn with_queue(mut self, queue: QueueName) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Delay dispatch; the task is reported as queued until then.
    #[must_use]
    pub fn with_process_in(mut self, delay: Duration) -> Self {
        self.process_in = Some(delay);
        self
    }
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self::FEEDBACK
    }
}
