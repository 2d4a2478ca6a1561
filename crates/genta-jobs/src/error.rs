use thiserror::Error;

/// Errors raised by the job queue and its brokers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No task with this id is tracked by any queue, or its retention expired.
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("failed to serialize task payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// The backing store failed.
    #[error("broker error: {0}")]
    Broker(String),
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound(_))
    }
}
