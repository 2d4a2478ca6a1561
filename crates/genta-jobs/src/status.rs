//! Coarse job status for client polling.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::queue::JobQueue;
use crate::task::TaskState;

/// Fixed estimate reported while a job is still in flight.
pub const ESTIMATED_COMPLETION_SECONDS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<TaskState> for JobStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending | TaskState::Scheduled => JobStatus::Queued,
            TaskState::Active | TaskState::Retry => JobStatus::Processing,
            TaskState::Completed => JobStatus::Completed,
            TaskState::Archived => JobStatus::Failed,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion_seconds: Option<u32>,
}

/// Read-only status lookups. Error text of failed jobs is never exposed.
#[derive(Clone)]
pub struct StatusTracker {
    queue: JobQueue,
}

impl StatusTracker {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    pub async fn status(&self, job_id: &str) -> Result<StatusResponse, QueueError> {
        let info = self.queue.status(job_id).await?;
        let status = JobStatus::from(info.state);
        Ok(StatusResponse {
            job_id: info.id,
            status,
            estimated_completion_seconds: (!status.is_terminal())
                .then_some(ESTIMATED_COMPLETION_SECONDS),
        })
    }

    /// Look up several jobs at once, preserving input order.
    pub async fn statuses(&self, job_ids: &[String]) -> Vec<Result<StatusResponse, QueueError>> {
        join_all(job_ids.iter().map(|id| self.status(id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::options::EnqueueOptions;
    use crate::task::QueueName;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn state_mapping() {
        assert_eq!(JobStatus::from(TaskState::Pending), JobStatus::Queued);
        assert_eq!(JobStatus::from(TaskState::Scheduled), JobStatus::Queued);
        assert_eq!(JobStatus::from(TaskState::Active), JobStatus::Processing);
        assert_eq!(JobStatus::from(TaskState::Retry), JobStatus::Processing);
        assert_eq!(JobStatus::from(TaskState::Completed), JobStatus::Completed);
        assert_eq!(JobStatus::from(TaskState::Archived), JobStatus::Failed);
    }

    #[test]
    fn response_json_shape() {
        let response = StatusResponse {
            job_id: "j-1".into(),
            status: JobStatus::Completed,
            estimated_completion_seconds: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"job_id": "j-1", "status": "completed"}));
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_as_seen_by_a_poller() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = JobQueue::new(broker.clone());
        let tracker = StatusTracker::new(queue.clone());
        let id = queue
            .enqueue("test:noop", &(), EnqueueOptions::FEEDBACK)
            .await
            .unwrap();

        let queued = tracker.status(&id).await.unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
        assert_eq!(queued.estimated_completion_seconds, Some(8));

        broker.dequeue(QueueName::Default).await.unwrap();
        assert_eq!(tracker.status(&id).await.unwrap().status, JobStatus::Processing);

        broker.retry(&id, "secret internal error", None).await.unwrap();
        let failed = tracker.status(&id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.estimated_completion_seconds, None);
        assert!(!serde_json::to_string(&failed).unwrap().contains("secret"));

        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        assert!(tracker.status(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn batch_lookup_keeps_order() {
        let queue = JobQueue::new(Arc::new(MemoryBroker::new()));
        let tracker = StatusTracker::new(queue.clone());
        let id = queue
            .enqueue("test:noop", &(), EnqueueOptions::FEEDBACK)
            .await
            .unwrap();

        let results = tracker.statuses(&[id.clone(), "missing".into()]).await;
        assert_eq!(results[0].as_ref().unwrap().job_id, id);
        assert!(results[1].as_ref().unwrap_err().is_not_found());
    }
}
