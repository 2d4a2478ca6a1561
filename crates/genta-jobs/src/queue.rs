use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::broker::Broker;
use crate::error::QueueError;
use crate::options::EnqueueOptions;
use crate::task::{NewTask, QueueName, TaskInfo};

/// Client-side view of the broker: enqueue and status lookup.
#[derive(Clone)]
pub struct JobQueue {
    broker: Arc<dyn Broker>,
}

impl JobQueue {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Serialize `payload` and hand the task to the broker. Returns the job id.
    pub async fn enqueue<P: Serialize + ?Sized>(
        &self,
        task_type: &str,
        payload: &P,
        opts: EnqueueOptions,
    ) -> Result<String, QueueError> {
        let task = NewTask {
            task_type: task_type.to_string(),
            payload: serde_json::to_value(payload)?,
            queue: opts.queue,
            max_retry: opts.max_retry,
            timeout: opts.timeout,
            retention: opts.retention,
            process_in: opts.process_in,
        };
        let info = self.broker.enqueue(task).await?;
        debug!(job_id = %info.id, task_type, queue = %info.queue, "task enqueued");
        Ok(info.id)
    }

    /// Find a task in any queue.
    ///
    /// `NotFound` means the id was never issued or its retention window has
    /// passed; callers cannot tell the two apart.
    pub async fn status(&self, job_id: &str) -> Result<TaskInfo, QueueError> {
        for queue in QueueName::ALL {
            match self.broker.inspect(queue, job_id).await {
                Ok(info) => return Ok(info),
                Err(QueueError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(QueueError::NotFound(job_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::task::TaskState;
    use std::time::Duration;

    #[tokio::test]
    async fn status_searches_every_queue() {
        let queue = JobQueue::new(Arc::new(MemoryBroker::new()));
        let id = queue
            .enqueue(
                "test:noop",
                &serde_json::json!({}),
                EnqueueOptions::FEEDBACK.with_queue(QueueName::Low),
            )
            .await
            .unwrap();

        let info = queue.status(&id).await.unwrap();
        assert_eq!(info.queue, QueueName::Low);
        assert_eq!(info.state, TaskState::Pending);
        assert_eq!(info.max_retry, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_task_is_scheduled_then_expires_after_its_retention() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = JobQueue::new(broker.clone());
        let id = queue
            .enqueue(
                "test:noop",
                &(),
                EnqueueOptions::FEEDBACK
                    .with_process_in(Duration::from_secs(30))
                    .with_retention(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        let info = queue.status(&id).await.unwrap();
        assert_eq!(info.state, TaskState::Scheduled);
        assert_eq!(info.retention, Duration::from_secs(60));
        assert!(broker.dequeue(QueueName::Default).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        let task = broker.dequeue(QueueName::Default).await.unwrap().unwrap();
        assert_eq!(task.id, id);
        broker.ack(&id).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(queue.status(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let queue = JobQueue::new(Arc::new(MemoryBroker::new()));
        assert!(queue.status("missing").await.unwrap_err().is_not_found());
    }
}
