//! Worker pool: claims tasks from the broker and runs their handlers.
//!
//! Concurrency is bounded by a semaphore. Each claim walks the queues in the
//! order given by [`WeightedSelector`]. Handler errors are classified with
//! [`is_permanent_failure`]; transient ones are retried with exponential
//! backoff while the task has retries left, everything else is archived.
//! A handler that overruns the task timeout counts as a failed run.
//! A janitor prunes expired tasks from the broker while the pool runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genta_core::error::{is_permanent_failure, DomainError, ProviderError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::selector::{QueueWeights, WeightedSelector};
use crate::task::{TaskInfo, TaskState};

/// Processes tasks of one type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskInfo) -> anyhow::Result<()>;
}

/// Routes tasks to handlers by task type.
#[derive(Default, Clone)]
pub struct HandlerMux {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[async_trait]
impl TaskHandler for HandlerMux {
    async fn handle(&self, task: &TaskInfo) -> anyhow::Result<()> {
        match self.handlers.get(&task.task_type) {
            Some(handler) => handler.handle(task).await,
            None => Err(DomainError::Invalid(format!(
                "no handler registered for task type {}",
                task.task_type
            ))
            .into()),
        }
    }
}

/// Exponential backoff between retries: `base * 2^retry`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count.min(31));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay to use after `err`, honouring a provider's rate-limit hint.
    pub fn delay_after(&self, err: &anyhow::Error, retry_count: u32) -> Duration {
        let hint = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<ProviderError>())
            .and_then(ProviderError::retry_after_ms)
            .map(Duration::from_millis);
        hint.unwrap_or_else(|| self.delay_for_retry(retry_count))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of tasks running at once.
    pub concurrency: usize,
    /// Sleep between polls when every queue is empty.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub weights: QueueWeights,
    /// How often expired tasks are reclaimed from the broker.
    pub prune_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            weights: QueueWeights::default(),
            prune_interval: Duration::from_secs(60),
        }
    }
}

pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    handler: Arc<HandlerMux>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(broker: Arc<dyn Broker>, handler: HandlerMux, config: PoolConfig) -> Self {
        Self {
            broker,
            handler: Arc::new(handler),
            config,
        }
    }

    /// Run until `shutdown` is cancelled, then wait for in-flight tasks.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut selector = WeightedSelector::new(self.config.weights);
        let mut running = JoinSet::new();

        info!(
            concurrency = self.config.concurrency,
            task_types = ?self.handler.task_types().collect::<Vec<_>>(),
            "worker pool started"
        );
        let janitor = tokio::spawn(prune_expired(
            Arc::clone(&self.broker),
            self.config.prune_interval,
            shutdown.clone(),
        ));

        loop {
            while let Some(joined) = running.try_join_next() {
                log_join(joined);
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit?,
            };

            match self.claim(&mut selector).await {
                Some(task) => {
                    let broker = Arc::clone(&self.broker);
                    let handler = Arc::clone(&self.handler);
                    let retry = self.config.retry;
                    running.spawn(async move {
                        let _permit = permit;
                        process(broker.as_ref(), handler.as_ref(), retry, task).await;
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!(in_flight = running.len(), "worker pool draining");
        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }
        log_join(janitor.await);
        info!("worker pool stopped");
        Ok(())
    }

    /// A queue that fails to dequeue is skipped for this round.
    async fn claim(&self, selector: &mut WeightedSelector) -> Option<TaskInfo> {
        for queue in selector.next_order() {
            match self.broker.dequeue(queue).await {
                Ok(Some(task)) => return Some(task),
                Ok(None) => {}
                Err(e) => warn!(queue = %queue, error = %e, "failed to dequeue task"),
            }
        }
        None
    }
}

async fn prune_expired(broker: Arc<dyn Broker>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = broker.prune().await {
                    warn!(error = %e, "failed to prune expired tasks");
                }
            }
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "worker task panicked");
    }
}

/// Run one claimed task and record the outcome with the broker.
pub async fn process(broker: &dyn Broker, handler: &dyn TaskHandler, retry: RetryPolicy, task: TaskInfo) {
    debug!(
        job_id = %task.id,
        task_type = %task.task_type,
        retry_count = task.retry_count,
        "task started"
    );

    let outcome = match tokio::time::timeout(task.timeout, handler.handle(&task)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "task timed out after {}s",
            task.timeout.as_secs_f64()
        )),
    };

    match outcome {
        Ok(()) => match broker.ack(&task.id).await {
            Ok(()) => info!(job_id = %task.id, task_type = %task.task_type, "task completed"),
            Err(e) => {
                error!(job_id = %task.id, error = %e, "failed to ack task");
                let message = format!("handler succeeded but completion was not recorded: {e}");
                if let Err(e) = broker.retry(&task.id, &message, None).await {
                    error!(job_id = %task.id, error = %e, "failed to archive unacknowledged task");
                }
            }
        },
        Err(err) => {
            let permanent = is_permanent_failure(&err);
            let delay = (!permanent && task.has_retries_left())
                .then(|| retry.delay_after(&err, task.retry_count));
            let message = format!("{err:#}");

            match broker.retry(&task.id, &message, delay).await {
                Ok(TaskState::Archived) => warn!(
                    job_id = %task.id,
                    task_type = %task.task_type,
                    retry_count = task.retry_count,
                    permanent,
                    error = %message,
                    "task archived"
                ),
                Ok(_) => warn!(
                    job_id = %task.id,
                    task_type = %task.task_type,
                    retry_count = task.retry_count + 1,
                    backoff_ms = delay.map_or(0, |d| d.as_millis() as u64),
                    error = %message,
                    "task failed, retry scheduled"
                ),
                Err(e) => error!(job_id = %task.id, error = %e, "failed to record task failure"),
            }
        }
    }
}
