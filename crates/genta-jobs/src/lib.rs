//! genta-jobs: Asynchronous feedback pipeline.
//!
//! A priority-weighted job queue behind a [`Broker`] trait, a bounded worker
//! pool with retries and timeouts, the feedback generation handler, the
//! status surface clients poll, and the answer submission service that ties
//! scoring to the queue.

pub mod background;
pub mod broker;
pub mod error;
pub mod feedback;
pub mod options;
pub mod pool;
pub mod queue;
pub mod selector;
pub mod status;
pub mod submit;
pub mod task;

pub use broker::{Broker, MemoryBroker};
pub use error::QueueError;
pub use feedback::{FeedbackPayload, FeedbackWorker, FEEDBACK_TASK};
pub use options::EnqueueOptions;
pub use pool::{HandlerMux, PoolConfig, RetryPolicy, TaskHandler, WorkerPool};
pub use queue::JobQueue;
pub use selector::QueueWeights;
pub use status::{JobStatus, StatusResponse, StatusTracker};
pub use submit::AnswerSubmitter;
pub use task::{QueueName, TaskInfo, TaskState};
