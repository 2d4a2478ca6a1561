//! Feedback generation task handler.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use genta_core::error::{domain_error, DomainError, ProviderError};
use genta_core::model::{FeedbackRecord, Language};
use genta_core::prompt::{FeedbackPrompt, PROMPT_VERSION};
use genta_core::traits::{AttemptStore, FeedbackStore, GenerationService, QuestionStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::options::EnqueueOptions;
use crate::pool::TaskHandler;
use crate::queue::JobQueue;
use crate::task::TaskInfo;

pub const FEEDBACK_TASK: &str = "feedback:generation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub attempt_id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub is_correct: bool,
}

/// Enqueue a feedback generation task with the standard feedback options.
pub async fn enqueue_feedback(
    queue: &JobQueue,
    payload: &FeedbackPayload,
) -> Result<String, QueueError> {
    queue
        .enqueue(FEEDBACK_TASK, payload, EnqueueOptions::FEEDBACK)
        .await
}

/// Generates and stores feedback for one attempt.
pub struct FeedbackWorker {
    questions: Arc<dyn QuestionStore>,
    attempts: Arc<dyn AttemptStore>,
    feedback: Arc<dyn FeedbackStore>,
    generator: Arc<dyn GenerationService>,
    language: Language,
}

impl FeedbackWorker {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        attempts: Arc<dyn AttemptStore>,
        feedback: Arc<dyn FeedbackStore>,
        generator: Arc<dyn GenerationService>,
    ) -> Self {
        Self {
            questions,
            attempts,
            feedback,
            generator,
            language: Language::default(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    async fn generate(&self, payload: &FeedbackPayload) -> anyhow::Result<()> {
        if self.feedback.feedback_for(payload.attempt_id).await?.is_some() {
            info!(attempt_id = %payload.attempt_id, "feedback already exists, skipping");
            return Ok(());
        }

        let question = retryable(self.questions.question(payload.question_id).await)
            .context("failed to fetch question")?;
        let attempt = retryable(self.attempts.attempt(payload.attempt_id).await)
            .context("failed to fetch attempt")?;

        let request = FeedbackPrompt::new(&question, &attempt, self.language).into_request();
        let generation = self
            .generator
            .generate(&request)
            .await
            .context("failed to generate feedback")?;

        let now = Utc::now();
        let record = FeedbackRecord {
            id: Uuid::new_v4(),
            attempt_id: attempt.id,
            text: generation.text,
            language: self.language,
            model: generation.model,
            prompt_version: PROMPT_VERSION.to_string(),
            generation_ms: generation.latency_ms,
            tokens_in: generation.tokens_in,
            tokens_out: generation.tokens_out,
            is_helpful: None,
            created_at: now,
            updated_at: now,
        };

        match self.feedback.create_feedback(&record).await {
            Ok(()) => {}
            // Another delivery of the same task won the race.
            Err(e) if matches!(domain_error(&e), Some(DomainError::Conflict(_))) => {
                info!(attempt_id = %attempt.id, "feedback stored concurrently, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.context("failed to save feedback")),
        }

        info!(
            attempt_id = %attempt.id,
            feedback_id = %record.id,
            model = %record.model,
            generation_ms = record.generation_ms,
            tokens_in = record.tokens_in,
            tokens_out = record.tokens_out,
            "feedback generated"
        );
        Ok(())
    }
}

/// Lookups inside the worker race the submission path, so a missing row is
/// reported as transient and retried.
fn retryable<T>(result: anyhow::Result<T>) -> anyhow::Result<T> {
    result.map_err(|e| match domain_error(&e) {
        Some(DomainError::NotFound { .. }) => {
            anyhow::Error::new(DomainError::Transient(format!("{e:#}")))
        }
        _ => e,
    })
}

#[async_trait]
impl TaskHandler for FeedbackWorker {
    async fn handle(&self, task: &TaskInfo) -> anyhow::Result<()> {
        let payload: FeedbackPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| DomainError::Invalid(format!("malformed feedback payload: {e}")))?;

        info!(
            job_id = %task.id,
            attempt_id = %payload.attempt_id,
            question_id = %payload.question_id,
            is_correct = payload.is_correct,
            "processing feedback generation"
        );

        if !self.generator.is_configured() {
            warn!(
                attempt_id = %payload.attempt_id,
                "generation service not configured, skipping feedback"
            );
            return Ok(());
        }

        match self.generate(&payload).await {
            Err(e)
                if e.chain().any(|c| {
                    matches!(
                        c.downcast_ref::<ProviderError>(),
                        Some(ProviderError::NotConfigured(_))
                    )
                }) =>
            {
                warn!(attempt_id = %payload.attempt_id, error = %e, "generation service not configured, skipping feedback");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::pool::{process, RetryPolicy};
    use crate::task::{QueueName, TaskState};
    use genta_core::error::is_permanent_failure;
    use genta_core::memory::MemoryStore;
    use genta_core::model::{AnswerOption, Attempt, FeedbackSummary, Question, Section};
    use genta_core::traits::{Generation, GenerationRequest, ModelInfo};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct StubGenerator {
        configured: bool,
        fail_first: u32,
        calls: AtomicU32,
        last_prompt: Mutex<Option<GenerationRequest>>,
    }

    impl StubGenerator {
        fn new(configured: bool, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                configured,
                fail_first,
                calls: AtomicU32::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl GenerationService for StubGenerator {
        fn name(&self) -> &str {
            "stub"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
            *self.last_prompt.lock().unwrap() = Some(request.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ProviderError::NetworkError("connection reset".into()).into());
            }
            Ok(Generation {
                text: "Jawabanmu tepat.".into(),
                model: "stub-1".into(),
                tokens_in: 120,
                tokens_out: 30,
                latency_ms: 250,
            })
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        attempt: Attempt,
        question: Question,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let question = Question {
            id: Uuid::new_v4(),
            section: Section::GeneralReasoning,
            sub_type: Some("deduktif".into()),
            difficulty: Some(0.2),
            text: "Semua A adalah B. Semua B adalah C. Maka?".into(),
            options: [
                "Semua A adalah C",
                "Semua C adalah A",
                "Tidak ada A yang C",
                "Sebagian C bukan B",
                "Tidak dapat disimpulkan",
            ]
            .map(String::from),
            correct_option: AnswerOption::A,
            explanation: Some("Silogisme transitif.".into()),
            stats: Default::default(),
        };
        store.insert_question(question.clone());
        let attempt = Attempt {
            id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            question_id: question.id,
            session_id: None,
            selected_option: AnswerOption::B,
            is_correct: false,
            time_spent_seconds: 75,
            theta_before: 0.0,
            theta_after: -0.04,
            theta_change: -0.04,
            feedback: FeedbackSummary::default(),
            created_at: Utc::now(),
        };
        store.create_attempt(&attempt).await.unwrap();
        Fixture {
            store,
            attempt,
            question,
        }
    }

    fn worker(store: &Arc<MemoryStore>, generator: Arc<StubGenerator>) -> FeedbackWorker {
        FeedbackWorker::new(store.clone(), store.clone(), store.clone(), generator)
    }

    fn payload(f: &Fixture) -> FeedbackPayload {
        FeedbackPayload {
            attempt_id: f.attempt.id,
            user_id: f.attempt.learner_id,
            question_id: f.question.id,
            is_correct: f.attempt.is_correct,
        }
    }

    async fn enqueue_and_claim(broker: &Arc<MemoryBroker>, payload: &FeedbackPayload) -> (String, TaskInfo) {
        let queue = JobQueue::new(broker.clone());
        let id = enqueue_feedback(&queue, payload).await.unwrap();
        let task = broker.dequeue(QueueName::Default).await.unwrap().unwrap();
        (id, task)
    }

    #[tokio::test]
    async fn successful_run_stores_feedback_and_marks_attempt() {
        let f = fixture().await;
        let generator = StubGenerator::new(true, 0);
        let worker = worker(&f.store, generator.clone());
        let broker = Arc::new(MemoryBroker::new());
        let (id, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        assert_eq!(task.task_type, FEEDBACK_TASK);
        assert_eq!(task.max_retry, 3);
        process(broker.as_ref(), &worker, RetryPolicy::default(), task).await;

        assert_eq!(
            broker.inspect(QueueName::Default, &id).await.unwrap().state,
            TaskState::Completed
        );
        let record = f.store.feedback_for(f.attempt.id).await.unwrap().unwrap();
        assert_eq!(record.model, "stub-1");
        assert_eq!(record.prompt_version, PROMPT_VERSION);
        assert_eq!(record.language, Language::Indonesian);
        assert_eq!((record.tokens_in, record.tokens_out), (120, 30));

        let attempt = f.store.attempt(f.attempt.id).await.unwrap();
        assert!(attempt.feedback.generated);
        assert_eq!(attempt.feedback.model_used.as_deref(), Some("stub-1"));
        assert_eq!(attempt.feedback.generation_ms, Some(250));

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.user_prompt.contains("Jawaban Siswa: B (SALAH)"));
        assert!(prompt.user_prompt.contains("Subtes: PU (deduktif)"));
    }

    #[tokio::test]
    async fn english_worker_uses_english_prompt() {
        let f = fixture().await;
        let generator = StubGenerator::new(true, 0);
        let worker = worker(&f.store, generator.clone()).with_language(Language::English);
        let broker = Arc::new(MemoryBroker::new());
        let (_, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        worker.handle(&task).await.unwrap();
        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.user_prompt.contains("Student's Answer: B (INCORRECT)"));
        let record = f.store.feedback_for(f.attempt.id).await.unwrap().unwrap();
        assert_eq!(record.language, Language::English);
    }

    #[tokio::test]
    async fn unconfigured_generator_completes_without_feedback() {
        let f = fixture().await;
        let generator = StubGenerator::new(false, 0);
        let worker = worker(&f.store, generator.clone());
        let broker = Arc::new(MemoryBroker::new());
        let (id, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        process(broker.as_ref(), &worker, RetryPolicy::default(), task).await;
        assert_eq!(
            broker.inspect(QueueName::Default, &id).await.unwrap().state,
            TaskState::Completed
        );
        assert!(f.store.feedback_for(f.attempt.id).await.unwrap().is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_attempt_is_retryable() {
        let f = fixture().await;
        let worker = worker(&f.store, StubGenerator::new(true, 0));
        let mut p = payload(&f);
        p.attempt_id = Uuid::new_v4();
        let broker = Arc::new(MemoryBroker::new());
        let (_, task) = enqueue_and_claim(&broker, &p).await;

        let err = worker.handle(&task).await.unwrap_err();
        assert!(!is_permanent_failure(&err));
        assert!(format!("{err:#}").contains("failed to fetch attempt"));
    }

    #[tokio::test]
    async fn malformed_payload_is_permanent() {
        let f = fixture().await;
        let worker = worker(&f.store, StubGenerator::new(true, 0));
        let broker = Arc::new(MemoryBroker::new());
        let queue = JobQueue::new(broker.clone());
        queue
            .enqueue(FEEDBACK_TASK, &serde_json::json!({"attempt_id": 7}), EnqueueOptions::FEEDBACK)
            .await
            .unwrap();
        let task = broker.dequeue(QueueName::Default).await.unwrap().unwrap();

        let err = worker.handle(&task).await.unwrap_err();
        assert!(is_permanent_failure(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn generation_failure_is_retried_then_succeeds() {
        let f = fixture().await;
        let generator = StubGenerator::new(true, 1);
        let worker = worker(&f.store, generator.clone());
        let broker = Arc::new(MemoryBroker::new());
        let (id, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        process(broker.as_ref(), &worker, RetryPolicy::default(), task).await;
        let info = broker.inspect(QueueName::Default, &id).await.unwrap();
        assert_eq!(info.state, TaskState::Retry);
        assert!(info.last_error.unwrap().contains("connection reset"));

        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        let task = broker.dequeue(QueueName::Default).await.unwrap().unwrap();
        process(broker.as_ref(), &worker, RetryPolicy::default(), task).await;
        assert_eq!(
            broker.inspect(QueueName::Default, &id).await.unwrap().state,
            TaskState::Completed
        );
        assert!(f.store.feedback_for(f.attempt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn redelivery_does_not_duplicate_feedback() {
        let f = fixture().await;
        let generator = StubGenerator::new(true, 0);
        let worker = worker(&f.store, generator.clone());
        let broker = Arc::new(MemoryBroker::new());
        let (_, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        worker.handle(&task).await.unwrap();
        worker.handle(&task).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    /// Hides existing feedback from the pre-check, as if another delivery
    /// stored its record between the check and the insert.
    struct LateWinner {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl FeedbackStore for LateWinner {
        async fn create_feedback(&self, record: &FeedbackRecord) -> anyhow::Result<()> {
            self.inner.create_feedback(record).await
        }

        async fn feedback_for(&self, _attempt_id: Uuid) -> anyhow::Result<Option<FeedbackRecord>> {
            Ok(None)
        }

        async fn rate_feedback(&self, attempt_id: Uuid, helpful: bool) -> anyhow::Result<()> {
            self.inner.rate_feedback(attempt_id, helpful).await
        }
    }

    #[tokio::test]
    async fn concurrent_delivery_conflict_completes_the_task() {
        let f = fixture().await;
        let now = Utc::now();
        let winner = FeedbackRecord {
            id: Uuid::new_v4(),
            attempt_id: f.attempt.id,
            text: "Coba periksa lagi premisnya.".into(),
            language: Language::Indonesian,
            model: "winner-1".into(),
            prompt_version: PROMPT_VERSION.to_string(),
            generation_ms: 180,
            tokens_in: 100,
            tokens_out: 20,
            is_helpful: None,
            created_at: now,
            updated_at: now,
        };
        f.store.create_feedback(&winner).await.unwrap();

        let generator = StubGenerator::new(true, 0);
        let worker = FeedbackWorker::new(
            f.store.clone(),
            f.store.clone(),
            Arc::new(LateWinner {
                inner: f.store.clone(),
            }),
            generator.clone(),
        );
        let broker = Arc::new(MemoryBroker::new());
        let (id, task) = enqueue_and_claim(&broker, &payload(&f)).await;

        worker.handle(&task).await.unwrap();
        process(broker.as_ref(), &worker, RetryPolicy::default(), task).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            broker.inspect(QueueName::Default, &id).await.unwrap().state,
            TaskState::Completed
        );
        let stored = f.store.feedback_for(f.attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.id, winner.id);
        assert_eq!(stored.model, "winner-1");
    }
}
