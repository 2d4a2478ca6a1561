//! Answer submission and attempt-level queries.

use std::sync::Arc;

use chrono::Utc;
use genta_core::error::DomainError;
use genta_core::model::{AnswerOption, Attempt, FeedbackRecord, FeedbackSummary, Question, SkillEstimate};
use genta_core::scoring::update_theta;
use genta_core::traits::{AttemptStore, FeedbackStore, QuestionStore, SkillStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::background::BackgroundTasks;
use crate::feedback::{enqueue_feedback, FeedbackPayload};
use crate::queue::JobQueue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswer {
    pub question_id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,
    pub selected_option: AnswerOption,
    pub time_spent_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub attempt: Attempt,
    pub is_correct: bool,
    pub theta_before: f64,
    pub theta_after: f64,
    pub theta_change: f64,
    /// Feedback job id; `None` if the job could not be enqueued.
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptDetail {
    pub attempt: Attempt,
    pub question: Question,
    pub feedback: Option<FeedbackRecord>,
}

/// Records answers and schedules their feedback.
pub struct AnswerSubmitter {
    questions: Arc<dyn QuestionStore>,
    attempts: Arc<dyn AttemptStore>,
    skills: Arc<dyn SkillStore>,
    feedback: Arc<dyn FeedbackStore>,
    queue: JobQueue,
    background: BackgroundTasks,
}

impl AnswerSubmitter {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        attempts: Arc<dyn AttemptStore>,
        skills: Arc<dyn SkillStore>,
        feedback: Arc<dyn FeedbackStore>,
        queue: JobQueue,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            questions,
            attempts,
            skills,
            feedback,
            queue,
            background,
        }
    }

    /// Score an answer, persist it, and enqueue feedback generation.
    ///
    /// Never waits on feedback. A failed enqueue is logged and reported as
    /// `job_id: None`.
    pub async fn submit(
        &self,
        learner_id: Uuid,
        answer: SubmitAnswer,
    ) -> anyhow::Result<SubmissionResult> {
        let question = self.questions.question(answer.question_id).await?;
        let is_correct = answer.selected_option == question.correct_option;

        let theta_before = self
            .skills
            .skill(learner_id, question.section)
            .await?
            .map_or(0.0, |s| s.theta);
        let update = update_theta(theta_before, is_correct, question.difficulty);

        let attempt = Attempt {
            id: Uuid::new_v4(),
            learner_id,
            question_id: question.id,
            session_id: answer.session_id,
            selected_option: answer.selected_option,
            is_correct,
            time_spent_seconds: answer.time_spent_seconds,
            theta_before,
            theta_after: update.new_theta,
            theta_change: update.change,
            feedback: FeedbackSummary::default(),
            created_at: Utc::now(),
        };
        self.attempts.create_attempt(&attempt).await?;
        self.skills
            .save_skill(&SkillEstimate {
                learner_id,
                section: question.section,
                theta: update.new_theta,
                variance: None,
            })
            .await?;

        let questions = Arc::clone(&self.questions);
        let (question_id, time_spent) = (question.id, attempt.time_spent_seconds);
        self.background.spawn("question_stats", async move {
            questions
                .record_answer_stats(question_id, is_correct, time_spent)
                .await
        });

        let payload = FeedbackPayload {
            attempt_id: attempt.id,
            user_id: learner_id,
            question_id: question.id,
            is_correct,
        };
        let job_id = match enqueue_feedback(&self.queue, &payload).await {
            Ok(id) => {
                info!(job_id = %id, attempt_id = %attempt.id, "feedback generation enqueued");
                Some(id)
            }
            Err(e) => {
                warn!(attempt_id = %attempt.id, error = %e, "failed to enqueue feedback generation");
                None
            }
        };

        info!(
            learner_id = %learner_id,
            question_id = %question.id,
            is_correct,
            theta_change = update.change,
            "attempt recorded"
        );

        Ok(SubmissionResult {
            is_correct,
            theta_before,
            theta_after: update.new_theta,
            theta_change: update.change,
            attempt,
            job_id,
        })
    }

    async fn owned_attempt(&self, learner_id: Uuid, attempt_id: Uuid) -> anyhow::Result<Attempt> {
        let attempt = self.attempts.attempt(attempt_id).await?;
        if attempt.learner_id != learner_id {
            return Err(DomainError::Forbidden(format!(
                "attempt {attempt_id} belongs to another learner"
            ))
            .into());
        }
        Ok(attempt)
    }

    pub async fn attempt_detail(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
    ) -> anyhow::Result<AttemptDetail> {
        let attempt = self.owned_attempt(learner_id, attempt_id).await?;
        let question = self.questions.question(attempt.question_id).await?;
        let feedback = self.feedback.feedback_for(attempt_id).await?;
        Ok(AttemptDetail {
            attempt,
            question,
            feedback,
        })
    }

    /// Rate an attempt's feedback as helpful or not.
    pub async fn rate_feedback(
        &self,
        learner_id: Uuid,
        attempt_id: Uuid,
        helpful: bool,
    ) -> anyhow::Result<()> {
        self.owned_attempt(learner_id, attempt_id).await?;
        if self.feedback.feedback_for(attempt_id).await?.is_none() {
            return Err(DomainError::not_found("feedback", attempt_id).into());
        }
        self.feedback.rate_feedback(attempt_id, helpful).await?;
        info!(attempt_id = %attempt_id, helpful, "feedback rated");
        Ok(())
    }
}
