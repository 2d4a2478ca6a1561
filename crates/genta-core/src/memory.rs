//! In-memory implementation of every store trait.
//!
//! All state lives behind one mutex, so each trait method is a single
//! transaction. Used by the CLI simulator and by tests across the workspace.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::DomainError;
use crate::model::{Attempt, FeedbackRecord, Question, ReadinessRecord, Section, SkillEstimate};
use crate::traits::{
    AttemptStore, FeedbackStore, HistoryEntry, QuestionStore, ReadinessStore, SkillStore,
};

#[derive(Default)]
struct State {
    questions: HashMap<Uuid, Question>,
    attempts: HashMap<Uuid, Attempt>,
    /// Attempt ids in insertion order.
    attempt_order: Vec<Uuid>,
    feedback: HashMap<Uuid, FeedbackRecord>,
    skills: HashMap<(Uuid, Section), SkillEstimate>,
    readiness: HashMap<(Uuid, Section), ReadinessRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DomainError::Transient("memory store lock poisoned".into()).into())
    }

    /// Seed a question. Replaces any question with the same id.
    pub fn insert_question(&self, question: Question) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.questions.insert(question.id, question);
    }

    pub fn question_count(&self) -> usize {
        self.state.lock().map(|s| s.questions.len()).unwrap_or_default()
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn question(&self, id: Uuid) -> anyhow::Result<Question> {
        self.lock()?
            .questions
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("question", id).into())
    }

    async fn record_answer_stats(
        &self,
        id: Uuid,
        is_correct: bool,
        time_spent_seconds: u32,
    ) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        let question = state
            .questions
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("question", id))?;
        question.stats.record(is_correct, time_spent_seconds);
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create_attempt(&self, attempt: &Attempt) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        if state.attempts.contains_key(&attempt.id) {
            return Err(DomainError::Conflict(format!("attempt {} already exists", attempt.id)).into());
        }
        state.attempts.insert(attempt.id, attempt.clone());
        state.attempt_order.push(attempt.id);
        Ok(())
    }

    async fn attempt(&self, id: Uuid) -> anyhow::Result<Attempt> {
        self.lock()?
            .attempts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("attempt", id).into())
    }

    async fn section_history(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<Vec<HistoryEntry>> {
        let state = self.lock()?;
        let mut history: Vec<HistoryEntry> = state
            .attempt_order
            .iter()
            .filter_map(|id| state.attempts.get(id))
            .filter(|a| a.learner_id == learner_id)
            .filter_map(|a| {
                let question = state.questions.get(&a.question_id)?;
                (question.section == section).then(|| HistoryEntry {
                    attempt_id: a.id,
                    section,
                    sub_type: question.sub_type.clone(),
                    is_correct: a.is_correct,
                    time_spent_seconds: a.time_spent_seconds,
                    created_at: a.created_at,
                })
            })
            .collect();
        history.sort_by_key(|e| e.created_at);
        Ok(history)
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn create_feedback(&self, record: &FeedbackRecord) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        if state.feedback.contains_key(&record.attempt_id) {
            return Err(DomainError::Conflict(format!(
                "feedback for attempt {} already exists",
                record.attempt_id
            ))
            .into());
        }
        let attempt = state
            .attempts
            .get_mut(&record.attempt_id)
            .ok_or_else(|| DomainError::not_found("attempt", record.attempt_id))?;
        attempt.feedback = record.summary();
        state.feedback.insert(record.attempt_id, record.clone());
        Ok(())
    }

    async fn feedback_for(&self, attempt_id: Uuid) -> anyhow::Result<Option<FeedbackRecord>> {
        Ok(self.lock()?.feedback.get(&attempt_id).cloned())
    }

    async fn rate_feedback(&self, attempt_id: Uuid, helpful: bool) -> anyhow::Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let record = state
            .feedback
            .get_mut(&attempt_id)
            .ok_or_else(|| DomainError::not_found("feedback", attempt_id))?;
        let attempt = state
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| DomainError::not_found("attempt", attempt_id))?;
        record.is_helpful = Some(helpful);
        record.updated_at = Utc::now();
        attempt.feedback.helpful = Some(helpful);
        Ok(())
    }
}

#[async_trait]
impl SkillStore for MemoryStore {
    async fn skill(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<Option<SkillEstimate>> {
        Ok(self.lock()?.skills.get(&(learner_id, section)).copied())
    }

    async fn save_skill(&self, estimate: &SkillEstimate) -> anyhow::Result<()> {
        self.lock()?
            .skills
            .insert((estimate.learner_id, estimate.section), *estimate);
        Ok(())
    }
}

#[async_trait]
impl ReadinessStore for MemoryStore {
    async fn records(&self, learner_id: Uuid) -> anyhow::Result<Vec<ReadinessRecord>> {
        let state = self.lock()?;
        Ok(Section::ALL
            .iter()
            .filter_map(|s| state.readiness.get(&(learner_id, *s)).cloned())
            .collect())
    }

    async fn record(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<Option<ReadinessRecord>> {
        Ok(self.lock()?.readiness.get(&(learner_id, section)).cloned())
    }

    async fn upsert_defaults(&self, learner_id: Uuid) -> anyhow::Result<Vec<ReadinessRecord>> {
        let mut state = self.lock()?;
        Ok(Section::ALL
            .iter()
            .map(|s| {
                state
                    .readiness
                    .entry((learner_id, *s))
                    .or_insert_with(|| ReadinessRecord::initial(learner_id, *s))
                    .clone()
            })
            .collect())
    }

    async fn save_record(&self, record: &ReadinessRecord) -> anyhow::Result<()> {
        self.lock()?
            .readiness
            .insert((record.learner_id, record.section), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::domain_error;
    use crate::model::{AnswerOption, FeedbackSummary, Language};

    fn question(section: Section) -> Question {
        Question {
            id: Uuid::new_v4(),
            section,
            sub_type: None,
            difficulty: Some(0.5),
            text: "?".into(),
            options: ["a", "b", "c", "d", "e"].map(String::from),
            correct_option: AnswerOption::A,
            explanation: None,
            stats: Default::default(),
        }
    }

    fn attempt(learner_id: Uuid, question_id: Uuid) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            learner_id,
            question_id,
            session_id: Some("s-1".into()),
            selected_option: AnswerOption::A,
            is_correct: true,
            time_spent_seconds: 42,
            theta_before: 0.0,
            theta_after: 0.05,
            theta_change: 0.05,
            feedback: FeedbackSummary::default(),
            created_at: Utc::now(),
        }
    }

    fn feedback(attempt_id: Uuid) -> FeedbackRecord {
        let now = Utc::now();
        FeedbackRecord {
            id: Uuid::new_v4(),
            attempt_id,
            text: "Bagus!".into(),
            language: Language::Indonesian,
            model: "mock-1".into(),
            prompt_version: "v1.0.0".into(),
            generation_ms: 120,
            tokens_in: 80,
            tokens_out: 40,
            is_helpful: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let store = MemoryStore::new();
        let err = store.question(Uuid::new_v4()).await.unwrap_err();
        assert!(domain_error(&err).is_some_and(DomainError::is_not_found));
    }

    #[tokio::test]
    async fn feedback_create_mirrors_onto_attempt() {
        let store = MemoryStore::new();
        let q = question(Section::GeneralReasoning);
        store.insert_question(q.clone());
        let a = attempt(Uuid::new_v4(), q.id);
        store.create_attempt(&a).await.unwrap();

        store.create_feedback(&feedback(a.id)).await.unwrap();
        let stored = store.attempt(a.id).await.unwrap();
        assert!(stored.feedback.generated);
        assert_eq!(stored.feedback.model_used.as_deref(), Some("mock-1"));
        assert_eq!(stored.feedback.generation_ms, Some(120));

        let err = store.create_feedback(&feedback(a.id)).await.unwrap_err();
        assert!(matches!(domain_error(&err), Some(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn feedback_for_unknown_attempt_writes_nothing() {
        let store = MemoryStore::new();
        let orphan = feedback(Uuid::new_v4());
        assert!(store.create_feedback(&orphan).await.is_err());
        assert!(store.feedback_for(orphan.attempt_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rating_updates_both_sides() {
        let store = MemoryStore::new();
        let q = question(Section::GeneralReasoning);
        store.insert_question(q.clone());
        let a = attempt(Uuid::new_v4(), q.id);
        store.create_attempt(&a).await.unwrap();

        let err = store.rate_feedback(a.id, true).await.unwrap_err();
        assert!(domain_error(&err).is_some_and(DomainError::is_not_found));

        store.create_feedback(&feedback(a.id)).await.unwrap();
        store.rate_feedback(a.id, false).await.unwrap();
        let record = store.feedback_for(a.id).await.unwrap().unwrap();
        assert_eq!(record.is_helpful, Some(false));
        assert_eq!(store.attempt(a.id).await.unwrap().feedback.helpful, Some(false));
    }

    #[tokio::test]
    async fn history_filters_by_learner_and_section() {
        let store = MemoryStore::new();
        let pu = question(Section::GeneralReasoning);
        let pk = question(Section::QuantitativeKnowledge);
        store.insert_question(pu.clone());
        store.insert_question(pk.clone());
        let learner = Uuid::new_v4();

        store.create_attempt(&attempt(learner, pu.id)).await.unwrap();
        store.create_attempt(&attempt(learner, pk.id)).await.unwrap();
        store.create_attempt(&attempt(Uuid::new_v4(), pu.id)).await.unwrap();

        let history = store
            .section_history(learner, Section::GeneralReasoning)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].time_spent_seconds, 42);
    }

    #[tokio::test]
    async fn upsert_defaults_keeps_existing_rows() {
        let store = MemoryStore::new();
        let learner = Uuid::new_v4();
        let mut custom = ReadinessRecord::initial(learner, Section::EnglishLiteracy);
        custom.target_theta = 1.5;
        store.save_record(&custom).await.unwrap();

        let records = store.upsert_defaults(learner).await.unwrap();
        assert_eq!(records.len(), 7);
        let lbe = records
            .iter()
            .find(|r| r.section == Section::EnglishLiteracy)
            .unwrap();
        assert_eq!(lbe.target_theta, 1.5);

        assert_eq!(store.upsert_defaults(learner).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn answer_stats_accumulate() {
        let store = MemoryStore::new();
        let q = question(Section::IndonesianLiteracy);
        store.insert_question(q.clone());
        store.record_answer_stats(q.id, true, 10).await.unwrap();
        store.record_answer_stats(q.id, true, 20).await.unwrap();
        let stats = store.question(q.id).await.unwrap().stats;
        assert_eq!(stats.attempt_count, 2);
        assert_eq!(stats.correct_rate, 1.0);
        assert_eq!(stats.avg_time_seconds, 15.0);
    }
}
