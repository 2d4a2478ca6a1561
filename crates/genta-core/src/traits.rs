//! Collaborator traits for persistence and text generation.
//!
//! Storage backends implement the store traits; the `genta-providers` crate
//! implements [`GenerationService`]. Every method returns `anyhow::Result`
//! and typed failures travel as [`DomainError`](crate::error::DomainError)
//! or [`ProviderError`](crate::error::ProviderError) inside it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    Attempt, FeedbackRecord, Question, ReadinessRecord, Section, SkillEstimate,
};

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Fetch a question. Fails with `DomainError::NotFound` if absent.
    async fn question(&self, id: Uuid) -> anyhow::Result<Question>;

    /// Fold one answer into the question's aggregate counters.
    async fn record_answer_stats(
        &self,
        id: Uuid,
        is_correct: bool,
        time_spent_seconds: u32,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create_attempt(&self, attempt: &Attempt) -> anyhow::Result<()>;

    /// Fetch an attempt. Fails with `DomainError::NotFound` if absent.
    async fn attempt(&self, id: Uuid) -> anyhow::Result<Attempt>;

    /// All attempts by a learner on questions of one section, oldest first.
    async fn section_history(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<Vec<HistoryEntry>>;
}

/// An attempt joined with the question fields readiness needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub attempt_id: Uuid,
    pub section: Section,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub is_correct: bool,
    pub time_spent_seconds: u32,
    pub created_at: DateTime<Utc>,
}

/// Feedback persistence.
///
/// Both mutating methods must update the `FeedbackRecord` and the owning
/// attempt's [`FeedbackSummary`](crate::model::FeedbackSummary) atomically.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Insert a record and mark its attempt as having feedback.
    ///
    /// Fails with `DomainError::Conflict` if the attempt already has one.
    async fn create_feedback(&self, record: &FeedbackRecord) -> anyhow::Result<()>;

    async fn feedback_for(&self, attempt_id: Uuid) -> anyhow::Result<Option<FeedbackRecord>>;

    /// Set the helpfulness rating on both the record and its attempt.
    async fn rate_feedback(&self, attempt_id: Uuid, helpful: bool) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SkillStore: Send + Sync {
    async fn skill(&self, learner_id: Uuid, section: Section)
        -> anyhow::Result<Option<SkillEstimate>>;

    async fn save_skill(&self, estimate: &SkillEstimate) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReadinessStore: Send + Sync {
    async fn records(&self, learner_id: Uuid) -> anyhow::Result<Vec<ReadinessRecord>>;

    async fn record(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<Option<ReadinessRecord>>;

    /// Insert a default record for every section the learner lacks one for,
    /// then return all of the learner's records.
    ///
    /// Must be safe under concurrent first access: existing rows are never
    /// overwritten and no uniqueness error is raised.
    async fn upsert_defaults(&self, learner_id: Uuid) -> anyhow::Result<Vec<ReadinessRecord>>;

    async fn save_record(&self, record: &ReadinessRecord) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Generation service
// ---------------------------------------------------------------------------

/// Opaque prompt-to-text backend used by the feedback worker.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Whether a credential is present. Unconfigured services fail every
    /// call with `ProviderError::NotConfigured`.
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation>;

    fn available_models(&self) -> Vec<ModelInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Result of a successful generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Model that actually produced the text.
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency_ms: u64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}
