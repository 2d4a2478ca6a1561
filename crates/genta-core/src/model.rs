//! Core data model types for genta.
//!
//! Questions, attempts, feedback, skill estimates, and readiness records,
//! plus the closed set of exam sections they are keyed by.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound of the theta scale.
pub const THETA_MIN: f64 = -3.0;
/// Upper bound of the theta scale.
pub const THETA_MAX: f64 = 3.0;
/// Goal theta assigned to a freshly created readiness record.
pub const DEFAULT_TARGET_THETA: f64 = 0.5;
/// Predicted score band assigned to a freshly created readiness record.
pub const DEFAULT_SCORE_BAND: (u32, u32) = (500, 550);

/// One of the seven fixed exam subtests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    #[serde(rename = "PU")]
    GeneralReasoning,
    #[serde(rename = "PPU")]
    GeneralKnowledge,
    #[serde(rename = "PBM")]
    ReadingAndWriting,
    #[serde(rename = "PK")]
    QuantitativeKnowledge,
    #[serde(rename = "LBI")]
    IndonesianLiteracy,
    #[serde(rename = "LBE")]
    EnglishLiteracy,
    #[serde(rename = "PM")]
    MathematicalReasoning,
}

/// Grouping of sections used for the two secondary overview averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionCluster {
    Quantitative,
    Literacy,
}

impl Section {
    /// Every section, in canonical order.
    pub const ALL: [Section; 7] = [
        Section::GeneralReasoning,
        Section::GeneralKnowledge,
        Section::ReadingAndWriting,
        Section::QuantitativeKnowledge,
        Section::IndonesianLiteracy,
        Section::EnglishLiteracy,
        Section::MathematicalReasoning,
    ];

    /// Short code used on the wire and in storage.
    pub fn code(self) -> &'static str {
        match self {
            Section::GeneralReasoning => "PU",
            Section::GeneralKnowledge => "PPU",
            Section::ReadingAndWriting => "PBM",
            Section::QuantitativeKnowledge => "PK",
            Section::IndonesianLiteracy => "LBI",
            Section::EnglishLiteracy => "LBE",
            Section::MathematicalReasoning => "PM",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Section::GeneralReasoning => "Penalaran Umum",
            Section::GeneralKnowledge => "Pengetahuan dan Pemahaman Umum",
            Section::ReadingAndWriting => "Pemahaman Bacaan dan Menulis",
            Section::QuantitativeKnowledge => "Pengetahuan Kuantitatif",
            Section::IndonesianLiteracy => "Literasi Bahasa Indonesia",
            Section::EnglishLiteracy => "Literasi Bahasa Inggris",
            Section::MathematicalReasoning => "Penalaran Matematika",
        }
    }

    pub fn cluster(self) -> SectionCluster {
        match self {
            Section::GeneralReasoning
            | Section::GeneralKnowledge
            | Section::ReadingAndWriting
            | Section::QuantitativeKnowledge => SectionCluster::Quantitative,
            Section::IndonesianLiteracy
            | Section::EnglishLiteracy
            | Section::MathematicalReasoning => SectionCluster::Literacy,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Section::ALL
            .into_iter()
            .find(|section| section.code() == code)
            .ok_or_else(|| format!("unknown section: {s}"))
    }
}

/// One of the five answer options of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
    E,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 5] = [
        AnswerOption::A,
        AnswerOption::B,
        AnswerOption::C,
        AnswerOption::D,
        AnswerOption::E,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AnswerOption::A => "A",
            AnswerOption::B => "B",
            AnswerOption::C => "C",
            AnswerOption::D => "D",
            AnswerOption::E => "E",
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AnswerOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(AnswerOption::A),
            "B" => Ok(AnswerOption::B),
            "C" => Ok(AnswerOption::C),
            "D" => Ok(AnswerOption::D),
            "E" => Ok(AnswerOption::E),
            other => Err(format!("unknown answer option: {other}")),
        }
    }
}

/// Language feedback is generated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "id")]
    Indonesian,
    #[serde(rename = "en")]
    English,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Indonesian => write!(f, "id"),
            Language::English => write!(f, "en"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "id" | "indonesian" => Ok(Language::Indonesian),
            "en" | "english" => Ok(Language::English),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// A practice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub section: Section,
    /// Sub-category within the section (e.g. "deduktif").
    #[serde(default)]
    pub sub_type: Option<String>,
    /// IRT difficulty parameter; treated as 0 when absent.
    #[serde(default)]
    pub difficulty: Option<f64>,
    pub text: String,
    /// Option texts, indexed A through E.
    pub options: [String; 5],
    pub correct_option: AnswerOption,
    /// Reference explanation fed to the feedback prompt.
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub stats: QuestionStats,
}

impl Question {
    pub fn option_text(&self, option: AnswerOption) -> &str {
        let index = AnswerOption::ALL
            .iter()
            .position(|o| *o == option)
            .unwrap_or_default();
        &self.options[index]
    }
}

/// Aggregate answer counters maintained by the best-effort statistics task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub attempt_count: u32,
    pub correct_rate: f64,
    pub avg_time_seconds: f64,
}

impl QuestionStats {
    /// Fold one more answer into the running counters.
    pub fn record(&mut self, is_correct: bool, time_spent_seconds: u32) {
        let n = self.attempt_count as f64;
        let correct = if is_correct { 1.0 } else { 0.0 };
        self.correct_rate = (self.correct_rate * n + correct) / (n + 1.0);
        self.avg_time_seconds = (self.avg_time_seconds * n + time_spent_seconds as f64) / (n + 1.0);
        self.attempt_count += 1;
    }
}

/// One answer event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub question_id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,
    pub selected_option: AnswerOption,
    pub is_correct: bool,
    pub time_spent_seconds: u32,
    pub theta_before: f64,
    pub theta_after: f64,
    pub theta_change: f64,
    /// Denormalized copy of the attempt's feedback record.
    #[serde(default)]
    pub feedback: FeedbackSummary,
    pub created_at: DateTime<Utc>,
}

/// Feedback fields mirrored onto the attempt.
///
/// Must always agree with the attempt's `FeedbackRecord`; stores update
/// both in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub generated: bool,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub generation_ms: Option<u64>,
    #[serde(default)]
    pub helpful: Option<bool>,
}

/// Generated feedback for a single attempt. At most one per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub text: String,
    pub language: Language,
    pub model: String,
    pub prompt_version: String,
    pub generation_ms: u64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    #[serde(default)]
    pub is_helpful: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// The attempt-side mirror of this record.
    pub fn summary(&self) -> FeedbackSummary {
        FeedbackSummary {
            generated: true,
            model_used: Some(self.model.clone()),
            generation_ms: Some(self.generation_ms),
            helpful: self.is_helpful,
        }
    }
}

/// Latent ability of a learner in one section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillEstimate {
    pub learner_id: Uuid,
    pub section: Section,
    pub theta: f64,
    /// Confidence field maintained outside this crate.
    #[serde(default)]
    pub variance: Option<f64>,
}

/// Per (learner, section) readiness snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessRecord {
    pub learner_id: Uuid,
    pub section: Section,

    pub recent_attempts: u32,
    pub recent_correct: u32,
    pub recent_accuracy: Option<f64>,

    pub total_attempts: u32,
    pub total_correct: u32,
    pub overall_accuracy: Option<f64>,

    pub current_theta: f64,
    pub target_theta: f64,
    pub readiness_percentage: f64,

    pub predicted_score_low: u32,
    pub predicted_score_high: u32,

    // Populated upstream; consumed read-only here.
    #[serde(default)]
    pub ready_by_date: Option<NaiveDate>,
    #[serde(default)]
    pub improvement_rate_per_week: Option<f64>,
    #[serde(default)]
    pub days_to_ready: Option<u32>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReadinessRecord {
    /// The row created lazily on first access.
    pub fn initial(learner_id: Uuid, section: Section) -> Self {
        Self {
            learner_id,
            section,
            recent_attempts: 0,
            recent_correct: 0,
            recent_accuracy: None,
            total_attempts: 0,
            total_correct: 0,
            overall_accuracy: None,
            current_theta: 0.0,
            target_theta: DEFAULT_TARGET_THETA,
            readiness_percentage: 0.0,
            predicted_score_low: DEFAULT_SCORE_BAND.0,
            predicted_score_high: DEFAULT_SCORE_BAND.1,
            ready_by_date: None,
            improvement_rate_per_week: None,
            days_to_ready: None,
            last_updated: None,
        }
    }
}
