//! Readiness aggregation over attempt history and skill estimates.
//!
//! The pure functions at the top of this module hold the arithmetic;
//! [`ReadinessAggregator`] wires them to the stores. Nothing here runs on the
//! answer write path: readiness is recomputed on demand.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::DomainError;
use crate::model::{ReadinessRecord, Section, SectionCluster, THETA_MAX, THETA_MIN};
use crate::traits::{AttemptStore, HistoryEntry, ReadinessStore, SkillStore};

/// Readiness at or above this percentage counts as ready.
pub const READY_THRESHOLD: f64 = 80.0;
/// Sub-types answered correctly less often than this are flagged weak.
pub const WEAK_SUBTYPE_ACCURACY: f64 = 0.6;
/// Length of the rolling "recent" window and of the accuracy trend.
pub const RECENT_WINDOW_DAYS: i64 = 30;

const READY_MESSAGE: &str =
    "Selamat! Kamu sudah siap untuk section ini. Tetap latihan untuk mempertahankan kemampuan.";
const START_MESSAGE: &str = "Mulai berlatih untuk meningkatkan readiness kamu di section ini.";

/// `current / target * 100`, capped at 100. A zero target yields 0.
///
/// Only the upper bound is clamped; a negative theta produces a negative
/// percentage.
pub fn readiness_percentage(current_theta: f64, target_theta: f64) -> f64 {
    if target_theta == 0.0 {
        return 0.0;
    }
    (current_theta / target_theta * 100.0).min(100.0)
}

/// Suggested questions per day for a section that is not yet ready.
pub fn suggested_daily_practice(readiness: f64) -> u32 {
    ((READY_THRESHOLD - readiness) / 5.0).round().clamp(5.0, 20.0) as u32
}

/// Learner-wide readiness summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub overall_readiness: f64,
    pub quantitative_readiness: f64,
    pub literacy_readiness: f64,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub overall_accuracy: f64,
    pub sections: Vec<ReadinessRecord>,
    pub weakest: Option<Section>,
    pub strongest: Option<Section>,
    /// The weakest section, only when it is below the ready threshold.
    pub recommended_practice: Option<Section>,
}

/// Compose an overview from per-section records.
///
/// Weakest and strongest come from a single scan with strict comparisons,
/// so among equal values the first record in `records` wins.
pub fn build_overview(records: &[ReadinessRecord]) -> Overview {
    let mut total = 0.0;
    let mut quantitative = (0.0, 0u32);
    let mut literacy = (0.0, 0u32);
    let mut total_attempts = 0;
    let mut total_correct = 0;

    let mut weakest: Option<(Section, f64)> = None;
    let mut strongest: Option<(Section, f64)> = None;

    for record in records {
        let value = record.readiness_percentage;
        total += value;
        total_attempts += record.total_attempts;
        total_correct += record.total_correct;

        let bucket = match record.section.cluster() {
            SectionCluster::Quantitative => &mut quantitative,
            SectionCluster::Literacy => &mut literacy,
        };
        bucket.0 += value;
        bucket.1 += 1;

        if weakest.map_or(true, |(_, min)| value < min) {
            weakest = Some((record.section, value));
        }
        if strongest.map_or(true, |(_, max)| value > max) {
            strongest = Some((record.section, value));
        }
    }

    let mean = |sum: f64, n: u32| if n > 0 { sum / n as f64 } else { 0.0 };

    Overview {
        overall_readiness: mean(total, records.len() as u32),
        quantitative_readiness: mean(quantitative.0, quantitative.1),
        literacy_readiness: mean(literacy.0, literacy.1),
        total_attempts,
        total_correct,
        overall_accuracy: if total_attempts > 0 {
            total_correct as f64 / total_attempts as f64
        } else {
            0.0
        },
        sections: records.to_vec(),
        weakest: weakest.map(|(s, _)| s),
        strongest: strongest.map(|(s, _)| s),
        recommended_practice: weakest
            .filter(|(_, min)| *min < READY_THRESHOLD)
            .map(|(s, _)| s),
    }
}

/// Accuracy on one question sub-type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeAccuracy {
    pub sub_type: String,
    pub total_attempts: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub is_weak: bool,
}

/// Daily accuracy within the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub accuracy: f64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextSteps {
    pub is_ready: bool,
    pub message: String,
    pub suggested_daily_practice: Option<u32>,
    pub estimated_completion_date: Option<NaiveDate>,
}

/// Everything shown on a single section's readiness page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDetail {
    pub record: ReadinessRecord,
    pub avg_time_seconds: Option<f64>,
    pub last_practiced: Option<DateTime<Utc>>,
    pub subtype_breakdown: Vec<SubtypeAccuracy>,
    pub accuracy_trend: Vec<TrendPoint>,
    pub next_steps: NextSteps,
}

/// Per sub-type accuracy, ordered by sub-type name. Untyped entries are skipped.
pub fn subtype_breakdown(history: &[HistoryEntry]) -> Vec<SubtypeAccuracy> {
    let mut counts: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for entry in history {
        if let Some(sub_type) = entry.sub_type.as_deref() {
            let slot = counts.entry(sub_type).or_default();
            slot.0 += 1;
            slot.1 += entry.is_correct as u32;
        }
    }

    counts
        .into_iter()
        .map(|(sub_type, (total, correct))| {
            let accuracy = correct as f64 / total as f64;
            SubtypeAccuracy {
                sub_type: sub_type.to_string(),
                total_attempts: total,
                correct,
                accuracy,
                is_weak: accuracy < WEAK_SUBTYPE_ACCURACY,
            }
        })
        .collect()
}

/// Daily accuracy for attempts made within `RECENT_WINDOW_DAYS` of `now`.
pub fn accuracy_trend(history: &[HistoryEntry], now: DateTime<Utc>) -> Vec<TrendPoint> {
    let since = now - Duration::days(RECENT_WINDOW_DAYS);
    let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    for entry in history.iter().filter(|e| e.created_at >= since) {
        let slot = days.entry(entry.created_at.date_naive()).or_default();
        slot.0 += 1;
        slot.1 += entry.is_correct as u32;
    }

    days.into_iter()
        .map(|(date, (attempts, correct))| TrendPoint {
            date,
            accuracy: correct as f64 / attempts as f64,
            attempts,
        })
        .collect()
}

pub fn next_steps(record: &ReadinessRecord) -> NextSteps {
    let readiness = record.readiness_percentage;
    if readiness >= READY_THRESHOLD {
        return NextSteps {
            is_ready: true,
            message: READY_MESSAGE.to_string(),
            suggested_daily_practice: None,
            estimated_completion_date: None,
        };
    }

    let message = match record.days_to_ready {
        Some(days) if days > 0 => {
            format!("Terus berlatih! Estimasi kamu akan siap dalam {days} hari.")
        }
        _ => START_MESSAGE.to_string(),
    };

    NextSteps {
        is_ready: false,
        message,
        suggested_daily_practice: Some(suggested_daily_practice(readiness)),
        estimated_completion_date: record.ready_by_date,
    }
}

/// Store-backed readiness queries and maintenance.
pub struct ReadinessAggregator {
    readiness: Arc<dyn ReadinessStore>,
    attempts: Arc<dyn AttemptStore>,
    skills: Arc<dyn SkillStore>,
}

impl ReadinessAggregator {
    pub fn new(
        readiness: Arc<dyn ReadinessStore>,
        attempts: Arc<dyn AttemptStore>,
        skills: Arc<dyn SkillStore>,
    ) -> Self {
        Self {
            readiness,
            attempts,
            skills,
        }
    }

    /// All sections for a learner, creating default rows on first access.
    async fn ensure_records(&self, learner_id: Uuid) -> anyhow::Result<Vec<ReadinessRecord>> {
        let mut records = self.readiness.records(learner_id).await?;
        if records.len() < Section::ALL.len() {
            debug!(learner_id = %learner_id, existing = records.len(), "initializing readiness records");
            records = self.readiness.upsert_defaults(learner_id).await?;
        }
        records.sort_by_key(|r| r.section);
        Ok(records)
    }

    async fn ensure_record(
        &self,
        learner_id: Uuid,
        section: Section,
    ) -> anyhow::Result<ReadinessRecord> {
        if let Some(record) = self.readiness.record(learner_id, section).await? {
            return Ok(record);
        }
        self.ensure_records(learner_id)
            .await?
            .into_iter()
            .find(|r| r.section == section)
            .ok_or_else(|| DomainError::not_found("readiness record", section).into())
    }

    pub async fn overview(&self, learner_id: Uuid) -> anyhow::Result<Overview> {
        let records = self.ensure_records(learner_id).await?;
        let overview = build_overview(&records);
        debug!(
            learner_id = %learner_id,
            overall_readiness = overview.overall_readiness,
            "readiness overview computed"
        );
        Ok(overview)
    }

    pub async fn section(&self, learner_id: Uuid, section: Section) -> anyhow::Result<SectionDetail> {
        self.section_as_of(learner_id, section, Utc::now()).await
    }

    /// Section detail with the trend window anchored at `now`.
    pub async fn section_as_of(
        &self,
        learner_id: Uuid,
        section: Section,
        now: DateTime<Utc>,
    ) -> anyhow::Result<SectionDetail> {
        let record = self.ensure_record(learner_id, section).await?;
        let history = self
            .attempts
            .section_history(learner_id, section)
            .await
            .with_context(|| format!("loading {section} history"))?;

        let avg_time_seconds = if history.is_empty() {
            None
        } else {
            let total: u64 = history.iter().map(|e| e.time_spent_seconds as u64).sum();
            Some(total as f64 / history.len() as f64)
        };

        Ok(SectionDetail {
            avg_time_seconds,
            last_practiced: history.iter().map(|e| e.created_at).max(),
            subtype_breakdown: subtype_breakdown(&history),
            accuracy_trend: accuracy_trend(&history, now),
            next_steps: next_steps(&record),
            record,
        })
    }

    pub async fn refresh(&self, learner_id: Uuid, section: Section) -> anyhow::Result<ReadinessRecord> {
        self.refresh_as_of(learner_id, section, Utc::now()).await
    }

    /// Recompute counts, accuracy, theta and readiness for one section.
    pub async fn refresh_as_of(
        &self,
        learner_id: Uuid,
        section: Section,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReadinessRecord> {
        let mut record = self.ensure_record(learner_id, section).await?;
        let history = self.attempts.section_history(learner_id, section).await?;
        let since = now - Duration::days(RECENT_WINDOW_DAYS);

        let (total, correct) = tally(history.iter());
        let (recent, recent_correct) = tally(history.iter().filter(|e| e.created_at >= since));

        record.total_attempts = total;
        record.total_correct = correct;
        record.overall_accuracy = accuracy(correct, total);
        record.recent_attempts = recent;
        record.recent_correct = recent_correct;
        record.recent_accuracy = accuracy(recent_correct, recent);

        record.current_theta = self
            .skills
            .skill(learner_id, section)
            .await?
            .map_or(0.0, |s| s.theta);
        record.readiness_percentage =
            readiness_percentage(record.current_theta, record.target_theta);
        record.last_updated = Some(now);

        self.readiness.save_record(&record).await?;
        debug!(
            learner_id = %learner_id,
            section = %section,
            readiness = record.readiness_percentage,
            "readiness refreshed"
        );
        Ok(record)
    }

    /// Change a section's goal theta and recompute its readiness.
    pub async fn update_target_theta(
        &self,
        learner_id: Uuid,
        section: Section,
        target_theta: f64,
    ) -> anyhow::Result<ReadinessRecord> {
        if !(THETA_MIN..=THETA_MAX).contains(&target_theta) {
            return Err(DomainError::Invalid(format!(
                "target theta {target_theta} outside [{THETA_MIN}, {THETA_MAX}]"
            ))
            .into());
        }

        let mut record = self.ensure_record(learner_id, section).await?;
        record.target_theta = target_theta;
        record.readiness_percentage =
            readiness_percentage(record.current_theta, record.target_theta);
        record.last_updated = Some(Utc::now());
        self.readiness.save_record(&record).await?;

        tracing::info!(
            learner_id = %learner_id,
            section = %section,
            target_theta,
            "target theta updated"
        );
        Ok(record)
    }
}

fn tally<'a>(entries: impl Iterator<Item = &'a HistoryEntry>) -> (u32, u32) {
    entries.fold((0, 0), |(n, c), e| (n + 1, c + e.is_correct as u32))
}

fn accuracy(correct: u32, total: u32) -> Option<f64> {
    (total > 0).then(|| correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{AnswerOption, Attempt, FeedbackSummary, Question, SkillEstimate};
    use crate::traits::{AttemptStore, QuestionStore as _};
    use chrono::TimeZone;

    fn record_with(section: Section, readiness: f64) -> ReadinessRecord {
        let mut r = ReadinessRecord::initial(Uuid::nil(), section);
        r.readiness_percentage = readiness;
        r
    }

    fn entry(sub_type: Option<&str>, is_correct: bool, at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            attempt_id: Uuid::new_v4(),
            section: Section::GeneralReasoning,
            sub_type: sub_type.map(String::from),
            is_correct,
            time_spent_seconds: 60,
            created_at: at,
        }
    }

    #[test]
    fn readiness_is_half_way() {
        assert!((readiness_percentage(1.0, 2.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn readiness_caps_at_hundred_and_zero_target() {
        assert_eq!(readiness_percentage(2.5, 0.5), 100.0);
        assert_eq!(readiness_percentage(1.0, 0.0), 0.0);
        for i in -30..=30 {
            let theta = i as f64 / 10.0;
            assert!(readiness_percentage(theta, 0.5) <= 100.0);
        }
    }

    #[test]
    fn negative_theta_is_not_floored() {
        assert!((readiness_percentage(-0.5, 0.5) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn daily_practice_clamps() {
        assert_eq!(suggested_daily_practice(0.0), 16);
        assert_eq!(suggested_daily_practice(70.0), 5);
        assert_eq!(suggested_daily_practice(-100.0), 20);
        // (80 - 27.5) / 5 = 10.5 rounds away from zero.
        assert_eq!(suggested_daily_practice(27.5), 11);
    }

    #[test]
    fn overview_of_seven_sections() {
        let values = [90.0, 70.0, 95.0, 60.0, 85.0, 100.0, 55.0];
        let records: Vec<_> = Section::ALL
            .iter()
            .zip(values)
            .map(|(s, v)| record_with(*s, v))
            .collect();

        let overview = build_overview(&records);
        assert!((overview.overall_readiness - 555.0 / 7.0).abs() < 1e-9);
        assert!((overview.quantitative_readiness - 78.75).abs() < 1e-9);
        assert!((overview.literacy_readiness - 80.0).abs() < 1e-9);
        assert_eq!(overview.weakest, Some(Section::MathematicalReasoning));
        assert_eq!(overview.strongest, Some(Section::EnglishLiteracy));
        assert_eq!(overview.recommended_practice, Some(Section::MathematicalReasoning));
    }

    #[test]
    fn no_recommendation_when_all_ready() {
        let records: Vec<_> = Section::ALL.iter().map(|s| record_with(*s, 85.0)).collect();
        let overview = build_overview(&records);
        assert_eq!(overview.weakest, Some(Section::GeneralReasoning));
        assert_eq!(overview.strongest, Some(Section::GeneralReasoning));
        assert_eq!(overview.recommended_practice, None);
    }

    #[test]
    fn empty_overview_is_zeroed() {
        let overview = build_overview(&[]);
        assert_eq!(overview.overall_readiness, 0.0);
        assert_eq!(overview.overall_accuracy, 0.0);
        assert_eq!(overview.weakest, None);
    }

    #[test]
    fn overall_accuracy_sums_sections() {
        let mut a = record_with(Section::GeneralReasoning, 10.0);
        a.total_attempts = 6;
        a.total_correct = 3;
        let mut b = record_with(Section::EnglishLiteracy, 10.0);
        b.total_attempts = 4;
        b.total_correct = 4;
        let overview = build_overview(&[a, b]);
        assert_eq!(overview.total_attempts, 10);
        assert!((overview.overall_accuracy - 0.7).abs() < 1e-9);
    }

    #[test]
    fn subtypes_flag_weak_and_skip_untyped() {
        let now = Utc::now();
        let history = vec![
            entry(Some("deduktif"), true, now),
            entry(Some("deduktif"), false, now),
            entry(Some("induktif"), true, now),
            entry(None, false, now),
        ];
        let breakdown = subtype_breakdown(&history);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].sub_type, "deduktif");
        assert!(breakdown[0].is_weak);
        assert!(!breakdown[1].is_weak);
    }

    #[test]
    fn trend_groups_by_day_within_window() {
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let history = vec![
            entry(None, true, now - Duration::days(40)),
            entry(None, true, now - Duration::days(2)),
            entry(None, false, now - Duration::days(2)),
            entry(None, true, now),
        ];
        let trend = accuracy_trend(&history, now);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].attempts, 2);
        assert!((trend[0].accuracy - 0.5).abs() < 1e-9);
        assert_eq!(trend[1].date, now.date_naive());
    }

    #[test]
    fn next_steps_ready_and_not_ready() {
        let ready = next_steps(&record_with(Section::GeneralKnowledge, 80.0));
        assert!(ready.is_ready);
        assert_eq!(ready.suggested_daily_practice, None);

        let mut record = record_with(Section::GeneralKnowledge, 30.0);
        record.days_to_ready = Some(14);
        record.ready_by_date = NaiveDate::from_ymd_opt(2025, 7, 14);
        let steps = next_steps(&record);
        assert!(!steps.is_ready);
        assert!(steps.message.contains("14 hari"));
        assert_eq!(steps.suggested_daily_practice, Some(10));
        assert_eq!(steps.estimated_completion_date, record.ready_by_date);

        let fresh = next_steps(&record_with(Section::GeneralKnowledge, 0.0));
        assert_eq!(fresh.message, START_MESSAGE);
    }

    fn aggregator(store: &Arc<MemoryStore>) -> ReadinessAggregator {
        ReadinessAggregator::new(store.clone(), store.clone(), store.clone())
    }

    #[tokio::test]
    async fn overview_initializes_seven_defaults() {
        let store = Arc::new(MemoryStore::new());
        let agg = aggregator(&store);
        let learner = Uuid::new_v4();

        let overview = agg.overview(learner).await.unwrap();
        assert_eq!(overview.sections.len(), 7);
        assert_eq!(overview.overall_readiness, 0.0);
        assert!(overview
            .sections
            .iter()
            .all(|r| r.predicted_score_low == 500 && r.predicted_score_high == 550));
    }

    #[tokio::test]
    async fn concurrent_first_access_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let agg = Arc::new(aggregator(&store));
        let learner = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let agg = agg.clone();
                tokio::spawn(async move { agg.overview(learner).await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().sections.len(), 7);
        }
        assert_eq!(store.records(learner).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn refresh_recomputes_from_history_and_skill() {
        let store = Arc::new(MemoryStore::new());
        let agg = aggregator(&store);
        let learner = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();

        let question = Question {
            id: Uuid::new_v4(),
            section: Section::QuantitativeKnowledge,
            sub_type: Some("aljabar".into()),
            difficulty: None,
            text: "1 + 1 = ?".into(),
            options: ["1", "2", "3", "4", "5"].map(String::from),
            correct_option: AnswerOption::B,
            explanation: None,
            stats: Default::default(),
        };
        store.insert_question(question.clone());

        for (days_ago, correct) in [(45, true), (3, true), (1, false)] {
            let attempt = Attempt {
                id: Uuid::new_v4(),
                learner_id: learner,
                question_id: question.id,
                session_id: None,
                selected_option: if correct { AnswerOption::B } else { AnswerOption::A },
                is_correct: correct,
                time_spent_seconds: 30,
                theta_before: 0.0,
                theta_after: 0.0,
                theta_change: 0.0,
                feedback: FeedbackSummary::default(),
                created_at: now - Duration::days(days_ago),
            };
            store.create_attempt(&attempt).await.unwrap();
        }
        store
            .save_skill(&SkillEstimate {
                learner_id: learner,
                section: Section::QuantitativeKnowledge,
                theta: 0.25,
                variance: None,
            })
            .await
            .unwrap();

        let record = agg
            .refresh_as_of(learner, Section::QuantitativeKnowledge, now)
            .await
            .unwrap();
        assert_eq!(record.total_attempts, 3);
        assert_eq!(record.total_correct, 2);
        assert_eq!(record.recent_attempts, 2);
        assert_eq!(record.recent_correct, 1);
        assert_eq!(record.recent_accuracy, Some(0.5));
        assert!((record.readiness_percentage - 50.0).abs() < 1e-9);

        let detail = agg
            .section_as_of(learner, Section::QuantitativeKnowledge, now)
            .await
            .unwrap();
        assert_eq!(detail.avg_time_seconds, Some(30.0));
        assert_eq!(detail.accuracy_trend.len(), 2);
        assert_eq!(detail.subtype_breakdown.len(), 1);
        assert_eq!(detail.last_practiced, Some(now - Duration::days(1)));

        // Question lookups still work alongside readiness.
        assert!(store.question(question.id).await.is_ok());
    }

    #[tokio::test]
    async fn target_theta_validation_and_recompute() {
        let store = Arc::new(MemoryStore::new());
        let agg = aggregator(&store);
        let learner = Uuid::new_v4();

        let err = agg
            .update_target_theta(learner, Section::EnglishLiteracy, 3.5)
            .await
            .unwrap_err();
        assert!(matches!(
            crate::error::domain_error(&err),
            Some(DomainError::Invalid(_))
        ));

        let record = agg
            .update_target_theta(learner, Section::EnglishLiteracy, 2.0)
            .await
            .unwrap();
        assert_eq!(record.target_theta, 2.0);
        assert_eq!(record.readiness_percentage, 0.0);
    }
}
