//! The `genta simulate` command.
//!
//! Runs a fixture through the whole pipeline in memory: answers are
//! submitted, feedback jobs flow through the broker and worker pool, job
//! statuses are polled, and readiness is refreshed and printed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use genta_core::memory::MemoryStore;
use genta_core::readiness::{Overview, ReadinessAggregator, SectionDetail};
use genta_core::traits::GenerationService;
use genta_core::{Language, Section};
use genta_jobs::background::BackgroundTasks;
use genta_jobs::submit::{SubmissionResult, SubmitAnswer};
use genta_jobs::{
    AnswerSubmitter, FeedbackWorker, HandlerMux, JobQueue, JobStatus, MemoryBroker, PoolConfig,
    QueueName, QueueWeights, RetryPolicy, StatusTracker, WorkerPool, FEEDBACK_TASK,
};
use genta_providers::{create_generator, load_config_from, MockProvider, WorkerConfig};

use crate::fixture::parse_fixture;

/// Upper bound on how long we wait for feedback jobs to settle.
const JOB_WAIT: Duration = Duration::from_secs(30);
const STATUS_POLL: Duration = Duration::from_millis(50);
const FEEDBACK_PREVIEW_CHARS: usize = 60;

pub async fn execute(
    fixture_path: PathBuf,
    mock: bool,
    section: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let detail_section = section
        .map(|code| code.parse::<Section>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()?;

    let config = load_config_from(config_path.as_deref())?;
    let practice = parse_fixture(&fixture_path)?
        .build()
        .with_context(|| format!("invalid fixture: {}", fixture_path.display()))?;

    let generator: Arc<dyn GenerationService> = if mock {
        Arc::new(mock_generator(config.feedback_language))
    } else {
        create_generator(&config)?
    };

    let store = Arc::new(MemoryStore::new());
    for question in &practice.questions {
        store.insert_question(question.clone());
    }
    let broker = Arc::new(MemoryBroker::new());
    let queue = JobQueue::new(broker.clone());
    let background = BackgroundTasks::new();

    eprintln!(
        "genta v{} - {} questions, {} answers, generator: {}",
        env!("CARGO_PKG_VERSION"),
        store.question_count(),
        practice.answers.len(),
        generator.name()
    );

    let worker = FeedbackWorker::new(store.clone(), store.clone(), store.clone(), generator)
        .with_language(config.feedback_language);
    let mut handlers = HandlerMux::new();
    handlers.register(FEEDBACK_TASK, Arc::new(worker));

    let pool = WorkerPool::new(broker.clone(), handlers, pool_config(&config.worker));
    let shutdown = CancellationToken::new();
    let pool_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { pool.run(shutdown).await }
    });

    let learner_id = Uuid::new_v4();
    let aggregator = ReadinessAggregator::new(store.clone(), store.clone(), store.clone());
    if let Some(target) = practice.target_theta {
        for section in Section::ALL {
            aggregator.update_target_theta(learner_id, section, target).await?;
        }
    }

    let submitter = AnswerSubmitter::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        queue.clone(),
        background.clone(),
    );

    let mut submissions = Vec::with_capacity(practice.answers.len());
    for answer in &practice.answers {
        let result = submitter
            .submit(
                learner_id,
                SubmitAnswer {
                    question_id: answer.question_id,
                    session_id: Some("simulate".into()),
                    selected_option: answer.selected,
                    time_spent_seconds: answer.time_spent_seconds,
                },
            )
            .await
            .with_context(|| format!("submitting answer for {}", answer.fixture_id))?;
        submissions.push((answer.fixture_id.clone(), result));
    }

    let tracker = StatusTracker::new(queue);
    let job_ids: Vec<String> = submissions
        .iter()
        .filter_map(|(_, s)| s.job_id.clone())
        .collect();
    if tokio::time::timeout(JOB_WAIT, wait_for_jobs(&tracker, &job_ids))
        .await
        .is_err()
    {
        eprintln!(
            "Warning: feedback jobs still running after {}s",
            JOB_WAIT.as_secs()
        );
    }
    let statuses = job_statuses(&tracker, &job_ids).await;

    shutdown.cancel();
    pool_handle.await.context("worker pool task failed")??;
    background.wait().await;
    tracing::debug!(
        backlog = broker.backlog(QueueName::Default)?,
        "worker pool stopped"
    );

    let mut rows = Vec::with_capacity(submissions.len());
    for (fixture_id, submission) in &submissions {
        let detail = submitter
            .attempt_detail(learner_id, submission.attempt.id)
            .await?;
        rows.push(AttemptRow {
            fixture_id,
            section: detail.question.section,
            submission,
            status: submission
                .job_id
                .as_ref()
                .and_then(|id| statuses.get(id).copied()),
            feedback: detail.feedback.map(|f| preview(&f.text)),
        });
    }
    print_attempts(&rows);

    for section in Section::ALL {
        aggregator.refresh(learner_id, section).await?;
    }
    print_overview(&aggregator.overview(learner_id).await?);

    if let Some(section) = detail_section {
        print_section(&aggregator.section(learner_id, section).await?);
    }

    Ok(())
}

fn mock_generator(language: Language) -> MockProvider {
    let responses = match language {
        Language::Indonesian => [
            ("(BENAR)", "Jawabanmu tepat. Pertahankan cara berpikir ini untuk soal sejenis."),
            ("(SALAH)", "Belum tepat. Baca ulang soal dan periksa kembali setiap langkahnya."),
        ],
        Language::English => [
            ("(CORRECT)", "Well done. Keep using this approach on similar questions."),
            ("(INCORRECT)", "Not quite. Reread the question and check each step again."),
        ],
    };
    MockProvider::new(
        responses
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn pool_config(worker: &WorkerConfig) -> PoolConfig {
    PoolConfig {
        concurrency: worker.concurrency,
        poll_interval: Duration::from_millis(worker.poll_interval_ms),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(worker.retry_base_delay_ms),
            max_delay: Duration::from_millis(worker.retry_max_delay_ms),
        },
        weights: QueueWeights {
            critical: worker.weights.critical,
            default: worker.weights.default,
            low: worker.weights.low,
        },
        prune_interval: Duration::from_secs(worker.prune_interval_secs),
    }
}

/// Poll until every job is terminal or no longer known to the broker.
async fn wait_for_jobs(tracker: &StatusTracker, job_ids: &[String]) {
    loop {
        let settled = tracker
            .statuses(job_ids)
            .await
            .iter()
            .all(|s| s.as_ref().map_or(true, |s| s.status.is_terminal()));
        if settled {
            return;
        }
        tokio::time::sleep(STATUS_POLL).await;
    }
}

async fn job_statuses(tracker: &StatusTracker, job_ids: &[String]) -> HashMap<String, JobStatus> {
    tracker
        .statuses(job_ids)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .map(|s| (s.job_id, s.status))
        .collect()
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > FEEDBACK_PREVIEW_CHARS {
        let cut: String = line.chars().take(FEEDBACK_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v * 100.0))
}

struct AttemptRow<'a> {
    fixture_id: &'a str,
    section: Section,
    submission: &'a SubmissionResult,
    status: Option<JobStatus>,
    feedback: Option<String>,
}

fn print_attempts(rows: &[AttemptRow<'_>]) {
    let mut table = Table::new();
    table.set_header(vec![
        "#", "Question", "Section", "Answer", "Result", "Theta", "Change", "Job", "Feedback",
    ]);

    for (index, row) in rows.iter().enumerate() {
        let submission = row.submission;
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(row.fixture_id),
            Cell::new(row.section),
            Cell::new(submission.attempt.selected_option),
            Cell::new(if submission.is_correct { "correct" } else { "incorrect" }),
            Cell::new(format!(
                "{:.3} -> {:.3}",
                submission.theta_before, submission.theta_after
            )),
            Cell::new(format!("{:+.3}", submission.theta_change)),
            Cell::new(row.status.map_or_else(|| "not queued".to_string(), |s| s.to_string())),
            Cell::new(row.feedback.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
}

fn section_name(section: Option<Section>) -> String {
    section.map_or_else(|| "-".to_string(), |s| format!("{s} ({})", s.display_name()))
}

fn print_overview(overview: &Overview) {
    let mut table = Table::new();
    table.set_header(vec![
        "Section", "Name", "Attempts", "Accuracy", "Recent", "Theta", "Target", "Readiness",
    ]);

    for record in &overview.sections {
        table.add_row(vec![
            Cell::new(record.section),
            Cell::new(record.section.display_name()),
            Cell::new(format!("{}/{}", record.total_correct, record.total_attempts)),
            Cell::new(percent(record.overall_accuracy)),
            Cell::new(percent(record.recent_accuracy)),
            Cell::new(format!("{:.3}", record.current_theta)),
            Cell::new(format!("{:.2}", record.target_theta)),
            Cell::new(format!("{:.1}%", record.readiness_percentage)),
        ]);
    }

    println!("\n{table}");
    println!(
        "Overall readiness: {:.1}% (quantitative {:.1}%, literacy {:.1}%)",
        overview.overall_readiness, overview.quantitative_readiness, overview.literacy_readiness
    );
    println!(
        "Answered: {}/{} correct ({})",
        overview.total_correct,
        overview.total_attempts,
        percent(Some(overview.overall_accuracy))
    );
    println!("Weakest:   {}", section_name(overview.weakest));
    println!("Strongest: {}", section_name(overview.strongest));
    if let Some(section) = overview.recommended_practice {
        println!("Recommended practice: {}", section_name(Some(section)));
    }
}

fn print_section(detail: &SectionDetail) {
    let record = &detail.record;
    println!(
        "\nSection {} ({}): readiness {:.1}%, predicted score {}-{}",
        record.section,
        record.section.display_name(),
        record.readiness_percentage,
        record.predicted_score_low,
        record.predicted_score_high
    );
    if let Some(avg) = detail.avg_time_seconds {
        println!("Average time per question: {avg:.1}s");
    }
    if let Some(last) = detail.last_practiced {
        println!("Last practiced: {}", last.format("%Y-%m-%d %H:%M UTC"));
    }

    if !detail.subtype_breakdown.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Sub-type", "Correct", "Accuracy", "Weak"]);
        for sub in &detail.subtype_breakdown {
            table.add_row(vec![
                Cell::new(&sub.sub_type),
                Cell::new(format!("{}/{}", sub.correct, sub.total_attempts)),
                Cell::new(percent(Some(sub.accuracy))),
                Cell::new(if sub.is_weak { "yes" } else { "" }),
            ]);
        }
        println!("{table}");
    }

    for point in &detail.accuracy_trend {
        println!(
            "  {}  {} attempt(s), {}",
            point.date,
            point.attempts,
            percent(Some(point.accuracy))
        );
    }

    let steps = &detail.next_steps;
    println!("{}", steps.message);
    if let Some(daily) = steps.suggested_daily_practice {
        println!("Suggested daily practice: {daily} questions");
    }
    if let Some(date) = steps.estimated_completion_date {
        println!("Estimated ready by: {date}");
    }
}
