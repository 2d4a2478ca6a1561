//! TOML practice fixtures: a question bank plus one learner's answer script.
//!
//! Fields are kept as raw strings on parse so `validate` can report every
//! problem at once; [`PracticeFixture::build`] turns a clean fixture into
//! domain types.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use genta_core::model::{AnswerOption, Question, QuestionStats, Section, THETA_MAX, THETA_MIN};

#[derive(Debug, Deserialize)]
pub struct PracticeFixture {
    pub practice: PracticeHeader,
    #[serde(default)]
    pub questions: Vec<FixtureQuestion>,
    #[serde(default)]
    pub answers: Vec<FixtureAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct PracticeHeader {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Goal theta applied to every section before the run.
    #[serde(default)]
    pub target_theta: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureQuestion {
    pub id: String,
    pub section: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub difficulty: Option<f64>,
    pub text: String,
    pub options: Vec<String>,
    pub correct: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureAnswer {
    pub question: String,
    pub selected: String,
    #[serde(default = "default_time_spent")]
    pub time_spent_seconds: u32,
}

fn default_time_spent() -> u32 {
    60
}

/// One answer ready for submission.
#[derive(Debug, Clone)]
pub struct ScriptedAnswer {
    pub fixture_id: String,
    pub question_id: Uuid,
    pub selected: AnswerOption,
    pub time_spent_seconds: u32,
}

/// A fixture converted to domain types.
#[derive(Debug)]
pub struct PracticeSet {
    pub questions: Vec<Question>,
    pub answers: Vec<ScriptedAnswer>,
    pub target_theta: Option<f64>,
}

pub fn parse_fixture(path: &Path) -> Result<PracticeFixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file: {}", path.display()))?;
    parse_fixture_str(&content, path)
}

pub fn parse_fixture_str(content: &str, source_path: &Path) -> Result<PracticeFixture> {
    toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
}

/// A warning from fixture validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Question id, or `answer #n` for an answer entry.
    pub item: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: Some(item.into()),
            message: message.into(),
        }
    }
}

/// Validate a fixture for common issues.
pub fn validate_fixture(fixture: &PracticeFixture) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if let Some(target) = fixture.practice.target_theta {
        if !(THETA_MIN..=THETA_MAX).contains(&target) {
            warnings.push(ValidationWarning {
                item: None,
                message: format!("target_theta {target} outside [{THETA_MIN}, {THETA_MAX}]"),
            });
        }
    }

    let mut seen_ids = HashSet::new();
    for q in &fixture.questions {
        if !seen_ids.insert(q.id.as_str()) {
            warnings.push(ValidationWarning::new(&q.id, format!("duplicate question ID: {}", q.id)));
        }
        if let Err(e) = q.section.parse::<Section>() {
            warnings.push(ValidationWarning::new(&q.id, e));
        }
        if q.options.len() != AnswerOption::ALL.len() {
            warnings.push(ValidationWarning::new(
                &q.id,
                format!("expected 5 options, found {}", q.options.len()),
            ));
        }
        if let Err(e) = q.correct.parse::<AnswerOption>() {
            warnings.push(ValidationWarning::new(&q.id, format!("invalid correct option: {e}")));
        }
        if q.difficulty.is_some_and(|d| !(THETA_MIN..=THETA_MAX).contains(&d)) {
            warnings.push(ValidationWarning::new(&q.id, "difficulty outside [-3, 3]"));
        }
        if q.text.trim().is_empty() {
            warnings.push(ValidationWarning::new(&q.id, "question text is empty"));
        }
    }

    for (index, answer) in fixture.answers.iter().enumerate() {
        let item = format!("answer #{}", index + 1);
        if !seen_ids.contains(answer.question.as_str()) {
            warnings.push(ValidationWarning::new(
                &item,
                format!("unknown question ID: {}", answer.question),
            ));
        }
        if let Err(e) = answer.selected.parse::<AnswerOption>() {
            warnings.push(ValidationWarning::new(&item, format!("invalid selected option: {e}")));
        }
    }

    warnings
}

impl PracticeFixture {
    /// Convert to domain types, failing on the first invalid entry.
    pub fn build(&self) -> Result<PracticeSet> {
        let mut ids: HashMap<&str, Uuid> = HashMap::new();
        let mut questions = Vec::with_capacity(self.questions.len());

        for q in &self.questions {
            let id = Uuid::new_v4();
            anyhow::ensure!(
                ids.insert(q.id.as_str(), id).is_none(),
                "duplicate question ID: {}",
                q.id
            );
            let section: Section = q
                .section
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {e}", q.id))?;
            let correct_option: AnswerOption = q
                .correct
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {e}", q.id))?;
            let options: [String; 5] = q.options.clone().try_into().map_err(|v: Vec<String>| {
                anyhow::anyhow!("question {}: expected 5 options, found {}", q.id, v.len())
            })?;

            questions.push(Question {
                id,
                section,
                sub_type: q.sub_type.clone(),
                difficulty: q.difficulty,
                text: q.text.clone(),
                options,
                correct_option,
                explanation: q.explanation.clone(),
                stats: QuestionStats::default(),
            });
        }

        let answers = self
            .answers
            .iter()
            .map(|a| {
                let question_id = *ids
                    .get(a.question.as_str())
                    .ok_or_else(|| anyhow::anyhow!("unknown question ID: {}", a.question))?;
                let selected = a
                    .selected
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!("answer for {}: {e}", a.question))?;
                Ok(ScriptedAnswer {
                    fixture_id: a.question.clone(),
                    question_id,
                    selected,
                    time_spent_seconds: a.time_spent_seconds,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PracticeSet {
            questions,
            answers,
            target_theta: self.practice.target_theta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[practice]
name = "Latihan PK"
target_theta = 1.0

[[questions]]
id = "pk-1"
section = "PK"
sub_type = "aljabar"
difficulty = 0.5
text = "Jika 2x + 3 = 11, berapakah x?"
options = ["2", "3", "4", "5", "6"]
correct = "C"
explanation = "2x = 8 sehingga x = 4."

[[questions]]
id = "pu-1"
section = "pu"
text = "Semua kucing berkaki empat. Tom adalah kucing. Maka..."
options = ["a", "b", "c", "d", "e"]
correct = "A"

[[answers]]
question = "pk-1"
selected = "C"
time_spent_seconds = 45

[[answers]]
question = "pu-1"
selected = "b"
"#;

    fn parse(content: &str) -> PracticeFixture {
        parse_fixture_str(content, &PathBuf::from("test.toml")).unwrap()
    }

    #[test]
    fn parse_valid_fixture() {
        let fixture = parse(VALID_TOML);
        assert_eq!(fixture.practice.name, "Latihan PK");
        assert_eq!(fixture.questions.len(), 2);
        assert_eq!(fixture.answers[1].time_spent_seconds, 60);
        assert!(validate_fixture(&fixture).is_empty());
    }

    #[test]
    fn build_maps_answers_to_questions() {
        let set = parse(VALID_TOML).build().unwrap();
        assert_eq!(set.questions.len(), 2);
        assert_eq!(set.questions[0].section, Section::QuantitativeKnowledge);
        assert_eq!(set.questions[1].section, Section::GeneralReasoning);
        assert_eq!(set.answers[0].question_id, set.questions[0].id);
        assert_eq!(set.answers[1].selected, AnswerOption::B);
        assert_eq!(set.target_theta, Some(1.0));
    }

    #[test]
    fn validate_reports_every_problem() {
        let toml = r#"
[practice]
name = "Broken"
target_theta = 4.0

[[questions]]
id = "q1"
section = "XYZ"
text = " "
options = ["a", "b"]
correct = "F"

[[questions]]
id = "q1"
section = "PK"
text = "dup"
options = ["a", "b", "c", "d", "e"]
correct = "A"
difficulty = 9.0

[[answers]]
question = "q2"
selected = "Z"
"#;
        let warnings = validate_fixture(&parse(toml));
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();

        assert!(messages.iter().any(|m| m.contains("target_theta")));
        assert!(messages.iter().any(|m| m.contains("duplicate question ID: q1")));
        assert!(messages.iter().any(|m| m.contains("unknown section")));
        assert!(messages.iter().any(|m| m.contains("expected 5 options")));
        assert!(messages.iter().any(|m| m.contains("invalid correct option")));
        assert!(messages.iter().any(|m| m.contains("difficulty outside")));
        assert!(messages.iter().any(|m| m.contains("question text is empty")));
        assert!(messages.iter().any(|m| m.contains("unknown question ID: q2")));
        assert!(messages.iter().any(|m| m.contains("invalid selected option")));
        assert_eq!(warnings.last().unwrap().item.as_deref(), Some("answer #1"));
    }

    #[test]
    fn build_rejects_unknown_answer() {
        let toml = r#"
[practice]
name = "x"

[[answers]]
question = "missing"
selected = "A"
"#;
        let err = parse(toml).build().unwrap_err();
        assert!(err.to_string().contains("unknown question ID: missing"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = parse_fixture_str("[practice", &PathBuf::from("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
