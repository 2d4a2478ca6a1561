//! Feedback prompt construction.

use std::fmt::Write as _;

use crate::model::{AnswerOption, Attempt, Language, Question, Section};
use crate::traits::GenerationRequest;

/// Version tag stored on every feedback record.
pub const PROMPT_VERSION: &str = "v1.0.0";
pub const FEEDBACK_TEMPERATURE: f64 = 0.7;
pub const FEEDBACK_MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT_ID: &str = "Kamu adalah tutor UTBK yang sabar dan berpengalaman.
Berikan feedback kepada siswa yang baru saja menjawab soal latihan.

Panduan:
- Tetap menyemangati, juga ketika jawabannya salah
- Jelaskan alasan jawaban yang benar
- Bila siswa keliru, tunjukkan letak kesalahannya dengan sopan
- Cukup 2-4 kalimat yang padat
- Gunakan bahasa sederhana untuk siswa SMA
- Tambahkan tips singkat bila membantu

Jawab dalam Bahasa Indonesia.";

const SYSTEM_PROMPT_EN: &str = "You are a patient, experienced UTBK (Indonesian university entrance exam) tutor.
Give feedback to a student who has just answered a practice question.

Guidelines:
- Stay encouraging, also when the answer is wrong
- Explain why the correct answer is correct
- If the student was wrong, point out the mistake kindly
- Keep it to 2-4 focused sentences
- Use plain language suitable for high school students
- Add a short tip when it helps

Respond in English.";

/// Everything the feedback prompt mentions about one answer.
#[derive(Debug, Clone)]
pub struct FeedbackPrompt<'a> {
    pub section: Section,
    pub sub_type: Option<&'a str>,
    pub question_text: &'a str,
    pub options: &'a [String; 5],
    pub correct_option: AnswerOption,
    pub selected_option: AnswerOption,
    pub is_correct: bool,
    pub explanation: Option<&'a str>,
    pub language: Language,
}

impl<'a> FeedbackPrompt<'a> {
    pub fn new(question: &'a Question, attempt: &Attempt, language: Language) -> Self {
        Self {
            section: question.section,
            sub_type: question.sub_type.as_deref().filter(|s| !s.is_empty()),
            question_text: &question.text,
            options: &question.options,
            correct_option: question.correct_option,
            selected_option: attempt.selected_option,
            is_correct: attempt.is_correct,
            explanation: question.explanation.as_deref().filter(|s| !s.is_empty()),
            language,
        }
    }

    pub fn user_prompt(&self) -> String {
        let labels = match self.language {
            Language::Indonesian => Labels::INDONESIAN,
            Language::English => Labels::ENGLISH,
        };
        let verdict = if self.is_correct {
            labels.correct
        } else {
            labels.incorrect
        };

        let mut out = String::new();
        let _ = write!(out, "{}: {}", labels.section, self.section);
        if let Some(sub_type) = self.sub_type {
            let _ = write!(out, " ({sub_type})");
        }
        let _ = write!(out, "\n\n{}:\n{}\n\n", labels.question, self.question_text);

        let _ = writeln!(out, "{}:", labels.options);
        for (option, text) in AnswerOption::ALL.iter().zip(self.options) {
            let _ = writeln!(out, "{option}. {text}");
        }
        out.push('\n');

        let _ = writeln!(out, "{}: {}", labels.correct_answer, self.correct_option);
        let _ = writeln!(
            out,
            "{}: {} ({verdict})",
            labels.student_answer, self.selected_option
        );
        if let Some(explanation) = self.explanation {
            let _ = writeln!(out, "\n{}: {explanation}", labels.explanation);
        }
        out.push('\n');
        out.push_str(labels.closing);
        out
    }

    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest {
            system_prompt: system_prompt(self.language).to_string(),
            user_prompt: self.user_prompt(),
            max_tokens: FEEDBACK_MAX_TOKENS,
            temperature: FEEDBACK_TEMPERATURE,
        }
    }
}

pub fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::Indonesian => SYSTEM_PROMPT_ID,
        Language::English => SYSTEM_PROMPT_EN,
    }
}

struct Labels {
    section: &'static str,
    question: &'static str,
    options: &'static str,
    correct_answer: &'static str,
    student_answer: &'static str,
    explanation: &'static str,
    correct: &'static str,
    incorrect: &'static str,
    closing: &'static str,
}

impl Labels {
    const INDONESIAN: Labels = Labels {
        section: "Subtes",
        question: "Soal",
        options: "Pilihan",
        correct_answer: "Jawaban Benar",
        student_answer: "Jawaban Siswa",
        explanation: "Penjelasan Referensi",
        correct: "BENAR",
        incorrect: "SALAH",
        closing: "Berikan feedback singkat yang membantu siswa.",
    };

    const ENGLISH: Labels = Labels {
        section: "Section",
        question: "Question",
        options: "Options",
        correct_answer: "Correct Answer",
        student_answer: "Student's Answer",
        explanation: "Reference Explanation",
        correct: "CORRECT",
        incorrect: "INCORRECT",
        closing: "Give the student short, helpful feedback.",
    };
}
