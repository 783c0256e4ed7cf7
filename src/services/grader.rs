use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::schemas::submission::GradingResult;

/// Reference answers of the stub, keyed by problem id.
#[derive(Debug, Clone, Default)]
pub(crate) struct AnswerKey {
    answers: HashMap<i64, String>,
}

impl AnswerKey {
    pub(crate) fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        Self { answers: pairs.into_iter().map(|(id, answer)| (id, answer.into())).collect() }
    }

    /// Reads a JSON object such as `{"1": "42", "2": "-3/4"}`.
    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, String> =
            serde_json::from_str(raw).context("Answer key must be a JSON object of strings")?;

        let pairs = parsed
            .into_iter()
            .map(|(key, answer)| {
                let problem_id = key
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("Answer key entry '{key}' is not a problem id"))?;
                Ok((problem_id, answer))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_pairs(pairs))
    }

    pub(crate) async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read answer key {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub(crate) fn answer_for(&self, problem_id: i64) -> Option<&str> {
        self.answers.get(&problem_id).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.answers.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AnswerCheck {
    pub(crate) is_correct: bool,
    pub(crate) confidence: f64,
}

pub(crate) fn normalize_answer(text: &str) -> String {
    text.trim().replace(' ', "").replace('\u{2212}', "-")
}

pub(crate) fn check_answer(student_answer: Option<&str>, correct_answer: Option<&str>) -> AnswerCheck {
    let student = student_answer.map(normalize_answer).unwrap_or_default();
    let correct = correct_answer.map(normalize_answer).unwrap_or_default();

    if !student.is_empty() && student == correct {
        AnswerCheck { is_correct: true, confidence: 1.0 }
    } else {
        AnswerCheck { is_correct: false, confidence: 0.0 }
    }
}

/// Weighted blend of answer correctness and the logical flow score.
pub(crate) fn final_score(answer_correct: bool, logical_score: f64) -> f64 {
    let answer = if answer_correct { 1.0 } else { 0.0 };
    let (answer_weight, solution_weight) = if answer_correct {
        (0.4, 0.6)
    } else if logical_score > 0.0 {
        (0.2, 0.8)
    } else {
        (0.5, 0.5)
    };

    answer_weight * answer + solution_weight * logical_score
}

pub(crate) fn grade_problem(
    answer_key: &AnswerKey,
    problem_id: i64,
    student_answer: Option<&str>,
) -> GradingResult {
    let check = check_answer(student_answer, answer_key.answer_for(problem_id));
    let logical_flow_score = if check.is_correct { 1.0 } else { 0.0 };
    let score = final_score(check.is_correct, logical_flow_score);

    let (first_error_step_index, error_summary, hint_provided) = if check.is_correct {
        (None, None, None)
    } else if student_answer.map(normalize_answer).unwrap_or_default().is_empty() {
        (
            Some(0),
            Some("No final answer was provided".to_string()),
            Some("Write your final answer clearly at the end of the solution".to_string()),
        )
    } else {
        (
            Some(0),
            Some("Final answer does not match the reference".to_string()),
            Some("Re-check each step of your computation".to_string()),
        )
    };

    GradingResult {
        problem_id,
        answer_is_correct: check.is_correct,
        answer_confidence: check.confidence,
        logical_flow_score,
        percentage: score * 100.0,
        first_error_step_index,
        error_summary,
        hint_provided,
        final_score: Some(score),
    }
}
