use crate::fixture::AnswerMap;
use crate::problem::{InputField, ProblemTree, Responder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    Correct,
    Incorrect,
}

/// Input id -> grading outcome.
pub type CorrectMap = BTreeMap<String, Correctness>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GradeError {
    #[error("answer submitted for unknown input `{0}`")]
    UnknownInput(String),
    #[error("no answer submitted for input `{0}`")]
    MissingAnswer(String),
    #[error("responder `{0}` has no answer key")]
    NoAnswerKey(String),
    #[error("answer key `{key}` of responder `{responder}` is not usable")]
    BadAnswerKey { responder: String, key: String },
    #[error("`{answer}` is not a number (input `{input}`)")]
    NotNumeric { input: String, answer: String },
}

/// The grading engine a content test is run against.
pub trait Grader {
    fn grade(&self, tree: &ProblemTree, answers: &AnswerMap) -> Result<CorrectMap, GradeError>;
}

/// Grades against `answer` attributes written into the problem definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerKeyGrader {
    pub numeric_tolerance: f64,
}

impl Default for AnswerKeyGrader {
    fn default() -> Self {
        Self {
            numeric_tolerance: DEFAULT_NUMERIC_TOLERANCE,
        }
    }
}

impl Grader for AnswerKeyGrader {
    fn grade(&self, tree: &ProblemTree, answers: &AnswerMap) -> Result<CorrectMap, GradeError> {
        if let Some(stray) = answers
            .keys()
            .find(|k| !tree.inputs().any(|(_, f)| &f.id == *k))
        {
            return Err(GradeError::UnknownInput(stray.clone()));
        }

        let mut out = CorrectMap::new();
        for (responder, field) in tree.inputs() {
            let Some(answer) = answers.get(&field.id) else {
                return Err(GradeError::MissingAnswer(field.id.clone()));
            };
            let correct = self.grade_input(responder, field, answer)?;
            out.insert(
                field.id.clone(),
                if correct {
                    Correctness::Correct
                } else {
                    Correctness::Incorrect
                },
            );
        }
        Ok(out)
    }
}

impl AnswerKeyGrader {
    fn grade_input(
        &self,
        responder: &Responder,
        field: &InputField,
        answer: &str,
    ) -> Result<bool, GradeError> {
        let key = field
            .node
            .attrs
            .get("answer")
            .or_else(|| responder.xml.attrs.get("answer"))
            .ok_or_else(|| GradeError::NoAnswerKey(responder.id.clone()))?;

        match responder.tag() {
            "numericalresponse" => self.grade_numeric(responder, field, key, answer),
            "stringresponse" => {
                let ci = responder
                    .xml
                    .attrs
                    .get("type")
                    .map(|t| t.split_whitespace().any(|w| w == "ci"))
                    .unwrap_or(false);
                if ci {
                    Ok(key.trim().to_lowercase() == answer.trim().to_lowercase())
                } else {
                    Ok(key.trim() == answer.trim())
                }
            }
            _ => Ok(key.trim() == answer.trim()),
        }
    }

    fn grade_numeric(
        &self,
        responder: &Responder,
        field: &InputField,
        key: &str,
        answer: &str,
    ) -> Result<bool, GradeError> {
        let bad_key = |k: &str| GradeError::BadAnswerKey {
            responder: responder.id.clone(),
            key: k.to_string(),
        };
        let expected: f64 = key.trim().parse().map_err(|_| bad_key(key))?;
        let given: f64 = answer.trim().parse().map_err(|_| GradeError::NotNumeric {
            input: field.id.clone(),
            answer: answer.to_string(),
        })?;

        let tolerance = match responder.xml.attrs.get("tolerance").map(|t| t.trim()) {
            None => self.numeric_tolerance,
            Some(t) => match t.strip_suffix('%') {
                Some(pct) => {
                    let pct: f64 = pct.trim().parse().map_err(|_| bad_key(t))?;
                    expected.abs() * pct / 100.0
                }
                None => t.parse().map_err(|_| bad_key(t))?,
            },
        };
        Ok((given - expected).abs() <= tolerance)
    }
}
