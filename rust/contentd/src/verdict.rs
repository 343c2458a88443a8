use crate::grading::{CorrectMap, Correctness, GradeError};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// What grading a content test's answers is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShouldBe {
    Correct,
    Incorrect,
    Error,
}

impl ShouldBe {
    pub fn as_str(self) -> &'static str {
        match self {
            ShouldBe::Correct => "Correct",
            ShouldBe::Incorrect => "Incorrect",
            ShouldBe::Error => "ERROR",
        }
    }
}

impl FromStr for ShouldBe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correct" => Ok(ShouldBe::Correct),
            "incorrect" => Ok(ShouldBe::Incorrect),
            "error" => Ok(ShouldBe::Error),
            other => Err(format!("unknown expected outcome: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Error,
    NotRun,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "Pass",
            Verdict::Fail => "Fail",
            Verdict::Error => "ERROR",
            Verdict::NotRun => "Not Run",
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pass" => Ok(Verdict::Pass),
            "Fail" => Ok(Verdict::Fail),
            "ERROR" => Ok(Verdict::Error),
            "Not Run" => Ok(Verdict::NotRun),
            other => Err(format!("unknown verdict: {}", other)),
        }
    }
}

macro_rules! label_impls {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

label_impls!(ShouldBe);
label_impls!(Verdict);

/// Compares a grading outcome with the expected one.
pub fn make_verdict(should_be: ShouldBe, graded: &Result<CorrectMap, GradeError>) -> Verdict {
    let correct_map = match graded {
        Ok(m) => m,
        Err(_) if should_be == ShouldBe::Error => return Verdict::Pass,
        Err(_) => return Verdict::Error,
    };

    let passing_all = correct_map
        .values()
        .all(|c| *c == Correctness::Correct);

    match (should_be, passing_all) {
        (ShouldBe::Correct, true) | (ShouldBe::Incorrect, false) => Verdict::Pass,
        _ => Verdict::Fail,
    }
}
