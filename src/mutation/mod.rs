//! Mutation testing results.
//!
//! The mutation tool (Mull by default) is run by the pipeline like any other
//! command; this module only turns its textual report into numbers.

pub mod report;

pub use report::parse_report;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mutation score of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationScore {
    /// Percentage of mutants killed
    Percent(u32),
    /// No mutants were produced, or the report carried no score
    NotApplicable,
}

impl MutationScore {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Percent(p) => Some(f64::from(*p)),
            Self::NotApplicable => None,
        }
    }
}

impl std::fmt::Display for MutationScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Percent(p) => write!(f, "{}", p),
            Self::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// Metrics extracted from one mutation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationMetrics {
    pub score: MutationScore,
    pub killed: u32,
    pub survived: u32,
    pub total: u32,
    /// Where the full report was saved
    pub raw_output_ref: Option<PathBuf>,
}

impl MutationMetrics {
    pub fn not_applicable() -> Self {
        Self {
            score: MutationScore::NotApplicable,
            killed: 0,
            survived: 0,
            total: 0,
            raw_output_ref: None,
        }
    }

    /// `(score, killed, survived, total)`
    pub fn tuple(&self) -> (MutationScore, u32, u32, u32) {
        (self.score, self.killed, self.survived, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_display() {
        assert_eq!(MutationScore::Percent(62).to_string(), "62");
        assert_eq!(MutationScore::NotApplicable.to_string(), "N/A");
    }

    #[test]
    fn test_score_as_number() {
        assert_eq!(MutationScore::Percent(100).as_number(), Some(100.0));
        assert_eq!(MutationScore::NotApplicable.as_number(), None);
    }

    #[test]
    fn test_not_applicable_metrics() {
        assert_eq!(
            MutationMetrics::not_applicable().tuple(),
            (MutationScore::NotApplicable, 0, 0, 0)
        );
    }
}
