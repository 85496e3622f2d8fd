//! Run summaries and CSV persistence.
//!
//! Both CSV files are append-only: one row per function in the results file,
//! one row per program run in the summary file. A header is written only when
//! the file is created.

pub mod threshold;

use crate::mutation::MutationScore;
use crate::pipeline::{FunctionResult, FunctionStatus};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;

/// Aggregate outcome of one program run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub program: String,
    pub total: usize,
    pub build_success: usize,
    pub build_failure: usize,
    pub test_success: usize,
    pub test_failure: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Mean score over the functions that produced a numeric score
    pub average_score: Option<f64>,
    /// Mean mutant count over the same functions
    pub average_total: Option<f64>,
}

impl RunSummary {
    pub fn from_results(program: &str, results: &[FunctionResult]) -> Self {
        let mut summary = RunSummary {
            program: program.to_string(),
            total: results.len(),
            build_success: 0,
            build_failure: 0,
            test_success: 0,
            test_failure: 0,
            skipped: 0,
            errored: 0,
            average_score: None,
            average_total: None,
        };

        let mut score_sum = 0.0;
        let mut total_sum = 0.0;
        let mut scored = 0usize;

        for result in results {
            match result.status {
                FunctionStatus::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                FunctionStatus::Error => summary.errored += 1,
                _ => {}
            }

            if result.build_ok {
                summary.build_success += 1;
                if result.test_ok {
                    summary.test_success += 1;
                } else {
                    summary.test_failure += 1;
                }
            } else {
                summary.build_failure += 1;
            }

            if let Some(metrics) = &result.mutation {
                if let Some(score) = metrics.score.as_number() {
                    score_sum += score;
                    total_sum += f64::from(metrics.total);
                    scored += 1;
                }
            }
        }

        if scored > 0 {
            summary.average_score = Some(score_sum / scored as f64);
            summary.average_total = Some(total_sum / scored as f64);
        }
        summary
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} functions, build {}/{}, test {}/{}, {} skipped, {} errors, average score {}",
            self.program,
            self.total,
            self.build_success,
            self.build_success + self.build_failure,
            self.test_success,
            self.test_success + self.test_failure,
            self.skipped,
            self.errored,
            format_average(self.average_score),
        )
    }
}

fn format_average(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => MutationScore::NotApplicable.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    program_name: &'a str,
    function_name: &'a str,
    build: bool,
    test: bool,
    mull_score: String,
    mull_total: u32,
    mull_killed: u32,
    mull_survived: u32,
    status: &'static str,
}

impl<'a> ResultRow<'a> {
    fn new(program: &'a str, result: &'a FunctionResult) -> Self {
        let (score, killed, survived, total) = match &result.mutation {
            Some(metrics) => metrics.tuple(),
            None => (MutationScore::NotApplicable, 0, 0, 0),
        };
        Self {
            program_name: program,
            function_name: &result.function_name,
            build: result.build_ok,
            test: result.test_ok,
            mull_score: score.to_string(),
            mull_total: total,
            mull_killed: killed,
            mull_survived: survived,
            status: result.status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    program_name: &'a str,
    total: usize,
    build_success: usize,
    test_success: usize,
    mull_score: String,
    mull_total: String,
}

/// Append rows to `path`, writing the header first if the file is new.
fn append_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Append one row per function result.
pub fn append_results(path: &Path, program: &str, results: &[FunctionResult]) -> Result<()> {
    append_rows(path, results.iter().map(|r| ResultRow::new(program, r)))
}

/// Append the summary row of one run.
pub fn append_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    append_rows(
        path,
        [SummaryRow {
            program_name: &summary.program,
            total: summary.total,
            build_success: summary.build_success,
            test_success: summary.test_success,
            mull_score: format_average(summary.average_score),
            mull_total: format_average(summary.average_total),
        }],
    )
}
