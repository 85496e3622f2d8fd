//! Count functions whose mutation score beats a threshold.

use anyhow::{Context, Result};
use std::path::Path;

const SCORE_COLUMN: &str = "mull_score";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdCount {
    /// Rows with a numeric score strictly above the threshold
    pub above: usize,
    /// Rows with a numeric score
    pub scored: usize,
    pub rows: usize,
}

/// Scan a results CSV. `N/A` and other non-numeric scores are ignored.
pub fn count_above(path: &Path, threshold: f64) -> Result<ThresholdCount> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read CSV: {}", path.display()))?;
    let column = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .position(|h| h.trim() == SCORE_COLUMN)
        .with_context(|| format!("{} has no {} column", path.display(), SCORE_COLUMN))?;

    let mut count = ThresholdCount {
        above: 0,
        scored: 0,
        rows: 0,
    };
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("Failed to read CSV record {} in {}", i + 1, path.display())
        })?;
        count.rows += 1;

        let Some(score) = record.get(column).and_then(|s| s.trim().parse::<f64>().ok()) else {
            continue;
        };
        count.scored += 1;
        if score > threshold {
            count.above += 1;
        }
    }
    Ok(count)
}
