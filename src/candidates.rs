//! Candidate functions delivered by the function extractor.
//!
//! Each program has a `<program>_injectable_functions.json` file holding an
//! array of `{function_name, function_signature, test_filename?}` objects.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CANDIDATES_SUFFIX: &str = "_injectable_functions.json";

/// A function to run through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCandidate {
    #[serde(rename = "function_name")]
    pub name: String,
    #[serde(rename = "function_signature")]
    pub signature: String,
    /// Generated test source, e.g. `tests_trees_bi_reverse.c`
    #[serde(rename = "test_filename", default, skip_serializing_if = "Option::is_none")]
    pub test_source_name: Option<String>,
}

impl FunctionCandidate {
    /// Build target for the test binary: the test file name up to its first `.`.
    pub fn test_target(&self) -> Option<&str> {
        let name = self.test_source_name.as_deref()?.trim();
        let target = name.split('.').next().unwrap_or(name);
        (!target.is_empty()).then_some(target)
    }
}

#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("no candidates: {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("failed to read candidates from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse candidates from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a candidates file.
pub fn load_candidates(path: &Path) -> Result<Vec<FunctionCandidate>, CandidateError> {
    if !path.exists() {
        return Err(CandidateError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| CandidateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CandidateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Programs that have a candidates file in `dir`, sorted by name.
pub fn discover_programs(dir: &Path) -> Vec<String> {
    let pattern = dir.join(format!("*{}", CANDIDATES_SUFFIX));
    let Some(pattern) = pattern.to_str() else {
        tracing::warn!("Candidates directory is not valid UTF-8: {}", dir.display());
        return Vec::new();
    };

    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Invalid candidates pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };

    let mut programs: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|path| {
            path.file_name()?
                .to_str()?
                .strip_suffix(CANDIDATES_SUFFIX)
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .collect();
    programs.sort();
    programs
}
