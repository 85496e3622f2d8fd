//! Mull report parsing.
//!
//! Mull prints differently shaped reports depending on the outcome, so the
//! cases are checked in order: no mutants, all mutants killed, then the mixed
//! report with a score line and a survivor count.

use super::{MutationMetrics, MutationScore};
use regex::Regex;
use std::sync::OnceLock;

const NO_MUTANTS_MARKER: &str = "No mutants found";
const ALL_KILLED_MARKER: &str = "All mutations have been killed";

/// Progress bar line such as `8/8. Finished`. Only the first match is used, so
/// warm-up bars printed before the mutant run (`1/1. Finished` under `--debug`)
/// make the all-killed total come out as 1.
fn finished_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)/(\d+)\.\s*Finished").expect("valid finished regex"))
}

fn score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Mutation score:\s*([0-9]+)%").expect("valid score regex"))
}

fn survived_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Survived mutants \((\d+)/(\d+)\)").expect("valid survived regex")
    })
}

fn capture_u32(caps: &regex::Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

/// Extract mutation metrics from raw report text.
pub fn parse_report(output: &str) -> MutationMetrics {
    if output.contains(NO_MUTANTS_MARKER) {
        return MutationMetrics::not_applicable();
    }

    if output.contains(ALL_KILLED_MARKER) {
        let total = finished_regex()
            .captures(output)
            .and_then(|caps| capture_u32(&caps, 2))
            .unwrap_or(0);
        return MutationMetrics {
            score: MutationScore::Percent(100),
            killed: total,
            survived: 0,
            total,
            raw_output_ref: None,
        };
    }

    let score = score_regex()
        .captures(output)
        .and_then(|caps| capture_u32(&caps, 1))
        .map(MutationScore::Percent)
        .unwrap_or(MutationScore::NotApplicable);

    let (survived, total) = survived_regex()
        .captures(output)
        .and_then(|caps| Some((capture_u32(&caps, 1)?, capture_u32(&caps, 2)?)))
        .unwrap_or((0, 0));

    MutationMetrics {
        score,
        killed: total.saturating_sub(survived),
        survived,
        total,
        raw_output_ref: None,
    }
}
