//! Narrative parsing: bug report extraction, test plan decoding, verdicts.
//!
//! The agent's final output is semi-structured markdown. Bug reports are
//! pulled out with a fixed-template regex; blocks that open with the header
//! but do not fully match are skipped whole (never partially parsed) and
//! surfaced via a skip count so they stay observable in tests and logs.

use crate::models::{BugReport, BugStatus, Severity, next_bug_id};
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

/// Header that opens every templated bug block.
const BUG_HEADER: &str = "## Bug Report";

static BUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Summary, expected and actual are single lines in the template; keeping
    // them line-bound stops a malformed block from swallowing the next one.
    Regex::new(
        r"(?s)## Bug Report\n\n\*\*Bug Summary:\*\* ([^\n]+)\n\n\*\*Description:\*\* (.*?)\n\n\*\*Steps to Reproduce:\*\*\n(.*?)\n\n\*\*Expected Result:\*\* ([^\n]+)\n\n\*\*Actual Result:\*\* ([^\n]+)",
    )
    .expect("bug report pattern is valid")
});

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").expect("fenced json pattern is valid")
});

/// Bug reports extracted from one narrative, plus the number of blocks that
/// opened with the header but deviated from the template.
#[derive(Debug, Clone, Default)]
pub struct ParsedBugs {
    pub bugs: Vec<BugReport>,
    pub skipped_blocks: usize,
}

/// Extracts templated bug reports from an agent narrative.
///
/// Zero matches is not an error: it means the agent reported no bugs.
/// Verdict tokens, not bug counts, are the authoritative outcome; see
/// [`final_verdict`].
pub fn parse_bug_reports(narrative: &str) -> ParsedBugs {
    let now = Utc::now().to_rfc3339();
    let mut bugs = Vec::new();

    for caps in BUG_PATTERN.captures_iter(narrative) {
        let steps = caps[3]
            .lines()
            .map(strip_enumeration)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        bugs.push(BugReport {
            bug_id: next_bug_id(),
            title: caps[1].trim().to_string(),
            description: caps[2].trim().to_string(),
            steps_to_reproduce: steps,
            expected_behavior: caps[4].trim().to_string(),
            actual_behavior: caps[5].trim().to_string(),
            severity: Severity::Medium,
            category: "Functional".to_string(),
            status: BugStatus::Open,
            reported_date: now.clone(),
        });
    }

    let headers = narrative.matches(BUG_HEADER).count();
    let skipped_blocks = headers.saturating_sub(bugs.len());
    if skipped_blocks > 0 {
        tracing::warn!(
            skipped = skipped_blocks,
            "Bug blocks did not match the report template and were skipped"
        );
    }

    ParsedBugs {
        bugs,
        skipped_blocks,
    }
}

/// Strips leading enumeration markers (digits, punctuation, whitespace)
/// from a reproduce-steps line.
fn strip_enumeration(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | ' '))
        .trim()
}

/// Failure decoding a planner narrative into a test plan.
///
/// This is the one parse failure that is not swallowed: an empty or garbled
/// plan blocks the entire downstream batch.
#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("planner output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("planner output has no \"test_cases\" key")]
    MissingTestCases,
    #[error("\"test_cases\" must be an array of strings")]
    NotStrings,
}

/// Decodes the planner narrative into an ordered list of test case names.
///
/// Prefers a fenced JSON code block; falls back to parsing the whole
/// narrative as JSON.
pub fn parse_test_plan(narrative: &str) -> Result<Vec<String>, PlanParseError> {
    let json_text = FENCED_JSON
        .captures(narrative)
        .map_or(narrative.trim(), |caps| caps.get(1).map_or("", |m| m.as_str()));

    let value: serde_json::Value = serde_json::from_str(json_text)?;

    let cases = value
        .get("test_cases")
        .ok_or(PlanParseError::MissingTestCases)?
        .as_array()
        .ok_or(PlanParseError::NotStrings)?;

    cases
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(PlanParseError::NotStrings)
        })
        .collect()
}

/// Authoritative verdict token at the tail of an executor narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Unknown,
}

/// Reads the trailing `PASS`/`FAIL` token, tolerating surrounding
/// backticks and punctuation.
pub fn final_verdict(narrative: &str) -> Verdict {
    let last = narrative
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_matches(|c: char| matches!(c, '`' | '*' | '.' | ':' | '!' | '"' | '\''));

    match last {
        "PASS" => Verdict::Pass,
        "FAIL" => Verdict::Fail,
        _ => Verdict::Unknown,
    }
}
