//! Data models for QAProbe test runs.
//!
//! These shapes are shared by the run controller, the HTTP layer, and the
//! persisted snapshot files, so everything here is serde-serializable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Execution status of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Passed,
    Failed,
    Error,
}

/// Bug severity, defaulting to Medium for template-parsed reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Lifecycle status of a bug report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BugStatus {
    #[default]
    Open,
    Closed,
}

/// One executed (or planned) step within a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    pub action: String,
    pub expected_result: String,
    pub status: CaseStatus,
    #[serde(default)]
    pub actual_result: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
}

/// A test case as tracked through batch execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub test_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: CaseStatus,
    #[serde(default)]
    pub test_steps: Vec<StepRecord>,
    /// Cumulative execution time in seconds.
    #[serde(default)]
    pub execution_time: f64,
    pub created_date: String,
}

impl TestCaseRecord {
    /// Creates a record for a named test case about to run.
    pub fn new(test_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            title: title.into(),
            description: String::new(),
            status: CaseStatus::NotStarted,
            test_steps: Vec::new(),
            execution_time: 0.0,
            created_date: Utc::now().to_rfc3339(),
        }
    }
}

/// A structured bug report, usually extracted from an agent narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    pub bug_id: String,
    pub title: String,
    pub description: String,
    pub steps_to_reproduce: Vec<String>,
    pub expected_behavior: String,
    pub actual_behavior: String,
    pub severity: Severity,
    pub category: String,
    pub status: BugStatus,
    pub reported_date: String,
}

/// Process-wide bug ID counter. Timestamps alone can collide across
/// concurrent runs and rapid successive parses; the counter cannot.
static BUG_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique bug identifier.
pub fn next_bug_id() -> String {
    let n = BUG_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("BUG_{}_{n}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// A timestamped coverage estimate per test dimension (heuristic, not code
/// coverage). Appended to history, never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub timestamp: String,
    /// Dimension name -> percentage.
    pub coverage: BTreeMap<String, f64>,
}

/// One line of the execution log, mirrored to connected dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock time, HH:MM:SS, for display.
    pub timestamp: String,
    pub level: String,
    pub message: String,
    /// Full RFC 3339 timestamp.
    pub datetime: String,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            timestamp: now.format("%H:%M:%S").to_string(),
            level: level.into(),
            message: message.into(),
            datetime: now.to_rfc3339(),
        }
    }
}

/// Accumulated results of testing activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    #[serde(default)]
    pub test_cases: Vec<TestCaseRecord>,
    #[serde(default)]
    pub bug_reports: Vec<BugReport>,
    #[serde(default)]
    pub coverage_reports: Vec<CoverageSnapshot>,
    #[serde(default)]
    pub execution_logs: Vec<LogEntry>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl TestResults {
    /// Drops all accumulated data.
    pub fn clear(&mut self) {
        *self = TestResults::default();
    }
}

/// Live status of the current (or most recent) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub is_running: bool,
    /// Advisory only: recorded and broadcast, but the batch loop does not
    /// halt on it. Pausing mid-agent-call is not possible.
    pub is_paused: bool,
    pub current_test_case: u32,
    pub total_test_cases: u32,
    pub progress_percentage: f64,
    pub current_url: String,
    pub status_message: String,
    #[serde(default)]
    pub test_coverage: BTreeMap<String, f64>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            is_paused: false,
            current_test_case: 0,
            total_test_cases: 0,
            progress_percentage: 0.0,
            current_url: String::new(),
            status_message: "Ready for testing".to_string(),
            test_coverage: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CaseStatus::NotStarted).unwrap(),
            "\"not_started\""
        );
        assert_eq!(
            serde_json::to_string(&CaseStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&CaseStatus::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn test_bug_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&BugStatus::Open).unwrap(), "\"OPEN\"");
    }

    #[test]
    fn test_next_bug_id_unique_in_rapid_succession() {
        let ids: Vec<String> = (0..100).map(|_| next_bug_id()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_results_round_trip() {
        let mut results = TestResults::default();
        results.test_cases.push(TestCaseRecord::new("TC_1", "Login"));
        results.recommendations.push("Add more cases".to_string());

        let json = serde_json::to_string(&results).unwrap();
        let back: TestResults = serde_json::from_str(&json).unwrap();

        assert_eq!(back.test_cases.len(), 1);
        assert_eq!(back.test_cases[0].test_id, "TC_1");
        assert_eq!(back.recommendations, results.recommendations);
    }

    #[test]
    fn test_run_status_default_not_running() {
        let status = RunStatus::default();
        assert!(!status.is_running);
        assert!(!status.is_paused);
        assert_eq!(status.status_message, "Ready for testing");
    }
}
