//! Run events published by the controller and relayed to dashboards.

use crate::models::{BugReport, CaseStatus, LogEntry, RunStatus, TestResults};
use serde::Serialize;

/// Progress events emitted while a plan generation or batch run executes.
///
/// The web layer subscribes to these and fans them out over WebSocket.
/// There is no sequence numbering: a subscriber that misses an event only
/// sees the next full snapshot, never a replay.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    /// Run status overwritten in place.
    Status(RunStatus),
    /// Results collection changed.
    Results(TestResults),
    /// One execution log line.
    Log(LogEntry),
    /// Planner produced a test plan.
    PlanGenerated { test_cases: Vec<String> },
    /// Planner failed (agent error or unparsable plan).
    PlanFailed { error: String },
    /// Per-case progress during batch execution.
    CaseUpdate {
        test_case: String,
        status: CaseStatus,
        bugs: Vec<BugReport>,
        error: Option<String>,
    },
    /// Batch reached its terminal state with all cases processed.
    Completed {
        passed: usize,
        failed: usize,
        errored: usize,
    },
    /// Batch observed the cancellation flag between cases and stopped.
    Stopped,
}
