//! Core domain logic for QAProbe.
//!
//! Owns the test configuration and result models, the prompts sent to the
//! browser agent, the parsers that turn agent narratives into structured
//! plans and bug reports, the run controller that drives batches, and the
//! JSON persistence layer.

pub mod config;
pub mod controller;
pub mod events;
pub mod models;
pub mod prompts;
pub mod report;
pub mod sample;
pub mod store;

pub use config::{ConfigUpdate, TestConfig};
pub use controller::{
    RunController, RunGuard, SharedConfig, SharedResults, SharedStatus, read_lock, write_lock,
};
pub use events::RunEvent;
pub use models::{
    BugReport, BugStatus, CaseStatus, CoverageSnapshot, LogEntry, RunStatus, Severity,
    StepRecord, TestCaseRecord, TestResults, next_bug_id,
};
pub use report::{
    ParsedBugs, PlanParseError, Verdict, final_verdict, parse_bug_reports, parse_test_plan,
};
pub use store::{ResultsSnapshot, StoreError};
