//! Test run controller.
//!
//! Coordinates plan generation and batch execution: builds prompts, invokes
//! the agent runtime, parses narratives, reconciles shared state, and
//! publishes progress events.
//!
//! Concurrency model: the HTTP layer spawns one background task per run and
//! returns immediately. A run token enforces a single active run; starting
//! while the token is held fails fast. Cancellation is cooperative and
//! observed only at case boundaries, because the agent call cannot be
//! interrupted mid-flight: a stop request takes effect only after the
//! in-flight case returns, which can take up to one full step budget.

use crate::config::TestConfig;
use crate::events::RunEvent;
use crate::models::{
    BugReport, BugStatus, CaseStatus, CoverageSnapshot, LogEntry, RunStatus, Severity,
    TestCaseRecord, TestResults, next_bug_id,
};
use crate::prompts;
use crate::report::{self, Verdict};
use crate::store::{self, ResultsSnapshot};
use chrono::Utc;
use qaprobe_agent::{AgentError, AgentInvocation, AgentRuntime, validate_credential};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::broadcast;

/// Shared configuration handle.
pub type SharedConfig = Arc<RwLock<TestConfig>>;
/// Shared results handle.
pub type SharedResults = Arc<RwLock<TestResults>>;
/// Shared run status handle.
pub type SharedStatus = Arc<RwLock<RunStatus>>;

/// Step budget for the planner agent (it only produces the plan).
const PLANNER_STEP_BUDGET: u32 = 1;
/// Step budget for executing one test case.
const EXECUTOR_STEP_BUDGET: u32 = 8;
/// Event channel capacity; slow subscribers drop events, they are snapshots
/// anyway.
const EVENT_CAPACITY: usize = 64;

/// Exclusive token for the single active run.
///
/// Released on drop so a panicking or early-returning task cannot wedge the
/// controller.
pub struct RunGuard {
    active: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Coordinates test runs against the shared state.
pub struct RunController {
    config: SharedConfig,
    results: SharedResults,
    status: SharedStatus,
    runtime: Arc<dyn AgentRuntime>,
    events: broadcast::Sender<RunEvent>,
    stop_flag: Arc<AtomicBool>,
    run_active: Arc<AtomicBool>,
    data_dir: PathBuf,
}

impl RunController {
    pub fn new(
        config: SharedConfig,
        results: SharedResults,
        status: SharedStatus,
        runtime: Arc<dyn AgentRuntime>,
        data_dir: PathBuf,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            results,
            status,
            runtime,
            events,
            stop_flag: Arc::new(AtomicBool::new(false)),
            run_active: Arc::new(AtomicBool::new(false)),
            data_dir,
        }
    }

    /// Subscribes to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Publishes an event to all subscribers. Send errors just mean nobody
    /// is listening.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    /// Tries to acquire the run token. Returns None when a run is active.
    pub fn try_begin_run(&self) -> Option<RunGuard> {
        if self
            .run_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.stop_flag.store(false, Ordering::SeqCst);
            Some(RunGuard {
                active: Arc::clone(&self.run_active),
            })
        } else {
            None
        }
    }

    /// Whether a run currently holds the token.
    pub fn is_run_active(&self) -> bool {
        self.run_active.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the active run, effective at the next case
    /// boundary.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Appends a log entry to the results and broadcasts it.
    pub fn log(&self, level: &str, message: impl Into<String>) {
        let entry = self.emit_log(level, message);
        write_lock(&self.results).execution_logs.push(entry);
    }

    /// Broadcasts a log line without recording it. Plan generation logs
    /// this way so the results store stays untouched until a run starts.
    fn emit_log(&self, level: &str, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);
        tracing::info!(level = %entry.level, "{}", entry.message);
        self.publish(RunEvent::Log(entry.clone()));
        entry
    }

    /// Builds an agent invocation from the current configuration. Fails
    /// eagerly when the provider's credential is missing.
    fn invocation(&self, task: String, max_steps: u32) -> Result<AgentInvocation, AgentError> {
        let config = read_lock(&self.config).clone();
        let credential = config.credential_for(config.provider).map(str::to_string);
        validate_credential(config.provider, credential.as_deref())?;

        let browser = config.browser_options();
        Ok(AgentInvocation {
            task,
            provider: config.provider,
            model: config.model,
            credential,
            max_steps,
            browser,
        })
    }

    /// Generates a test plan for `url` with a single planner invocation.
    ///
    /// Publishes `PlanGenerated` or `PlanFailed`; does not touch the
    /// results collection.
    pub async fn generate_plan(&self, _guard: RunGuard, url: &str) {
        self.emit_log("INFO", format!("Starting test plan generation for {url}"));

        let invocation = match self.invocation(prompts::planner_prompt(url), PLANNER_STEP_BUDGET) {
            Ok(inv) => inv,
            Err(e) => {
                self.plan_failed(e.to_string());
                return;
            }
        };

        let narrative = match self.runtime.run(invocation).await {
            Ok(history) => history.final_narrative(),
            Err(e) => {
                self.plan_failed(e.to_string());
                return;
            }
        };

        match report::parse_test_plan(&narrative) {
            Ok(test_cases) => {
                self.emit_log(
                    "INFO",
                    format!("Planner produced {} test cases", test_cases.len()),
                );
                self.publish(RunEvent::PlanGenerated { test_cases });
            }
            Err(e) => self.plan_failed(e.to_string()),
        }
    }

    fn plan_failed(&self, error: String) {
        self.emit_log("ERROR", format!("Test plan generation failed: {error}"));
        self.publish(RunEvent::PlanFailed { error });
    }

    /// Executes test cases strictly in order, one at a time.
    ///
    /// A per-case failure is recorded and the batch continues; the batch
    /// always reaches a terminal `Completed` or `Stopped` event.
    pub async fn execute_batch(&self, _guard: RunGuard, test_cases: Vec<String>) {
        let total = test_cases.len();
        self.log("INFO", format!("Starting execution of {total} test cases"));

        let url = read_lock(&self.config).website_url.clone();
        {
            let mut status = write_lock(&self.status);
            status.is_running = true;
            status.is_paused = false;
            status.current_test_case = 0;
            status.total_test_cases = total as u32;
            status.progress_percentage = 0.0;
            status.current_url = url.clone();
            status.status_message = "Executing test cases".to_string();
        }
        self.publish_status();

        let mut stopped = false;

        for (index, test_case) in test_cases.iter().enumerate() {
            if self.stop_requested() {
                stopped = true;
                break;
            }

            {
                let mut status = write_lock(&self.status);
                status.current_test_case = (index + 1) as u32;
                status.status_message = format!(
                    "Running test case {}/{}: {test_case}",
                    index + 1,
                    total
                );
            }
            self.publish_status();
            self.log(
                "INFO",
                format!("Running test case {}/{}: {test_case}", index + 1, total),
            );
            self.publish(RunEvent::CaseUpdate {
                test_case: test_case.clone(),
                status: CaseStatus::InProgress,
                bugs: Vec::new(),
                error: None,
            });

            self.run_one_case(index, test_case, &url).await;

            {
                let mut status = write_lock(&self.status);
                status.progress_percentage = ((index + 1) as f64 / total as f64) * 100.0;
            }
            self.publish_status();
            self.publish(RunEvent::Results(read_lock(&self.results).clone()));
            self.persist_snapshot();
        }

        self.finish_batch(stopped);
    }

    /// Runs one case: invoke, parse, reconcile into results.
    async fn run_one_case(&self, index: usize, test_case: &str, url: &str) {
        let record = TestCaseRecord::new(format!("TC_{}", index + 1), test_case);
        let prompt = prompts::executor_prompt(url, test_case);
        self.run_case_with_prompt(record, prompt, test_case).await;
    }

    /// Shared tail of case execution: invoke the agent with `prompt`, parse
    /// the narrative, and record the outcome under `record`.
    async fn run_case_with_prompt(
        &self,
        mut record: TestCaseRecord,
        prompt: String,
        test_case: &str,
    ) {
        let started = Instant::now();

        let outcome = match self.invocation(prompt, EXECUTOR_STEP_BUDGET) {
            Ok(invocation) => self.runtime.run(invocation).await,
            Err(e) => Err(e),
        };

        record.execution_time = started.elapsed().as_secs_f64();

        match outcome {
            Ok(history) => {
                let narrative = history.final_narrative();
                let parsed = report::parse_bug_reports(&narrative);
                if parsed.skipped_blocks > 0 {
                    self.log(
                        "WARN",
                        format!(
                            "{} bug blocks in '{test_case}' did not match the template and were skipped",
                            parsed.skipped_blocks
                        ),
                    );
                }

                // FAIL when any bug parsed or the narrative says so.
                let failed =
                    !parsed.bugs.is_empty() || report::final_verdict(&narrative) == Verdict::Fail;
                record.status = if failed {
                    CaseStatus::Failed
                } else {
                    CaseStatus::Passed
                };

                self.log(
                    if failed { "WARN" } else { "INFO" },
                    format!(
                        "Test case '{test_case}' {} with {} bug report(s)",
                        if failed { "FAILED" } else { "PASSED" },
                        parsed.bugs.len()
                    ),
                );
                self.publish(RunEvent::CaseUpdate {
                    test_case: test_case.to_string(),
                    status: record.status,
                    bugs: parsed.bugs.clone(),
                    error: None,
                });

                let mut results = write_lock(&self.results);
                results.bug_reports.extend(parsed.bugs);
                results.test_cases.push(record);
            }
            Err(e) => {
                record.status = CaseStatus::Error;
                self.log("ERROR", format!("Error running test case '{test_case}': {e}"));
                self.publish(RunEvent::CaseUpdate {
                    test_case: test_case.to_string(),
                    status: CaseStatus::Error,
                    bugs: Vec::new(),
                    error: Some(e.to_string()),
                });
                write_lock(&self.results).test_cases.push(record);
            }
        }
    }

    /// Terminal bookkeeping: coverage snapshot, recommendations, status.
    ///
    /// Locks are taken one at a time. Holding the results guard while
    /// waiting on the status lock would invert the order used by snapshot
    /// readers and wedge both tasks.
    fn finish_batch(&self, stopped: bool) {
        let (coverage, counts) = {
            let mut results = write_lock(&self.results);

            let coverage = if stopped {
                None
            } else {
                let coverage = estimate_coverage(&results);
                results.coverage_reports.push(CoverageSnapshot {
                    timestamp: Utc::now().to_rfc3339(),
                    coverage: coverage.clone(),
                });
                results.recommendations = build_recommendations(&results, &coverage);
                Some(coverage)
            };

            (coverage, count_outcomes(&results))
        };
        let (passed, failed, errored) = counts;

        {
            let mut status = write_lock(&self.status);
            if let Some(coverage) = coverage {
                status.test_coverage = coverage;
            }
            status.is_running = false;
            status.status_message = if stopped {
                "Test run stopped".to_string()
            } else {
                format!("Test run completed: {passed} passed, {failed} failed, {errored} errored")
            };
        }
        self.publish_status();
        self.publish(RunEvent::Results(read_lock(&self.results).clone()));
        self.persist_snapshot();

        if stopped {
            self.log("INFO", "Test execution stopped by request");
            self.publish(RunEvent::Stopped);
        } else {
            self.log("INFO", "Test execution completed");
            self.publish(RunEvent::Completed {
                passed,
                failed,
                errored,
            });
        }
    }

    /// Full run: generate a plan for `url`, then execute it.
    ///
    /// A planning failure is a whole-run failure: it is recorded as a
    /// CRITICAL bug report and the run terminates with a `Completed` event
    /// so dashboards always see a terminal broadcast.
    pub async fn run_full(&self, guard: RunGuard, url: String) {
        self.log("INFO", format!("Starting full test run for {url}"));

        let plan = match self.invocation(prompts::planner_prompt(&url), PLANNER_STEP_BUDGET) {
            Ok(inv) => match self.runtime.run(inv).await {
                Ok(history) => {
                    report::parse_test_plan(&history.final_narrative()).map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match plan {
            Ok(test_cases) if !test_cases.is_empty() => {
                self.publish(RunEvent::PlanGenerated {
                    test_cases: test_cases.clone(),
                });
                self.execute_batch(guard, test_cases).await;
            }
            Ok(_) => self.fail_run(&url, "Planner returned an empty test plan".to_string()),
            Err(error) => self.fail_run(&url, error),
        }
    }

    /// Exploratory run: one agent pass following the configured custom
    /// instructions, recorded as a single test case.
    pub async fn run_exploratory(&self, _guard: RunGuard, url: String) {
        self.log("INFO", format!("Starting exploratory test of {url}"));

        {
            let mut status = write_lock(&self.status);
            status.is_running = true;
            status.is_paused = false;
            status.current_test_case = 1;
            status.total_test_cases = 1;
            status.progress_percentage = 0.0;
            status.current_url = url.clone();
            status.status_message = "Running exploratory test".to_string();
        }
        self.publish_status();

        let prompt = {
            let config = read_lock(&self.config);
            prompts::exploratory_prompt(&url, &config.custom_prompt)
        };
        let record = TestCaseRecord::new("TC_EXPLORATORY", "Exploratory test");
        self.run_case_with_prompt(record, prompt, "Exploratory test")
            .await;

        {
            let mut status = write_lock(&self.status);
            status.progress_percentage = 100.0;
        }
        self.finish_batch(false);
    }

    /// Records a whole-run failure and publishes the terminal event.
    fn fail_run(&self, url: &str, error: String) {
        self.log("ERROR", format!("Test run failed: {error}"));

        {
            let mut results = write_lock(&self.results);
            results.bug_reports.push(BugReport {
                bug_id: next_bug_id(),
                title: "Test run failed before execution".to_string(),
                description: error.clone(),
                steps_to_reproduce: vec![format!("Start a test run against {url}")],
                expected_behavior: "A test plan is generated and executed".to_string(),
                actual_behavior: error.clone(),
                severity: Severity::Critical,
                category: "Test Infrastructure".to_string(),
                status: BugStatus::Open,
                reported_date: Utc::now().to_rfc3339(),
            });
        }

        {
            let mut status = write_lock(&self.status);
            status.is_running = false;
            status.status_message = format!("Test run failed: {error}");
        }

        self.publish(RunEvent::PlanFailed { error });
        self.publish_status();
        self.publish(RunEvent::Results(read_lock(&self.results).clone()));
        self.persist_snapshot();
        self.publish(RunEvent::Completed {
            passed: 0,
            failed: 0,
            errored: 0,
        });
    }

    fn publish_status(&self) {
        self.publish(RunEvent::Status(read_lock(&self.status).clone()));
    }

    /// Best-effort snapshot write; a failed write is logged and ignored.
    pub fn persist_snapshot(&self) {
        // One read guard at a time, matching the writers.
        let status = read_lock(&self.status).clone();
        let results = read_lock(&self.results).clone();
        let config = read_lock(&self.config).clone();
        let snapshot = ResultsSnapshot::new(status, results, config);
        if let Err(e) = store::save_snapshot(&self.data_dir, &snapshot) {
            tracing::warn!("Failed to persist results snapshot: {e}");
        }
    }
}

/// Poison-tolerant read: a panicked writer cannot make state unreadable.
pub fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Poison-tolerant write.
pub fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn count_outcomes(results: &TestResults) -> (usize, usize, usize) {
    let passed = results
        .test_cases
        .iter()
        .filter(|c| c.status == CaseStatus::Passed)
        .count();
    let failed = results
        .test_cases
        .iter()
        .filter(|c| c.status == CaseStatus::Failed)
        .count();
    let errored = results
        .test_cases
        .iter()
        .filter(|c| c.status == CaseStatus::Error)
        .count();
    (passed, failed, errored)
}

/// Heuristic coverage estimate: breadth grows with executed cases, scaled
/// per dimension by how strongly this kind of testing exercises it. Not
/// code coverage.
fn estimate_coverage(results: &TestResults) -> BTreeMap<String, f64> {
    let total = results.test_cases.len();
    let breadth = (total.min(10) * 10) as f64;
    let (passed, _, _) = count_outcomes(results);
    let pass_rate = if total > 0 {
        passed as f64 / total as f64
    } else {
        0.0
    };
    // Confidence discounts breadth when most cases failed to complete.
    let confidence = 0.5 + pass_rate / 2.0;

    [
        ("Functional Testing", 1.0),
        ("UI/UX Testing", 0.75),
        ("Content Testing", 0.9),
        ("Navigation Testing", 0.8),
    ]
    .into_iter()
    .map(|(dimension, weight)| {
        (
            dimension.to_string(),
            (breadth * weight * confidence).min(100.0),
        )
    })
    .collect()
}

fn build_recommendations(
    results: &TestResults,
    coverage: &BTreeMap<String, f64>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for (dimension, value) in coverage {
        if *value < 70.0 {
            recommendations.push(format!(
                "Increase test coverage for {dimension} (currently {value:.1}%)"
            ));
        }
    }

    let open_severe = results
        .bug_reports
        .iter()
        .filter(|b| {
            b.status == BugStatus::Open
                && matches!(b.severity, Severity::High | Severity::Critical)
        })
        .count();
    if open_severe > 0 {
        recommendations.push(format!(
            "Focus on fixing {open_severe} high-severity bugs first"
        ));
    }

    let (_, failed, errored) = count_outcomes(results);
    if failed + errored > 0 {
        recommendations.push(format!(
            "Re-run the {} failed or errored test cases after fixes",
            failed + errored
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qaprobe_agent::{AgentHistory, AgentStep, Provider};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Runtime that replays a scripted sequence of outcomes.
    struct ScriptedRuntime {
        outcomes: Mutex<VecDeque<Result<AgentHistory, AgentError>>>,
    }

    impl ScriptedRuntime {
        fn new(outcomes: Vec<Result<AgentHistory, AgentError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn run(&self, _invocation: AgentInvocation) -> Result<AgentHistory, AgentError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::ExecutionFailed("script exhausted".into())))
        }
    }

    fn narrative(text: &str) -> Result<AgentHistory, AgentError> {
        Ok(AgentHistory {
            steps: vec![AgentStep {
                is_done: true,
                long_term_memory: Some(text.to_string()),
            }],
        })
    }

    fn controller(
        outcomes: Vec<Result<AgentHistory, AgentError>>,
        temp: &TempDir,
    ) -> RunController {
        let mut config = TestConfig::default();
        config.provider = Provider::Ollama;
        config.model = "llama3".to_string();

        RunController::new(
            Arc::new(RwLock::new(config)),
            Arc::new(RwLock::new(TestResults::default())),
            Arc::new(RwLock::new(RunStatus::default())),
            Arc::new(ScriptedRuntime::new(outcomes)),
            temp.path().to_path_buf(),
        )
    }

    fn bug_block() -> &'static str {
        "## Bug Report\n\n\
         **Bug Summary:** Cart is empty after add\n\n\
         **Description:** Item vanished.\n\n\
         **Steps to Reproduce:**\n\
         1. Add item\n\
         2. Open cart\n\n\
         **Expected Result:** Item listed\n\n\
         **Actual Result:** Cart empty\n\nFAIL"
    }

    #[tokio::test]
    async fn test_batch_continues_past_case_error() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![
                Err(AgentError::ExecutionFailed("browser crashed".into())),
                narrative("Everything worked.\n\nPASS"),
            ],
            &temp,
        );

        let guard = ctl.try_begin_run().unwrap();
        ctl.execute_batch(guard, vec!["caseA".into(), "caseB".into()])
            .await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases.len(), 2);
        assert_eq!(results.test_cases[0].status, CaseStatus::Error);
        assert_eq!(results.test_cases[1].status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn test_batch_verdicts_and_bug_collection() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![narrative("Fine.\n\nPASS"), narrative(bug_block())],
            &temp,
        );

        let guard = ctl.try_begin_run().unwrap();
        ctl.execute_batch(guard, vec!["login".into(), "cart".into()])
            .await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases[0].status, CaseStatus::Passed);
        assert_eq!(results.test_cases[1].status, CaseStatus::Failed);
        assert_eq!(results.bug_reports.len(), 1);
        assert_eq!(results.bug_reports[0].title, "Cart is empty after add");

        // Terminal state reached, coverage appended
        let status = read_lock(&ctl.status);
        assert!(!status.is_running);
        assert_eq!(results.coverage_reports.len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_fail_token_without_bugs_fails_case() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![narrative("Something was off but no template used.\n\nFAIL")],
            &temp,
        );

        let guard = ctl.try_begin_run().unwrap();
        ctl.execute_batch(guard, vec!["checkout".into()]).await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases[0].status, CaseStatus::Failed);
        assert!(results.bug_reports.is_empty());
    }

    #[tokio::test]
    async fn test_stop_flag_checked_between_cases() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(vec![narrative("PASS"), narrative("PASS")], &temp);

        let guard = ctl.try_begin_run().unwrap();
        ctl.request_stop();
        ctl.execute_batch(guard, vec!["a".into(), "b".into()]).await;

        let results = read_lock(&ctl.results);
        assert!(results.test_cases.is_empty());
        assert!(!read_lock(&ctl.status).is_running);
    }

    #[tokio::test]
    async fn test_run_token_exclusive_and_released() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(vec![], &temp);

        let guard = ctl.try_begin_run().unwrap();
        assert!(ctl.is_run_active());
        assert!(ctl.try_begin_run().is_none());

        drop(guard);
        assert!(!ctl.is_run_active());
        assert!(ctl.try_begin_run().is_some());
    }

    #[tokio::test]
    async fn test_generate_plan_publishes_plan() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![narrative("```json\n{\"test_cases\": [\"A\", \"B\"]}\n```")],
            &temp,
        );

        let mut rx = ctl.subscribe();
        let guard = ctl.try_begin_run().unwrap();
        ctl.generate_plan(guard, "https://x.test/").await;

        let mut plan = None;
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::PlanGenerated { test_cases } = event {
                plan = Some(test_cases);
            }
        }
        assert_eq!(plan.unwrap(), vec!["A", "B"]);

        // Plan generation must not touch the results collection, its
        // execution log included.
        assert!(read_lock(&ctl.results).test_cases.is_empty());
        assert!(read_lock(&ctl.results).bug_reports.is_empty());
        assert!(read_lock(&ctl.results).execution_logs.is_empty());
    }

    #[tokio::test]
    async fn test_generate_plan_surfaces_parse_failure() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(vec![narrative("I could not produce a plan, sorry.")], &temp);

        let mut rx = ctl.subscribe();
        let guard = ctl.try_begin_run().unwrap();
        ctl.generate_plan(guard, "https://x.test/").await;

        let mut failed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunEvent::PlanFailed { .. }) {
                failed = true;
            }
        }
        assert!(failed);
        assert!(read_lock(&ctl.results).execution_logs.is_empty());
    }

    #[tokio::test]
    async fn test_run_full_plan_failure_records_critical_bug() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![Err(AgentError::ExecutionFailed("no browser".into()))],
            &temp,
        );

        let mut rx = ctl.subscribe();
        let guard = ctl.try_begin_run().unwrap();
        ctl.run_full(guard, "https://x.test/".into()).await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.bug_reports.len(), 1);
        assert_eq!(results.bug_reports[0].severity, Severity::Critical);

        // Terminal broadcast always reached
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunEvent::Completed { .. }) {
                completed = true;
            }
        }
        assert!(completed);
        assert!(!read_lock(&ctl.status).is_running);
    }

    #[tokio::test]
    async fn test_run_full_executes_generated_plan() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(
            vec![
                narrative("{\"test_cases\": [\"only case\"]}"),
                narrative("Great.\n\nPASS"),
            ],
            &temp,
        );

        let guard = ctl.try_begin_run().unwrap();
        ctl.run_full(guard, "https://x.test/".into()).await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases.len(), 1);
        assert_eq!(results.test_cases[0].title, "only case");
        assert_eq!(results.test_cases[0].status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn test_exploratory_run_records_single_case() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(vec![narrative(bug_block())], &temp);
        write_lock(&ctl.config).custom_prompt = "Focus on the checkout flow.".to_string();

        let guard = ctl.try_begin_run().unwrap();
        ctl.run_exploratory(guard, "https://x.test/".into()).await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases.len(), 1);
        assert_eq!(results.test_cases[0].test_id, "TC_EXPLORATORY");
        assert_eq!(results.test_cases[0].status, CaseStatus::Failed);
        assert_eq!(results.bug_reports.len(), 1);
        assert!(!read_lock(&ctl.status).is_running);
    }

    #[tokio::test]
    async fn test_missing_credential_is_per_case_error() {
        let temp = TempDir::new().unwrap();
        let ctl = controller(vec![narrative("PASS")], &temp);
        write_lock(&ctl.config).provider = Provider::Google; // no key configured

        let guard = ctl.try_begin_run().unwrap();
        ctl.execute_batch(guard, vec!["a".into()]).await;

        let results = read_lock(&ctl.results);
        assert_eq!(results.test_cases[0].status, CaseStatus::Error);
    }

    #[test]
    fn test_estimate_coverage_empty_results() {
        let coverage = estimate_coverage(&TestResults::default());
        assert!(coverage.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_recommendations_flag_low_coverage_and_severe_bugs() {
        let mut results = TestResults::default();
        let mut case = TestCaseRecord::new("TC_1", "t");
        case.status = CaseStatus::Failed;
        results.test_cases.push(case);
        results.bug_reports.push(BugReport {
            bug_id: next_bug_id(),
            title: "t".into(),
            description: "d".into(),
            steps_to_reproduce: vec![],
            expected_behavior: "e".into(),
            actual_behavior: "a".into(),
            severity: Severity::Critical,
            category: "Functional".into(),
            status: BugStatus::Open,
            reported_date: Utc::now().to_rfc3339(),
        });

        let coverage = estimate_coverage(&results);
        let recommendations = build_recommendations(&results, &coverage);

        assert!(
            recommendations
                .iter()
                .any(|r| r.contains("Increase test coverage"))
        );
        assert!(
            recommendations
                .iter()
                .any(|r| r.contains("high-severity bugs"))
        );
        assert!(recommendations.iter().any(|r| r.contains("Re-run")));
    }

    // Batch completion takes the results and status locks one at a time,
    // so snapshot readers interleaving with it must never wedge.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_finish_interleaves_with_snapshot_readers() {
        let temp = TempDir::new().unwrap();
        let ctl = Arc::new(controller(Vec::new(), &temp));

        let snapshotter = {
            let ctl = Arc::clone(&ctl);
            tokio::task::spawn_blocking(move || {
                for _ in 0..1_000 {
                    ctl.persist_snapshot();
                }
            })
        };
        let batches = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move {
                for _ in 0..1_000 {
                    let guard = ctl.try_begin_run().unwrap();
                    ctl.execute_batch(guard, Vec::new()).await;
                }
            })
        };

        let joined = tokio::time::timeout(std::time::Duration::from_secs(60), async {
            batches.await.unwrap();
            snapshotter.await.unwrap();
        })
        .await;
        assert!(joined.is_ok(), "batch finish and snapshot readers wedged");
    }
}
