//! Demonstration fixtures for the dashboard.

use crate::models::{
    BugReport, BugStatus, CaseStatus, CoverageSnapshot, Severity, StepRecord, TestCaseRecord,
    TestResults, next_bug_id,
};
use chrono::Utc;
use std::collections::BTreeMap;

/// Builds the fixed sample data set served by `/api/load_sample_data`.
pub fn sample_results() -> TestResults {
    let now = Utc::now().to_rfc3339();

    let passed_case = TestCaseRecord {
        test_id: "BATCH_ABOUT_US_CONTENT_ELEMENTS".to_string(),
        title: "Batch Test: Content Elements on About Us".to_string(),
        description: "Test all content elements together on the about us page".to_string(),
        status: CaseStatus::Passed,
        test_steps: vec![
            StepRecord {
                step_number: 1,
                action: "Test headings and text functionality and appearance".to_string(),
                expected_result: "headings and text should work correctly".to_string(),
                status: CaseStatus::Passed,
                actual_result: "as expected".to_string(),
                duration: 1.2,
            },
            StepRecord {
                step_number: 2,
                action: "Test images and media functionality and appearance".to_string(),
                expected_result: "images and media should work correctly".to_string(),
                status: CaseStatus::Passed,
                actual_result: "as expected".to_string(),
                duration: 1.3,
            },
        ],
        execution_time: 2.5,
        created_date: now.clone(),
    };

    let failed_case = TestCaseRecord {
        test_id: "BATCH_ABOUT_US_LAYOUT_ELEMENTS".to_string(),
        title: "Batch Test: Layout Elements on About Us".to_string(),
        description: "Test all layout elements together on the about us page".to_string(),
        status: CaseStatus::Failed,
        test_steps: vec![
            StepRecord {
                step_number: 1,
                action: "Test header section functionality and appearance".to_string(),
                expected_result: "header section should work correctly".to_string(),
                status: CaseStatus::Passed,
                actual_result: "as expected".to_string(),
                duration: 1.4,
            },
            StepRecord {
                step_number: 2,
                action: "Test main content area functionality and appearance".to_string(),
                expected_result: "main content area should work correctly".to_string(),
                status: CaseStatus::Failed,
                actual_result: "layout overflows the viewport".to_string(),
                duration: 1.8,
            },
        ],
        execution_time: 3.2,
        created_date: now.clone(),
    };

    let bug = BugReport {
        bug_id: next_bug_id(),
        title: "Test failure in Batch Test: Layout Elements on About Us".to_string(),
        description: "Step 2: Test main content area functionality and appearance".to_string(),
        steps_to_reproduce: vec![
            "Navigate to the test page".to_string(),
            "Execute test case: Batch Test: Layout Elements on About Us".to_string(),
            "Reach step 2: Test main content area functionality and appearance".to_string(),
        ],
        expected_behavior: "main content area should work correctly".to_string(),
        actual_behavior: "layout overflows the viewport".to_string(),
        severity: Severity::Medium,
        category: "UI Layout".to_string(),
        status: BugStatus::Open,
        reported_date: now.clone(),
    };

    let coverage: BTreeMap<String, f64> = [
        ("Functional Testing", 85.0),
        ("UI/UX Testing", 90.0),
        ("Responsiveness Testing", 75.0),
        ("Accessibility Testing", 60.0),
        ("Performance Testing", 80.0),
        ("Security Testing", 70.0),
        ("Browser Compatibility", 85.0),
        ("Content Testing", 95.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    TestResults {
        test_cases: vec![passed_case, failed_case],
        bug_reports: vec![bug],
        coverage_reports: vec![CoverageSnapshot {
            timestamp: now,
            coverage,
        }],
        execution_logs: Vec::new(),
        recommendations: vec![
            "Increase test coverage for Accessibility Testing (currently 60.0%)".to_string(),
            "Increase test coverage for Security Testing (currently 70.0%)".to_string(),
            "Focus on fixing 1 open bugs first".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_results_shape() {
        let results = sample_results();

        assert_eq!(results.test_cases.len(), 2);
        assert_eq!(results.test_cases[0].status, CaseStatus::Passed);
        assert_eq!(results.test_cases[1].status, CaseStatus::Failed);
        assert_eq!(results.bug_reports.len(), 1);
        assert_eq!(results.coverage_reports.len(), 1);
        assert_eq!(results.coverage_reports[0].coverage.len(), 8);
        assert_eq!(results.recommendations.len(), 3);
    }

    #[test]
    fn test_sample_results_serialize() {
        let json = serde_json::to_string(&sample_results()).unwrap();
        assert!(json.contains("BATCH_ABOUT_US_CONTENT_ELEMENTS"));
    }
}
