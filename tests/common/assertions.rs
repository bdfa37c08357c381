use pgreconcile::{PipelineReport, StepOutcome};

/// Assert that no step failed and the run was not interrupted
pub fn assert_report_clean(report: &PipelineReport) {
    let failures: Vec<_> = report
        .failures()
        .iter()
        .map(|f| format!("{}: {}", f.description, f.outcome))
        .collect();
    assert!(
        report.is_clean(),
        "Expected a clean run, but found failures: {:?}",
        failures
    );
}

/// Assert that a re-run changed nothing
pub fn assert_report_converged(report: &PipelineReport) {
    let changed: Vec<_> = report
        .entries
        .iter()
        .filter(|e| !e.outcome.is_noop())
        .map(|e| format!("{}: {}", e.description, e.outcome))
        .collect();
    assert!(
        changed.is_empty(),
        "Expected a converged run, but these steps changed something: {:?}",
        changed
    );
}

pub fn assert_step_outcome(report: &PipelineReport, description: &str, expected: StepOutcome) {
    let actual = report.outcome_of(description);
    assert_eq!(
        actual,
        Some(&expected),
        "Unexpected outcome for '{}'",
        description
    );
}

pub fn assert_step_failed(report: &PipelineReport, description: &str) {
    match report.outcome_of(description) {
        Some(outcome) => assert!(outcome.is_failed(), "Expected '{}' to fail, got {}", description, outcome),
        None => panic!("No step named '{}' in the report", description),
    }
}
