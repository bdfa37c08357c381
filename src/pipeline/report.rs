use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::step::{MigrationStep, Phase, StepOutcome};
use crate::error::{ReconcileError, Result};
use crate::logging::format_duration;
use crate::output::OutputHandler;

/// One executed step and what came of it
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub phase: Phase,
    pub description: String,
    pub target: String,
    pub critical: bool,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Per-run report; built fresh each run and never persisted
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub schema: String,
    pub fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<StepRecord>,
    pub steps_planned: usize,
    pub all_critical_steps_succeeded: bool,
    /// Cancelled between steps; the remaining steps never ran
    pub interrupted: bool,
}

impl PipelineReport {
    pub fn new(schema: impl Into<String>, fingerprint: impl Into<String>, steps_planned: usize) -> Self {
        Self {
            schema: schema.into(),
            fingerprint: fingerprint.into(),
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::with_capacity(steps_planned),
            steps_planned,
            all_critical_steps_succeeded: true,
            interrupted: false,
        }
    }

    pub fn record(&mut self, step: &MigrationStep, outcome: StepOutcome, duration: Duration) {
        if step.critical && outcome.is_failed() {
            self.all_critical_steps_succeeded = false;
        }
        self.entries.push(StepRecord {
            phase: step.phase,
            description: step.description.clone(),
            target: step.target(),
            critical: step.critical,
            outcome,
            duration_ms: duration.as_millis() as u64,
        });
    }

    /// Close the report; critical steps that never ran count as not succeeded
    pub fn finish(&mut self, interrupted: bool, unexecuted_critical: usize) {
        self.interrupted = interrupted;
        if unexecuted_critical > 0 {
            self.all_critical_steps_succeeded = false;
        }
        self.finished_at = Some(Utc::now());
    }

    pub fn outcomes(&self) -> Vec<(&str, &StepOutcome)> {
        self.entries
            .iter()
            .map(|e| (e.description.as_str(), &e.outcome))
            .collect()
    }

    pub fn outcome_of(&self, description: &str) -> Option<&StepOutcome> {
        self.entries
            .iter()
            .find(|e| e.description == description)
            .map(|e| &e.outcome)
    }

    pub fn failures(&self) -> Vec<&StepRecord> {
        self.entries.iter().filter(|e| e.outcome.is_failed()).collect()
    }

    pub fn created_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == StepOutcome::Created)
            .count()
    }

    pub fn present_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == StepOutcome::AlreadyPresent)
            .count()
    }

    pub fn repaired_rows(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                StepOutcome::Repaired(count) => count,
                _ => 0,
            })
            .sum()
    }

    /// Every step ran and none failed
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.failures().is_empty()
    }

    /// True when the run changed nothing: only `AlreadyPresent` and `Repaired(0)`
    pub fn is_converged(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_noop())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .and_then(|finished| (finished - self.started_at).to_std().ok())
    }

    /// One-line verdict for operators
    pub fn summary(&self) -> String {
        let failures = self.failures().len();
        let mut summary = if failures == 0 {
            format!(
                "schema {} reconciled: {} created, {} already present, {} row(s) repaired",
                self.schema,
                self.created_count(),
                self.present_count(),
                self.repaired_rows()
            )
        } else {
            format!(
                "schema {} partially reconciled, {} issue(s) logged",
                self.schema, failures
            )
        };
        if self.interrupted {
            summary.push_str(&format!(
                " (interrupted after {} of {} steps)",
                self.entries.len(),
                self.steps_planned
            ));
        }
        summary
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReconcileError::Other(format!("Failed to serialize report: {}", e)))
    }

    /// One line per step, then the summary; `verbose` includes no-op steps
    pub fn render(&self, output: &dyn OutputHandler, verbose: bool) {
        output.heading(&format!(
            "Reconciling schema {} ({})",
            self.schema,
            &self.fingerprint[..self.fingerprint.len().min(12)]
        ));

        let mut hidden = 0;
        for entry in &self.entries {
            let line = format!("[{}] {}", entry.phase, entry.target);
            match &entry.outcome {
                StepOutcome::Failed(reason) => output.error(&format!("{}: {}", line, reason)),
                StepOutcome::Created => output.status("created", &line),
                StepOutcome::Repaired(count) if *count > 0 => {
                    output.status("repaired", &format!("{} ({} rows)", line, count))
                }
                outcome if verbose => output.status("ok", &format!("{} ({})", line, outcome)),
                _ => hidden += 1,
            }
        }
        if hidden > 0 {
            output.debug(&format!("{} step(s) unchanged", hidden));
        }

        let summary = match self.duration() {
            Some(duration) => format!("{} in {}", self.summary(), format_duration(duration)),
            None => self.summary(),
        };
        if self.is_clean() {
            output.success(&summary);
        } else {
            output.warning(&summary);
        }
        if !self.all_critical_steps_succeeded {
            output.warning("Some enum or table creation steps did not succeed; re-run after fixing the logged issues");
        }
    }
}
