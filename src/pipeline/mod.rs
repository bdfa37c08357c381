//! Declarative step list and the single executor that runs it.
//!
//! [`DeploymentPipeline::plan`] turns a validated [`TargetSchema`] into an
//! ordered list of idempotent [`MigrationStep`]s; [`DeploymentPipeline::run`]
//! executes them strictly in order, recording every failure and moving on.

pub mod report;
pub mod step;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::analysis::DependencyGraph;
use crate::db::connection::ConnectionManager;
use crate::db::store::SchemaStore;
use crate::error::{ReconcileError, Result};
use crate::schema::TargetSchema;

pub use report::{PipelineReport, StepRecord};
pub use step::{MigrationStep, OnFailure, Phase, PhaseSelection, StepAction, StepOutcome};

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotConnected,
    Connected,
    Running,
    Reported,
    /// Final; reached from `Reported`, or straight from `NotConnected` when connecting fails
    Disconnected,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::NotConnected, RunState::Connected)
                | (RunState::NotConnected, RunState::Disconnected)
                | (RunState::Connected, RunState::Running)
                | (RunState::Running, RunState::Reported)
                | (RunState::Reported, RunState::Disconnected)
        )
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(self.can_transition_to(next), "{:?} -> {:?}", self, next);
        debug!("Run state {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Shared flag set from a signal handler; checked between steps
pub type CancellationFlag = Arc<AtomicBool>;

/// Text recorded for a failed step
fn failure_reason(err: &ReconcileError) -> String {
    match err {
        ReconcileError::Database { message, .. }
        | ReconcileError::Schema { message, .. }
        | ReconcileError::UnsupportedOperation { message, .. } => message.clone(),
        _ => err.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentPipeline {
    schema_name: String,
    fingerprint: String,
    creation_order: Vec<String>,
    steps: Vec<MigrationStep>,
    cancel: Option<CancellationFlag>,
}

impl DeploymentPipeline {
    /// Validate the schema, resolve table order and build the step list.
    ///
    /// Cycles and other definition errors are fatal here, before any
    /// connection is made or statement sent.
    pub fn plan(schema: &TargetSchema, selection: PhaseSelection) -> Result<Self> {
        schema.validate()?;
        let graph = DependencyGraph::build(&schema.tables)?;
        let creation_order = graph.creation_order()?;

        let ordered_tables: Vec<_> = creation_order
            .iter()
            .filter_map(|name| schema.find_table(name))
            .collect();

        let mut steps = Vec::new();
        for phase in Phase::ALL {
            if !selection.includes(phase) {
                continue;
            }
            let actions: Vec<StepAction> = match phase {
                Phase::Enums => schema.enums.iter().cloned().map(StepAction::EnsureEnum).collect(),
                Phase::EnumValues => schema
                    .enums
                    .iter()
                    .flat_map(|spec| {
                        spec.values.iter().map(move |value| StepAction::EnsureEnumValue {
                            enum_name: spec.name.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect(),
                Phase::Tables => ordered_tables
                    .iter()
                    .map(|spec| StepAction::EnsureTable((*spec).clone()))
                    .collect(),
                Phase::Columns => ordered_tables
                    .iter()
                    .flat_map(|spec| {
                        spec.columns.iter().map(move |column| StepAction::EnsureColumn {
                            table: spec.name.clone(),
                            column: column.clone(),
                        })
                    })
                    .collect(),
                Phase::ForeignKeys => ordered_tables
                    .iter()
                    .flat_map(|spec| {
                        spec.foreign_keys().map(move |(column, _)| StepAction::EnsureForeignKey {
                            table: spec.name.clone(),
                            column: column.clone(),
                        })
                    })
                    .collect(),
                Phase::Indexes => ordered_tables
                    .iter()
                    .flat_map(|spec| {
                        spec.indexes.iter().map(move |index| StepAction::EnsureIndex {
                            table: spec.name.clone(),
                            index: index.clone(),
                        })
                    })
                    .collect(),
                Phase::Repair => schema.repairs.iter().cloned().map(StepAction::Repair).collect(),
            };
            steps.extend(actions.into_iter().map(|action| MigrationStep::new(phase, action)));
        }

        debug!(
            "Planned {} steps for schema {} (table order: {})",
            steps.len(),
            schema.name,
            creation_order.join(", ")
        );

        Ok(Self {
            schema_name: schema.name.clone(),
            fingerprint: schema.fingerprint(),
            creation_order,
            steps,
            cancel: None,
        })
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn creation_order(&self) -> &[String] {
        &self.creation_order
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Execute every step in order; failures are recorded, never propagated
    pub async fn run<S: SchemaStore>(&self, store: &S) -> PipelineReport {
        let mut report = PipelineReport::new(&self.schema_name, &self.fingerprint, self.steps.len());
        let mut interrupted = false;

        for (index, step) in self.steps.iter().enumerate() {
            if self.cancelled() {
                let remaining = &self.steps[index..];
                warn!(
                    "Run interrupted; {} step(s) not executed, re-run to converge",
                    remaining.len()
                );
                let unexecuted_critical = remaining.iter().filter(|s| s.critical).count();
                report.finish(true, unexecuted_critical);
                interrupted = true;
                break;
            }

            let started = Instant::now();
            let outcome = match step.action.execute(store).await {
                Ok(outcome) => {
                    info!("[{}] {}: {}", step.phase, step.target(), outcome);
                    outcome
                }
                Err(e) => {
                    let reason = failure_reason(&e);
                    warn!("[{}] {} failed: {}", step.phase, step.target(), reason);
                    StepOutcome::Failed(reason)
                }
            };
            report.record(step, outcome, started.elapsed());
        }

        if !interrupted {
            report.finish(false, 0);
        }
        report
    }
}

/// Connect, run the pipeline, report and disconnect.
///
/// The connection is closed exactly once whatever the steps do; only a
/// connection failure is returned as an error.
pub async fn deploy(manager: &ConnectionManager, pipeline: &DeploymentPipeline) -> Result<PipelineReport> {
    let mut state = RunState::NotConnected;

    let connection = match manager.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            state.advance(RunState::Disconnected);
            return Err(e);
        }
    };
    state.advance(RunState::Connected);

    let report = match connection.store() {
        Ok(store) => {
            state.advance(RunState::Running);
            let report = pipeline.run(&store).await;
            state.advance(RunState::Reported);
            Ok(report)
        }
        Err(e) => Err(e),
    };

    connection.close().await;
    if report.is_ok() {
        state.advance(RunState::Disconnected);
    }
    report
}
