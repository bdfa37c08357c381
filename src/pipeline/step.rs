use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::store::SchemaStore;
use crate::error::{ReconcileError, Result};
use crate::reconcile::{DataRepairPass, EnumTypeManager, SchemaReconciler};
use crate::schema::{ColumnSpec, EnumSpec, IndexSpec, RepairRule, TableSpec};

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Enums,
    EnumValues,
    Tables,
    Columns,
    ForeignKeys,
    Indexes,
    Repair,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Enums,
        Phase::EnumValues,
        Phase::Tables,
        Phase::Columns,
        Phase::ForeignKeys,
        Phase::Indexes,
        Phase::Repair,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Enums => "enums",
            Phase::EnumValues => "enum-values",
            Phase::Tables => "tables",
            Phase::Columns => "columns",
            Phase::ForeignKeys => "foreign-keys",
            Phase::Indexes => "indexes",
            Phase::Repair => "repair",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_lowercase().replace('_', "-");
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| ReconcileError::Configuration(format!("Unknown phase: {}", s)))
    }
}

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseSelection {
    #[default]
    All,
    /// A single phase, for operator-driven diagnosis
    Only(Phase),
}

impl PhaseSelection {
    pub fn includes(&self, phase: Phase) -> bool {
        match self {
            PhaseSelection::All => true,
            PhaseSelection::Only(only) => *only == phase,
        }
    }
}

impl From<Option<Phase>> for PhaseSelection {
    fn from(phase: Option<Phase>) -> Self {
        phase.map(PhaseSelection::Only).unwrap_or_default()
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Created,
    AlreadyPresent,
    /// Rows rewritten by a repair scan; 0 when the scan found nothing
    Repaired(u64),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }

    /// True when the step changed nothing in the database
    pub fn is_noop(&self) -> bool {
        matches!(self, StepOutcome::AlreadyPresent | StepOutcome::Repaired(0))
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Created => write!(f, "created"),
            StepOutcome::AlreadyPresent => write!(f, "already present"),
            StepOutcome::Repaired(1) => write!(f, "repaired 1 row"),
            StepOutcome::Repaired(count) => write!(f, "repaired {} rows", count),
            StepOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// The only policy: record the failure and move on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    #[default]
    Continue,
}

/// What a step does, executed against an explicitly passed store
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    EnsureEnum(EnumSpec),
    EnsureEnumValue { enum_name: String, value: String },
    EnsureTable(TableSpec),
    EnsureColumn { table: String, column: ColumnSpec },
    EnsureForeignKey { table: String, column: ColumnSpec },
    EnsureIndex { table: String, index: IndexSpec },
    Repair(RepairRule),
}

impl StepAction {
    pub async fn execute<S: SchemaStore>(&self, store: &S) -> Result<StepOutcome> {
        match self {
            StepAction::EnsureEnum(spec) => EnumTypeManager::new(store).ensure_enum(spec).await,
            StepAction::EnsureEnumValue { enum_name, value } => {
                EnumTypeManager::new(store).ensure_value(enum_name, value).await
            }
            StepAction::EnsureTable(spec) => SchemaReconciler::new(store).ensure_table(spec).await,
            StepAction::EnsureColumn { table, column } => {
                SchemaReconciler::new(store).ensure_column(table, column).await
            }
            StepAction::EnsureForeignKey { table, column } => {
                SchemaReconciler::new(store).ensure_foreign_key(table, column).await
            }
            StepAction::EnsureIndex { table, index } => {
                SchemaReconciler::new(store).ensure_index(table, index).await
            }
            StepAction::Repair(rule) => DataRepairPass::new(store).repair(rule).await,
        }
    }

    /// Name of the object the step acts on
    pub fn target(&self) -> String {
        match self {
            StepAction::EnsureEnum(spec) => spec.name.clone(),
            StepAction::EnsureEnumValue { enum_name, value } => format!("{}.{}", enum_name, value),
            StepAction::EnsureTable(spec) => spec.name.clone(),
            StepAction::EnsureColumn { table, column } | StepAction::EnsureForeignKey { table, column } => {
                format!("{}.{}", table, column.name)
            }
            StepAction::EnsureIndex { index, .. } => index.name.clone(),
            StepAction::Repair(rule) => rule.target(),
        }
    }

    fn describe(&self) -> String {
        match self {
            StepAction::EnsureEnum(spec) => format!("ensure enum {}", spec.name),
            StepAction::EnsureEnumValue { enum_name, value } => {
                format!("ensure enum value {}.'{}'", enum_name, value)
            }
            StepAction::EnsureTable(spec) => format!("ensure table {}", spec.name),
            StepAction::EnsureColumn { table, column } => format!("ensure column {}.{}", table, column.name),
            StepAction::EnsureForeignKey { table, column } => {
                format!("ensure foreign key {}.{}", table, column.name)
            }
            StepAction::EnsureIndex { table, index } => format!("ensure index {} on {}", index.name, table),
            StepAction::Repair(rule) => format!("repair {}", rule.target()),
        }
    }
}

/// One idempotent unit of work, built at plan time and executed once per run
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    pub phase: Phase,
    pub description: String,
    pub action: StepAction,
    /// Enum and table creation; everything downstream depends on them
    pub critical: bool,
    pub on_failure: OnFailure,
}

impl MigrationStep {
    pub fn new(phase: Phase, action: StepAction) -> Self {
        let critical = matches!(action, StepAction::EnsureEnum(_) | StepAction::EnsureTable(_));
        Self {
            phase,
            description: action.describe(),
            action,
            critical,
            on_failure: OnFailure::Continue,
        }
    }

    pub fn target(&self) -> String {
        self.action.target()
    }
}
