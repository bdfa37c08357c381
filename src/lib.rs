//! Idempotent schema reconciliation and data repair for PostgreSQL.
//!
//! A [`TargetSchema`] declares enums, tables, foreign keys, indexes and the
//! value sets some columns must respect. A run creates whatever is missing,
//! appends missing enum values, and rewrites out-of-range values to a
//! documented fallback. Nothing is ever dropped or redefined, so a run can be
//! repeated after any partial failure and converges.

pub mod analysis;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod sql;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::ReconcileConfig;
pub use db::{ConnectionManager, DatabaseConfig, MemoryStore, PgStore, RetryPolicy, SchemaStore};
pub use error::{ReconcileError, Result};
pub use pipeline::{DeploymentPipeline, Phase, PhaseSelection, PipelineReport, StepOutcome};
pub use schema::target::recruiting_schema;
pub use schema::TargetSchema;

/// Run every phase against the database described by `database`
pub async fn reconcile(database: DatabaseConfig, schema: &TargetSchema) -> Result<PipelineReport> {
    let manager = ConnectionManager::new(database, RetryPolicy::default())?;
    reconcile_with_options(&manager, schema, PhaseSelection::All).await
}

/// Run the selected phases through an already configured connection manager
pub async fn reconcile_with_options(
    manager: &ConnectionManager,
    schema: &TargetSchema,
    selection: PhaseSelection,
) -> Result<PipelineReport> {
    let pipeline = DeploymentPipeline::plan(schema, selection)?;
    pipeline::deploy(manager, &pipeline).await
}
