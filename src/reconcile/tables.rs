use tracing::info;

use crate::db::store::SchemaStore;
use crate::error::{ReconcileError, Result};
use crate::pipeline::StepOutcome;
use crate::schema::{ColumnSpec, IndexSpec, TableSpec};
use crate::sql::ddl;

/// Creates what is missing from the live schema; never alters, retypes or drops
pub struct SchemaReconciler<'a, S> {
    store: &'a S,
}

impl<'a, S: SchemaStore> SchemaReconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn require_table(&self, table: &str, object: &str) -> Result<()> {
        if self.store.table_exists(table).await? {
            Ok(())
        } else {
            Err(ReconcileError::schema(
                object,
                format!("relation \"{}\" does not exist", table),
            ))
        }
    }

    /// Create the table with its columns, foreign keys and indexes if it is missing.
    ///
    /// An existing table is reported as present and left untouched; missing
    /// columns are the job of [`ensure_column`](Self::ensure_column).
    pub async fn ensure_table(&self, spec: &TableSpec) -> Result<StepOutcome> {
        if self.store.table_exists(&spec.name).await? {
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.create_table(spec).await?;
        info!(
            "Created table {} ({} columns, {} indexes)",
            spec.name,
            spec.columns.len(),
            spec.indexes.len()
        );
        Ok(StepOutcome::Created)
    }

    /// Add a declared column missing from a live table; existing rows get its default
    pub async fn ensure_column(&self, table: &str, column: &ColumnSpec) -> Result<StepOutcome> {
        let object = format!("{}.{}", table, column.name);
        self.require_table(table, &object).await?;

        if self.store.column_exists(table, &column.name).await? {
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.add_column(table, column).await?;
        info!("Added column {}", object);
        Ok(StepOutcome::Created)
    }

    /// Add the named foreign-key constraint for `column` if the live table lacks it
    pub async fn ensure_foreign_key(&self, table: &str, column: &ColumnSpec) -> Result<StepOutcome> {
        let fk = column.references.as_ref().ok_or_else(|| {
            ReconcileError::schema(
                format!("{}.{}", table, column.name),
                "column does not reference another table",
            )
        })?;
        let constraint = ddl::foreign_key_name(table, &column.name);
        self.require_table(table, &constraint).await?;

        if self.store.constraint_exists(table, &constraint).await? {
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.add_foreign_key(table, &column.name, fk).await?;
        info!("Added foreign key {} ({} -> {})", constraint, table, fk.table);
        Ok(StepOutcome::Created)
    }

    pub async fn ensure_index(&self, table: &str, index: &IndexSpec) -> Result<StepOutcome> {
        self.require_table(table, &index.name).await?;

        if self.store.index_exists(&index.name).await? {
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.create_index(table, index).await?;
        info!("Created index {} on {}", index.name, table);
        Ok(StepOutcome::Created)
    }
}
