use tokio_postgres::Client;
use tracing::debug;

use crate::error::{ErrorContext, Result};
use crate::schema::{ColumnSpec, EnumSpec, ForeignKey, IndexSpec, RepairRule, TableSpec};
use crate::sql::ddl;

/// Live catalog operations the reconciler needs.
///
/// Every mutating call is additive; nothing here drops, renames or retypes an
/// existing structure. Implementations report failures as errors and the
/// pipeline decides what to do with them.
#[allow(async_fn_in_trait)]
pub trait SchemaStore {
    /// Current values of an enumerated type in sort order, `None` if it does not exist
    async fn enum_values(&self, name: &str) -> Result<Option<Vec<String>>>;

    async fn create_enum(&self, spec: &EnumSpec) -> Result<()>;

    /// Append `value` after the existing values of `enum_name`
    async fn append_enum_value(&self, enum_name: &str, value: &str) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool>;

    /// Create the table with all its columns, foreign keys and indexes, atomically
    async fn create_table(&self, spec: &TableSpec) -> Result<()>;

    /// Add a column; its default is applied to existing rows
    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()>;

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool>;

    async fn add_foreign_key(&self, table: &str, column: &str, fk: &ForeignKey) -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()>;

    /// Rewrite non-NULL values outside the allowed set to the fallback; returns rows changed
    async fn repair_values(&self, rule: &RepairRule) -> Result<u64>;
}

/// [`SchemaStore`] over a live PostgreSQL session, scoped to `current_schema()`
pub struct PgStore<'a> {
    client: &'a Client,
}

impl<'a> PgStore<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn exists(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)], object: &str) -> Result<bool> {
        let row = self.client.query_one(sql, params).await.object_context(object)?;
        Ok(row.get(0))
    }

    async fn execute_ddl(&self, sql: &str, object: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.client.batch_execute(sql).await.object_context(object)
    }

    /// User-defined type name of a column (enum columns), `None` for built-in types
    async fn column_cast_type(&self, table: &str, column: &str) -> Result<Option<String>> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT data_type, udt_name
                FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
                "#,
                &[&table, &column],
            )
            .await
            .object_context(&format!("{}.{}", table, column))?;

        let row = row.ok_or_else(|| {
            crate::error::ReconcileError::schema(
                format!("{}.{}", table, column),
                "column does not exist",
            )
        })?;
        let data_type: String = row.get(0);
        let udt_name: String = row.get(1);
        Ok((data_type == "USER-DEFINED").then_some(udt_name))
    }
}

impl SchemaStore for PgStore<'_> {
    async fn enum_values(&self, name: &str) -> Result<Option<Vec<String>>> {
        let exists = self
            .exists(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM pg_type t
                    JOIN pg_namespace n ON n.oid = t.typnamespace
                    WHERE t.typname = $1
                      AND t.typtype = 'e'
                      AND n.nspname = current_schema()
                )
                "#,
                &[&name],
                name,
            )
            .await?;
        if !exists {
            return Ok(None);
        }

        let rows = self
            .client
            .query(
                r#"
                SELECT e.enumlabel::text
                FROM pg_type t
                JOIN pg_namespace n ON n.oid = t.typnamespace
                JOIN pg_enum e ON e.enumtypid = t.oid
                WHERE t.typname = $1
                  AND n.nspname = current_schema()
                ORDER BY e.enumsortorder
                "#,
                &[&name],
            )
            .await
            .object_context(name)?;

        Ok(Some(rows.into_iter().map(|row| row.get(0)).collect()))
    }

    async fn create_enum(&self, spec: &EnumSpec) -> Result<()> {
        self.execute_ddl(&ddl::create_enum(spec), &spec.name).await
    }

    async fn append_enum_value(&self, enum_name: &str, value: &str) -> Result<()> {
        // ADD VALUE cannot run inside a transaction block before PostgreSQL 12;
        // batch_execute of a single statement runs it on its own.
        self.execute_ddl(&ddl::add_enum_value(enum_name, value), enum_name).await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = current_schema()
                  AND table_name = $1
            )
            "#,
            &[&table],
            table,
        )
        .await
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
            &[&table, &column],
            &format!("{}.{}", table, column),
        )
        .await
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let mut statements = vec![ddl::create_table(spec)];
        statements.extend(spec.indexes.iter().map(|index| ddl::create_index(&spec.name, index)));
        // A multi-statement simple query runs as one implicit transaction
        self.execute_ddl(&statements.join(";\n"), &spec.name).await
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()> {
        self.execute_ddl(&ddl::add_column(table, column), &format!("{}.{}", table, column.name))
            .await
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.table_constraints
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND constraint_name = $2
            )
            "#,
            &[&table, &constraint],
            constraint,
        )
        .await
    }

    async fn add_foreign_key(&self, table: &str, column: &str, fk: &ForeignKey) -> Result<()> {
        self.execute_ddl(
            &ddl::add_foreign_key(table, column, fk),
            &ddl::foreign_key_name(table, column),
        )
        .await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT FROM pg_indexes
                WHERE schemaname = current_schema()
                  AND indexname = $1
            )
            "#,
            &[&index],
            index,
        )
        .await
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        self.execute_ddl(&ddl::create_index(table, index), &index.name).await
    }

    async fn repair_values(&self, rule: &RepairRule) -> Result<u64> {
        let cast_type = self.column_cast_type(&rule.table, &rule.column).await?;
        let sql = ddl::repair_values(&rule.table, &rule.column, cast_type.as_deref());
        debug!("Executing: {}", sql);
        self.client
            .execute(&sql, &[&rule.fallback, &rule.allowed_values])
            .await
            .object_context(&rule.target())
    }
}
