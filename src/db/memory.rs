//! In-process catalog implementing [`SchemaStore`].
//!
//! Mirrors the PostgreSQL behaviour the reconciler relies on (missing types
//! and relations fail DDL, enum columns reject unknown labels, `ADD COLUMN`
//! back-fills defaults, foreign keys reject orphans) so pipeline behaviour can
//! be exercised without a server. Failures can be injected per object.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ReconcileError, Result};
use crate::schema::{ColumnDefault, ColumnSpec, ColumnType, EnumSpec, ForeignKey, IndexSpec, RepairRule, TableSpec};
use crate::sql::ddl;

pub type Row = BTreeMap<String, Option<String>>;

#[derive(Debug, Default)]
struct MemTable {
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    next_serial: u64,
}

impl MemTable {
    fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct Catalog {
    enums: BTreeMap<String, Vec<String>>,
    tables: BTreeMap<String, MemTable>,
    indexes: BTreeMap<String, String>,
    constraints: BTreeSet<(String, String)>,
    statements: Vec<String>,
    created_tables: Vec<String>,
    enum_append_unsupported: bool,
    failing: HashSet<String>,
}

impl Catalog {
    fn check_injected(&self, object: &str) -> Result<()> {
        if self.failing.contains(object) {
            return Err(ReconcileError::schema(object, "injected failure"));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| ReconcileError::schema(name, format!("relation \"{}\" does not exist", name)))
    }

    fn check_type(&self, object: &str, column: &ColumnSpec) -> Result<()> {
        if let Some(enum_name) = column.enum_ref() {
            if !self.enums.contains_key(enum_name) {
                return Err(ReconcileError::schema(
                    object,
                    format!("type \"{}\" does not exist", enum_name),
                ));
            }
        }
        Ok(())
    }

    fn check_value(&self, object: &str, column: &ColumnSpec, value: &str) -> Result<()> {
        if let Some(enum_name) = column.enum_ref() {
            let labels = self.enums.get(enum_name).map(Vec::as_slice).unwrap_or(&[]);
            if !labels.iter().any(|l| l == value) {
                return Err(ReconcileError::schema(
                    object,
                    format!("invalid input value for enum {}: \"{}\"", enum_name, value),
                ));
            }
        }
        Ok(())
    }
}

fn default_value(column: &ColumnSpec) -> Option<String> {
    column.default.as_ref().map(|d| match d {
        ColumnDefault::Literal(value) => value.clone(),
        ColumnDefault::Expression(expr) => expr.clone(),
    })
}

fn is_serial(column: &ColumnSpec) -> bool {
    matches!(column.column_type, ColumnType::Serial | ColumnType::BigSerial)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Mutex<Catalog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Behave like a store that cannot append to a live enumerated type
    pub fn with_enum_append_unsupported(self) -> Self {
        self.catalog().enum_append_unsupported = true;
        self
    }

    /// Make every DDL/DML statement naming `object` fail.
    ///
    /// `object` is a table, enum or index name, or `table.column` for column
    /// additions and repairs.
    pub fn fail_on(self, object: &str) -> Self {
        self.catalog().failing.insert(object.to_string());
        self
    }

    pub fn clear_failures(&self) {
        let mut catalog = self.catalog();
        catalog.failing.clear();
        catalog.enum_append_unsupported = false;
    }

    /// Insert a row; omitted columns take their default, serial columns the next value
    pub fn insert_row(&self, table: &str, values: &[(&str, Option<&str>)]) -> Result<()> {
        let mut catalog = self.catalog();
        let mem = catalog.table(table)?;

        for (name, value) in values {
            let column = mem.column(name).ok_or_else(|| {
                ReconcileError::schema(table, format!("column \"{}\" does not exist", name))
            })?;
            if let Some(value) = value {
                catalog.check_value(table, column, value)?;
            }
        }

        let mem = catalog
            .tables
            .get_mut(table)
            .ok_or_else(|| ReconcileError::schema(table, "relation vanished"))?;
        let mut row = Row::new();
        for column in &mem.columns {
            let given = values.iter().find(|(name, _)| *name == column.name);
            let value = match given {
                Some((_, value)) => {
                    if let Some(id) = value.filter(|_| is_serial(column)).and_then(|v| v.parse::<u64>().ok()) {
                        mem.next_serial = mem.next_serial.max(id);
                    }
                    value.map(str::to_string)
                }
                None if is_serial(column) => {
                    mem.next_serial += 1;
                    Some(mem.next_serial.to_string())
                }
                None => default_value(column),
            };
            if value.is_none() && !column.nullable {
                return Err(ReconcileError::schema(
                    table,
                    format!("null value in column \"{}\" violates not-null constraint", column.name),
                ));
            }
            row.insert(column.name.clone(), value);
        }
        mem.rows.push(row);
        Ok(())
    }

    /// Rows in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.catalog()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.catalog().tables.contains_key(table)
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.catalog()
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.catalog().indexes.contains_key(index)
    }

    pub fn enum_labels(&self, name: &str) -> Option<Vec<String>> {
        self.catalog().enums.get(name).cloned()
    }

    /// Tables in the order they were created
    pub fn created_tables(&self) -> Vec<String> {
        self.catalog().created_tables.clone()
    }

    /// Every successful DDL/DML statement, as the PostgreSQL store would have sent it
    pub fn statements(&self) -> Vec<String> {
        self.catalog().statements.clone()
    }
}

impl super::SchemaStore for MemoryStore {
    async fn enum_values(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.catalog().enums.get(name).cloned())
    }

    async fn create_enum(&self, spec: &EnumSpec) -> Result<()> {
        let mut catalog = self.catalog();
        catalog.check_injected(&spec.name)?;
        if catalog.enums.contains_key(&spec.name) {
            return Err(ReconcileError::schema(
                &spec.name,
                format!("type \"{}\" already exists", spec.name),
            ));
        }
        catalog.enums.insert(spec.name.clone(), spec.values.clone());
        catalog.statements.push(ddl::create_enum(spec));
        Ok(())
    }

    async fn append_enum_value(&self, enum_name: &str, value: &str) -> Result<()> {
        let mut catalog = self.catalog();
        catalog.check_injected(enum_name)?;
        if catalog.enum_append_unsupported {
            return Err(ReconcileError::UnsupportedOperation {
                object: enum_name.to_string(),
                message: "cannot add a value to a live enumerated type".to_string(),
            });
        }
        let labels = catalog.enums.get_mut(enum_name).ok_or_else(|| {
            ReconcileError::schema(enum_name, format!("type \"{}\" does not exist", enum_name))
        })?;
        if !labels.iter().any(|l| l == value) {
            labels.push(value.to_string());
        }
        catalog.statements.push(ddl::add_enum_value(enum_name, value));
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.catalog().tables.contains_key(table))
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .catalog()
            .tables
            .get(table)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let mut catalog = self.catalog();
        catalog.check_injected(&spec.name)?;
        if catalog.tables.contains_key(&spec.name) {
            return Ok(());
        }
        for column in &spec.columns {
            catalog.check_type(&spec.name, column)?;
            if let Some(fk) = &column.references {
                if fk.table != spec.name && !catalog.tables.contains_key(&fk.table) {
                    return Err(ReconcileError::schema(
                        &spec.name,
                        format!("relation \"{}\" does not exist", fk.table),
                    ));
                }
            }
        }
        for index in &spec.indexes {
            catalog.check_injected(&index.name)?;
        }

        catalog.tables.insert(
            spec.name.clone(),
            MemTable {
                columns: spec.columns.clone(),
                ..Default::default()
            },
        );
        for (column, _) in spec.foreign_keys() {
            let name = ddl::foreign_key_name(&spec.name, &column.name);
            catalog.constraints.insert((spec.name.clone(), name));
        }
        catalog.statements.push(ddl::create_table(spec));
        for index in &spec.indexes {
            catalog.indexes.entry(index.name.clone()).or_insert_with(|| spec.name.clone());
            catalog.statements.push(ddl::create_index(&spec.name, index));
        }
        catalog.created_tables.push(spec.name.clone());
        Ok(())
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<()> {
        let object = format!("{}.{}", table, column.name);
        let mut catalog = self.catalog();
        catalog.check_injected(&object)?;
        catalog.check_type(&object, column)?;
        let mem = catalog.table(table)?;
        if mem.column(&column.name).is_some() {
            return Ok(());
        }

        let default = default_value(column);
        if let Some(value) = &default {
            if matches!(column.default, Some(ColumnDefault::Literal(_))) {
                catalog.check_value(&object, column, value)?;
            }
        }
        let populated = !catalog.table(table)?.rows.is_empty();
        if populated && default.is_none() && !column.nullable && !is_serial(column) {
            return Err(ReconcileError::schema(
                &object,
                format!("column \"{}\" contains null values", column.name),
            ));
        }

        let mem = catalog
            .tables
            .get_mut(table)
            .ok_or_else(|| ReconcileError::schema(table, "relation vanished"))?;
        let mut serial = 0u64;
        for row in &mut mem.rows {
            let value = if is_serial(column) {
                serial += 1;
                Some(serial.to_string())
            } else {
                default.clone()
            };
            row.insert(column.name.clone(), value);
        }
        mem.columns.push(column.clone());
        catalog.statements.push(ddl::add_column(table, column));
        Ok(())
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        Ok(self
            .catalog()
            .constraints
            .contains(&(table.to_string(), constraint.to_string())))
    }

    async fn add_foreign_key(&self, table: &str, column: &str, fk: &ForeignKey) -> Result<()> {
        let name = ddl::foreign_key_name(table, column);
        let mut catalog = self.catalog();
        catalog.check_injected(&name)?;
        if catalog.constraints.contains(&(table.to_string(), name.clone())) {
            return Err(ReconcileError::schema(
                &name,
                format!("constraint \"{}\" for relation \"{}\" already exists", name, table),
            ));
        }
        let source = catalog.table(table)?;
        if source.column(column).is_none() {
            return Err(ReconcileError::schema(&name, format!("column \"{}\" does not exist", column)));
        }
        let target = catalog.table(&fk.table)?;
        if target.column(&fk.column).is_none() {
            return Err(ReconcileError::schema(&name, format!("column \"{}\" does not exist", fk.column)));
        }
        let keys: HashSet<Option<String>> = target.rows.iter().map(|r| r.get(&fk.column).cloned().flatten()).collect();
        let orphan = source
            .rows
            .iter()
            .filter_map(|r| r.get(column).cloned().flatten())
            .find(|v| !keys.contains(&Some(v.clone())));
        if let Some(value) = orphan {
            return Err(ReconcileError::schema(
                &name,
                format!("key ({})=({}) is not present in table \"{}\"", column, value, fk.table),
            ));
        }

        catalog.constraints.insert((table.to_string(), name));
        catalog.statements.push(ddl::add_foreign_key(table, column, fk));
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.catalog().indexes.contains_key(index))
    }

    async fn create_index(&self, table: &str, index: &IndexSpec) -> Result<()> {
        let mut catalog = self.catalog();
        catalog.check_injected(&index.name)?;
        let mem = catalog.table(table)?;
        if let Some(missing) = index.columns.iter().find(|c| mem.column(c).is_none()) {
            return Err(ReconcileError::schema(
                &index.name,
                format!("column \"{}\" does not exist", missing),
            ));
        }
        if catalog.indexes.contains_key(&index.name) {
            return Ok(());
        }
        catalog.indexes.insert(index.name.clone(), table.to_string());
        catalog.statements.push(ddl::create_index(table, index));
        Ok(())
    }

    async fn repair_values(&self, rule: &RepairRule) -> Result<u64> {
        let object = rule.target();
        let mut catalog = self.catalog();
        catalog.check_injected(&object)?;
        let mem = catalog.table(&rule.table)?;
        let column = mem
            .column(&rule.column)
            .ok_or_else(|| ReconcileError::schema(&object, format!("column \"{}\" does not exist", rule.column)))?
            .clone();

        let needs_repair = |row: &Row| match row.get(&rule.column) {
            Some(Some(value)) => !rule.allowed_values.contains(value),
            _ => false,
        };
        if mem.rows.iter().any(needs_repair) {
            catalog.check_value(&object, &column, &rule.fallback)?;
        }

        let mem = catalog
            .tables
            .get_mut(&rule.table)
            .ok_or_else(|| ReconcileError::schema(&rule.table, "relation vanished"))?;
        let mut changed = 0;
        for row in &mut mem.rows {
            if needs_repair(&*row) {
                row.insert(rule.column.clone(), Some(rule.fallback.clone()));
                changed += 1;
            }
        }
        let cast = column.enum_ref().map(str::to_string);
        catalog
            .statements
            .push(ddl::repair_values(&rule.table, &rule.column, cast.as_deref()));
        Ok(changed)
    }
}
