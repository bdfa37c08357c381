//! Declarative description of the schema the reconciler converges on.
//!
//! A [`TargetSchema`] is built once in-process (see [`target`]) and is
//! read-only for the duration of a run.

pub mod target;

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ReconcileError, Result};

/// PostgreSQL truncates identifiers longer than this
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arg", rename_all = "snake_case")]
pub enum ColumnType {
    Serial,
    BigSerial,
    Integer,
    BigInt,
    Boolean,
    Text,
    Varchar(u32),
    Numeric(u8, u8),
    Date,
    Timestamptz,
    Jsonb,
    Uuid,
    /// Column constrained by a named enumerated type
    Enum(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// Quoted as a string literal when rendered
    Literal(String),
    /// Rendered verbatim, e.g. `now()` or `false`
    Expression(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<ForeignKey>,
}

impl ColumnSpec {
    /// A nullable column with no default
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
            references: None,
        }
    }

    /// `SERIAL PRIMARY KEY` column
    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Serial).primary_key()
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_literal(mut self, value: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Literal(value.into()));
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expr.into()));
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
            on_delete: ReferentialAction::NoAction,
        });
        self
    }

    /// Sets the ON DELETE action of an existing reference
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let Some(fk) = self.references.as_mut() {
            fk.on_delete = action;
        }
        self
    }

    /// Name of the enumerated type this column is tied to, if any
    pub fn enum_ref(&self) -> Option<&str> {
        match &self.column_type {
            ColumnType::Enum(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub indexes: Vec<IndexSpec>,
    /// Tables that must exist before this one; includes every foreign-key target
    pub depends_on: BTreeSet<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Adds a column; a reference to another table also records the dependency
    pub fn column(mut self, column: ColumnSpec) -> Self {
        if let Some(fk) = &column.references {
            if fk.table != self.name {
                self.depends_on.insert(fk.table.clone());
            }
        }
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Declares a dependency that is not expressed through a foreign key
    pub fn depends_on(mut self, table: impl Into<String>) -> Self {
        self.depends_on.insert(table.into());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns carrying a foreign key, in declaration order
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnSpec, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| (c, fk)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumSpec {
    pub name: String,
    /// Ordered; only ever grows
    pub values: Vec<String>,
}

impl EnumSpec {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Baseline data invariant: `column` only holds `allowed_values`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRule {
    pub table: String,
    pub column: String,
    pub allowed_values: Vec<String>,
    pub fallback: String,
}

impl RepairRule {
    pub fn new(table: &str, column: &str, allowed_values: &[&str], fallback: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            allowed_values: allowed_values.iter().map(|v| v.to_string()).collect(),
            fallback: fallback.to_string(),
        }
    }

    /// Rule whose allowed set is every value of `spec`
    pub fn for_enum(table: &str, column: &str, spec: &EnumSpec, fallback: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            allowed_values: spec.values.clone(),
            fallback: fallback.to_string(),
        }
    }

    pub fn target(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSchema {
    pub name: String,
    pub enums: Vec<EnumSpec>,
    pub tables: Vec<TableSpec>,
    pub repairs: Vec<RepairRule>,
}

impl TargetSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enums: Vec::new(),
            tables: Vec::new(),
            repairs: Vec::new(),
        }
    }

    pub fn with_enum(mut self, spec: EnumSpec) -> Self {
        self.enums.push(spec);
        self
    }

    pub fn with_table(mut self, spec: TableSpec) -> Self {
        self.tables.push(spec);
        self
    }

    pub fn with_repair(mut self, rule: RepairRule) -> Self {
        self.repairs.push(rule);
        self
    }

    pub fn find_table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumSpec> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// SHA-256 over the serialized definition; identifies the schema version in reports
    pub fn fingerprint(&self) -> String {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&serialized);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Check the definition is internally consistent.
    ///
    /// Cycles are left to the dependency resolver, which reports the tables involved.
    pub fn validate(&self) -> Result<()> {
        let ident = Regex::new(r"^[a-z_][a-z0-9_]*$")
            .map_err(|e| ReconcileError::Other(e.to_string()))?;
        let check = |kind: &str, name: &str| -> Result<()> {
            if !ident.is_match(name) || name.len() > MAX_IDENTIFIER_LEN {
                return Err(ReconcileError::InvalidSchema(format!(
                    "{} name '{}' is not a valid identifier",
                    kind, name
                )));
            }
            Ok(())
        };

        let mut enum_names = HashSet::new();
        for spec in &self.enums {
            check("enum", &spec.name)?;
            if !enum_names.insert(spec.name.as_str()) {
                return Err(duplicate("enum", &spec.name));
            }
            if spec.values.is_empty() {
                return Err(ReconcileError::InvalidSchema(format!(
                    "enum '{}' has no values",
                    spec.name
                )));
            }
            let mut seen = HashSet::new();
            for value in &spec.values {
                if !seen.insert(value.as_str()) {
                    return Err(duplicate(&format!("value of enum '{}'", spec.name), value));
                }
            }
        }

        let table_names: HashSet<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        if table_names.len() != self.tables.len() {
            let mut seen = HashSet::new();
            for table in &self.tables {
                if !seen.insert(table.name.as_str()) {
                    return Err(duplicate("table", &table.name));
                }
            }
        }

        let mut index_names = HashSet::new();
        for table in &self.tables {
            check("table", &table.name)?;
            let mut columns = HashSet::new();
            let mut constraint_names = HashSet::new();
            for column in &table.columns {
                check("column", &column.name)?;
                if !columns.insert(column.name.as_str()) {
                    return Err(duplicate(&format!("column of '{}'", table.name), &column.name));
                }
                if let Some(enum_name) = column.enum_ref() {
                    if !enum_names.contains(enum_name) {
                        return Err(ReconcileError::InvalidSchema(format!(
                            "column {}.{} references undeclared enum '{}'",
                            table.name, column.name, enum_name
                        )));
                    }
                }
                if let Some(fk) = &column.references {
                    let constraint = crate::sql::ddl::foreign_key_name(&table.name, &column.name);
                    if !constraint_names.insert(constraint.clone()) {
                        return Err(ReconcileError::InvalidSchema(format!(
                            "foreign key name '{}' on table '{}' is used by more than one column",
                            constraint, table.name
                        )));
                    }
                    let target = self.find_table(&fk.table).ok_or_else(|| {
                        ReconcileError::MissingDependency {
                            table: table.name.clone(),
                            dependency: fk.table.clone(),
                        }
                    })?;
                    if target.find_column(&fk.column).is_none() {
                        return Err(ReconcileError::InvalidSchema(format!(
                            "column {}.{} references missing column {}.{}",
                            table.name, column.name, fk.table, fk.column
                        )));
                    }
                }
            }
            for dependency in &table.depends_on {
                if !table_names.contains(dependency.as_str()) {
                    return Err(ReconcileError::MissingDependency {
                        table: table.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            for index in &table.indexes {
                check("index", &index.name)?;
                if !index_names.insert(index.name.as_str()) {
                    return Err(duplicate("index", &index.name));
                }
                if index.columns.is_empty() {
                    return Err(ReconcileError::InvalidSchema(format!(
                        "index '{}' has no columns",
                        index.name
                    )));
                }
                for column in &index.columns {
                    if table.find_column(column).is_none() {
                        return Err(ReconcileError::InvalidSchema(format!(
                            "index '{}' names unknown column {}.{}",
                            index.name, table.name, column
                        )));
                    }
                }
            }
        }

        for rule in &self.repairs {
            let table = self.find_table(&rule.table).ok_or_else(|| {
                ReconcileError::InvalidSchema(format!(
                    "repair rule for {} names an undeclared table",
                    rule.target()
                ))
            })?;
            let column = table.find_column(&rule.column).ok_or_else(|| {
                ReconcileError::InvalidSchema(format!(
                    "repair rule for {} names an undeclared column",
                    rule.target()
                ))
            })?;
            if !rule.allowed_values.contains(&rule.fallback) {
                return Err(ReconcileError::InvalidSchema(format!(
                    "repair fallback '{}' for {} is not an allowed value",
                    rule.fallback,
                    rule.target()
                )));
            }
            if let Some(enum_spec) = column.enum_ref().and_then(|name| self.find_enum(name)) {
                if let Some(value) = rule.allowed_values.iter().find(|v| !enum_spec.contains(v)) {
                    return Err(ReconcileError::InvalidSchema(format!(
                        "repair rule for {} allows '{}' which enum '{}' does not declare",
                        rule.target(),
                        value,
                        enum_spec.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn duplicate(kind: &str, name: &str) -> ReconcileError {
    ReconcileError::InvalidSchema(format!("duplicate {} '{}'", kind, name))
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Serial => write!(f, "serial"),
            ColumnType::BigSerial => write!(f, "bigserial"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Varchar(len) => write!(f, "varchar({})", len),
            ColumnType::Numeric(p, s) => write!(f, "numeric({},{})", p, s),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Timestamptz => write!(f, "timestamptz"),
            ColumnType::Jsonb => write!(f, "jsonb"),
            ColumnType::Uuid => write!(f, "uuid"),
            ColumnType::Enum(name) => write!(f, "{}", name),
        }
    }
}
