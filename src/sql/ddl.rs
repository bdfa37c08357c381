//! SQL text for every statement the reconciler issues.
//!
//! Identifiers are always quoted and literals always escaped, so names coming
//! from the target schema can never change the shape of a statement.

use sha2::{Digest, Sha256};

use crate::schema::{ColumnDefault, ColumnSpec, ColumnType, EnumSpec, ForeignKey, IndexSpec, TableSpec};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render_type(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Serial => "SERIAL".to_string(),
        ColumnType::BigSerial => "BIGSERIAL".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Varchar(len) => format!("VARCHAR({})", len),
        ColumnType::Numeric(precision, scale) => format!("NUMERIC({},{})", precision, scale),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Timestamptz => "TIMESTAMPTZ".to_string(),
        ColumnType::Jsonb => "JSONB".to_string(),
        ColumnType::Uuid => "UUID".to_string(),
        ColumnType::Enum(name) => quote_ident(name),
    }
}

pub fn render_default(default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Literal(value) => quote_literal(value),
        ColumnDefault::Expression(expr) => expr.clone(),
    }
}

/// Column definition without its foreign key; references are table constraints
pub fn render_column(column: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), render_type(&column.column_type));
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(default));
    }
    def
}

/// Hex chars of the `table.column` digest kept in a shortened constraint name
const NAME_HASH_LEN: usize = 8;

/// Constraint name for a column's foreign key.
///
/// `fk_<table>_<column>` when it fits in an identifier; otherwise a prefix of
/// it followed by a digest of `table.column`, so long table names still give
/// each column its own constraint.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    let name = format!("fk_{}_{}", table, column);
    let max_len = crate::schema::MAX_IDENTIFIER_LEN;
    if name.len() <= max_len {
        return name;
    }

    let digest = Sha256::digest(format!("{}.{}", table, column).as_bytes());
    let hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let mut prefix_len = max_len - NAME_HASH_LEN - 1;
    while !name.is_char_boundary(prefix_len) {
        prefix_len -= 1;
    }
    format!("{}_{}", &name[..prefix_len], &hash[..NAME_HASH_LEN])
}

fn render_foreign_key(table: &str, column: &str, fk: &ForeignKey) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
        quote_ident(&foreign_key_name(table, column)),
        quote_ident(column),
        quote_ident(&fk.table),
        quote_ident(&fk.column),
        fk.on_delete.as_sql()
    )
}

pub fn create_enum(spec: &EnumSpec) -> String {
    let values: Vec<String> = spec.values.iter().map(|v| quote_literal(v)).collect();
    format!("CREATE TYPE {} AS ENUM ({})", quote_ident(&spec.name), values.join(", "))
}

pub fn add_enum_value(enum_name: &str, value: &str) -> String {
    format!(
        "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
        quote_ident(enum_name),
        quote_literal(value)
    )
}

pub fn create_table(spec: &TableSpec) -> String {
    let mut elements: Vec<String> = spec.columns.iter().map(render_column).collect();
    for (column, fk) in spec.foreign_keys() {
        elements.push(render_foreign_key(&spec.name, &column.name, fk));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(&spec.name),
        elements.join(",\n    ")
    )
}

pub fn add_column(table: &str, column: &ColumnSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        quote_ident(table),
        render_column(column)
    )
}

pub fn add_foreign_key(table: &str, column: &str, fk: &ForeignKey) -> String {
    format!(
        "ALTER TABLE {} ADD {}",
        quote_ident(table),
        render_foreign_key(table, column, fk)
    )
}

pub fn create_index(table: &str, index: &IndexSpec) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(table),
        columns.join(", ")
    )
}

/// Rewrites non-NULL values outside `$2` (a text array) to `$1`.
///
/// `cast_type` is the live column's user-defined type (an enum), if any; the
/// text parameter has no implicit assignment cast to it.
pub fn repair_values(table: &str, column: &str, cast_type: Option<&str>) -> String {
    let column_ident = quote_ident(column);
    let value = match cast_type {
        Some(type_name) => format!("$1::text::{}", quote_ident(type_name)),
        None => "$1::text".to_string(),
    };
    format!(
        "UPDATE {} SET {} = {} WHERE {} IS NOT NULL AND NOT ({}::text = ANY($2::text[]))",
        quote_ident(table),
        column_ident,
        value,
        column_ident,
        column_ident
    )
}
