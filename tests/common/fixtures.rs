use indoc::indoc;
use pgreconcile::schema::{ColumnSpec, ColumnType, EnumSpec, IndexSpec, RepairRule, TableSpec};
use pgreconcile::TargetSchema;

pub const JOB_STATUSES: [&str; 3] = ["draft", "active", "closed"];

/// companies <- users <- jobs with a job_status enum
pub fn hiring_schema() -> TargetSchema {
    let job_status = EnumSpec::new("job_status", &JOB_STATUSES);
    TargetSchema::new("hiring")
        .with_repair(RepairRule::for_enum("jobs", "status", &job_status, "draft"))
        .with_enum(job_status)
        .with_table(
            TableSpec::new("companies")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("name", ColumnType::Varchar(255)).not_null()),
        )
        .with_table(
            TableSpec::new("users")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("email", ColumnType::Varchar(255)).not_null().unique())
                .column(ColumnSpec::new("company_id", ColumnType::Integer).references("companies", "id")),
        )
        .with_table(
            TableSpec::new("jobs")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("company_id", ColumnType::Integer).not_null().references("companies", "id"))
                .column(ColumnSpec::new("posted_by", ColumnType::Integer).references("users", "id"))
                .column(ColumnSpec::new("title", ColumnType::Varchar(255)).not_null().default_literal("untitled"))
                .column(
                    ColumnSpec::new("status", ColumnType::Enum("job_status".into()))
                        .not_null()
                        .default_literal("draft"),
                )
                .index(IndexSpec::new("idx_jobs_status", &["status"])),
        )
}

/// Legacy database state that predates enums
pub mod sql {
    use super::*;

    /// jobs with a free-text status and no title column yet
    pub const LEGACY_JOBS: &str = indoc! {r#"
        CREATE TABLE companies (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL
        );

        CREATE TABLE jobs (
            id SERIAL PRIMARY KEY,
            company_id INTEGER NOT NULL,
            status VARCHAR(32)
        );

        INSERT INTO companies (name) VALUES ('Acme');
        INSERT INTO jobs (company_id, status) VALUES (1, 'active'), (1, 'bogus'), (1, 'draft'), (1, NULL);
    "#};

    /// job_status created by an older release with fewer labels
    pub const PARTIAL_JOB_STATUS: &str = indoc! {r#"
        CREATE TYPE job_status AS ENUM ('closed', 'draft');
    "#};
}
