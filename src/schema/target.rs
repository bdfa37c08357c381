//! The recruiting platform's target schema.
//!
//! Bump nothing by hand: the report carries [`TargetSchema::fingerprint`], so
//! any edit here is visible as a new schema version in the next run's output.

use super::{
    ColumnSpec, ColumnType, EnumSpec, IndexSpec, ReferentialAction, RepairRule, TableSpec,
    TargetSchema,
};

pub const SCHEMA_NAME: &str = "recruiting";

pub fn user_role() -> EnumSpec {
    EnumSpec::new("user_role", &["candidate", "employer", "admin"])
}

pub fn job_status() -> EnumSpec {
    EnumSpec::new(
        "job_status",
        &["draft", "active", "paused", "closed", "expired", "inactive"],
    )
}

pub fn employment_type() -> EnumSpec {
    EnumSpec::new(
        "employment_type",
        &["full_time", "part_time", "contract", "internship", "temporary"],
    )
}

pub fn application_status() -> EnumSpec {
    EnumSpec::new(
        "application_status",
        &[
            "pending",
            "reviewing",
            "shortlisted",
            "interviewing",
            "offered",
            "hired",
            "rejected",
            "withdrawn",
        ],
    )
}

fn timestamps(table: TableSpec) -> TableSpec {
    table
        .column(ColumnSpec::new("created_at", ColumnType::Timestamptz).not_null().default_expr("now()"))
        .column(ColumnSpec::new("updated_at", ColumnType::Timestamptz).not_null().default_expr("now()"))
}

fn companies() -> TableSpec {
    timestamps(
        TableSpec::new("companies")
            .column(ColumnSpec::id("id"))
            .column(ColumnSpec::new("name", ColumnType::Varchar(255)).not_null())
            .column(ColumnSpec::new("slug", ColumnType::Varchar(255)).not_null().unique())
            .column(ColumnSpec::new("website", ColumnType::Varchar(512)))
            .column(ColumnSpec::new("description", ColumnType::Text))
            .column(ColumnSpec::new("logo_url", ColumnType::Varchar(512)))
            .column(ColumnSpec::new("location", ColumnType::Varchar(255)))
            .column(ColumnSpec::new("is_verified", ColumnType::Boolean).not_null().default_expr("false")),
    )
}

fn users() -> TableSpec {
    timestamps(
        TableSpec::new("users")
            .column(ColumnSpec::id("id"))
            .column(ColumnSpec::new("email", ColumnType::Varchar(255)).not_null().unique())
            .column(ColumnSpec::new("password_hash", ColumnType::Varchar(255)).not_null())
            .column(ColumnSpec::new("full_name", ColumnType::Varchar(255)))
            .column(
                ColumnSpec::new("role", ColumnType::Enum("user_role".into()))
                    .not_null()
                    .default_literal("candidate"),
            )
            .column(
                ColumnSpec::new("company_id", ColumnType::Integer)
                    .references("companies", "id")
                    .on_delete(ReferentialAction::SetNull),
            )
            .column(ColumnSpec::new("resume_url", ColumnType::Varchar(512)))
            .column(ColumnSpec::new("is_active", ColumnType::Boolean).not_null().default_expr("true"))
            .column(ColumnSpec::new("last_login_at", ColumnType::Timestamptz))
            .index(IndexSpec::new("idx_users_company_id", &["company_id"])),
    )
}

fn jobs() -> TableSpec {
    timestamps(
        TableSpec::new("jobs")
            .column(ColumnSpec::id("id"))
            .column(
                ColumnSpec::new("company_id", ColumnType::Integer)
                    .not_null()
                    .references("companies", "id")
                    .on_delete(ReferentialAction::Cascade),
            )
            .column(
                ColumnSpec::new("posted_by", ColumnType::Integer)
                    .references("users", "id")
                    .on_delete(ReferentialAction::SetNull),
            )
            .column(ColumnSpec::new("title", ColumnType::Varchar(255)).not_null())
            .column(ColumnSpec::new("description", ColumnType::Text).not_null())
            .column(ColumnSpec::new("requirements", ColumnType::Text))
            .column(ColumnSpec::new("location", ColumnType::Varchar(255)))
            .column(ColumnSpec::new("is_remote", ColumnType::Boolean).not_null().default_expr("false"))
            .column(
                ColumnSpec::new("employment_type", ColumnType::Enum("employment_type".into()))
                    .not_null()
                    .default_literal("full_time"),
            )
            .column(ColumnSpec::new("salary_min", ColumnType::Numeric(12, 2)))
            .column(ColumnSpec::new("salary_max", ColumnType::Numeric(12, 2)))
            .column(ColumnSpec::new("currency", ColumnType::Varchar(3)).not_null().default_literal("USD"))
            .column(
                ColumnSpec::new("status", ColumnType::Enum("job_status".into()))
                    .not_null()
                    .default_literal("draft"),
            )
            .column(ColumnSpec::new("views_count", ColumnType::Integer).not_null().default_expr("0"))
            .column(ColumnSpec::new("expires_at", ColumnType::Timestamptz))
            .index(IndexSpec::new("idx_jobs_company_id", &["company_id"]))
            .index(IndexSpec::new("idx_jobs_status", &["status"]))
            .index(IndexSpec::new("idx_jobs_created_at", &["created_at"])),
    )
}

fn applications() -> TableSpec {
    timestamps(
        TableSpec::new("applications")
            .column(ColumnSpec::id("id"))
            .column(
                ColumnSpec::new("job_id", ColumnType::Integer)
                    .not_null()
                    .references("jobs", "id")
                    .on_delete(ReferentialAction::Cascade),
            )
            .column(
                ColumnSpec::new("candidate_id", ColumnType::Integer)
                    .not_null()
                    .references("users", "id")
                    .on_delete(ReferentialAction::Cascade),
            )
            .column(
                ColumnSpec::new("status", ColumnType::Enum("application_status".into()))
                    .not_null()
                    .default_literal("pending"),
            )
            .column(ColumnSpec::new("cover_letter", ColumnType::Text))
            .column(ColumnSpec::new("resume_url", ColumnType::Varchar(512)))
            .column(ColumnSpec::new("notes", ColumnType::Text))
            .column(ColumnSpec::new("reviewed_at", ColumnType::Timestamptz))
            .index(IndexSpec::new("idx_applications_job_candidate", &["job_id", "candidate_id"]).unique())
            .index(IndexSpec::new("idx_applications_status", &["status"])),
    )
}

fn saved_jobs() -> TableSpec {
    TableSpec::new("saved_jobs")
        .column(ColumnSpec::id("id"))
        .column(
            ColumnSpec::new("user_id", ColumnType::Integer)
                .not_null()
                .references("users", "id")
                .on_delete(ReferentialAction::Cascade),
        )
        .column(
            ColumnSpec::new("job_id", ColumnType::Integer)
                .not_null()
                .references("jobs", "id")
                .on_delete(ReferentialAction::Cascade),
        )
        .column(ColumnSpec::new("created_at", ColumnType::Timestamptz).not_null().default_expr("now()"))
        .index(IndexSpec::new("idx_saved_jobs_user_job", &["user_id", "job_id"]).unique())
}

fn interviews() -> TableSpec {
    timestamps(
        TableSpec::new("interviews")
            .column(ColumnSpec::id("id"))
            .column(
                ColumnSpec::new("application_id", ColumnType::Integer)
                    .not_null()
                    .references("applications", "id")
                    .on_delete(ReferentialAction::Cascade),
            )
            .column(ColumnSpec::new("scheduled_at", ColumnType::Timestamptz).not_null())
            .column(ColumnSpec::new("duration_minutes", ColumnType::Integer).not_null().default_expr("30"))
            .column(ColumnSpec::new("location", ColumnType::Varchar(255)))
            .column(ColumnSpec::new("meeting_url", ColumnType::Varchar(512)))
            .column(ColumnSpec::new("feedback", ColumnType::Text))
            .index(IndexSpec::new("idx_interviews_application_id", &["application_id"])),
    )
}

/// Full definition, tables listed in the order operators expect to read them
pub fn recruiting_schema() -> TargetSchema {
    let job_status = job_status();
    let application_status = application_status();
    let user_role = user_role();
    let employment_type = employment_type();

    TargetSchema::new(SCHEMA_NAME)
        .with_repair(RepairRule::for_enum("jobs", "status", &job_status, "inactive"))
        .with_repair(RepairRule::for_enum("applications", "status", &application_status, "pending"))
        .with_repair(RepairRule::for_enum("users", "role", &user_role, "candidate"))
        .with_repair(RepairRule::for_enum("jobs", "employment_type", &employment_type, "full_time"))
        .with_repair(RepairRule::new("jobs", "currency", &["USD", "EUR", "GBP", "CAD"], "USD"))
        .with_enum(user_role)
        .with_enum(job_status)
        .with_enum(employment_type)
        .with_enum(application_status)
        .with_table(companies())
        .with_table(users())
        .with_table(jobs())
        .with_table(applications())
        .with_table(saved_jobs())
        .with_table(interviews())
}
