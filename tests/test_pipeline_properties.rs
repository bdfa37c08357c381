use pgreconcile::analysis::resolve_creation_order;
use pgreconcile::reconcile::{DataRepairPass, EnumTypeManager, SchemaReconciler};
use pgreconcile::schema::{ColumnSpec, ColumnType, EnumSpec, IndexSpec, RepairRule, TableSpec};
use pgreconcile::{
    recruiting_schema, DeploymentPipeline, MemoryStore, Phase, PhaseSelection, ReconcileError, SchemaStore,
    StepOutcome, TargetSchema,
};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

const JOB_STATUSES: [&str; 6] = ["draft", "active", "paused", "closed", "expired", "inactive"];

/// companies <- users <- jobs, declared out of order on purpose
fn hiring_schema() -> TargetSchema {
    TargetSchema::new("hiring")
        .with_enum(EnumSpec::new("job_status", &["draft", "active", "closed"]))
        .with_table(
            TableSpec::new("jobs")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("company_id", ColumnType::Integer).not_null().references("companies", "id"))
                .column(ColumnSpec::new("posted_by", ColumnType::Integer).references("users", "id"))
                .column(
                    ColumnSpec::new("status", ColumnType::Enum("job_status".into()))
                        .not_null()
                        .default_literal("draft"),
                )
                .index(IndexSpec::new("idx_jobs_status", &["status"])),
        )
        .with_table(
            TableSpec::new("users")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("email", ColumnType::Text).not_null().unique())
                .column(ColumnSpec::new("company_id", ColumnType::Integer).references("companies", "id")),
        )
        .with_table(
            TableSpec::new("companies")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("name", ColumnType::Text).not_null()),
        )
}

fn position(order: &[String], table: &str) -> usize {
    order
        .iter()
        .position(|t| t == table)
        .unwrap_or_else(|| panic!("{} missing from {:?}", table, order))
}

#[tokio::test]
async fn test_end_to_end_from_empty_database() {
    init_test_tracing();
    let store = MemoryStore::new();
    let pipeline = DeploymentPipeline::plan(&hiring_schema(), PhaseSelection::All).unwrap();

    let report = pipeline.run(&store).await;

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures());
    assert!(report.all_critical_steps_succeeded);
    for table in ["companies", "users", "jobs"] {
        assert_eq!(
            report.outcome_of(&format!("ensure table {}", table)),
            Some(&StepOutcome::Created)
        );
    }
    assert_eq!(report.outcome_of("ensure enum job_status"), Some(&StepOutcome::Created));
    assert_eq!(report.created_count(), 4);

    let created = store.created_tables();
    assert!(position(&created, "companies") < position(&created, "jobs"));
    assert!(position(&created, "users") < position(&created, "jobs"));
    assert!(store.has_index("idx_jobs_status"));
    assert_eq!(
        store.enum_labels("job_status"),
        Some(vec!["draft".to_string(), "active".to_string(), "closed".to_string()])
    );
}

#[tokio::test]
async fn test_second_run_is_converged_and_identical() {
    init_test_tracing();
    let store = MemoryStore::new();
    let pipeline = DeploymentPipeline::plan(&recruiting_schema(), PhaseSelection::All).unwrap();

    let first = pipeline.run(&store).await;
    assert!(first.is_clean(), "unexpected failures: {:?}", first.failures());
    assert!(!first.is_converged());
    let statements_after_first = store.statements().len();

    let second = pipeline.run(&store).await;
    let third = pipeline.run(&store).await;

    assert!(second.is_converged(), "second run changed something: {:?}", second.outcomes());
    assert_eq!(second.outcomes(), third.outcomes());
    assert_eq!(second.entries.len(), first.entries.len());

    // Only repair statements are sent on a converged run
    let repeat_statements = &store.statements()[statements_after_first..];
    assert!(repeat_statements.iter().all(|s| s.starts_with("UPDATE")));
}

#[test]
fn test_dependencies_always_precede_dependents() {
    let schema = recruiting_schema();
    let order = resolve_creation_order(&schema.tables).unwrap();

    for table in &schema.tables {
        for dependency in &table.depends_on {
            assert!(
                position(&order, dependency) < position(&order, &table.name),
                "{} placed before its dependency {}",
                table.name,
                dependency
            );
        }
    }
}

#[tokio::test]
async fn test_cycle_rejected_before_any_ddl() {
    let store = MemoryStore::new();
    let cyclic = TargetSchema::new("cyclic")
        .with_table(
            TableSpec::new("a")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("b_id", ColumnType::Integer).references("b", "id")),
        )
        .with_table(
            TableSpec::new("b")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("a_id", ColumnType::Integer).references("a", "id")),
        );

    let err = DeploymentPipeline::plan(&cyclic, PhaseSelection::All).unwrap_err();

    assert!(matches!(err, ReconcileError::CircularDependency(_)));
    assert!(err.is_fatal());
    assert!(store.statements().is_empty());
    assert!(store.created_tables().is_empty());
}

#[tokio::test]
async fn test_enum_values_are_append_only() {
    let store = MemoryStore::new();
    let manager = EnumTypeManager::new(&store);
    manager
        .ensure_enum(&EnumSpec::new("job_status", &["draft", "active", "closed"]))
        .await
        .unwrap();

    let first = manager.ensure_value("job_status", "expired").await.unwrap();
    let second = manager.ensure_value("job_status", "expired").await.unwrap();

    assert_eq!(first, StepOutcome::Created);
    assert_eq!(second, StepOutcome::AlreadyPresent);
    assert_eq!(
        store.enum_labels("job_status").unwrap(),
        vec!["draft", "active", "closed", "expired"]
    );
}

#[tokio::test]
async fn test_extended_enum_keeps_existing_labels_through_pipeline() {
    let store = MemoryStore::new();
    EnumTypeManager::new(&store)
        .ensure_enum(&EnumSpec::new("job_status", &["closed", "draft"]))
        .await
        .unwrap();

    let schema = TargetSchema::new("hiring").with_enum(EnumSpec::new("job_status", &JOB_STATUSES));
    let report = DeploymentPipeline::plan(&schema, PhaseSelection::All)
        .unwrap()
        .run(&store)
        .await;

    assert_eq!(report.outcome_of("ensure enum job_status"), Some(&StepOutcome::AlreadyPresent));
    assert_eq!(report.outcome_of("ensure enum value job_status.'closed'"), Some(&StepOutcome::AlreadyPresent));
    assert_eq!(report.outcome_of("ensure enum value job_status.'paused'"), Some(&StepOutcome::Created));

    let labels = store.enum_labels("job_status").unwrap();
    assert_eq!(&labels[..2], &["closed".to_string(), "draft".to_string()]);
    assert_eq!(labels.len(), JOB_STATUSES.len());
}

#[tokio::test]
async fn test_long_table_name_gets_every_foreign_key() {
    init_test_tracing();
    let long = format!("candidate_application_history_{}", "x".repeat(30));
    assert_eq!(long.len(), 60);

    let schema = TargetSchema::new("long_names")
        .with_table(TableSpec::new("companies").column(ColumnSpec::id("id")))
        .with_table(TableSpec::new("users").column(ColumnSpec::id("id")))
        .with_table(
            TableSpec::new(long.clone())
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("company_id", ColumnType::Integer).references("companies", "id"))
                .column(ColumnSpec::new("user_id", ColumnType::Integer).references("users", "id")),
        );

    // Legacy copy of the table with the columns but no constraints
    let store = MemoryStore::new();
    for table in ["companies", "users"] {
        store
            .create_table(&TableSpec::new(table).column(ColumnSpec::id("id")))
            .await
            .unwrap();
    }
    store
        .create_table(
            &TableSpec::new(long.clone())
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("company_id", ColumnType::Integer))
                .column(ColumnSpec::new("user_id", ColumnType::Integer)),
        )
        .await
        .unwrap();
    let statements_before = store.statements().len();

    let pipeline = DeploymentPipeline::plan(&schema, PhaseSelection::All).unwrap();
    let report = pipeline.run(&store).await;

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures());
    for column in ["company_id", "user_id"] {
        assert_eq!(
            report.outcome_of(&format!("ensure foreign key {}.{}", long, column)),
            Some(&StepOutcome::Created)
        );
    }
    let added_constraints = store.statements()[statements_before..]
        .iter()
        .filter(|s| s.contains("FOREIGN KEY"))
        .count();
    assert_eq!(added_constraints, 2);

    let second = pipeline.run(&store).await;
    assert!(second.is_converged(), "second run changed something: {:?}", second.outcomes());
}

#[tokio::test]
async fn test_column_added_to_populated_table_keeps_rows() {
    let store = MemoryStore::new();
    store
        .create_table(
            &TableSpec::new("companies")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("name", ColumnType::Text).not_null()),
        )
        .await
        .unwrap();
    store.insert_row("companies", &[("name", Some("Acme"))]).unwrap();
    store.insert_row("companies", &[("name", Some("Globex"))]).unwrap();

    let verified = ColumnSpec::new("is_verified", ColumnType::Boolean)
        .not_null()
        .default_expr("false");
    let outcome = SchemaReconciler::new(&store)
        .ensure_column("companies", &verified)
        .await
        .unwrap();

    assert_eq!(outcome, StepOutcome::Created);
    assert_eq!(store.column_names("companies"), vec!["id", "name", "is_verified"]);
    let rows = store.rows("companies");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Some("Acme".to_string()));
    assert_eq!(rows[1]["name"], Some("Globex".to_string()));
    assert!(rows.iter().all(|r| r["is_verified"] == Some("false".to_string())));
}

#[tokio::test]
async fn test_repair_changes_only_invalid_row() {
    let store = MemoryStore::new();
    store
        .create_table(
            &TableSpec::new("jobs")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("status", ColumnType::Varchar(32))),
        )
        .await
        .unwrap();
    store.insert_row("jobs", &[("id", Some("1")), ("status", Some("active"))]).unwrap();
    store.insert_row("jobs", &[("id", Some("2")), ("status", Some("bogus"))]).unwrap();
    store.insert_row("jobs", &[("id", Some("3")), ("status", Some("draft"))]).unwrap();

    let rule = RepairRule::new("jobs", "status", &JOB_STATUSES, "inactive");
    let repair = DataRepairPass::new(&store);

    assert_eq!(repair.repair(&rule).await.unwrap(), StepOutcome::Repaired(1));
    let statuses: Vec<_> = store
        .rows("jobs")
        .iter()
        .map(|r| r["status"].clone().unwrap())
        .collect();
    assert_eq!(statuses, vec!["active", "inactive", "draft"]);

    assert_eq!(repair.repair(&rule).await.unwrap(), StepOutcome::Repaired(0));
}

#[tokio::test]
async fn test_failed_table_does_not_stop_independent_table() {
    init_test_tracing();
    // Creating the enum fails, so table b cannot be created; c does not care
    let store = MemoryStore::new().fail_on("b_kind");
    let schema = TargetSchema::new("partial")
        .with_enum(EnumSpec::new("b_kind", &["x", "y"]))
        .with_table(
            TableSpec::new("b")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("kind", ColumnType::Enum("b_kind".into()))),
        )
        .with_table(
            TableSpec::new("c")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("label", ColumnType::Text)),
        );
    let pipeline = DeploymentPipeline::plan(&schema, PhaseSelection::All).unwrap();

    let report = pipeline.run(&store).await;

    assert!(report.outcome_of("ensure enum b_kind").unwrap().is_failed());
    assert!(report.outcome_of("ensure table b").unwrap().is_failed());
    assert_eq!(report.outcome_of("ensure table c"), Some(&StepOutcome::Created));
    assert!(!report.all_critical_steps_succeeded);
    assert_eq!(report.entries.len(), pipeline.steps().len());
    assert!(report.summary().contains("partially reconciled"));

    // Once the cause is gone a re-run converges the remainder
    store.clear_failures();
    let retry = pipeline.run(&store).await;
    assert!(retry.is_clean(), "unexpected failures: {:?}", retry.failures());
    assert_eq!(retry.outcome_of("ensure table b"), Some(&StepOutcome::Created));
    assert_eq!(retry.outcome_of("ensure table c"), Some(&StepOutcome::AlreadyPresent));
}

#[tokio::test]
async fn test_unsupported_enum_extension_is_reported_not_fatal() {
    let store = MemoryStore::new();
    EnumTypeManager::new(&store)
        .ensure_enum(&EnumSpec::new("job_status", &["draft"]))
        .await
        .unwrap();
    let store = store.with_enum_append_unsupported();

    let schema = TargetSchema::new("hiring").with_enum(EnumSpec::new("job_status", &["draft", "active"]));
    let report = DeploymentPipeline::plan(&schema, PhaseSelection::All)
        .unwrap()
        .run(&store)
        .await;

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].description, "ensure enum value job_status.'active'");
    assert_eq!(store.enum_labels("job_status").unwrap(), vec!["draft"]);
}

#[tokio::test]
async fn test_single_phase_only_touches_that_phase() {
    let store = MemoryStore::new();
    let pipeline = DeploymentPipeline::plan(&hiring_schema(), PhaseSelection::Only(Phase::Enums)).unwrap();

    let report = pipeline.run(&store).await;

    assert_eq!(report.entries.len(), 1);
    assert!(store.enum_labels("job_status").is_some());
    assert!(store.created_tables().is_empty());
}

#[tokio::test]
async fn test_recruiting_repairs_after_schema_drift() {
    init_test_tracing();
    let store = MemoryStore::new();
    // A legacy jobs table whose status and currency were free text
    store
        .create_table(&TableSpec::new("companies").column(ColumnSpec::id("id")))
        .await
        .unwrap();
    store
        .create_table(
            &TableSpec::new("jobs")
                .column(ColumnSpec::id("id"))
                .column(ColumnSpec::new("company_id", ColumnType::Integer))
                .column(ColumnSpec::new("status", ColumnType::Varchar(32)))
                .column(ColumnSpec::new("currency", ColumnType::Varchar(3))),
        )
        .await
        .unwrap();
    store.insert_row("companies", &[("id", Some("1"))]).unwrap();
    store
        .insert_row(
            "jobs",
            &[("company_id", Some("1")), ("status", Some("open")), ("currency", Some("usd"))],
        )
        .unwrap();
    store
        .insert_row(
            "jobs",
            &[("company_id", Some("1")), ("status", Some("active")), ("currency", Some("EUR"))],
        )
        .unwrap();

    let pipeline = DeploymentPipeline::plan(&recruiting_schema(), PhaseSelection::All).unwrap();
    let report = pipeline.run(&store).await;

    assert_eq!(report.outcome_of("ensure table jobs"), Some(&StepOutcome::AlreadyPresent));
    assert_eq!(report.outcome_of("ensure table users"), Some(&StepOutcome::Created));
    assert_eq!(report.outcome_of("ensure column jobs.employment_type"), Some(&StepOutcome::Created));
    // NOT NULL without a default cannot be added to populated rows; the run carries on
    assert!(report.outcome_of("ensure column jobs.title").unwrap().is_failed());
    assert_eq!(report.outcome_of("ensure foreign key jobs.company_id"), Some(&StepOutcome::Created));
    assert_eq!(report.outcome_of("repair jobs.status"), Some(&StepOutcome::Repaired(1)));
    assert_eq!(report.outcome_of("repair jobs.currency"), Some(&StepOutcome::Repaired(1)));

    let jobs = store.rows("jobs");
    assert_eq!(jobs[0]["status"], Some("inactive".to_string()));
    assert_eq!(jobs[0]["currency"], Some("USD".to_string()));
    assert_eq!(jobs[1]["status"], Some("active".to_string()));
    assert_eq!(jobs[1]["currency"], Some("EUR".to_string()));
}
