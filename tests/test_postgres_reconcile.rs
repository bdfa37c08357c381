//! Runs the pipeline against a real PostgreSQL server.
//!
//! Needs Docker; run with `cargo test -- --ignored`.

mod common;

use common::{assertions::*, fixtures, TestEnvironment};
use pgreconcile::{
    reconcile, reconcile_with_options, ConnectionManager, DatabaseConfig, DeploymentPipeline, Phase,
    PhaseSelection, ReconcileError, RetryPolicy, StepOutcome,
};
use std::time::Duration;
use tracing::info;

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(100),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_end_to_end_on_empty_database() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;

    info!("Reconciling {}", env.database_name);
    let report = reconcile(env.database_config(), &fixtures::hiring_schema()).await?;

    assert_report_clean(&report);
    assert_step_outcome(&report, "ensure enum job_status", StepOutcome::Created);
    for table in ["companies", "users", "jobs"] {
        assert_step_outcome(&report, &format!("ensure table {}", table), StepOutcome::Created);
        assert!(env.table_exists(table).await?);
    }
    assert!(env.index_exists("idx_jobs_status").await?);
    assert_eq!(env.enum_labels("job_status").await?, fixtures::JOB_STATUSES);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_second_run_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;
    let schema = fixtures::hiring_schema();

    let first = reconcile(env.database_config(), &schema).await?;
    assert_report_clean(&first);

    let second = reconcile(env.database_config(), &schema).await?;
    assert_report_clean(&second);
    assert_report_converged(&second);
    assert_eq!(second.entries.len(), first.entries.len());

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_legacy_database_is_extended_and_repaired() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;
    env.execute_sql(fixtures::sql::LEGACY_JOBS).await?;

    let report = reconcile(env.database_config(), &fixtures::hiring_schema()).await?;

    assert_report_clean(&report);
    assert_step_outcome(&report, "ensure table jobs", StepOutcome::AlreadyPresent);
    assert_step_outcome(&report, "ensure table users", StepOutcome::Created);
    assert_step_outcome(&report, "ensure column jobs.title", StepOutcome::Created);
    assert_step_outcome(&report, "ensure foreign key jobs.company_id", StepOutcome::Created);
    assert_step_outcome(&report, "repair jobs.status", StepOutcome::Repaired(1));

    let columns = env.column_names("jobs").await?;
    assert_eq!(columns.len(), 5);
    assert_eq!(columns[..3], ["id", "company_id", "status"]);
    assert!(columns.contains(&"posted_by".to_string()));
    assert!(columns.contains(&"title".to_string()));

    // Rows survive the new column, which takes its default
    assert_eq!(
        env.column_values("jobs", "title").await?,
        vec![Some("untitled".to_string()); 4]
    );
    assert_eq!(
        env.column_values("jobs", "status").await?,
        vec![
            Some("active".to_string()),
            Some("draft".to_string()),
            Some("draft".to_string()),
            None
        ]
    );

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_enum_extension_keeps_existing_order() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;
    env.execute_sql(fixtures::sql::PARTIAL_JOB_STATUS).await?;

    let manager = ConnectionManager::new(env.database_config(), quick_retry())?;
    let report = reconcile_with_options(&manager, &fixtures::hiring_schema(), PhaseSelection::Only(Phase::EnumValues)).await?;

    assert_report_clean(&report);
    assert_step_outcome(&report, "ensure enum value job_status.'active'", StepOutcome::Created);
    assert_step_outcome(&report, "ensure enum value job_status.'closed'", StepOutcome::AlreadyPresent);
    assert_eq!(env.enum_labels("job_status").await?, vec!["closed", "draft", "active"]);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_failed_table_does_not_block_unrelated_tables() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;
    // A conflicting relation named like the enum makes CREATE TYPE fail
    env.execute_sql("CREATE TABLE job_status (id int);").await?;

    let report = reconcile(env.database_config(), &fixtures::hiring_schema()).await?;

    assert_step_failed(&report, "ensure enum job_status");
    assert_step_failed(&report, "ensure table jobs");
    assert_step_outcome(&report, "ensure table companies", StepOutcome::Created);
    assert_step_outcome(&report, "ensure table users", StepOutcome::Created);
    assert!(!report.all_critical_steps_succeeded);
    assert!(env.table_exists("users").await?);
    assert!(!env.table_exists("jobs").await?);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unreachable_database_is_a_connection_error() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;
    let mut config = env.database_config();
    config.password = "wrong".to_string();

    let manager = ConnectionManager::new(config, quick_retry())?;
    let pipeline = DeploymentPipeline::plan(&fixtures::hiring_schema(), PhaseSelection::All)?;
    let err = pgreconcile::pipeline::deploy(&manager, &pipeline).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Connection { attempts: 2, .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(!env.table_exists("companies").await?);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_database_url_matches_environment_settings() -> Result<(), Box<dyn std::error::Error>> {
    let env = TestEnvironment::new().await?;

    let from_url = DatabaseConfig::from_url(&env.connection_string)?;
    let expected = env.database_config();

    assert_eq!(from_url.describe(), expected.describe());
    assert_eq!(from_url.password, expected.password);

    let report = reconcile(from_url, &fixtures::hiring_schema()).await?;
    assert_report_clean(&report);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rejected_session_setting_is_a_connection_error() -> Result<(), Box<dyn std::error::Error>> {
    init_test_tracing();
    let env = TestEnvironment::new().await?;

    // Larger than PostgreSQL accepts for statement_timeout
    let manager = ConnectionManager::new(env.database_config(), quick_retry())?
        .with_statement_timeout(Some(Duration::from_millis(3_000_000_000)));
    let err = match manager.connect().await {
        Ok(connection) => {
            connection.close().await;
            panic!("statement_timeout out of range was accepted");
        }
        Err(e) => e,
    };

    match &err {
        ReconcileError::Connection { attempts, message, .. } => {
            assert_eq!(*attempts, 1);
            assert!(message.starts_with("session setup failed"));
        }
        other => panic!("Expected a connection error, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(!env.table_exists("companies").await?);

    Ok(())
}
