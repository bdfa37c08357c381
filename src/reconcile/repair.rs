use tracing::{debug, info};

use crate::db::store::SchemaStore;
use crate::error::{ReconcileError, Result};
use crate::pipeline::StepOutcome;
use crate::schema::RepairRule;

/// Coerces out-of-range column values to a documented fallback.
///
/// Only non-NULL values that are not an exact member of the allowed set are
/// rewritten; valid rows are never touched.
pub struct DataRepairPass<'a, S> {
    store: &'a S,
}

impl<'a, S: SchemaStore> DataRepairPass<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn repair(&self, rule: &RepairRule) -> Result<StepOutcome> {
        let target = rule.target();
        if !rule.allowed_values.contains(&rule.fallback) {
            return Err(ReconcileError::schema(
                &target,
                format!("fallback '{}' is not an allowed value", rule.fallback),
            ));
        }
        if !self.store.table_exists(&rule.table).await? {
            return Err(ReconcileError::schema(
                &target,
                format!("relation \"{}\" does not exist", rule.table),
            ));
        }
        if !self.store.column_exists(&rule.table, &rule.column).await? {
            return Err(ReconcileError::schema(
                &target,
                format!("column \"{}\" does not exist", rule.column),
            ));
        }

        let changed = self.store.repair_values(rule).await?;
        if changed > 0 {
            info!("Repaired {} row(s) in {}, set to '{}'", changed, target, rule.fallback);
        } else {
            debug!("No invalid values in {}", target);
        }
        Ok(StepOutcome::Repaired(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::SchemaStore;
    use crate::schema::{ColumnSpec, ColumnType, TableSpec};

    const JOB_STATUSES: [&str; 6] = ["draft", "active", "paused", "closed", "expired", "inactive"];

    async fn jobs_with_text_status(store: &MemoryStore) {
        store
            .create_table(
                &TableSpec::new("jobs")
                    .column(ColumnSpec::id("id"))
                    .column(ColumnSpec::new("status", ColumnType::Varchar(20))),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repair_only_touches_invalid_rows() {
        let store = MemoryStore::new();
        jobs_with_text_status(&store).await;
        store.insert_row("jobs", &[("id", Some("1")), ("status", Some("active"))]).unwrap();
        store.insert_row("jobs", &[("id", Some("2")), ("status", Some("bogus"))]).unwrap();
        store.insert_row("jobs", &[("id", Some("3")), ("status", Some("draft"))]).unwrap();

        let rule = RepairRule::new("jobs", "status", &JOB_STATUSES, "inactive");
        let outcome = DataRepairPass::new(&store).repair(&rule).await.unwrap();
        assert_eq!(outcome, StepOutcome::Repaired(1));

        let statuses: Vec<_> = store.rows("jobs").iter().map(|r| r["status"].clone()).collect();
        assert_eq!(
            statuses,
            vec![
                Some("active".to_string()),
                Some("inactive".to_string()),
                Some("draft".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_repair_is_exact_match_and_skips_nulls() {
        let store = MemoryStore::new();
        jobs_with_text_status(&store).await;
        store.insert_row("jobs", &[("status", Some("Active"))]).unwrap();
        store.insert_row("jobs", &[("status", None)]).unwrap();

        let rule = RepairRule::new("jobs", "status", &JOB_STATUSES, "inactive");
        let pass = DataRepairPass::new(&store);
        assert_eq!(pass.repair(&rule).await.unwrap(), StepOutcome::Repaired(1));
        assert_eq!(pass.repair(&rule).await.unwrap(), StepOutcome::Repaired(0));

        let rows = store.rows("jobs");
        assert_eq!(rows[0]["status"], Some("inactive".to_string()));
        assert_eq!(rows[1]["status"], None);
    }

    #[tokio::test]
    async fn test_repair_missing_column_fails() {
        let store = MemoryStore::new();
        jobs_with_text_status(&store).await;
        let rule = RepairRule::new("jobs", "currency", &["USD"], "USD");
        let err = DataRepairPass::new(&store).repair(&rule).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Schema { ref object, .. } if object == "jobs.currency"));
    }

    #[tokio::test]
    async fn test_repair_missing_table_fails() {
        let store = MemoryStore::new();
        let rule = RepairRule::new("jobs", "status", &JOB_STATUSES, "inactive");
        assert!(DataRepairPass::new(&store).repair(&rule).await.is_err());
    }

    #[tokio::test]
    async fn test_fallback_outside_allowed_set_is_rejected() {
        let store = MemoryStore::new();
        jobs_with_text_status(&store).await;
        let rule = RepairRule::new("jobs", "status", &["draft"], "inactive");
        assert!(DataRepairPass::new(&store).repair(&rule).await.is_err());
    }
}
