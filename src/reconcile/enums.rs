use tracing::{debug, info};

use crate::db::store::SchemaStore;
use crate::error::{ReconcileError, Result};
use crate::pipeline::StepOutcome;
use crate::schema::EnumSpec;

/// Creates enumerated types and extends them; values are only ever appended
pub struct EnumTypeManager<'a, S> {
    store: &'a S,
}

impl<'a, S: SchemaStore> EnumTypeManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Create the type with its values in declared order; an existing type is left alone
    pub async fn ensure_enum(&self, spec: &EnumSpec) -> Result<StepOutcome> {
        if let Some(existing) = self.store.enum_values(&spec.name).await? {
            let missing = spec.values.iter().filter(|v| !existing.contains(v)).count();
            if missing > 0 {
                debug!(
                    "Enum {} exists with {} value(s) still to append",
                    spec.name, missing
                );
            }
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.create_enum(spec).await?;
        info!("Created enum {} ({} values)", spec.name, spec.values.len());
        Ok(StepOutcome::Created)
    }

    /// Append `value` unless the live type already has it
    pub async fn ensure_value(&self, enum_name: &str, value: &str) -> Result<StepOutcome> {
        let existing = self.store.enum_values(enum_name).await?.ok_or_else(|| {
            ReconcileError::schema(enum_name, format!("type \"{}\" does not exist", enum_name))
        })?;

        if existing.iter().any(|v| v == value) {
            return Ok(StepOutcome::AlreadyPresent);
        }

        self.store.append_enum_value(enum_name, value).await?;
        info!("Added value '{}' to enum {}", value, enum_name);
        Ok(StepOutcome::Created)
    }
}
