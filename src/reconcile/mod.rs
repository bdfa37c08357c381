//! Idempotent, additive reconciliation of live state towards the target schema.
//!
//! Each manager borrows the store explicitly and returns a [`StepOutcome`];
//! errors are left for the pipeline to record.
//!
//! [`StepOutcome`]: crate::pipeline::StepOutcome

pub mod enums;
pub mod repair;
pub mod tables;

pub use enums::EnumTypeManager;
pub use repair::DataRepairPass;
pub use tables::SchemaReconciler;
