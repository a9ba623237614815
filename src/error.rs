// src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{AssignmentId, PersonId, WorkPackageId};

// --- Ledger Error Type ---
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Assignment references unknown work package '{work_package_id}'")]
    UnknownWorkPackage { work_package_id: WorkPackageId },

    #[error("No monthly budget recorded for person '{person_id}' in {year}-{month:02}")]
    MissingBudget {
        person_id: PersonId,
        year: i32,
        month: u32,
    },

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Fatal conditions escalated to the caller. Expected business outcomes
/// (no overload, infeasible locks or travel floors) are never reported here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Ledger access failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid period: {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Assignment '{assignment_id}' carries a negative effort value ({value})")]
    NegativeEffort {
        assignment_id: AssignmentId,
        value: Decimal,
    },

    #[error("Monthly budget must not be negative (got {value})")]
    NegativeBudget { value: Decimal },

    #[error("Assignment '{assignment_id}' was returned more than once by the ledger")]
    DuplicateAssignment { assignment_id: AssignmentId },

    #[error("Assignment '{assignment_id}' is not linked to any project")]
    MissingProject { assignment_id: AssignmentId },
}
