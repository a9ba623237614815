// src/result.rs

use serde::{Deserialize, Serialize};

use crate::model::AssignmentUpdate;
use crate::rounding::RoundingNote;

pub const MSG_NO_OVERLOAD: &str = "No overload found.";
pub const MSG_LOCKED_INFEASIBLE: &str =
    "Locked efforts exceed available PM. Overload cannot be resolved.";
pub const MSG_TRAVEL_INFEASIBLE: &str =
    "Available PM is not enough to justify travel-related efforts.";
pub const MSG_RESOLVED: &str = "Overload resolved.";

/// Terminal state reached by one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    NoOverload,
    LockedInfeasible,
    TravelFloorInfeasible,
    Resolved,
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::NoOverload | Self::Resolved)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NoOverload => MSG_NO_OVERLOAD,
            Self::LockedInfeasible => MSG_LOCKED_INFEASIBLE,
            Self::TravelFloorInfeasible => MSG_TRAVEL_INFEASIBLE,
            Self::Resolved => MSG_RESOLVED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub message: String,
    pub outcome: ResolutionOutcome,
    /// The batch handed to the ledger. Empty on every early exit.
    pub updates: Vec<AssignmentUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounding_note: Option<RoundingNote>,
}

impl ResolutionResult {
    pub fn early_exit(outcome: ResolutionOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            message: outcome.message().to_string(),
            outcome,
            updates: Vec::new(),
            rounding_note: None,
        }
    }

    pub fn resolved(updates: Vec<AssignmentUpdate>, rounding_note: Option<RoundingNote>) -> Self {
        let outcome = ResolutionOutcome::Resolved;
        Self {
            success: true,
            message: outcome.message().to_string(),
            outcome,
            updates,
            rounding_note,
        }
    }
}
