//! Monthly effort overload resolution.
//!
//! A person's effort assignments for a month may add up to more than the
//! person-months (PM) they have available. [`EffortOverloadEngine`] shrinks the
//! unlocked assignments back to the budget by iterative proportional scaling
//! (water-filling), keeping every project at or above the PM its confirmed
//! travel requires and never touching locked project-months.
//!
//! Persistence is reached through the [`EffortLedger`] trait; [`InMemoryLedger`]
//! is the bundled adapter used by the batch tool and the tests.

pub mod allocation;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod resolver;
pub mod result;
pub mod rounding;


pub use allocation::AllocationGroup;
pub use config::EngineConfig;
pub use coordinator::ResolutionCoordinator;
pub use engine::{BatchEntry, BatchReport, EffortOverloadEngine};
pub use error::{EngineError, LedgerError};
pub use ledger::{EffortLedger, InMemoryLedger, LedgerSnapshot, TravelStatus};
pub use model::{AssignmentRecord, AssignmentUpdate, Period};
pub use resolver::OverloadResolver;
pub use result::{ResolutionOutcome, ResolutionResult};
pub use rounding::{RoundingNote, RoundingReconciler};
