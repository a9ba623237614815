// src/engine.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::allocation::{group_by_project, AllocationGroup};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::EffortLedger;
use crate::model::{AssignmentUpdate, Period, PersonId};
use crate::resolver::OverloadResolver;
use crate::result::{ResolutionOutcome, ResolutionResult};
use crate::rounding::RoundingReconciler;

/// Entry point for callers: loads a person-month from the ledger, resolves
/// any overload and writes the new values back in one batch.
pub struct EffortOverloadEngine<L: EffortLedger> {
    ledger: Arc<L>,
    resolver: OverloadResolver,
    config: EngineConfig,
}

/// Per-person outcome of a batch run. A fatal error for one person does not
/// stop the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub person_id: PersonId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub period: Period,
    pub entries: Vec<BatchEntry>,
}

impl BatchEntry {
    /// Logs a fatal error and keeps it in the entry so the batch can continue.
    pub fn from_result(person_id: PersonId, result: Result<ResolutionResult, EngineError>) -> Self {
        match result {
            Ok(result) => Self {
                person_id,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                error!("Effort adjustment failed for Person={}: {}", person_id, e);
                Self {
                    person_id,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

impl BatchReport {
    pub fn count(&self, outcome: ResolutionOutcome) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.as_ref().map(|r| r.outcome) == Some(outcome))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.as_ref().map_or(true, |r| !r.success))
            .count()
    }
}

impl<L: EffortLedger> EffortOverloadEngine<L> {
    pub fn new(ledger: Arc<L>, config: EngineConfig) -> Self {
        let resolver = OverloadResolver::new(RoundingReconciler::new(config.decimal_places));
        Self {
            ledger,
            resolver,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub async fn adjust_monthly_overload(
        &self,
        person_id: &str,
        year: i32,
        month: u32,
    ) -> Result<ResolutionResult, EngineError> {
        let period = Period::new(year, month)?;
        self.resolve_person_month(person_id, period).await
    }

    pub async fn resolve_person_month(
        &self,
        person_id: &str,
        period: Period,
    ) -> Result<ResolutionResult, EngineError> {
        info!("Adjusting monthly effort: Person={}, Period={}", person_id, period);
        let (mut groups, budget) = self.load(person_id, period).await?;

        let resolution = self.resolver.resolve(&mut groups, budget);
        if resolution.outcome != ResolutionOutcome::Resolved {
            info!(
                "No changes for Person={}, Period={}: {}",
                person_id,
                period,
                resolution.outcome.message()
            );
            return Ok(ResolutionResult::early_exit(resolution.outcome));
        }

        let updates: Vec<AssignmentUpdate> = groups
            .iter()
            .filter(|g| !g.is_locked)
            .flat_map(|g| g.members.iter())
            .map(|m| AssignmentUpdate {
                assignment_id: m.assignment_id.clone(),
                new_value: m.target_value,
            })
            .collect();
        self.report_drift(person_id, period, &groups, budget);

        self.ledger.persist_assignment_values(&updates).await?;
        info!(
            "Persisted {} adjusted assignments for Person={}, Period={}",
            updates.len(),
            person_id,
            period
        );
        Ok(ResolutionResult::resolved(updates, resolution.rounding_note))
    }

    async fn load(
        &self,
        person_id: &str,
        period: Period,
    ) -> Result<(Vec<AllocationGroup>, Decimal), EngineError> {
        let budget = self.ledger.monthly_budget(person_id, period).await?;
        if budget < Decimal::ZERO {
            return Err(EngineError::NegativeBudget { value: budget });
        }
        let records = self
            .ledger
            .assignments_for_person_month(person_id, period)
            .await?;
        let mut groups = group_by_project(&records)?;

        for group in &mut groups {
            group.is_locked = self
                .ledger
                .is_locked(person_id, &group.project_id, period)
                .await?;
            group.travel_floor = self
                .ledger
                .confirmed_travel_floor(person_id, &group.project_id, period)
                .await?;
        }
        debug!(
            "Loaded Person={}, Period={}: Budget={}, Assignments={}, Projects={}",
            person_id,
            period,
            budget,
            records.len(),
            groups.len()
        );
        Ok((groups, budget))
    }

    fn report_drift(
        &self,
        person_id: &str,
        period: Period,
        groups: &[AllocationGroup],
        budget: Decimal,
    ) {
        let persisted_total: Decimal = groups.iter().map(|g| g.target_total()).sum();
        let drift = (persisted_total - budget).abs();
        if drift > self.config.drift_tolerance {
            warn!(
                "Persisted total {} deviates from budget {} by {} for Person={}, Period={}",
                persisted_total, budget, drift, person_id, period
            );
        }
    }
}
