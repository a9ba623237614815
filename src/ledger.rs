// src/ledger.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::model::{
    AssignmentId, AssignmentRecord, AssignmentUpdate, Period, PersonId, ProjectId, WorkPackageId,
    FULL_PERSON_MONTH,
};

/// Read/write access to the persisted effort data the engine works on.
#[async_trait]
pub trait EffortLedger: Send + Sync {
    /// Available PM for the month. Out-of-contract substitution happens here, not in the engine.
    async fn monthly_budget(&self, person_id: &str, period: Period) -> Result<Decimal, LedgerError>;

    /// Assignments whose work package is active in the month.
    async fn assignments_for_person_month(
        &self,
        person_id: &str,
        period: Period,
    ) -> Result<Vec<AssignmentRecord>, LedgerError>;

    /// Sum of confirmed travel PM charged to the project for the month.
    async fn confirmed_travel_floor(
        &self,
        person_id: &str,
        project_id: &str,
        period: Period,
    ) -> Result<Decimal, LedgerError>;

    async fn is_locked(
        &self,
        person_id: &str,
        project_id: &str,
        period: Period,
    ) -> Result<bool, LedgerError>;

    /// Writes every update or none of them.
    async fn persist_assignment_values(&self, updates: &[AssignmentUpdate])
        -> Result<(), LedgerError>;

    async fn persons_with_assignments(&self, period: Period) -> Result<Vec<PersonId>, LedgerError>;

    async fn persons_on_work_package(
        &self,
        work_package_id: &str,
        period: Period,
    ) -> Result<Vec<PersonId>, LedgerError>;
}

// --- Stored Records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: WorkPackageId,
    pub project_id: ProjectId,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAssignment {
    pub id: AssignmentId,
    pub person_id: PersonId,
    pub work_package_id: WorkPackageId,
    #[serde(flatten)]
    pub period: Period,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBudgetEntry {
    pub person_id: PersonId,
    #[serde(flatten)]
    pub period: Period,
    #[serde(default)]
    pub budget: Decimal,
    /// The calendar service flags people without a contract for the month;
    /// their budget is a full person-month.
    #[serde(default)]
    pub out_of_contract: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelStatus {
    Confirmed,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelCharge {
    pub person_id: PersonId,
    pub project_id: ProjectId,
    pub date: NaiveDate,
    pub person_months: Decimal,
    pub status: TravelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub person_id: PersonId,
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub period: Period,
    pub is_locked: bool,
}

/// Everything the in-memory ledger holds; also the JSON file format of the batch tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub work_packages: Vec<WorkPackage>,
    #[serde(default)]
    pub assignments: Vec<StoredAssignment>,
    #[serde(default)]
    pub budgets: Vec<MonthlyBudgetEntry>,
    #[serde(default)]
    pub travel_charges: Vec<TravelCharge>,
    #[serde(default)]
    pub locks: Vec<LockRecord>,
}

impl LedgerSnapshot {
    // --- Configuration Methods ---

    pub fn configure_work_package(
        &mut self,
        id: &str,
        project_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> &mut Self {
        self.work_packages.push(WorkPackage {
            id: id.to_string(),
            project_id: project_id.to_string(),
            start,
            end,
        });
        self
    }

    pub fn configure_assignment(
        &mut self,
        id: &str,
        person_id: &str,
        work_package_id: &str,
        period: Period,
        value: Decimal,
    ) -> &mut Self {
        self.assignments.push(StoredAssignment {
            id: id.to_string(),
            person_id: person_id.to_string(),
            work_package_id: work_package_id.to_string(),
            period,
            value,
        });
        self
    }

    pub fn configure_budget(&mut self, person_id: &str, period: Period, budget: Decimal) -> &mut Self {
        self.budgets.push(MonthlyBudgetEntry {
            person_id: person_id.to_string(),
            period,
            budget,
            out_of_contract: false,
        });
        self
    }

    pub fn configure_out_of_contract(&mut self, person_id: &str, period: Period) -> &mut Self {
        self.budgets.push(MonthlyBudgetEntry {
            person_id: person_id.to_string(),
            period,
            budget: Decimal::ZERO,
            out_of_contract: true,
        });
        self
    }

    pub fn configure_travel_charge(
        &mut self,
        person_id: &str,
        project_id: &str,
        date: NaiveDate,
        person_months: Decimal,
        status: TravelStatus,
    ) -> &mut Self {
        self.travel_charges.push(TravelCharge {
            person_id: person_id.to_string(),
            project_id: project_id.to_string(),
            date,
            person_months,
            status,
        });
        self
    }

    pub fn configure_lock(&mut self, person_id: &str, project_id: &str, period: Period) -> &mut Self {
        self.locks.push(LockRecord {
            person_id: person_id.to_string(),
            project_id: project_id.to_string(),
            period,
            is_locked: true,
        });
        self
    }
}

// --- In-Memory Ledger ---

/// Ledger over a [`LedgerSnapshot`] held in memory. Every persisted batch is
/// also recorded so callers can inspect what was written.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerSnapshot>>,
    persisted_batches: Arc<Mutex<Vec<Vec<AssignmentUpdate>>>>,
}

impl InMemoryLedger {
    pub fn new(snapshot: LedgerSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(snapshot)),
            persisted_batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerSnapshot>, LedgerError> {
        self.state
            .lock()
            .map_err(|e| LedgerError::Storage(format!("ledger state lock poisoned: {}", e)))
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(self.state()?.clone())
    }

    pub fn persisted_batches(&self) -> Result<Vec<Vec<AssignmentUpdate>>, LedgerError> {
        self.persisted_batches
            .lock()
            .map(|batches| batches.clone())
            .map_err(|e| LedgerError::Storage(format!("batch log lock poisoned: {}", e)))
    }

    pub fn assignment_value(&self, assignment_id: &str) -> Result<Option<Decimal>, LedgerError> {
        Ok(self
            .state()?
            .assignments
            .iter()
            .find(|a| a.id == assignment_id)
            .map(|a| a.value))
    }
}

#[async_trait]
impl EffortLedger for InMemoryLedger {
    async fn monthly_budget(&self, person_id: &str, period: Period) -> Result<Decimal, LedgerError> {
        let state = self.state()?;
        let entry = state
            .budgets
            .iter()
            .find(|b| b.person_id == person_id && b.period == period)
            .ok_or_else(|| LedgerError::MissingBudget {
                person_id: person_id.to_string(),
                year: period.year,
                month: period.month,
            })?;
        if entry.out_of_contract {
            debug!(
                "Person {} is out of contract in {}; using a full person-month",
                person_id, period
            );
            return Ok(FULL_PERSON_MONTH);
        }
        Ok(entry.budget)
    }

    async fn assignments_for_person_month(
        &self,
        person_id: &str,
        period: Period,
    ) -> Result<Vec<AssignmentRecord>, LedgerError> {
        let state = self.state()?;
        let work_packages: HashMap<&str, &WorkPackage> = state
            .work_packages
            .iter()
            .map(|wp| (wp.id.as_str(), wp))
            .collect();

        let mut records = Vec::new();
        for assignment in state
            .assignments
            .iter()
            .filter(|a| a.person_id == person_id && a.period == period)
        {
            let work_package = work_packages
                .get(assignment.work_package_id.as_str())
                .ok_or_else(|| LedgerError::UnknownWorkPackage {
                    work_package_id: assignment.work_package_id.clone(),
                })?;
            if !period.overlaps(work_package.start, work_package.end) {
                debug!(
                    "Skipping assignment {}: work package {} is inactive in {}",
                    assignment.id, work_package.id, period
                );
                continue;
            }
            records.push(AssignmentRecord {
                assignment_id: assignment.id.clone(),
                work_package_id: work_package.id.clone(),
                project_id: work_package.project_id.clone(),
                value: assignment.value,
            });
        }
        Ok(records)
    }

    async fn confirmed_travel_floor(
        &self,
        person_id: &str,
        project_id: &str,
        period: Period,
    ) -> Result<Decimal, LedgerError> {
        Ok(self
            .state()?
            .travel_charges
            .iter()
            .filter(|t| {
                t.person_id == person_id
                    && t.project_id == project_id
                    && t.status == TravelStatus::Confirmed
                    && Period::containing(t.date) == period
            })
            .map(|t| t.person_months)
            .sum())
    }

    async fn is_locked(
        &self,
        person_id: &str,
        project_id: &str,
        period: Period,
    ) -> Result<bool, LedgerError> {
        Ok(self.state()?.locks.iter().any(|l| {
            l.is_locked && l.person_id == person_id && l.project_id == project_id && l.period == period
        }))
    }

    async fn persist_assignment_values(
        &self,
        updates: &[AssignmentUpdate],
    ) -> Result<(), LedgerError> {
        let mut state = self.state()?;
        let positions: HashMap<&str, usize> = state
            .assignments
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.as_str(), i))
            .collect();
        let resolved = updates
            .iter()
            .map(|u| {
                positions
                    .get(u.assignment_id.as_str())
                    .map(|&i| (i, u.new_value))
                    .ok_or_else(|| {
                        LedgerError::Storage(format!("unknown assignment '{}'", u.assignment_id))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(positions);

        for (index, value) in resolved {
            state.assignments[index].value = value;
        }
        drop(state);

        self.persisted_batches
            .lock()
            .map_err(|e| LedgerError::Storage(format!("batch log lock poisoned: {}", e)))?
            .push(updates.to_vec());
        info!("Persisted {} assignment values", updates.len());
        Ok(())
    }

    async fn persons_with_assignments(&self, period: Period) -> Result<Vec<PersonId>, LedgerError> {
        let persons: BTreeSet<PersonId> = self
            .state()?
            .assignments
            .iter()
            .filter(|a| a.period == period)
            .map(|a| a.person_id.clone())
            .collect();
        Ok(persons.into_iter().collect())
    }

    async fn persons_on_work_package(
        &self,
        work_package_id: &str,
        period: Period,
    ) -> Result<Vec<PersonId>, LedgerError> {
        let persons: BTreeSet<PersonId> = self
            .state()?
            .assignments
            .iter()
            .filter(|a| a.period == period && a.work_package_id == work_package_id)
            .map(|a| a.person_id.clone())
            .collect();
        Ok(persons.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", date_str))
    }

    fn march() -> Period {
        Period::new(2024, 3).unwrap()
    }

    fn setup_snapshot() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        snapshot
            .configure_work_package("WP1", "P1", d("2024-01-01"), None)
            .configure_work_package("WP2", "P2", d("2024-01-01"), Some(d("2024-02-29")))
            .configure_assignment("A1", "E1", "WP1", march(), dec!(0.60))
            .configure_assignment("A2", "E1", "WP2", march(), dec!(0.30))
            .configure_assignment("A3", "E2", "WP1", march(), dec!(0.50))
            .configure_budget("E1", march(), dec!(0.80))
            .configure_out_of_contract("E2", march());
        snapshot
    }

    #[tokio::test]
    async fn only_active_work_packages_are_loaded() {
        let ledger = InMemoryLedger::new(setup_snapshot());

        let records = ledger.assignments_for_person_month("E1", march()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assignment_id, "A1");
        assert_eq!(records[0].project_id, "P1");
    }

    #[tokio::test]
    async fn unknown_work_package_is_an_error() {
        let mut snapshot = setup_snapshot();
        snapshot.configure_assignment("A9", "E1", "WP-MISSING", march(), dec!(0.10));
        let ledger = InMemoryLedger::new(snapshot);

        let result = ledger.assignments_for_person_month("E1", march()).await;

        assert_eq!(
            result,
            Err(LedgerError::UnknownWorkPackage {
                work_package_id: "WP-MISSING".to_string()
            })
        );
    }

    #[tokio::test]
    async fn budget_falls_back_to_full_month_when_out_of_contract() {
        let ledger = InMemoryLedger::new(setup_snapshot());

        assert_eq!(ledger.monthly_budget("E1", march()).await.unwrap(), dec!(0.80));
        assert_eq!(ledger.monthly_budget("E2", march()).await.unwrap(), dec!(1.0));
        assert!(matches!(
            ledger.monthly_budget("E3", march()).await,
            Err(LedgerError::MissingBudget { .. })
        ));
    }

    #[tokio::test]
    async fn travel_floor_counts_confirmed_charges_in_the_month_only() {
        let mut snapshot = setup_snapshot();
        snapshot
            .configure_travel_charge("E1", "P1", d("2024-03-04"), dec!(0.10), TravelStatus::Confirmed)
            .configure_travel_charge("E1", "P1", d("2024-03-20"), dec!(0.15), TravelStatus::Confirmed)
            .configure_travel_charge("E1", "P1", d("2024-03-21"), dec!(0.20), TravelStatus::Pending)
            .configure_travel_charge("E1", "P1", d("2024-04-01"), dec!(0.30), TravelStatus::Confirmed)
            .configure_travel_charge("E1", "P2", d("2024-03-05"), dec!(0.40), TravelStatus::Confirmed);
        let ledger = InMemoryLedger::new(snapshot);

        let floor = ledger.confirmed_travel_floor("E1", "P1", march()).await.unwrap();

        assert_eq!(floor, dec!(0.25));
    }

    #[tokio::test]
    async fn lock_lookup_matches_person_project_and_month() {
        let mut snapshot = setup_snapshot();
        snapshot.configure_lock("E1", "P1", march());
        snapshot.locks.push(LockRecord {
            person_id: "E1".to_string(),
            project_id: "P2".to_string(),
            period: march(),
            is_locked: false,
        });
        let ledger = InMemoryLedger::new(snapshot);

        assert!(ledger.is_locked("E1", "P1", march()).await.unwrap());
        assert!(!ledger.is_locked("E1", "P2", march()).await.unwrap());
        assert!(!ledger.is_locked("E2", "P1", march()).await.unwrap());
        let april = Period::new(2024, 4).unwrap();
        assert!(!ledger.is_locked("E1", "P1", april).await.unwrap());
    }

    #[tokio::test]
    async fn persist_is_all_or_nothing() {
        let ledger = InMemoryLedger::new(setup_snapshot());
        let updates = vec![
            AssignmentUpdate {
                assignment_id: "A1".to_string(),
                new_value: dec!(0.40),
            },
            AssignmentUpdate {
                assignment_id: "A-UNKNOWN".to_string(),
                new_value: dec!(0.10),
            },
        ];

        let result = ledger.persist_assignment_values(&updates).await;

        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert_eq!(ledger.assignment_value("A1").unwrap(), Some(dec!(0.60)));
        assert!(ledger.persisted_batches().unwrap().is_empty());

        ledger
            .persist_assignment_values(&updates[..1])
            .await
            .unwrap();
        assert_eq!(ledger.assignment_value("A1").unwrap(), Some(dec!(0.40)));
        assert_eq!(ledger.persisted_batches().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lists_persons_per_month_and_work_package() {
        let ledger = InMemoryLedger::new(setup_snapshot());

        assert_eq!(
            ledger.persons_with_assignments(march()).await.unwrap(),
            vec!["E1".to_string(), "E2".to_string()]
        );
        assert_eq!(
            ledger.persons_on_work_package("WP2", march()).await.unwrap(),
            vec!["E1".to_string()]
        );
    }

    #[test]
    fn snapshot_json_uses_flat_periods_and_string_decimals() {
        let json = r#"{
            "work_packages": [{"id": "WP1", "project_id": "P1", "start": "2024-01-01"}],
            "assignments": [{"id": "A1", "person_id": "E1", "work_package_id": "WP1",
                             "year": 2024, "month": 3, "value": "0.60"}],
            "budgets": [{"person_id": "E1", "year": 2024, "month": 3, "budget": "0.80"}]
        }"#;
        let snapshot: LedgerSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.assignments[0].period, march());
        assert_eq!(snapshot.assignments[0].value, dec!(0.60));
        assert_eq!(snapshot.work_packages[0].end, None);
        assert!(!snapshot.budgets[0].out_of_contract);
        assert!(snapshot.locks.is_empty());
    }
}
