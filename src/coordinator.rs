// src/coordinator.rs

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::engine::{BatchEntry, BatchReport, EffortOverloadEngine};
use crate::error::EngineError;
use crate::ledger::EffortLedger;
use crate::model::{Period, PersonId};
use crate::result::ResolutionResult;

type ResolutionKey = (PersonId, Period);

/// Serializes resolutions per (person, month). Every trigger, single or batch,
/// goes through here; two triggers for the same key run one after the other
/// and different keys do not wait on each other.
pub struct ResolutionCoordinator<L: EffortLedger> {
    engine: Arc<EffortOverloadEngine<L>>,
    key_locks: TokioMutex<HashMap<ResolutionKey, Arc<TokioMutex<()>>>>,
}

impl<L: EffortLedger> ResolutionCoordinator<L> {
    pub fn new(engine: Arc<EffortOverloadEngine<L>>) -> Self {
        Self {
            engine,
            key_locks: TokioMutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<EffortOverloadEngine<L>> {
        &self.engine
    }

    pub async fn adjust_monthly_overload(
        &self,
        person_id: &str,
        year: i32,
        month: u32,
    ) -> Result<ResolutionResult, EngineError> {
        let period = Period::new(year, month)?;
        self.resolve_locked(person_id, period).await
    }

    /// Runs the engine for every person with assignments in the month.
    pub async fn adjust_period(&self, period: Period) -> Result<BatchReport, EngineError> {
        let persons = self.engine.ledger().persons_with_assignments(period).await?;
        info!("Batch adjustment for {}: {} persons", period, persons.len());
        Ok(self.run_batch(period, persons).await)
    }

    /// Trigger used after a timesheet import touched one work package.
    pub async fn adjust_after_import(
        &self,
        work_package_id: &str,
        period: Period,
    ) -> Result<BatchReport, EngineError> {
        let persons = self
            .engine
            .ledger()
            .persons_on_work_package(work_package_id, period)
            .await?;
        info!(
            "Post-import adjustment: WorkPackage={}, Period={}, Persons={}",
            work_package_id,
            period,
            persons.len()
        );
        Ok(self.run_batch(period, persons).await)
    }

    async fn run_batch(&self, period: Period, persons: Vec<PersonId>) -> BatchReport {
        let mut entries = Vec::with_capacity(persons.len());
        for person_id in persons {
            let result = self.resolve_locked(&person_id, period).await;
            entries.push(BatchEntry::from_result(person_id, result));
        }
        BatchReport { period, entries }
    }

    async fn resolve_locked(
        &self,
        person_id: &str,
        period: Period,
    ) -> Result<ResolutionResult, EngineError> {
        let key_lock = self.key_lock(person_id, period).await;
        let result = {
            let _guard = key_lock.lock().await;
            debug!("Acquired resolution lock: Person={}, Period={}", person_id, period);
            self.engine.resolve_person_month(person_id, period).await
        };
        self.release_key(person_id, period, key_lock).await;
        result
    }

    async fn key_lock(&self, person_id: &str, period: Period) -> Arc<TokioMutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry((person_id.to_string(), period))
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Forgets the key once the last holder is done; waiters keep it alive.
    async fn release_key(&self, person_id: &str, period: Period, key_lock: Arc<TokioMutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        let key = (person_id.to_string(), period);
        let idle = locks
            .get(&key)
            .is_some_and(|held| Arc::ptr_eq(held, &key_lock) && Arc::strong_count(&key_lock) == 2);
        if idle {
            locks.remove(&key);
        }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.key_locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::{InMemoryLedger, LedgerSnapshot};
    use crate::result::ResolutionOutcome;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn march() -> Period {
        Period::new(2024, 3).unwrap()
    }

    fn setup_coordinator() -> (Arc<ResolutionCoordinator<InMemoryLedger>>, InMemoryLedger) {
        let march = march();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut snapshot = LedgerSnapshot::default();
        snapshot
            .configure_work_package("WP1", "P1", start, None)
            .configure_work_package("WP2", "P2", start, None)
            .configure_assignment("A1", "E1", "WP1", march, dec!(0.70))
            .configure_assignment("A2", "E1", "WP2", march, dec!(0.70))
            .configure_budget("E1", march, dec!(1.00))
            .configure_assignment("B1", "E2", "WP1", march, dec!(0.40))
            .configure_budget("E2", march, dec!(1.00));
        let ledger = InMemoryLedger::new(snapshot);
        let engine = Arc::new(EffortOverloadEngine::new(
            Arc::new(ledger.clone()),
            EngineConfig::default(),
        ));
        (Arc::new(ResolutionCoordinator::new(engine)), ledger)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_for_one_person_month_resolve_once() {
        let (coordinator, ledger) = setup_coordinator();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.adjust_monthly_overload("E1", 2024, 3).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap().outcome);
        }

        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ResolutionOutcome::Resolved)
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ResolutionOutcome::NoOverload)
                .count(),
            7
        );
        assert_eq!(ledger.persisted_batches().unwrap().len(), 1);
        let total: Decimal = ["A1", "A2"]
            .iter()
            .map(|id| ledger.assignment_value(id).unwrap().unwrap())
            .sum();
        assert_eq!(total, dec!(1.00));
    }

    #[tokio::test]
    async fn keys_are_forgotten_once_no_trigger_holds_them() {
        let (coordinator, _ledger) = setup_coordinator();

        coordinator.adjust_monthly_overload("E1", 2024, 3).await.unwrap();
        coordinator.adjust_monthly_overload("E2", 2024, 3).await.unwrap();
        coordinator.adjust_period(march()).await.unwrap();

        assert_eq!(coordinator.tracked_keys().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn import_trigger_and_single_trigger_on_one_key_persist_once() {
        let (coordinator, ledger) = setup_coordinator();

        let import = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.adjust_after_import("WP1", march()).await })
        };
        let single = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.adjust_monthly_overload("E1", 2024, 3).await })
        };

        let report = import.await.unwrap().unwrap();
        let result = single.await.unwrap().unwrap();

        let import_outcome = report
            .entries
            .iter()
            .find(|e| e.person_id == "E1")
            .and_then(|e| e.result.as_ref())
            .map(|r| r.outcome)
            .unwrap();
        let mut outcomes = vec![import_outcome, result.outcome];
        outcomes.sort_by_key(|o| *o == ResolutionOutcome::Resolved);
        assert_eq!(
            outcomes,
            vec![ResolutionOutcome::NoOverload, ResolutionOutcome::Resolved]
        );
        assert_eq!(ledger.persisted_batches().unwrap().len(), 1);
        let total: Decimal = ["A1", "A2"]
            .iter()
            .map(|id| ledger.assignment_value(id).unwrap().unwrap())
            .sum();
        assert_eq!(total, dec!(1.00));
        assert_eq!(coordinator.tracked_keys().await, 0);
    }

    #[tokio::test]
    async fn batch_reports_each_person_of_the_month() {
        let (coordinator, ledger) = setup_coordinator();

        let report = coordinator.adjust_period(march()).await.unwrap();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.count(ResolutionOutcome::Resolved), 1);
        assert_eq!(report.count(ResolutionOutcome::NoOverload), 1);
        assert_eq!(ledger.persisted_batches().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_month_is_rejected_before_locking() {
        let (coordinator, _ledger) = setup_coordinator();

        let result = coordinator.adjust_monthly_overload("E1", 2024, 0).await;

        assert_eq!(
            result,
            Err(EngineError::InvalidPeriod {
                year: 2024,
                month: 0
            })
        );
        assert_eq!(coordinator.tracked_keys().await, 0);
    }
}
