// src/rounding.rs

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::allocation::AllocationGroup;
use crate::model::DEFAULT_DECIMAL_PLACES;

/// Non-fatal: the rounded total could not be brought back to the target
/// because no assignment was free to absorb the difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingNote {
    pub unresolved_residual: Decimal,
    pub detail: String,
}

/// Rounds every unlocked target to ledger precision while keeping the
/// rounded total equal to the scalable budget.
#[derive(Debug, Clone, Copy)]
pub struct RoundingReconciler {
    decimal_places: u32,
}

impl Default for RoundingReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_DECIMAL_PLACES)
    }
}

impl RoundingReconciler {
    pub fn new(decimal_places: u32) -> Self {
        Self { decimal_places }
    }

    pub fn round(&self, value: Decimal) -> Decimal {
        value
            .round_dp_with_strategy(self.decimal_places, RoundingStrategy::MidpointAwayFromZero)
            .max(Decimal::ZERO)
    }

    fn round_up(&self, value: Decimal) -> Decimal {
        value
            .round_dp_with_strategy(self.decimal_places, RoundingStrategy::ToPositiveInfinity)
            .max(Decimal::ZERO)
    }

    /// Finalizes the targets of all unlocked groups in place. Locked groups are skipped.
    ///
    /// `scalable_budget` is expected at ledger precision; it is rounded before the
    /// residual is taken so every final value stays at `decimal_places`.
    pub fn reconcile(
        &self,
        groups: &mut [AllocationGroup],
        scalable_budget: Decimal,
    ) -> Option<RoundingNote> {
        for group in groups.iter_mut().filter(|g| !g.is_locked) {
            for member in &mut group.members {
                member.target_value = self.round(member.target_value);
            }
            if group.fixed_at_floor || group.target_total() < self.floor_total(group) {
                self.settle_floor_group(group);
            }
        }

        let rounded_total: Decimal = groups
            .iter()
            .filter(|g| !g.is_locked)
            .map(|g| g.target_total())
            .sum();
        let residual = self.round(scalable_budget) - rounded_total;
        if residual.is_zero() {
            return None;
        }
        debug!(
            "Rounding residual: Scalable={}, Rounded={}, Residual={}",
            scalable_budget, rounded_total, residual
        );

        let unresolved = self.absorb_residual(groups, residual);
        if unresolved.is_zero() {
            return None;
        }
        let note = RoundingNote {
            unresolved_residual: unresolved,
            detail: format!(
                "Rounding residual of {} could not be assigned without breaking a travel floor",
                unresolved
            ),
        };
        warn!("RoundingResidualUnresolved: {}", note.detail);
        Some(note)
    }

    /// Smallest rounded sum that still covers the group's travel floor.
    fn floor_total(&self, group: &AllocationGroup) -> Decimal {
        self.round_up(group.travel_floor)
    }

    /// Makes a travel group sum to its floor rounded up to ledger
    /// precision, so rounding never drops the group below its travel floor.
    fn settle_floor_group(&self, group: &mut AllocationGroup) {
        let required = self.floor_total(group);
        let gap = required - group.target_total();
        if gap.is_zero() {
            return;
        }
        debug!(
            "Settling project {} at travel floor {} (gap {})",
            group.project_id, required, gap
        );
        if let Some(largest) = group
            .members
            .iter_mut()
            .reduce(|best, m| if m.current_value > best.current_value { m } else { best })
        {
            largest.target_value = (largest.target_value + gap).max(Decimal::ZERO);
        }
    }

    /// Applies the residual to the largest adjustable assignment and returns
    /// whatever could not be applied.
    fn absorb_residual(&self, groups: &mut [AllocationGroup], residual: Decimal) -> Decimal {
        // A negative residual may only come out of a group that keeps its floor.
        let candidate = groups
            .iter_mut()
            .filter(|g| !g.is_locked && !g.fixed_at_floor)
            .filter(|g| {
                residual > Decimal::ZERO
                    || !g.has_travel_floor()
                    || g.target_total() + residual >= self.floor_total(g)
            })
            .flat_map(|g| g.members.iter_mut())
            .reduce(|best, m| {
                if m.current_value.abs() > best.current_value.abs() {
                    m
                } else {
                    best
                }
            });

        let Some(member) = candidate else {
            return residual;
        };
        let adjusted = member.target_value + residual;
        if adjusted < Decimal::ZERO {
            let leftover = adjusted;
            member.target_value = Decimal::ZERO;
            return leftover;
        }
        member.target_value = adjusted;
        debug!(
            "Residual {} absorbed by assignment {}",
            residual, member.assignment_id
        );
        Decimal::ZERO
    }
}
