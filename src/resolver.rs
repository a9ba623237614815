// src/resolver.rs

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::allocation::AllocationGroup;
use crate::result::ResolutionOutcome;
use crate::rounding::{RoundingNote, RoundingReconciler};

/// Totals the classification is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub budget: Decimal,
    pub total_current: Decimal,
    pub locked_total: Decimal,
    /// Travel floors of unlocked groups only; a locked group is frozen anyway.
    pub floor_total: Decimal,
}

impl LoadSummary {
    pub fn from_groups(groups: &[AllocationGroup], budget: Decimal) -> Self {
        let mut summary = Self {
            budget,
            total_current: Decimal::ZERO,
            locked_total: Decimal::ZERO,
            floor_total: Decimal::ZERO,
        };
        for group in groups {
            let current = group.current_total();
            summary.total_current += current;
            if group.is_locked {
                summary.locked_total += current;
            } else {
                summary.floor_total += group.travel_floor;
            }
        }
        summary
    }

    pub fn scalable_budget(&self) -> Decimal {
        self.budget - self.locked_total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NoOverload,
    LockedInfeasible,
    TravelFloorInfeasible,
    Overloaded { scalable_budget: Decimal },
}

impl Classification {
    pub fn of(summary: &LoadSummary) -> Self {
        if summary.total_current <= summary.budget {
            Self::NoOverload
        } else if summary.locked_total > summary.budget {
            Self::LockedInfeasible
        } else if summary.locked_total + summary.floor_total > summary.budget {
            Self::TravelFloorInfeasible
        } else {
            Self::Overloaded {
                scalable_budget: summary.scalable_budget(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    pub rounding_note: Option<RoundingNote>,
    pub iterations: usize,
}

impl Resolution {
    fn exit(outcome: ResolutionOutcome) -> Self {
        Self {
            outcome,
            rounding_note: None,
            iterations: 0,
        }
    }
}

/// Shrinks an over-allocated month back to its budget. Works purely on the
/// in-memory groups; loading and persisting belong to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverloadResolver {
    reconciler: RoundingReconciler,
}

impl OverloadResolver {
    pub fn new(reconciler: RoundingReconciler) -> Self {
        Self { reconciler }
    }

    /// Classifies the month and, when it is overloaded but feasible, rewrites
    /// the target of every unlocked assignment. Groups are untouched on any
    /// early exit.
    pub fn resolve(&self, groups: &mut [AllocationGroup], budget: Decimal) -> Resolution {
        let summary = LoadSummary::from_groups(groups, budget);
        let classification = Classification::of(&summary);
        debug!("Load summary: {:?} -> {:?}", summary, classification);

        let scalable_budget = match classification {
            Classification::NoOverload => return Resolution::exit(ResolutionOutcome::NoOverload),
            Classification::LockedInfeasible => {
                warn!(
                    "Locked total {} exceeds budget {}",
                    summary.locked_total, summary.budget
                );
                return Resolution::exit(ResolutionOutcome::LockedInfeasible);
            }
            Classification::TravelFloorInfeasible => {
                warn!(
                    "Locked total {} plus travel floors {} exceed budget {}",
                    summary.locked_total, summary.floor_total, summary.budget
                );
                return Resolution::exit(ResolutionOutcome::TravelFloorInfeasible);
            }
            Classification::Overloaded { scalable_budget } => scalable_budget,
        };

        let iterations = self.water_fill(groups, scalable_budget);
        let rounding_note = self.reconciler.reconcile(groups, scalable_budget);
        info!(
            "Overload resolved: Budget={}, Current={}, Locked={}, Iterations={}",
            summary.budget, summary.total_current, summary.locked_total, iterations
        );
        Resolution {
            outcome: ResolutionOutcome::Resolved,
            rounding_note,
            iterations,
        }
    }

    /// Scales unlocked groups proportionally onto `scalable_budget`, pinning
    /// any group that would drop below its travel floor to exactly that floor
    /// and rescaling the rest. Every round either stops or pins at least one
    /// group, so the loop runs at most `unlocked + 1` times.
    pub fn water_fill(&self, groups: &mut [AllocationGroup], scalable_budget: Decimal) -> usize {
        let mut active: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.is_locked)
            .map(|(i, _)| i)
            .collect();
        for &i in &active {
            groups[i].fixed_at_floor = false;
        }
        let mut fixed_total = Decimal::ZERO;
        let mut iterations = 0;

        loop {
            iterations += 1;
            let remaining = scalable_budget - fixed_total;
            let active_total: Decimal = active.iter().map(|&i| groups[i].current_total()).sum();

            if active_total.is_zero() {
                // Nothing left to scale; whatever remains is picked up by rounding.
                for &i in &active {
                    groups[i].distribute(Decimal::ZERO);
                }
                debug!(
                    "Water-filling iteration {}: no active effort left, Remaining={}",
                    iterations, remaining
                );
                break;
            }

            let ratio = remaining / active_total;
            let (breaching, holding): (Vec<usize>, Vec<usize>) = active
                .iter()
                .copied()
                .partition(|&i| groups[i].current_total() * ratio < groups[i].travel_floor);
            debug!(
                "Water-filling iteration {}: Ratio={}, Active={}, Breaching={}",
                iterations,
                ratio,
                active.len(),
                breaching.len()
            );

            if breaching.is_empty() {
                for &i in &holding {
                    let target = groups[i].current_total() * ratio;
                    groups[i].distribute(target);
                }
                break;
            }

            for &i in &breaching {
                let group = &mut groups[i];
                let floor = group.travel_floor;
                group.fixed_at_floor = true;
                group.distribute(floor);
                fixed_total += floor;
                debug!("Pinned project {} at travel floor {}", group.project_id, floor);
            }
            active = holding;
        }
        iterations
    }
}
