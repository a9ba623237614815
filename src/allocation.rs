// src/allocation.rs

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::EngineError;
use crate::model::{AssignmentRecord, EffortAssignment, ProjectId};

/// All of one person's assignments on one project for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationGroup {
    pub project_id: ProjectId,
    pub members: Vec<EffortAssignment>,
    pub is_locked: bool,
    /// Sum of confirmed travel PM charged to this project; zero when there is none.
    pub travel_floor: Decimal,
    /// Set by the resolver when water-filling pins the group to its floor.
    pub fixed_at_floor: bool,
}

impl AllocationGroup {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            members: Vec::new(),
            is_locked: false,
            travel_floor: Decimal::ZERO,
            fixed_at_floor: false,
        }
    }

    pub fn current_total(&self) -> Decimal {
        self.members.iter().map(|m| m.current_value).sum()
    }

    pub fn target_total(&self) -> Decimal {
        self.members.iter().map(|m| m.target_value).sum()
    }

    pub fn has_travel_floor(&self) -> bool {
        self.travel_floor > Decimal::ZERO
    }

    /// Splits `group_target` across the members in proportion to their current
    /// share of the group. A group with no current effort spreads the target evenly.
    pub fn distribute(&mut self, group_target: Decimal) {
        let current_total = self.current_total();
        if self.members.is_empty() {
            return;
        }
        if current_total.is_zero() {
            let share = if group_target.is_zero() {
                Decimal::ZERO
            } else {
                group_target / Decimal::from(self.members.len())
            };
            for member in &mut self.members {
                member.target_value = share;
            }
            return;
        }
        for member in &mut self.members {
            member.target_value = member.current_value / current_total * group_target;
        }
        debug!(
            "Distributed group target: Project={}, Target={}, Members={}",
            self.project_id,
            group_target,
            self.members.len()
        );
    }
}

/// Groups assignment records by project, keeping the order in which projects
/// and members first appear.
pub fn group_by_project(records: &[AssignmentRecord]) -> Result<Vec<AllocationGroup>, EngineError> {
    let mut groups: Vec<AllocationGroup> = Vec::new();
    let mut index_by_project: HashMap<ProjectId, usize> = HashMap::new();
    let mut seen_assignments = HashSet::new();

    for record in records {
        if record.project_id.trim().is_empty() {
            return Err(EngineError::MissingProject {
                assignment_id: record.assignment_id.clone(),
            });
        }
        if record.value < Decimal::ZERO {
            return Err(EngineError::NegativeEffort {
                assignment_id: record.assignment_id.clone(),
                value: record.value,
            });
        }
        if !seen_assignments.insert(record.assignment_id.clone()) {
            return Err(EngineError::DuplicateAssignment {
                assignment_id: record.assignment_id.clone(),
            });
        }

        let index = *index_by_project
            .entry(record.project_id.clone())
            .or_insert_with(|| {
                groups.push(AllocationGroup::new(record.project_id.clone()));
                groups.len() - 1
            });
        groups[index]
            .members
            .push(EffortAssignment::from_record(record));
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(id: &str, project: &str, value: Decimal) -> AssignmentRecord {
        AssignmentRecord {
            assignment_id: id.to_string(),
            work_package_id: format!("WP-{}", id),
            project_id: project.to_string(),
            value,
        }
    }

    #[test]
    fn groups_assignments_by_project_in_first_seen_order() {
        let records = vec![
            record("A1", "P2", dec!(0.30)),
            record("A2", "P1", dec!(0.20)),
            record("A3", "P2", dec!(0.10)),
        ];
        let groups = group_by_project(&records).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].project_id, "P2");
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].current_total(), dec!(0.40));
        assert_eq!(groups[1].project_id, "P1");
        assert_eq!(groups[1].current_total(), dec!(0.20));
        assert!(!groups[0].is_locked);
        assert!(!groups[0].has_travel_floor());
    }

    #[test]
    fn rejects_negative_duplicate_and_projectless_records() {
        let negative = vec![record("A1", "P1", dec!(-0.10))];
        assert!(matches!(
            group_by_project(&negative),
            Err(EngineError::NegativeEffort { .. })
        ));

        let duplicate = vec![record("A1", "P1", dec!(0.10)), record("A1", "P2", dec!(0.10))];
        assert_eq!(
            group_by_project(&duplicate),
            Err(EngineError::DuplicateAssignment {
                assignment_id: "A1".to_string()
            })
        );

        let projectless = vec![record("A1", " ", dec!(0.10))];
        assert!(matches!(
            group_by_project(&projectless),
            Err(EngineError::MissingProject { .. })
        ));
    }

    #[test]
    fn distribute_keeps_original_shares() {
        let records = vec![record("A1", "P1", dec!(0.30)), record("A2", "P1", dec!(0.10))];
        let mut group = group_by_project(&records).unwrap().remove(0);

        group.distribute(dec!(0.20));

        assert_eq!(group.members[0].target_value, dec!(0.15));
        assert_eq!(group.members[1].target_value, dec!(0.05));
        assert_eq!(group.target_total(), dec!(0.20));
    }

    #[test]
    fn distribute_splits_evenly_when_group_is_empty() {
        let records = vec![record("A1", "P1", dec!(0)), record("A2", "P1", dec!(0))];
        let mut group = group_by_project(&records).unwrap().remove(0);

        group.distribute(dec!(0.40));
        assert_eq!(group.members[0].target_value, dec!(0.20));
        assert_eq!(group.members[1].target_value, dec!(0.20));

        group.distribute(Decimal::ZERO);
        assert!(group.members.iter().all(|m| m.target_value.is_zero()));
    }
}
