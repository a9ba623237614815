// src/model.rs

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

pub type PersonId = String;
pub type ProjectId = String;
pub type WorkPackageId = String;
pub type AssignmentId = String;

/// Ledger precision for effort values (hundredths of a person-month).
pub const DEFAULT_DECIMAL_PLACES: u32 = 2;

/// One full person-month.
pub const FULL_PERSON_MONTH: Decimal = Decimal::ONE;

/// A calendar month. Construct through [`Period::new`] so the month is always 1-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, EngineError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|_| Self { year, month })
            .ok_or(EngineError::InvalidPeriod { year, month })
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
    }

    /// True if the inclusive range `[start, end]` overlaps this month.
    pub fn overlaps(&self, start: NaiveDate, end: Option<NaiveDate>) -> bool {
        let (Some(first), Some(last)) = (self.first_day(), self.last_day()) else {
            return false;
        };
        start <= last && end.map_or(true, |end| end >= first)
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Row returned by the ledger: a person's effort on one work package for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub assignment_id: AssignmentId,
    pub work_package_id: WorkPackageId,
    pub project_id: ProjectId,
    pub value: Decimal,
}

/// Working copy of an assignment while the engine computes its new value.
#[derive(Debug, Clone, PartialEq)]
pub struct EffortAssignment {
    pub assignment_id: AssignmentId,
    pub work_package_id: WorkPackageId,
    pub current_value: Decimal,
    pub target_value: Decimal,
}

impl EffortAssignment {
    pub fn from_record(record: &AssignmentRecord) -> Self {
        Self {
            assignment_id: record.assignment_id.clone(),
            work_package_id: record.work_package_id.clone(),
            current_value: record.value,
            target_value: record.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentUpdate {
    pub assignment_id: AssignmentId,
    pub new_value: Decimal,
}
