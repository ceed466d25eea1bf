use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Shift start and grace window assigned to an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeShift {
    pub start_time: NaiveTime,
    pub grace_minutes: u32,
}

impl EmployeeShift {
    /// Latest local time on `date` that still counts as on time.
    pub fn deadline_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start_time) + TimeDelta::minutes(i64::from(self.grace_minutes))
    }
}
