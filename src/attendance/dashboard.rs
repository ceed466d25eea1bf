use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::dto::DashboardStats;
use super::store::AttendanceStore;
use crate::error::AppError;
use crate::model::attendance::AttendanceStatus;

/// Parses an IANA zone name such as `Asia/Jakarta`.
pub fn parse_timezone(name: &str) -> Result<Tz, AppError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| AppError::validation(format!("Unknown timezone: {name}")))
}

pub struct DashboardAggregator {
    store: Arc<dyn AttendanceStore>,
}

impl DashboardAggregator {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Counters for the calendar day `now` falls on in `timezone`.
    pub async fn stats(&self, timezone: &str, now: DateTime<Utc>) -> Result<DashboardStats, AppError> {
        let tz = parse_timezone(timezone)?;
        let today = now.with_timezone(&tz).date_naive();

        let (total_employees, present_today, late_today, recorded_today) = futures::try_join!(
            self.store.count_active_employees(),
            self.store.count_by_status(AttendanceStatus::Present, today),
            self.store.count_by_status(AttendanceStatus::Late, today),
            self.store.count_total(today),
        )?;

        tracing::debug!(%today, total_employees, recorded_today, "Dashboard counters computed");

        Ok(DashboardStats {
            total_employees,
            present_today,
            late_today,
            absent_today: (total_employees - recorded_today).max(0),
        })
    }
}
