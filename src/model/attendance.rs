use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    OnLeave,
}

impl TryFrom<String> for AttendanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One row per (employee, calendar date).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_lat: Option<f64>,
    pub check_in_lon: Option<f64>,
    pub check_out_lat: Option<f64>,
    pub check_out_lon: Option<f64>,
    pub check_in_address: Option<String>,
    pub check_out_address: Option<String>,
    pub notes: Option<String>,
    pub late_duration_minutes: i32,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// `None` until both timestamps are set.
    pub fn work_duration(&self) -> Option<TimeDelta> {
        match (self.check_in_time, self.check_out_time) {
            (Some(check_in), Some(check_out)) => Some(check_out - check_in),
            _ => None,
        }
    }
}

/// Insert payload for a fresh check-in.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub late_duration_minutes: i32,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
}

/// Attendance row joined with the owning employee, used by paged reads.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceView {
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_address: Option<String>,
    pub check_out_address: Option<String>,
    pub late_duration_minutes: i32,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub employee_name: String,
    pub nik: String,
    pub department: Option<String>,
    pub shift: Option<String>,
}

impl AttendanceView {
    pub fn work_duration(&self) -> String {
        match (self.check_in_time, self.check_out_time) {
            (Some(check_in), Some(check_out)) => format_work_duration(check_out - check_in),
            _ => String::new(),
        }
    }
}

/// Renders a duration as `8h0m0s`, `45m10s` or `30s`. Negative spans render as `0s`.
pub fn format_work_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
