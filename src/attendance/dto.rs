use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceStatus, AttendanceView};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ClockRequest {
    #[schema(example = json!(-6.2088))]
    pub latitude: Option<f64>,
    #[schema(example = 106.8456)]
    pub longitude: Option<f64>,
    /// Selfie proof, raw base64 or a `data:` URL
    #[serde(default)]
    #[schema(example = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==")]
    pub image_base64: String,
    #[schema(example = "Jl. Jend. Sudirman No.1, Jakarta")]
    pub address: Option<String>,
    #[schema(example = "WFO")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ClockType {
    CheckIn,
    CheckOut,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[serde(rename = "type")]
    pub kind: ClockType,
    pub status: AttendanceStatus,
    #[schema(example = "2026-03-02T02:01:00Z")]
    pub time: DateTime<Utc>,
    #[schema(example = "Check-in successful")]
    pub message: String,
}

/// Where an employee stands for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClockPhase {
    NoRecord,
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TodayStatus {
    /// `null` until the first clock of the day
    pub status: Option<AttendanceStatus>,
    #[serde(rename = "type")]
    pub phase: ClockPhase,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    #[schema(example = "8h0m0s")]
    pub work_duration: String,
}

impl TodayStatus {
    pub fn no_record() -> Self {
        Self {
            status: None,
            phase: ClockPhase::NoRecord,
            check_in_time: None,
            check_out_time: None,
            work_duration: String::new(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryItem {
    pub id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_address: Option<String>,
    pub check_out_address: Option<String>,
    pub status: AttendanceStatus,
    #[schema(example = 0)]
    pub late_duration_minutes: i32,
    #[schema(example = "8h0m0s")]
    pub work_duration: String,
}

impl From<AttendanceView> for HistoryItem {
    fn from(view: AttendanceView) -> Self {
        let work_duration = view.work_duration();
        Self {
            id: view.id,
            date: view.date,
            check_in_time: view.check_in_time,
            check_out_time: view.check_out_time,
            check_in_address: view.check_in_address,
            check_out_address: view.check_out_address,
            status: view.status,
            late_duration_minutes: view.late_duration_minutes,
            work_duration,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecapItem {
    pub id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "Budi Santoso")]
    pub employee_name: String,
    #[schema(example = "3201001")]
    pub nik: String,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    #[schema(example = "Regular")]
    pub shift: Option<String>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub late_duration_minutes: i32,
    pub work_duration: String,
}

impl From<AttendanceView> for RecapItem {
    fn from(view: AttendanceView) -> Self {
        let work_duration = view.work_duration();
        Self {
            id: view.id,
            date: view.date,
            employee_name: view.employee_name,
            nik: view.nik,
            department: view.department,
            shift: view.shift,
            check_in_time: view.check_in_time,
            check_out_time: view.check_out_time,
            status: view.status,
            late_duration_minutes: view.late_duration_minutes,
            work_duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardStats {
    #[schema(example = 120)]
    pub total_employees: i64,
    #[schema(example = 95)]
    pub present_today: i64,
    #[schema(example = 12)]
    pub late_today: i64,
    #[schema(example = 13)]
    pub absent_today: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LateSummary {
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = 42)]
    pub late_minutes: i64,
}
