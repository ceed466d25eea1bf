//! Persistence seams consumed by the attendance pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceView, NewAttendance};
use crate::model::shift::EmployeeShift;
use crate::utils::cursor::Cursor;

/// Which address column a background geocode result patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressColumn {
    CheckIn,
    CheckOut,
}

impl AddressColumn {
    pub fn column_name(self) -> &'static str {
        match self {
            AddressColumn::CheckIn => "check_in_address",
            AddressColumn::CheckOut => "check_out_address",
        }
    }
}

/// Columns a check-out writes. Everything else on the row, including the
/// check-in address a geocode worker may be patching, is left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutPatch {
    pub attendance_id: u64,
    pub check_out_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Client-supplied; `None` keeps the stored value
    pub address: Option<String>,
    /// `None` keeps the stored value
    pub notes: Option<String>,
}

/// Cross-employee recap filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecapFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department_id: Option<u64>,
    /// Case-insensitive substring match on employee name or NIK.
    pub search: Option<String>,
}

/// What a paged attendance query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFilter {
    History {
        employee_id: u64,
        month: Option<u32>,
        year: Option<i32>,
    },
    Recap(RecapFilter),
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get_today(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AppError>;

    /// Fails with `AppError::Conflict` when a record for (employee, date) already exists.
    async fn create(&self, new: NewAttendance) -> Result<AttendanceRecord, AppError>;

    /// Closes an open record. Fails with `AppError::AlreadyCompleted` when the
    /// record already has a check-out, so only one of two racing check-outs lands.
    async fn check_out(&self, patch: &CheckOutPatch) -> Result<(), AppError>;

    /// Patches a single address column. Returns rows affected.
    async fn update_address(
        &self,
        attendance_id: u64,
        column: AddressColumn,
        address: &str,
    ) -> Result<u64, AppError>;

    /// Up to `fetch` rows matching `filter`, ordered `(created_at DESC, id DESC)`,
    /// strictly after `after` when present.
    async fn page(
        &self,
        filter: &PageFilter,
        after: Option<&Cursor>,
        fetch: u32,
    ) -> Result<Vec<AttendanceView>, AppError>;

    async fn count_by_status(
        &self,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Result<i64, AppError>;

    /// Number of attendance records on `date`, whatever their status.
    async fn count_total(&self, date: NaiveDate) -> Result<i64, AppError>;

    async fn count_active_employees(&self) -> Result<i64, AppError>;

    /// Sum of late minutes per employee over records whose local date falls
    /// in the given month.
    async fn bulk_late_minutes(&self, month: u32, year: i32)
    -> Result<HashMap<u64, i64>, AppError>;
}

#[async_trait]
pub trait ShiftLookup: Send + Sync {
    /// `None` when the employee is unknown or inactive.
    async fn shift_for(&self, employee_id: u64) -> Result<Option<EmployeeShift>, AppError>;
}
