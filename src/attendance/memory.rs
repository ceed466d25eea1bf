//! In-memory test doubles for the store, shift and location seams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use tokio::sync::Barrier;
use tokio::time::Instant;

use super::geocode::LocationFetcher;
use super::store::{AddressColumn, AttendanceStore, CheckOutPatch, PageFilter, ShiftLookup};
use crate::error::AppError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceView, NewAttendance};
use crate::model::shift::EmployeeShift;
use crate::utils::cursor::Cursor;

#[derive(Debug, Clone)]
struct Employee {
    name: String,
    nik: String,
    department_id: u64,
    active: bool,
}

#[derive(Default)]
struct Inner {
    records: Vec<AttendanceRecord>,
    employees: HashMap<u64, Employee>,
    next_id: u64,
}

/// Enforces the (employee_id, date) uniqueness the MySQL schema provides.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    address_updates: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn add_employee(&self, id: u64, name: &str, nik: &str, department_id: u64) {
        self.inner.lock().unwrap().employees.insert(
            id,
            Employee {
                name: name.to_string(),
                nik: nik.to_string(),
                department_id,
                active: true,
            },
        );
    }

    pub fn deactivate_employee(&self, id: u64) {
        if let Some(e) = self.inner.lock().unwrap().employees.get_mut(&id) {
            e.active = false;
        }
    }

    /// Makes every subsequent write fail with an internal error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub async fn insert_checked_in(
        &self,
        employee_id: u64,
        at: DateTime<Utc>,
        status: AttendanceStatus,
    ) -> AttendanceRecord {
        self.create(NewAttendance {
            employee_id,
            date: at.date_naive(),
            check_in_time: at,
            latitude: -6.2,
            longitude: 106.8,
            address: None,
            notes: None,
            late_duration_minutes: 0,
            status,
            created_at: at,
        })
        .await
        .unwrap()
    }

    pub fn record(&self, id: u64) -> Option<AttendanceRecord> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn records_for(&self, employee_id: u64) -> Vec<AttendanceRecord> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect()
    }

    pub fn set_check_in_address(&self, id: u64, address: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.records.iter_mut().find(|r| r.id == id) {
            r.check_in_address = Some(address.to_string());
        }
    }

    pub fn address_updates(&self) -> usize {
        self.address_updates.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(AppError::Internal("store unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn view(record: &AttendanceRecord, employee: Option<&Employee>) -> AttendanceView {
        AttendanceView {
            id: record.id,
            employee_id: record.employee_id,
            date: record.date,
            check_in_time: record.check_in_time,
            check_out_time: record.check_out_time,
            check_in_address: record.check_in_address.clone(),
            check_out_address: record.check_out_address.clone(),
            late_duration_minutes: record.late_duration_minutes,
            status: record.status,
            created_at: record.created_at,
            employee_name: employee.map(|e| e.name.clone()).unwrap_or_default(),
            nik: employee.map(|e| e.nik.clone()).unwrap_or_default(),
            department: employee.map(|e| format!("Dept {}", e.department_id)),
            shift: None,
        }
    }
}

fn matches(filter: &PageFilter, record: &AttendanceRecord, employee: Option<&Employee>) -> bool {
    match filter {
        PageFilter::History {
            employee_id,
            month,
            year,
        } => {
            record.employee_id == *employee_id
                && month.is_none_or(|m| record.date.month() == m)
                && year.is_none_or(|y| record.date.year() == y)
        }
        PageFilter::Recap(recap) => {
            let in_range = recap.start_date.is_none_or(|start| record.date >= start)
                && recap.end_date.is_none_or(|end| record.date <= end);
            let in_department = recap
                .department_id
                .is_none_or(|d| employee.is_some_and(|e| e.department_id == d));
            let needle = recap
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase);
            let matches_search = needle.is_none_or(|needle| {
                employee.is_some_and(|e| {
                    e.name.to_lowercase().contains(&needle) || e.nik.to_lowercase().contains(&needle)
                })
            });
            in_range && in_department && matches_search
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn get_today(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.employee_id == employee_id && r.date == date)
            .cloned())
    }

    async fn create(&self, new: NewAttendance) -> Result<AttendanceRecord, AppError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .records
            .iter()
            .any(|r| r.employee_id == new.employee_id && r.date == new.date)
        {
            return Err(AppError::Conflict(
                "Attendance already recorded for today".into(),
            ));
        }

        inner.next_id += 1;
        let record = AttendanceRecord {
            id: inner.next_id,
            employee_id: new.employee_id,
            date: new.date,
            check_in_time: Some(new.check_in_time),
            check_out_time: None,
            check_in_lat: Some(new.latitude),
            check_in_lon: Some(new.longitude),
            check_out_lat: None,
            check_out_lon: None,
            check_in_address: new.address,
            check_out_address: None,
            notes: new.notes,
            late_duration_minutes: new.late_duration_minutes,
            status: new.status,
            created_at: new.created_at,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn check_out(&self, patch: &CheckOutPatch) -> Result<(), AppError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.records.iter_mut().find(|r| r.id == patch.attendance_id) else {
            return Err(AppError::NotFound("Attendance not found".into()));
        };
        if record.check_out_time.is_some() {
            return Err(AppError::AlreadyCompleted);
        }

        record.check_out_time = Some(patch.check_out_time);
        record.check_out_lat = Some(patch.latitude);
        record.check_out_lon = Some(patch.longitude);
        if let Some(address) = &patch.address {
            record.check_out_address = Some(address.clone());
        }
        if let Some(notes) = &patch.notes {
            record.notes = Some(notes.clone());
        }
        Ok(())
    }

    async fn update_address(
        &self,
        attendance_id: u64,
        column: AddressColumn,
        address: &str,
    ) -> Result<u64, AppError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.records.iter_mut().find(|r| r.id == attendance_id) else {
            return Ok(0);
        };
        match column {
            AddressColumn::CheckIn => record.check_in_address = Some(address.to_string()),
            AddressColumn::CheckOut => record.check_out_address = Some(address.to_string()),
        }
        self.address_updates.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn page(
        &self,
        filter: &PageFilter,
        after: Option<&Cursor>,
        fetch: u32,
    ) -> Result<Vec<AttendanceView>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<AttendanceView> = inner
            .records
            .iter()
            .filter(|r| {
                let employee = inner.employees.get(&r.employee_id);
                matches(filter, r, employee)
            })
            .filter(|r| {
                after.is_none_or(|c| {
                    r.created_at < c.sort_value || (r.created_at == c.sort_value && r.id < c.id)
                })
            })
            .map(|r| Self::view(r, inner.employees.get(&r.employee_id)))
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(fetch as usize);
        Ok(rows)
    }

    async fn count_by_status(
        &self,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Result<i64, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.date == date && r.status == status)
            .count() as i64)
    }

    async fn count_total(&self, date: NaiveDate) -> Result<i64, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().filter(|r| r.date == date).count() as i64)
    }

    async fn count_active_employees(&self) -> Result<i64, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.employees.values().filter(|e| e.active).count() as i64)
    }

    async fn bulk_late_minutes(
        &self,
        month: u32,
        year: i32,
    ) -> Result<HashMap<u64, i64>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut totals = HashMap::new();
        for record in &inner.records {
            if record.date.month() == month && record.date.year() == year {
                *totals.entry(record.employee_id).or_insert(0) +=
                    i64::from(record.late_duration_minutes);
            }
        }
        Ok(totals)
    }
}

/// Wraps a [`MemoryStore`] and injects work between a caller's `get_today`
/// read and its next write: a geocode patch of the check-in address, and a
/// barrier so several readers all observe the same state before any writes.
pub struct InterleavingStore {
    pub inner: Arc<MemoryStore>,
    geocoded_check_in: Option<String>,
    readers: Option<Barrier>,
}

impl InterleavingStore {
    pub fn geocode_after_read(inner: Arc<MemoryStore>, address: &str) -> Self {
        Self {
            inner,
            geocoded_check_in: Some(address.to_string()),
            readers: None,
        }
    }

    pub fn rendezvous_after_read(inner: Arc<MemoryStore>, readers: usize) -> Self {
        Self {
            inner,
            geocoded_check_in: None,
            readers: Some(Barrier::new(readers)),
        }
    }
}

#[async_trait]
impl AttendanceStore for InterleavingStore {
    async fn get_today(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        let record = self.inner.get_today(employee_id, date).await?;
        if let (Some(address), Some(record)) = (&self.geocoded_check_in, &record) {
            self.inner
                .update_address(record.id, AddressColumn::CheckIn, address)
                .await?;
        }
        if let Some(readers) = &self.readers {
            readers.wait().await;
        }
        Ok(record)
    }

    async fn create(&self, new: NewAttendance) -> Result<AttendanceRecord, AppError> {
        self.inner.create(new).await
    }

    async fn check_out(&self, patch: &CheckOutPatch) -> Result<(), AppError> {
        self.inner.check_out(patch).await
    }

    async fn update_address(
        &self,
        attendance_id: u64,
        column: AddressColumn,
        address: &str,
    ) -> Result<u64, AppError> {
        self.inner.update_address(attendance_id, column, address).await
    }

    async fn page(
        &self,
        filter: &PageFilter,
        after: Option<&Cursor>,
        fetch: u32,
    ) -> Result<Vec<AttendanceView>, AppError> {
        self.inner.page(filter, after, fetch).await
    }

    async fn count_by_status(
        &self,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Result<i64, AppError> {
        self.inner.count_by_status(status, date).await
    }

    async fn count_total(&self, date: NaiveDate) -> Result<i64, AppError> {
        self.inner.count_total(date).await
    }

    async fn count_active_employees(&self) -> Result<i64, AppError> {
        self.inner.count_active_employees().await
    }

    async fn bulk_late_minutes(
        &self,
        month: u32,
        year: i32,
    ) -> Result<HashMap<u64, i64>, AppError> {
        self.inner.bulk_late_minutes(month, year).await
    }
}

/// Every known employee works the same shift.
pub struct FixedShift {
    pub shift: EmployeeShift,
    pub known: Vec<u64>,
}

impl FixedShift {
    pub fn nine_to_five(known: Vec<u64>) -> Self {
        Self {
            shift: EmployeeShift {
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                grace_minutes: 5,
            },
            known,
        }
    }
}

#[async_trait]
impl ShiftLookup for FixedShift {
    async fn shift_for(&self, employee_id: u64) -> Result<Option<EmployeeShift>, AppError> {
        Ok(self.known.contains(&employee_id).then_some(self.shift))
    }
}

/// Returns a fixed address and records when it was asked.
pub struct RecordingFetcher {
    address: String,
    calls: Mutex<Vec<Instant>>,
}

impl RecordingFetcher {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocationFetcher for RecordingFetcher {
    async fn resolve_address(&self, _latitude: f64, _longitude: f64) -> String {
        self.calls.lock().unwrap().push(Instant::now());
        self.address.clone()
    }
}
