//! Clock-in/clock-out state machine and the read-side projections built on it.
//!
//! Per employee and local calendar day the record moves
//! `NO_RECORD -> CHECKED_IN -> CHECKED_OUT`; the last state is terminal.
//! The store's unique key on (employee_id, date) is what settles two racing
//! first clocks: the loser gets `AppError::Conflict`. Check-out only writes a
//! row whose check-out is still empty, so of two racing check-outs the loser
//! gets `AppError::AlreadyCompleted`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use super::dashboard::DashboardAggregator;
use super::dto::{
    AttendanceResponse, ClockPhase, ClockRequest, ClockType, DashboardStats, HistoryItem,
    LateSummary, RecapItem, TodayStatus,
};
use super::geocode::{EnqueueOutcome, GeocodeJob, GeocodePipeline};
use super::pagination::{HistoryPaginator, Page};
use super::store::{AttendanceStore, CheckOutPatch, PageFilter, RecapFilter, ShiftLookup};
use crate::error::AppError;
use crate::model::attendance::{AttendanceStatus, NewAttendance, format_work_duration};
use crate::model::shift::EmployeeShift;

pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    shifts: Arc<dyn ShiftLookup>,
    geocoder: Arc<GeocodePipeline>,
    paginator: HistoryPaginator,
    dashboard: DashboardAggregator,
    timezone: Tz,
}

/// Lateness of a local check-in against the shift deadline. Partial minutes
/// count as a whole minute.
pub fn evaluate_lateness(check_in: NaiveDateTime, shift: &EmployeeShift) -> (AttendanceStatus, i32) {
    let deadline = shift.deadline_on(check_in.date());
    if check_in <= deadline {
        return (AttendanceStatus::Present, 0);
    }

    let late_seconds = (check_in - deadline).num_seconds();
    let late_minutes = (late_seconds + 59) / 60;
    (
        AttendanceStatus::Late,
        i32::try_from(late_minutes).unwrap_or(i32::MAX),
    )
}

fn validate_coordinates(req: &ClockRequest) -> Result<(f64, f64), AppError> {
    let latitude = req
        .latitude
        .ok_or_else(|| AppError::validation("latitude is required"))?;
    let longitude = req
        .longitude
        .ok_or_else(|| AppError::validation("longitude is required"))?;

    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::validation("latitude must be between -90 and 90"));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation("longitude must be between -180 and 180"));
    }

    Ok((latitude, longitude))
}

/// Accepts raw base64 or a `data:<mime>;base64,<payload>` URL.
fn decode_image_proof(raw: &str) -> Result<Vec<u8>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("image proof is required"));
    }

    let payload = match raw.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| AppError::validation("image proof must be base64 encoded"))?,
        None => raw,
    };

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| AppError::validation("image proof is not valid base64"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("image proof is empty"));
    }
    Ok(bytes)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        shifts: Arc<dyn ShiftLookup>,
        geocoder: Arc<GeocodePipeline>,
        timezone: Tz,
    ) -> Self {
        Self {
            paginator: HistoryPaginator::new(Arc::clone(&store)),
            dashboard: DashboardAggregator::new(Arc::clone(&store)),
            store,
            shifts,
            geocoder,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Records a check-in or check-out depending on today's record.
    pub async fn clock(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
        req: &ClockRequest,
    ) -> Result<AttendanceResponse, AppError> {
        let (latitude, longitude) = validate_coordinates(req)?;
        decode_image_proof(&req.image_base64)?;

        let local_now = now.with_timezone(&self.timezone).naive_local();
        let today = local_now.date();

        match self.store.get_today(employee_id, today).await? {
            None => {
                self.check_in(employee_id, now, local_now, latitude, longitude, req)
                    .await
            }
            Some(record) if record.check_out_time.is_none() => {
                let check_in = record.check_in_time.unwrap_or(now);
                // Never let a skewed clock put check-out before check-in
                let check_out = now.max(check_in);

                self.store
                    .check_out(&CheckOutPatch {
                        attendance_id: record.id,
                        check_out_time: check_out,
                        latitude,
                        longitude,
                        address: non_blank(&req.address),
                        notes: non_blank(&req.notes),
                    })
                    .await
                    .inspect_err(|e| {
                        if matches!(e, AppError::AlreadyCompleted) {
                            warn!(employee_id, attendance_id = record.id, "Concurrent check-out lost the race");
                        }
                    })?;
                self.enqueue(record.id, latitude, longitude, true);

                let worked = format_work_duration(check_out - check_in);
                info!(employee_id, attendance_id = record.id, %worked, "Checked out");

                Ok(AttendanceResponse {
                    kind: ClockType::CheckOut,
                    status: record.status,
                    time: check_out,
                    message: format!("Check-out successful, worked {worked}"),
                })
            }
            Some(record) => {
                info!(employee_id, attendance_id = record.id, "Clock rejected, day already completed");
                Err(AppError::AlreadyCompleted)
            }
        }
    }

    async fn check_in(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
        local_now: NaiveDateTime,
        latitude: f64,
        longitude: f64,
        req: &ClockRequest,
    ) -> Result<AttendanceResponse, AppError> {
        let shift = self
            .shifts
            .shift_for(employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Employee not found".into()))?;

        let (status, late_duration_minutes) = evaluate_lateness(local_now, &shift);

        let record = self
            .store
            .create(NewAttendance {
                employee_id,
                date: local_now.date(),
                check_in_time: now,
                latitude,
                longitude,
                address: non_blank(&req.address),
                notes: non_blank(&req.notes),
                late_duration_minutes,
                status,
                created_at: now,
            })
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::Conflict(_)) {
                    warn!(employee_id, "Concurrent first clock lost the race");
                }
            })?;

        self.enqueue(record.id, latitude, longitude, false);
        info!(employee_id, attendance_id = record.id, %status, late_duration_minutes, "Checked in");

        let message = match status {
            AttendanceStatus::Late => {
                format!("Check-in successful, late by {late_duration_minutes} minutes")
            }
            _ => "Check-in successful".to_string(),
        };

        Ok(AttendanceResponse {
            kind: ClockType::CheckIn,
            status,
            time: now,
            message,
        })
    }

    fn enqueue(&self, attendance_id: u64, latitude: f64, longitude: f64, is_checkout: bool) {
        let outcome = self.geocoder.enqueue(GeocodeJob {
            attendance_id,
            latitude,
            longitude,
            is_checkout,
        });
        if outcome != EnqueueOutcome::Accepted {
            tracing::debug!(attendance_id, ?outcome, "Address enrichment skipped");
        }
    }

    async fn ensure_employee(&self, employee_id: u64) -> Result<(), AppError> {
        match self.shifts.shift_for(employee_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound("Employee not found".into())),
        }
    }

    pub async fn today_status(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<TodayStatus, AppError> {
        self.ensure_employee(employee_id).await?;

        let today = now.with_timezone(&self.timezone).date_naive();
        let Some(record) = self.store.get_today(employee_id, today).await? else {
            return Ok(TodayStatus::no_record());
        };

        let (phase, work_duration) = match (record.check_in_time, record.check_out_time) {
            (Some(check_in), Some(check_out)) => {
                (ClockPhase::CheckedOut, format_work_duration(check_out - check_in))
            }
            (Some(check_in), None) => (ClockPhase::CheckedIn, format_work_duration(now - check_in)),
            _ => (ClockPhase::NoRecord, String::new()),
        };

        Ok(TodayStatus {
            status: Some(record.status),
            phase,
            check_in_time: record.check_in_time,
            check_out_time: record.check_out_time,
            work_duration,
        })
    }

    pub async fn history(
        &self,
        employee_id: u64,
        month: Option<u32>,
        year: Option<i32>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<HistoryItem>, AppError> {
        if month.is_some_and(|m| !(1..=12).contains(&m)) {
            return Err(AppError::validation("month must be between 1 and 12"));
        }
        self.ensure_employee(employee_id).await?;

        let filter = PageFilter::History {
            employee_id,
            month,
            year,
        };
        let page = self.paginator.page(&filter, cursor, limit).await?;
        Ok(page.map(HistoryItem::from))
    }

    pub async fn recap(
        &self,
        filter: RecapFilter,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Page<RecapItem>, AppError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::validation("start_date cannot be after end_date"));
            }
        }

        let page = self
            .paginator
            .page(&PageFilter::Recap(filter), cursor, limit)
            .await?;
        Ok(page.map(RecapItem::from))
    }

    pub async fn dashboard_stats(
        &self,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Result<DashboardStats, AppError> {
        self.dashboard.stats(timezone, now).await
    }

    /// Total late minutes per employee for payroll deductions.
    pub async fn late_summary(&self, month: u32, year: i32) -> Result<Vec<LateSummary>, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation("month must be between 1 and 12"));
        }

        let mut summary: Vec<LateSummary> = self
            .store
            .bulk_late_minutes(month, year)
            .await?
            .into_iter()
            .map(|(employee_id, late_minutes)| LateSummary {
                employee_id,
                late_minutes,
            })
            .collect();
        summary.sort_by_key(|s| s.employee_id);
        Ok(summary)
    }
}
