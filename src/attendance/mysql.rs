use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use moka::future::Cache;
use sqlx::MySqlPool;
use tracing::debug;

use super::store::{AddressColumn, AttendanceStore, CheckOutPatch, PageFilter, ShiftLookup};
use crate::error::AppError;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceView, NewAttendance};
use crate::model::shift::EmployeeShift;
use crate::utils::cursor::Cursor;
use crate::utils::db_utils::{SqlSelect, SqlValue, WhereBuilder, bind_query_as};

const VIEW_SELECT: &str = r#"
    SELECT
        a.id,
        a.employee_id,
        a.date,
        a.check_in_time,
        a.check_out_time,
        a.check_in_address,
        a.check_out_address,
        a.late_duration_minutes,
        a.status,
        a.created_at,
        e.full_name AS employee_name,
        e.nik,
        d.name AS department,
        s.name AS shift
    FROM attendances a
    JOIN employees e ON e.id = a.employee_id
    LEFT JOIN ref_departments d ON d.id = e.department_id
    LEFT JOIN ref_shifts s ON s.id = e.shift_id
"#;

/// Writes only the check-out columns, and only while the day is still open.
const CHECK_OUT_SQL: &str = r#"
    UPDATE attendances
    SET check_out_time = ?,
        check_out_lat = ?,
        check_out_lon = ?,
        check_out_address = COALESCE(?, check_out_address),
        notes = COALESCE(?, notes)
    WHERE id = ? AND check_out_time IS NULL
"#;

/// Groups on the local calendar `date`, not the UTC check-in timestamp.
const LATE_MINUTES_SQL: &str = r#"
    SELECT employee_id,
           CAST(COALESCE(SUM(late_duration_minutes), 0) AS SIGNED) AS total_minute
    FROM attendances
    WHERE MONTH(date) = ? AND YEAR(date) = ?
    GROUP BY employee_id
"#;

/// Builds the keyset page query: filter predicates, optional cursor predicate,
/// `(created_at DESC, id DESC)` ordering and a `LIMIT` of `fetch`.
pub fn build_page_query(filter: &PageFilter, after: Option<&Cursor>, fetch: u32) -> SqlSelect {
    let mut builder = WhereBuilder::default();

    match filter {
        PageFilter::History {
            employee_id,
            month,
            year,
        } => {
            builder.push("a.employee_id = ?", [SqlValue::U64(*employee_id)]);
            if let Some(month) = month {
                builder.push("MONTH(a.date) = ?", [SqlValue::I64(i64::from(*month))]);
            }
            if let Some(year) = year {
                builder.push("YEAR(a.date) = ?", [SqlValue::I64(i64::from(*year))]);
            }
        }
        PageFilter::Recap(recap) => {
            match (recap.start_date, recap.end_date) {
                (Some(start), Some(end)) => builder.push(
                    "a.date BETWEEN ? AND ?",
                    [SqlValue::Date(start), SqlValue::Date(end)],
                ),
                (Some(start), None) => builder.push("a.date >= ?", [SqlValue::Date(start)]),
                (None, Some(end)) => builder.push("a.date <= ?", [SqlValue::Date(end)]),
                (None, None) => {}
            }
            if let Some(department_id) = recap.department_id {
                builder.push("e.department_id = ?", [SqlValue::U64(department_id)]);
            }
            if let Some(search) = recap.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let like = format!("%{}%", search.to_lowercase());
                builder.push(
                    "(LOWER(e.full_name) LIKE ? OR LOWER(e.nik) LIKE ?)",
                    [SqlValue::String(like.clone()), SqlValue::String(like)],
                );
            }
        }
    }

    if let Some(cursor) = after {
        builder.push(
            "(a.created_at < ? OR (a.created_at = ? AND a.id < ?))",
            [
                SqlValue::DateTime(cursor.sort_value),
                SqlValue::DateTime(cursor.sort_value),
                SqlValue::U64(cursor.id),
            ],
        );
    }

    let (where_clause, mut values) = builder.finish();
    values.push(SqlValue::U64(u64::from(fetch)));

    SqlSelect {
        sql: format!("{VIEW_SELECT} {where_clause} ORDER BY a.created_at DESC, a.id DESC LIMIT ?"),
        values,
    }
}

#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn get_today(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AppError> {
        let record = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT id, employee_id, date, check_in_time, check_out_time,
                   check_in_lat, check_in_lon, check_out_lat, check_out_lon,
                   check_in_address, check_out_address, notes,
                   late_duration_minutes, status, created_at
            FROM attendances
            WHERE employee_id = ? AND date = ?
            "#,
        )
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn create(&self, new: NewAttendance) -> Result<AttendanceRecord, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendances
                (employee_id, date, check_in_time, check_in_lat, check_in_lon,
                 check_in_address, notes, late_duration_minutes, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.date)
        .bind(new.check_in_time)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.address.as_deref())
        .bind(new.notes.as_deref())
        .bind(new.late_duration_minutes)
        .bind(new.status.to_string())
        .bind(new.created_at)
        .execute(&self.pool)
        .await?;

        Ok(AttendanceRecord {
            id: result.last_insert_id(),
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
        })
    }

    async fn check_out(&self, patch: &CheckOutPatch) -> Result<(), AppError> {
        let result = sqlx::query(CHECK_OUT_SQL)
            .bind(patch.check_out_time)
            .bind(patch.latitude)
            .bind(patch.longitude)
            .bind(patch.address.as_deref())
            .bind(patch.notes.as_deref())
            .bind(patch.attendance_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AlreadyCompleted);
        }
        Ok(())
    }

    async fn update_address(
        &self,
        attendance_id: u64,
        column: AddressColumn,
        address: &str,
    ) -> Result<u64, AppError> {
        let sql = format!(
            "UPDATE attendances SET {} = ? WHERE id = ?",
            column.column_name()
        );

        let result = sqlx::query(&sql)
            .bind(address)
            .bind(attendance_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn page(
        &self,
        filter: &PageFilter,
        after: Option<&Cursor>,
        fetch: u32,
    ) -> Result<Vec<AttendanceView>, AppError> {
        let select = build_page_query(filter, after, fetch);
        debug!(sql = %select.sql, bindings = ?select.values, "Fetching attendance page");

        let query = sqlx::query_as::<_, AttendanceView>(&select.sql);
        let rows = bind_query_as(query, select.values)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_by_status(
        &self,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendances WHERE date = ? AND status = ?",
        )
        .bind(date)
        .bind(status.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn count_total(&self, date: NaiveDate) -> Result<i64, AppError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendances WHERE date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    async fn count_active_employees(&self) -> Result<i64, AppError> {
        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;

        Ok(total)
    }

    async fn bulk_late_minutes(
        &self,
        month: u32,
        year: i32,
    ) -> Result<HashMap<u64, i64>, AppError> {
        let rows = sqlx::query_as::<_, (u64, i64)>(LATE_MINUTES_SQL)
            .bind(month)
            .bind(year)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }
}

/// Shift resolution with a short-lived per-employee cache.
pub struct MySqlShiftLookup {
    pool: MySqlPool,
    fallback: EmployeeShift,
    cache: Cache<u64, EmployeeShift>,
}

impl MySqlShiftLookup {
    /// `fallback` applies to employees with no shift, or a shift with no grace set.
    pub fn new(pool: MySqlPool, fallback: EmployeeShift) -> Self {
        Self {
            pool,
            fallback,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }
}

#[async_trait]
impl ShiftLookup for MySqlShiftLookup {
    async fn shift_for(&self, employee_id: u64) -> Result<Option<EmployeeShift>, AppError> {
        if let Some(shift) = self.cache.get(&employee_id).await {
            return Ok(Some(shift));
        }

        let row = sqlx::query_as::<_, (Option<NaiveTime>, Option<u32>)>(
            r#"
            SELECT s.start_time, s.grace_minutes
            FROM employees e
            LEFT JOIN ref_shifts s ON s.id = e.shift_id
            WHERE e.id = ? AND e.status = 'active'
            "#,
        )
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((start_time, grace_minutes)) = row else {
            return Ok(None);
        };

        let shift = EmployeeShift {
            start_time: start_time.unwrap_or(self.fallback.start_time),
            grace_minutes: grace_minutes.unwrap_or(self.fallback.grace_minutes),
        };
        self.cache.insert(employee_id, shift).await;

        Ok(Some(shift))
    }
}
