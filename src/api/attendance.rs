use crate::attendance::AttendanceService;
use crate::attendance::dto::ClockRequest;
use crate::attendance::pagination::{Page, clamp_limit};
use crate::attendance::store::RecapFilter;
use crate::auth::auth::AuthUser;
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HistoryQuery {
    /// Month of the record date (1-12)
    #[schema(example = 3)]
    pub month: Option<u32>,
    /// Year of the record date
    #[schema(example = 2026)]
    pub year: Option<i32>,
    /// Opaque token from the previous page's `meta.next_cursor`
    pub cursor: Option<String>,
    /// Page size, default 10, max 100
    #[schema(example = 10)]
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct RecapQuery {
    #[schema(example = "2026-03-01", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-03-31", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = 1)]
    pub department_id: Option<u64>,
    /// Matches employee name or NIK
    #[schema(example = "budi")]
    pub search: Option<String>,
    pub cursor: Option<String>,
    #[schema(example = 10)]
    pub limit: Option<u32>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct DashboardQuery {
    /// IANA zone, defaults to the server zone
    #[schema(example = "Asia/Jakarta")]
    pub timezone: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LateSummaryQuery {
    #[schema(example = 3)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
}

fn paged<T: Serialize>(message: &str, page: Page<T>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "meta": page.meta(),
        "data": page.items,
    }))
}

/// Clock in or out, whichever comes next today
#[utoipa::path(
    post,
    path = "/api/attendance/clock",
    request_body(
        content = ClockRequest,
        description = "Location and selfie proof",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Clock recorded", body = Object, example = json!({
            "message": "Check-in successful",
            "data": {
                "type": "check-in",
                "status": "PRESENT",
                "time": "2026-03-02T01:58:00Z",
                "message": "Check-in successful"
            }
        })),
        (status = 400, description = "Invalid coordinates or image proof", body = Object, example = json!({
            "message": "latitude and longitude are required"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Attendance for today is already completed", body = Object, example = json!({
            "message": "Attendance for today is already completed"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<ClockRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    tracing::debug!(user_id = auth.user_id, username = %auth.username, employee_id, "Clock requested");

    let result = service.clock(employee_id, Utc::now(), &payload).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": result.message,
        "data": result,
    })))
}

/// Today's clock state for the caller
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's status", body = Object, example = json!({
            "message": "Today's attendance status",
            "data": {
                "status": "LATE",
                "type": "CHECKED_IN",
                "check_in_time": "2026-03-02T02:10:00Z",
                "check_out_time": null,
                "work_duration": "1h5m0s"
            }
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "Employee not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;

    let status = service.today_status(employee_id, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Today's attendance status",
        "data": status,
    })))
}

/// The caller's own attendance history, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "One page of history", body = Object, example = json!({
            "message": "Attendance history",
            "meta": { "limit": 10, "has_next": true, "next_cursor": "eyJpZCI6NDIsInNvcnRfdmFsdWUiOiIyMDI2LTAzLTAyVDA4OjE1OjAwWiJ9" },
            "data": [{
                "id": 42,
                "date": "2026-03-02",
                "check_in_time": "2026-03-02T01:58:00Z",
                "check_out_time": "2026-03-02T10:01:00Z",
                "check_in_address": "Jl. Jend. Sudirman, Jakarta",
                "check_out_address": null,
                "status": "PRESENT",
                "late_duration_minutes": 0,
                "work_duration": "8h3m0s"
            }]
        })),
        (status = 400, description = "Invalid month or cursor"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<HistoryQuery>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let query = query.into_inner();

    let page = service
        .history(
            employee_id,
            query.month,
            query.year,
            query.cursor.as_deref(),
            clamp_limit(query.limit),
        )
        .await?;

    Ok(paged("Attendance history", page))
}

/// Attendance across all employees (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/recap",
    params(RecapQuery),
    responses(
        (status = 200, description = "One page of the recap", body = Object, example = json!({
            "message": "Attendance recap",
            "meta": { "limit": 10, "has_next": false },
            "data": [{
                "id": 42,
                "date": "2026-03-02",
                "employee_name": "Budi Santoso",
                "nik": "3201001",
                "department": "Engineering",
                "shift": "Regular",
                "check_in_time": "2026-03-02T02:10:00Z",
                "check_out_time": null,
                "status": "LATE",
                "late_duration_minutes": 5,
                "work_duration": ""
            }]
        })),
        (status = 400, description = "Invalid date range or cursor"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn recap(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<RecapQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let query = query.into_inner();

    let filter = RecapFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        department_id: query.department_id,
        search: query.search,
    };
    let page = service
        .recap(filter, query.cursor.as_deref(), clamp_limit(query.limit))
        .await?;

    Ok(paged("Attendance recap", page))
}

/// Today's headcount in the requested zone (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Dashboard counters", body = Object, example = json!({
            "message": "Dashboard stats",
            "data": {
                "total_employees": 120,
                "present_today": 95,
                "late_today": 12,
                "absent_today": 13
            }
        })),
        (status = 400, description = "Unknown timezone"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn dashboard(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<DashboardQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let timezone = query
        .timezone
        .as_deref()
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or(service.timezone().name());
    let stats = service.dashboard_stats(timezone, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Dashboard stats",
        "data": stats,
    })))
}

/// Late minutes per employee for one month (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/late-summary",
    params(LateSummaryQuery),
    responses(
        (status = 200, description = "Late minutes per employee", body = Object, example = json!({
            "message": "Late summary",
            "data": [{ "employee_id": 1001, "late_minutes": 42 }]
        })),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn late_summary(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<LateSummaryQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let summary = service.late_summary(query.month, query.year).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Late summary",
        "data": summary,
    })))
}

#[cfg(test)]
mod tests {
    use crate::attendance::geocode::GeocodeSettings;
    use crate::attendance::memory::{FixedShift, MemoryStore, RecordingFetcher};
    use crate::attendance::{AttendanceService, GeocodePipeline};
    use crate::auth::jwt::TokenType;
    use crate::auth::jwt::tests::token;
    use crate::auth::middleware::auth_middleware;
    use crate::config::Config;
    use crate::model::attendance::AttendanceStatus;
    use crate::routes::attendance_routes;
    use actix_web::http::StatusCode;
    use actix_web::middleware::from_fn;
    use actix_web::web::{self, Data};
    use actix_web::{App, test};
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    fn service(store: Arc<MemoryStore>) -> AttendanceService {
        let geocoder = Arc::new(GeocodePipeline::new(
            store.clone(),
            Arc::new(RecordingFetcher::new("Jakarta")),
            GeocodeSettings::default(),
        ));
        AttendanceService::new(
            store,
            Arc::new(FixedShift::nine_to_five(vec![1, 2])),
            geocoder,
            chrono_tz::Asia::Jakarta,
        )
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_employee(1, "Budi Santoso", "3201001", 1);
        store.add_employee(2, "Ayu Lestari", "3201002", 2);
        store
    }

    macro_rules! app {
        ($store:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new(Config::for_tests()))
                    .app_data(Data::new(service($store)))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .configure(attendance_routes),
                    ),
            )
            .await
        };
    }

    fn bearer(role: u8, employee_id: Option<u64>) -> (&'static str, String) {
        (
            "Authorization",
            format!("Bearer {}", token(role, employee_id, TokenType::Access)),
        )
    }

    fn clock_body() -> Value {
        json!({
            "latitude": -6.2088,
            "longitude": 106.8456,
            "image_base64": PNG,
        })
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get().uri("/api/attendance/today").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_token_is_unauthorized() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/today")
            .insert_header((
                "Authorization",
                format!("Bearer {}", token(3, Some(1), TokenType::Refresh)),
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn clock_cycles_in_then_out_then_conflicts() {
        let app = app!(seeded_store());

        let first = test::TestRequest::post()
            .uri("/api/attendance/clock")
            .insert_header(bearer(3, Some(1)))
            .set_json(clock_body())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, first).await;
        assert_eq!(body["data"]["type"], "check-in");

        let second = test::TestRequest::post()
            .uri("/api/attendance/clock")
            .insert_header(bearer(3, Some(1)))
            .set_json(clock_body())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, second).await;
        assert_eq!(body["data"]["type"], "check-out");

        let third = test::TestRequest::post()
            .uri("/api/attendance/clock")
            .insert_header(bearer(3, Some(1)))
            .set_json(clock_body())
            .to_request();
        let resp = test::call_service(&app, third).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Attendance for today is already completed");
    }

    #[actix_web::test]
    async fn clock_without_coordinates_is_bad_request() {
        let app = app!(seeded_store());
        let req = test::TestRequest::post()
            .uri("/api/attendance/clock")
            .insert_header(bearer(3, Some(1)))
            .set_json(json!({ "image_base64": PNG }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn account_without_employee_profile_is_forbidden() {
        let app = app!(seeded_store());
        let req = test::TestRequest::post()
            .uri("/api/attendance/clock")
            .insert_header(bearer(1, None))
            .set_json(clock_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn today_reports_no_record_before_first_clock() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/today")
            .insert_header(bearer(3, Some(2)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["type"], "NO_RECORD");
        assert_eq!(body["data"]["status"], Value::Null);
    }

    #[actix_web::test]
    async fn history_pages_with_cursor_meta() {
        let store = seeded_store();
        let base = Utc::now() - chrono::TimeDelta::days(30);
        for day in 0..3 {
            store
                .insert_checked_in(1, base + chrono::TimeDelta::days(day), AttendanceStatus::Present)
                .await;
        }
        let app = app!(store);

        let req = test::TestRequest::get()
            .uri("/api/attendance/history?limit=2")
            .insert_header(bearer(3, Some(1)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["meta"]["has_next"], true);

        let cursor = body["meta"]["next_cursor"]
            .as_str()
            .unwrap()
            .replace('+', "%2B")
            .replace('/', "%2F")
            .replace('=', "%3D");
        let req = test::TestRequest::get()
            .uri(&format!("/api/attendance/history?limit=2&cursor={cursor}"))
            .insert_header(bearer(3, Some(1)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["meta"]["has_next"], false);
        assert!(body["meta"].get("next_cursor").is_none());
    }

    #[actix_web::test]
    async fn history_rejects_month_out_of_range() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/history?month=13")
            .insert_header(bearer(3, Some(1)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn recap_is_limited_to_hr_and_admin() {
        let app = app!(seeded_store());

        let req = test::TestRequest::get()
            .uri("/api/attendance/recap")
            .insert_header(bearer(3, Some(1)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/attendance/recap?search=budi")
            .insert_header(bearer(2, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn dashboard_rejects_unknown_timezone() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/dashboard?timezone=Mars/Olympus")
            .insert_header(bearer(1, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn dashboard_defaults_to_server_zone() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/dashboard")
            .insert_header(bearer(2, None))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["total_employees"], 2);
    }

    #[actix_web::test]
    async fn late_summary_requires_month_and_year() {
        let app = app!(seeded_store());
        let req = test::TestRequest::get()
            .uri("/api/attendance/late-summary?month=3")
            .insert_header(bearer(1, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
