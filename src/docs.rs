use crate::api::attendance::{DashboardQuery, HistoryQuery, LateSummaryQuery, RecapQuery};
use crate::attendance::dto::{
    AttendanceResponse, ClockPhase, ClockRequest, ClockType, DashboardStats, HistoryItem,
    LateSummary, RecapItem, TodayStatus,
};
use crate::attendance::pagination::CursorMeta;
use crate::model::attendance::AttendanceStatus;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance API",
        version = "1.0.0",
        description = r#"
## Employee Attendance

Daily clock-in / clock-out with location and selfie proof.

### 🔹 Key Features
- **Clocking**
  - One endpoint decides between check-in and check-out
  - Late detection against the employee's shift and grace window
- **History & Recap**
  - Cursor-paginated, newest first
  - Recap filters by date range, department, and name/NIK search
- **Reporting**
  - Today's headcount per timezone
  - Monthly late minutes per employee

### 🌍 Addresses
Coordinates are resolved to street addresses in the background, so an
address may appear some seconds after the clock itself.

### 🔐 Security
All endpoints require a **JWT Bearer** access token.
Recap, dashboard and late summary are limited to **Admin** and **HR**.
"#,
    ),
    paths(
        crate::api::attendance::clock,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::recap,
        crate::api::attendance::dashboard,
        crate::api::attendance::late_summary
    ),
    components(
        schemas(
            ClockRequest,
            ClockType,
            AttendanceResponse,
            AttendanceStatus,
            ClockPhase,
            TodayStatus,
            HistoryItem,
            RecapItem,
            CursorMeta,
            DashboardStats,
            LateSummary,
            HistoryQuery,
            RecapQuery,
            DashboardQuery,
            LateSummaryQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
