use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod routes;
mod utils;

use attendance::{
    AttendanceService, GeocodePipeline, MySqlAttendanceStore, MySqlShiftLookup, NominatimFetcher,
};
use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let timezone = attendance::dashboard::parse_timezone(&config.timezone)
        .map_err(|e| anyhow::anyhow!("APP_TIMEZONE: {e}"))?;

    let pool = init_db(&config.database_url).await?;

    let store = Arc::new(MySqlAttendanceStore::new(pool.clone()));
    let shifts = Arc::new(MySqlShiftLookup::new(pool.clone(), config.default_shift));
    let fetcher = Arc::new(NominatimFetcher::new(
        &config.geocode_base_url,
        &config.geocode_user_agent,
    )?);

    let geocoder = Arc::new(GeocodePipeline::new(
        store.clone(),
        fetcher,
        config.geocode.clone(),
    ));
    geocoder.start();

    let service = Data::new(AttendanceService::new(
        store,
        shifts,
        geocoder.clone(),
        timezone,
    ));
    let limiter = routes::build_limiter(config.rate_protected_per_min)?;

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    let server = HttpServer::new(move || {
        let config = config_data.clone();
        let limiter = limiter.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(service.clone())
            .app_data(config.clone())
            .service(index)
            // Protected routes with auth + rate limiting
            .configure(|cfg| routes::configure(cfg, &config, limiter))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run();

    let result = server.await;

    // Let in-flight address lookups finish before the process exits
    geocoder.stop().await;
    info!("Server stopped");

    result.context("Server terminated with an error")
}
