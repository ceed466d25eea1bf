use crate::{api::attendance, auth::middleware::auth_middleware, config::Config};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub type RateLimiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiter shared by every worker.
pub fn build_limiter(requests_per_min: u32) -> anyhow::Result<RateLimiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiter: RateLimiter) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiter) // rate limiting
            .configure(attendance_routes),
    );
}

pub fn attendance_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            // /attendance/clock
            .service(web::resource("/clock").route(web::post().to(attendance::clock)))
            // /attendance/today
            .service(web::resource("/today").route(web::get().to(attendance::today)))
            // /attendance/history
            .service(web::resource("/history").route(web::get().to(attendance::history)))
            // /attendance/recap
            .service(web::resource("/recap").route(web::get().to(attendance::recap)))
            // /attendance/dashboard
            .service(web::resource("/dashboard").route(web::get().to(attendance::dashboard)))
            // /attendance/late-summary
            .service(
                web::resource("/late-summary").route(web::get().to(attendance::late_summary)),
            ),
    );
}
