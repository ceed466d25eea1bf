use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::NaiveTime;
use dotenvy::dotenv;

use crate::attendance::GeocodeSettings;
use crate::model::shift::EmployeeShift;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    /// IANA zone that decides which calendar day a clock belongs to
    pub timezone: String,
    /// Used when an employee has no shift assigned
    pub default_shift: EmployeeShift,

    // Reverse geocoding
    pub geocode: GeocodeSettings,
    pub geocode_base_url: String,
    pub geocode_user_agent: String,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has an invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let shift_start = env::var("DEFAULT_SHIFT_START").unwrap_or_else(|_| "09:00".to_string());
        let start_time = NaiveTime::parse_from_str(&shift_start, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&shift_start, "%H:%M:%S"))
            .with_context(|| format!("DEFAULT_SHIFT_START has an invalid value {shift_start:?}"))?;

        let defaults = GeocodeSettings::default();
        let interval_ms = or_default(
            "GEOCODE_INTERVAL_MS",
            defaults.interval.as_millis() as u64,
        )?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,

            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            timezone: env::var("APP_TIMEZONE").unwrap_or_else(|_| "Asia/Jakarta".to_string()),
            default_shift: EmployeeShift {
                start_time,
                grace_minutes: or_default("DEFAULT_GRACE_MINUTES", 5)?,
            },

            geocode: GeocodeSettings {
                queue_capacity: or_default("GEOCODE_QUEUE_CAPACITY", defaults.queue_capacity)?,
                workers: or_default("GEOCODE_WORKERS", defaults.workers)?,
                interval: Duration::from_millis(interval_ms),
            },
            geocode_base_url: env::var("GEOCODE_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            geocode_user_agent: env::var("GEOCODE_USER_AGENT")
                .unwrap_or_else(|_| "attendance-pipeline/0.1".to_string()),
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/test".to_string(),
            jwt_secret: crate::auth::jwt::tests::SECRET.to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            rate_protected_per_min: 1000,
            api_prefix: "/api".to_string(),
            timezone: "Asia/Jakarta".to_string(),
            default_shift: EmployeeShift {
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                grace_minutes: 5,
            },
            geocode: GeocodeSettings::default(),
            geocode_base_url: "http://localhost".to_string(),
            geocode_user_agent: "test".to_string(),
        }
    }
}
