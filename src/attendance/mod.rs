//! Attendance event pipeline: clock state machine, background address
//! enrichment, keyset-paginated history and dashboard counters.

pub mod dashboard;
pub mod dto;
pub mod geocode;
#[cfg(test)]
pub mod memory;
pub mod mysql;
pub mod pagination;
pub mod service;
pub mod store;

pub use geocode::{GeocodePipeline, GeocodeSettings, NominatimFetcher};
pub use mysql::{MySqlAttendanceStore, MySqlShiftLookup};
pub use service::AttendanceService;
