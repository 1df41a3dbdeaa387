//! Antenna control core: ICD link, telemetry, faults and tracking for one ground-station antenna.

pub mod axis;
pub mod config;
pub mod dispatch;
pub mod fault;
pub mod geometry;
pub mod icd;
pub mod station;
pub mod telemetry;
pub mod tracker;

pub use config::Config;
pub use station::{Station, StationReport};
