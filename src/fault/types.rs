use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::axis::Axis;
use crate::telemetry::TelemetryField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultCategory {
    Protocol,
    Servo,
    Emergency,
    Interlock,
    System,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A monitored status bit and the fault it raises.
#[derive(Debug, Clone)]
pub struct FaultCondition {
    pub code: String,
    pub word: TelemetryField,
    pub bit: u8,
    pub category: FaultCategory,
    pub severity: Severity,
    pub axis: Option<Axis>,
    pub description: String,
}

impl FaultCondition {
    pub fn is_set(&self, word: u32) -> bool {
        (word >> self.bit) & 1 == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareFault {
    pub id: u64,
    pub code: String,
    pub category: FaultCategory,
    pub severity: Severity,
    /// Status word the condition was decoded from.
    pub source: String,
    pub axis: Option<Axis>,
    pub description: String,
    /// Shared by faults raised from the same status word in the same update.
    pub correlation_id: Uuid,
    pub occurrence_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}
