mod fields;
mod liveness;
mod store;

pub use fields::{FieldKind, FieldValue, TelemetryField, TelemetryFields};
pub use liveness::Liveness;
pub use store::{TelemetrySnapshot, TelemetryStore};

/// A decoded inbound frame; only the fields the hardware reported are set.
pub type PartialTelemetry = TelemetryFields;
