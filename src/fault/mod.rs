mod conditions;
mod correlator;
mod types;

pub use conditions::monitored_conditions;
pub use correlator::FaultCorrelator;
pub use types::{FaultCategory, FaultCondition, HardwareFault, Severity};
