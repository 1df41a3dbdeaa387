mod coordinator;
mod error;
mod provider;
mod types;

pub use coordinator::TrackingCoordinator;
pub use error::{ProviderError, TrackerError};
pub use provider::{PassPlan, PositionProvider, ProviderSample, SampleTrack};
pub use types::{
    AxisCommand, ModeStatus, PointingStatus, TrackState, TrackingMode, TrackingStatus,
};
