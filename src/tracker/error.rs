use thiserror::Error;

use crate::dispatch::DispatchError;

use super::types::TrackingMode;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("cannot start {requested}: {active} is active")]
    ModeConflict {
        requested: TrackingMode,
        active: TrackingMode,
    },
    #[error("{0} is not an automated tracking mode")]
    NotAutomated(TrackingMode),
    #[error("pass schedule is empty")]
    EmptySchedule,
    #[error("position provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("no samples")]
    Empty,
    #[error("sample {0} has no timestamp")]
    MissingTimestamp(usize),
    #[error("{0}")]
    Failed(String),
}
