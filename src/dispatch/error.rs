use thiserror::Error;

use crate::axis::Axis;
use crate::icd::IcdError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("axis mask {0:#05b} selects no axis")]
    EmptyAxisMask(u8),
    #[error("axis mask {0:#010b} has unknown bits")]
    UnknownAxisBits(u8),
    #[error("feed mask {0:#010b} has unknown bits")]
    UnknownFeedBits(u8),
    #[error("{axis} angle {value} outside [{min}, {max}]")]
    AngleOutOfRange {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{axis} speed {value} outside (0, {max}]")]
    SpeedOutOfRange { axis: Axis, value: f64, max: f64 },
    #[error("{0} is not a finite number")]
    NotFinite(&'static str),
    #[error("unsupported emergency code {0:?}")]
    EmergencyCode(char),
    #[error("transport: {0}")]
    Transport(#[from] IcdError),
}

impl DispatchError {
    /// True when the command was rejected before a frame was built.
    pub fn is_validation(&self) -> bool {
        !matches!(self, DispatchError::Transport(_))
    }
}
