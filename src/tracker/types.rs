use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who owns the antenna.
///
/// Ephemeris, pass schedule and sun tracking are automated and mutually exclusive;
/// manual and geostationary pointing are one-shot moves that only raise a flag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackingMode {
    Ephemeris,
    PassSchedule,
    SunTrack,
    Manual,
    Geostationary,
}

impl TrackingMode {
    pub const AUTOMATED: [TrackingMode; 3] = [
        TrackingMode::Ephemeris,
        TrackingMode::PassSchedule,
        TrackingMode::SunTrack,
    ];

    pub fn is_automated(self) -> bool {
        Self::AUTOMATED.contains(&self)
    }

    /// Mode code carried in the track header frame.
    pub fn wire_code(self) -> u8 {
        match self {
            TrackingMode::Ephemeris => 1,
            TrackingMode::PassSchedule => 2,
            TrackingMode::SunTrack => 3,
            TrackingMode::Manual => 4,
            TrackingMode::Geostationary => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackState {
    Idle,
    Preparing { train_target_deg: f64 },
    Waiting { start: DateTime<Utc> },
    Tracking { points_sent: u64 },
    Completed { points_sent: u64 },
    Error { reason: String },
}

impl TrackState {
    /// Preparing, waiting or tracking: the mode holds the antenna.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            TrackState::Preparing { .. } | TrackState::Waiting { .. } | TrackState::Tracking { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackState::Idle => "IDLE",
            TrackState::Preparing { .. } => "PREPARING",
            TrackState::Waiting { .. } => "WAITING",
            TrackState::Tracking { .. } => "TRACKING",
            TrackState::Completed { .. } => "COMPLETED",
            TrackState::Error { .. } => "ERROR",
        }
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackState::Idle => write!(f, "idle"),
            TrackState::Preparing { train_target_deg } => {
                write!(f, "moving train axis to {:.2} deg", train_target_deg)
            }
            TrackState::Waiting { start } => write!(f, "waiting for pass start at {}", start),
            TrackState::Tracking { points_sent } => write!(f, "tracking, {} points sent", points_sent),
            TrackState::Completed { points_sent } => {
                write!(f, "completed after {} points", points_sent)
            }
            TrackState::Error { reason } => write!(f, "error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeStatus {
    pub active: bool,
    pub state: TrackState,
    /// Human readable rendering of `state`.
    pub sub_state: String,
    pub pass_index: Option<usize>,
    pub pass_count: usize,
}

impl Default for ModeStatus {
    fn default() -> Self {
        Self {
            active: false,
            state: TrackState::Idle,
            sub_state: TrackState::Idle.to_string(),
            pass_index: None,
            pass_count: 0,
        }
    }
}

impl ModeStatus {
    pub(crate) fn set(&mut self, state: TrackState) {
        self.active = state.is_running();
        self.sub_state = state.to_string();
        self.state = state;
        if !self.active {
            self.pass_index = None;
        }
    }
}

/// Flag and description for the one-shot pointing modes (manual, geostationary).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointingStatus {
    pub active: bool,
    pub sub_state: String,
}

impl Default for PointingStatus {
    fn default() -> Self {
        Self {
            active: false,
            sub_state: "idle".to_string(),
        }
    }
}

impl PointingStatus {
    pub(crate) fn point(&mut self, sub_state: String) {
        self.active = true;
        self.sub_state = sub_state;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingStatus {
    pub ephemeris: ModeStatus,
    pub pass_schedule: ModeStatus,
    pub sun_track: ModeStatus,
    pub manual: PointingStatus,
    pub geostationary: PointingStatus,
}

impl TrackingStatus {
    /// Status of an automated mode, `None` for manual and geostationary.
    pub fn mode(&self, mode: TrackingMode) -> Option<&ModeStatus> {
        match mode {
            TrackingMode::Ephemeris => Some(&self.ephemeris),
            TrackingMode::PassSchedule => Some(&self.pass_schedule),
            TrackingMode::SunTrack => Some(&self.sun_track),
            TrackingMode::Manual | TrackingMode::Geostationary => None,
        }
    }

    pub(crate) fn mode_mut(&mut self, mode: TrackingMode) -> Option<&mut ModeStatus> {
        match mode {
            TrackingMode::Ephemeris => Some(&mut self.ephemeris),
            TrackingMode::PassSchedule => Some(&mut self.pass_schedule),
            TrackingMode::SunTrack => Some(&mut self.sun_track),
            TrackingMode::Manual | TrackingMode::Geostationary => None,
        }
    }

    /// The automated mode currently holding the antenna.
    pub fn running_mode(&self) -> Option<TrackingMode> {
        TrackingMode::AUTOMATED
            .into_iter()
            .find(|m| self.mode(*m).is_some_and(|s| s.state.is_running()))
    }

    pub fn is_active(&self, mode: TrackingMode) -> bool {
        match mode {
            TrackingMode::Manual => self.manual.active,
            TrackingMode::Geostationary => self.geostationary.active,
            automated => self.mode(automated).is_some_and(|s| s.active),
        }
    }
}

/// Target angles and speeds for one instant, ordered azimuth, elevation, train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisCommand {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub train_deg: f64,
    pub azimuth_speed: f64,
    pub elevation_speed: f64,
    pub train_speed: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl AxisCommand {
    pub fn angles(&self) -> [f64; 3] {
        [self.azimuth_deg, self.elevation_deg, self.train_deg]
    }

    pub fn speeds(&self) -> [f64; 3] {
        [self.azimuth_speed, self.elevation_speed, self.train_speed]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn only_one_running_mode_is_reported() {
        let mut status = TrackingStatus::default();
        assert_eq!(status.running_mode(), None);

        status
            .mode_mut(TrackingMode::SunTrack)
            .unwrap()
            .set(TrackState::Tracking { points_sent: 3 });
        assert_eq!(status.running_mode(), Some(TrackingMode::SunTrack));
        assert!(status.is_active(TrackingMode::SunTrack));
        assert_eq!(status.sun_track.sub_state, "tracking, 3 points sent");

        status
            .mode_mut(TrackingMode::SunTrack)
            .unwrap()
            .set(TrackState::Error {
                reason: "provider failed".into(),
            });
        assert_eq!(status.running_mode(), None);
        assert!(!status.sun_track.active);
    }

    #[test]
    fn pointing_modes_describe_their_target() {
        let mut status = TrackingStatus::default();
        assert_eq!(status.geostationary.sub_state, "idle");

        status.geostationary.point("pointing at az 190.000 el 35.000".into());
        assert!(status.is_active(TrackingMode::Geostationary));
        assert_eq!(status.running_mode(), None);

        status.geostationary.clear();
        assert!(!status.is_active(TrackingMode::Geostationary));
        assert_eq!(status.geostationary.sub_state, "idle");
    }

    #[test]
    fn mode_names() {
        assert_eq!(TrackingMode::PassSchedule.to_string(), "pass_schedule");
        assert_eq!(TrackingMode::from_str("sun_track").unwrap(), TrackingMode::SunTrack);
        assert!(!TrackingMode::Manual.is_automated());
        assert!(TrackingMode::Ephemeris.is_automated());
    }
}
