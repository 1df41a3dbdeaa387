use serde::Serialize;

use crate::axis::AxisMask;

pub const SYNC_WORD: u16 = 0xEB90;
/// sync (2) + message id (1) + payload length (2)
pub const HEADER_LEN: usize = 5;
pub const CRC_LEN: usize = 2;

/// Message identifiers of the provisional ICD layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Stop = 0x01,
    MultiManualControl = 0x02,
    PositionOffset = 0x03,
    TimeOffset = 0x04,
    FeedOnOff = 0x05,
    Emergency = 0x06,
    Stow = 0x07,
    ServoPreset = 0x08,
    TrackHeader = 0x10,
    TrackPoint = 0x11,
    Telemetry = 0x80,
}

impl MessageId {
    pub fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            0x01 => MessageId::Stop,
            0x02 => MessageId::MultiManualControl,
            0x03 => MessageId::PositionOffset,
            0x04 => MessageId::TimeOffset,
            0x05 => MessageId::FeedOnOff,
            0x06 => MessageId::Emergency,
            0x07 => MessageId::Stow,
            0x08 => MessageId::ServoPreset,
            0x10 => MessageId::TrackHeader,
            0x11 => MessageId::TrackPoint,
            0x80 => MessageId::Telemetry,
            _ => return None,
        })
    }
}

/// Outbound command, one per ICD message.
///
/// Angle and speed arrays are ordered azimuth, elevation, train.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandFrame {
    Stop {
        axes: AxisMask,
    },
    MultiManualControl {
        axes: AxisMask,
        angles: [f32; 3],
        speeds: [f32; 3],
    },
    PositionOffset {
        azimuth: f32,
        elevation: f32,
        train: f32,
    },
    TimeOffset {
        seconds: f32,
    },
    FeedOnOff {
        mask: u8,
    },
    Emergency {
        code: u8,
    },
    Stow,
    ServoPreset {
        axes: AxisMask,
    },
    /// Handshake announcing a program track: mode code, start time and sample cadence.
    TrackHeader {
        mode: u8,
        start_unix_ms: i64,
        cadence_ms: u32,
    },
    TrackPoint {
        sequence: u32,
        angles: [f32; 3],
        speeds: [f32; 3],
    },
}

impl CommandFrame {
    pub fn message_id(&self) -> MessageId {
        match self {
            CommandFrame::Stop { .. } => MessageId::Stop,
            CommandFrame::MultiManualControl { .. } => MessageId::MultiManualControl,
            CommandFrame::PositionOffset { .. } => MessageId::PositionOffset,
            CommandFrame::TimeOffset { .. } => MessageId::TimeOffset,
            CommandFrame::FeedOnOff { .. } => MessageId::FeedOnOff,
            CommandFrame::Emergency { .. } => MessageId::Emergency,
            CommandFrame::Stow => MessageId::Stow,
            CommandFrame::ServoPreset { .. } => MessageId::ServoPreset,
            CommandFrame::TrackHeader { .. } => MessageId::TrackHeader,
            CommandFrame::TrackPoint { .. } => MessageId::TrackPoint,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandFrame::Stop { .. } => "stop",
            CommandFrame::MultiManualControl { .. } => "multi_manual_control",
            CommandFrame::PositionOffset { .. } => "position_offset",
            CommandFrame::TimeOffset { .. } => "time_offset",
            CommandFrame::FeedOnOff { .. } => "feed_on_off",
            CommandFrame::Emergency { .. } => "emergency",
            CommandFrame::Stow => "stow",
            CommandFrame::ServoPreset { .. } => "servo_preset",
            CommandFrame::TrackHeader { .. } => "track_header",
            CommandFrame::TrackPoint { .. } => "track_point",
        }
    }
}
