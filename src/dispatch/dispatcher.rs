use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::axis::{Axis, AxisMask};
use crate::config::AxisLimits;
use crate::icd::{CommandFrame, CommandSink};

use super::error::DispatchError;

/// Feed selector bits the controller knows about.
pub const FEED_MASK_ALL: u8 = 0x0F;

/// Emergency codes accepted by the controller: engage and release.
pub const EMERGENCY_ENGAGE: char = 'E';
pub const EMERGENCY_RELEASE: char = 'R';

/// Offsets last accepted by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Offsets {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub train_deg: f64,
    pub time_s: f64,
}

/// Named ICD operations. Each call validates, builds one frame and queues it.
pub struct CommandDispatcher {
    sink: Arc<dyn CommandSink>,
    limits: AxisLimits,
    offsets: Mutex<Offsets>,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn CommandSink>, limits: AxisLimits) -> Self {
        Self {
            sink,
            limits,
            offsets: Mutex::new(Offsets::default()),
        }
    }

    pub fn limits(&self) -> &AxisLimits {
        &self.limits
    }

    pub fn offsets(&self) -> Offsets {
        *self.offsets.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn on_emergency(&self, code: char) -> Result<(), DispatchError> {
        if code != EMERGENCY_ENGAGE && code != EMERGENCY_RELEASE {
            return Err(DispatchError::EmergencyCode(code));
        }
        log::warn!("Emergency command {:?}", code);
        self.send(CommandFrame::Emergency { code: code as u8 })
    }

    pub fn time_offset(&self, seconds: f64) -> Result<(), DispatchError> {
        finite("time offset", seconds)?;
        self.send(CommandFrame::TimeOffset {
            seconds: seconds as f32,
        })?;
        self.offsets.lock().unwrap_or_else(|e| e.into_inner()).time_s = seconds;
        Ok(())
    }

    /// Moves the selected axes. Angles and speeds of unselected axes are sent as zero.
    pub fn multi_manual_control(
        &self,
        axes: AxisMask,
        angles: [f64; 3],
        speeds: [f64; 3],
    ) -> Result<(), DispatchError> {
        check_mask(axes)?;
        let mut wire_angles = [0f32; 3];
        let mut wire_speeds = [0f32; 3];
        for axis in axes.axes() {
            let i = axis.index();
            self.check_angle(axis, angles[i])?;
            self.check_speed(axis, speeds[i])?;
            wire_angles[i] = angles[i] as f32;
            wire_speeds[i] = speeds[i] as f32;
        }
        self.send(CommandFrame::MultiManualControl {
            axes,
            angles: wire_angles,
            speeds: wire_speeds,
        })
    }

    pub fn feed_on_off(&self, mask: u8) -> Result<(), DispatchError> {
        if mask & !FEED_MASK_ALL != 0 {
            return Err(DispatchError::UnknownFeedBits(mask));
        }
        self.send(CommandFrame::FeedOnOff { mask })
    }

    pub fn position_offset(
        &self,
        azimuth: f64,
        elevation: f64,
        train: f64,
    ) -> Result<(), DispatchError> {
        finite("azimuth offset", azimuth)?;
        finite("elevation offset", elevation)?;
        finite("train offset", train)?;
        self.send(CommandFrame::PositionOffset {
            azimuth: azimuth as f32,
            elevation: elevation as f32,
            train: train as f32,
        })?;
        let mut offsets = self.offsets.lock().unwrap_or_else(|e| e.into_inner());
        offsets.azimuth_deg = azimuth;
        offsets.elevation_deg = elevation;
        offsets.train_deg = train;
        Ok(())
    }

    pub fn stop(&self, axes: AxisMask) -> Result<(), DispatchError> {
        check_mask(axes)?;
        self.send(CommandFrame::Stop { axes })
    }

    pub fn stow(&self) -> Result<(), DispatchError> {
        self.send(CommandFrame::Stow)
    }

    pub fn servo_preset(&self, axes: AxisMask) -> Result<(), DispatchError> {
        check_mask(axes)?;
        self.send(CommandFrame::ServoPreset { axes })
    }

    /// Announces a program track starting at `start` with one point per `cadence`.
    pub fn track_header(
        &self,
        mode: u8,
        start: DateTime<Utc>,
        cadence: Duration,
    ) -> Result<(), DispatchError> {
        let cadence_ms = u32::try_from(cadence.as_millis()).unwrap_or(u32::MAX);
        self.send(CommandFrame::TrackHeader {
            mode,
            start_unix_ms: start.timestamp_millis(),
            cadence_ms,
        })
    }

    /// One program track point. Every axis is checked against its limits.
    pub fn track_point(
        &self,
        sequence: u32,
        angles: [f64; 3],
        speeds: [f64; 3],
    ) -> Result<(), DispatchError> {
        for axis in Axis::ALL {
            self.check_angle(axis, angles[axis.index()])?;
            self.check_speed(axis, speeds[axis.index()])?;
        }
        self.send(CommandFrame::TrackPoint {
            sequence,
            angles: angles.map(|a| a as f32),
            speeds: speeds.map(|s| s as f32),
        })
    }

    pub fn check_angle(&self, axis: Axis, value: f64) -> Result<(), DispatchError> {
        finite("angle", value)?;
        let range = self.limits.range(axis);
        if !range.contains(value) {
            return Err(DispatchError::AngleOutOfRange {
                axis,
                value,
                min: range.min_deg,
                max: range.max_deg,
            });
        }
        Ok(())
    }

    fn check_speed(&self, axis: Axis, value: f64) -> Result<(), DispatchError> {
        finite("speed", value)?;
        if value < 0.0 || value > self.limits.max_speed_deg_s {
            return Err(DispatchError::SpeedOutOfRange {
                axis,
                value,
                max: self.limits.max_speed_deg_s,
            });
        }
        Ok(())
    }

    fn send(&self, frame: CommandFrame) -> Result<(), DispatchError> {
        self.sink.send_command(&frame)?;
        Ok(())
    }
}

fn check_mask(axes: AxisMask) -> Result<(), DispatchError> {
    if axes.has_unknown_bits() {
        return Err(DispatchError::UnknownAxisBits(axes.bits()));
    }
    if axes.selects_nothing() {
        return Err(DispatchError::EmptyAxisMask(axes.bits()));
    }
    Ok(())
}

fn finite(what: &'static str, value: f64) -> Result<(), DispatchError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DispatchError::NotFinite(what))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::icd::IcdError;

    /// Keeps every frame it is handed.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub frames: Mutex<Vec<CommandFrame>>,
        pub fail: Mutex<bool>,
    }

    impl RecordingSink {
        pub fn frames(&self) -> Vec<CommandFrame> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl CommandSink for RecordingSink {
        fn send_command(&self, frame: &CommandFrame) -> Result<(), IcdError> {
            if *self.fail.lock().unwrap() {
                return Err(IcdError::QueueFull);
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    fn dispatcher() -> (Arc<RecordingSink>, CommandDispatcher) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = CommandDispatcher::new(sink.clone(), AxisLimits::default());
        (sink, dispatcher)
    }

    #[test]
    fn stop_builds_one_frame() {
        let (sink, dispatcher) = dispatcher();
        dispatcher.stop(AxisMask::ALL).unwrap();
        assert_eq!(sink.frames(), vec![CommandFrame::Stop { axes: AxisMask::ALL }]);
    }

    #[test]
    fn invalid_masks_never_reach_the_sink() {
        let (sink, dispatcher) = dispatcher();
        assert!(matches!(
            dispatcher.stop(AxisMask::empty()),
            Err(DispatchError::EmptyAxisMask(0))
        ));
        assert!(matches!(
            dispatcher.servo_preset(AxisMask::from_bits_retain(0b1001)),
            Err(DispatchError::UnknownAxisBits(0b1001))
        ));
        assert!(matches!(
            dispatcher.feed_on_off(0x10),
            Err(DispatchError::UnknownFeedBits(0x10))
        ));
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn manual_control_checks_only_selected_axes() {
        let (sink, dispatcher) = dispatcher();
        // the train angle is out of range but train is not selected
        dispatcher
            .multi_manual_control(AxisMask::AZ_EL, [180.0, 45.0, 500.0], [2.0, 1.0, 99.0])
            .unwrap();
        assert_eq!(
            sink.frames(),
            vec![CommandFrame::MultiManualControl {
                axes: AxisMask::AZ_EL,
                angles: [180.0, 45.0, 0.0],
                speeds: [2.0, 1.0, 0.0],
            }]
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let (sink, dispatcher) = dispatcher();
        let err = dispatcher
            .multi_manual_control(AxisMask::ELEVATION, [0.0, 95.0, 0.0], [0.0, 1.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::AngleOutOfRange {
                axis: Axis::Elevation,
                ..
            }
        ));
        assert!(err.is_validation());

        let err = dispatcher
            .multi_manual_control(AxisMask::TRAIN, [0.0, 0.0, 10.0], [0.0, 0.0, 11.0])
            .unwrap_err();
        assert!(matches!(err, DispatchError::SpeedOutOfRange { .. }));

        assert!(matches!(
            dispatcher.position_offset(f64::NAN, 0.0, 0.0),
            Err(DispatchError::NotFinite(_))
        ));
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn emergency_accepts_known_codes() {
        let (sink, dispatcher) = dispatcher();
        dispatcher.on_emergency('E').unwrap();
        assert!(matches!(
            dispatcher.on_emergency('x'),
            Err(DispatchError::EmergencyCode('x'))
        ));
        assert_eq!(sink.frames(), vec![CommandFrame::Emergency { code: b'E' }]);
    }

    #[test]
    fn offsets_follow_accepted_commands() {
        let (sink, dispatcher) = dispatcher();
        dispatcher.position_offset(0.5, -0.25, 0.0).unwrap();
        dispatcher.time_offset(1.5).unwrap();

        *sink.fail.lock().unwrap() = true;
        assert!(matches!(
            dispatcher.time_offset(9.0),
            Err(DispatchError::Transport(IcdError::QueueFull))
        ));

        let offsets = dispatcher.offsets();
        assert_eq!(offsets.azimuth_deg, 0.5);
        assert_eq!(offsets.elevation_deg, -0.25);
        assert_eq!(offsets.time_s, 1.5);
    }

    #[test]
    fn track_frames_carry_timing_and_points() {
        let (sink, dispatcher) = dispatcher();
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        dispatcher
            .track_header(1, start, Duration::from_millis(500))
            .unwrap();
        dispatcher
            .track_point(7, [10.0, 20.0, 0.0], [0.5, 0.5, 0.0])
            .unwrap();
        assert!(dispatcher
            .track_point(8, [10.0, -5.0, 0.0], [0.5, 0.5, 0.0])
            .is_err());

        assert_eq!(
            sink.frames(),
            vec![
                CommandFrame::TrackHeader {
                    mode: 1,
                    start_unix_ms: 1_700_000_000_000,
                    cadence_ms: 500,
                },
                CommandFrame::TrackPoint {
                    sequence: 7,
                    angles: [10.0, 20.0, 0.0],
                    speeds: [0.5, 0.5, 0.0],
                },
            ]
        );
    }
}
