use crate::axis::Axis;
use crate::telemetry::TelemetryField;

use super::types::{FaultCategory, FaultCondition, Severity};

use FaultCategory::*;
use Severity::*;

type BitSpec = (u8, &'static str, FaultCategory, Severity, &'static str);

const SERVO_BITS: &[BitSpec] = &[
    (0, "SERVO_ALARM", Servo, Critical, "servo amplifier alarm"),
    (1, "ENCODER_FAULT", Servo, Critical, "position encoder fault"),
    (2, "OVER_SPEED", Servo, Warning, "axis over speed"),
    (3, "OVER_CURRENT", Servo, Critical, "motor over current"),
    (4, "MOTOR_OVERHEAT", Servo, Warning, "motor over temperature"),
];

const LIMIT_BITS: &[BitSpec] = &[
    (0, "POSITIVE_LIMIT", Interlock, Critical, "positive final limit switch"),
    (1, "NEGATIVE_LIMIT", Interlock, Critical, "negative final limit switch"),
    (2, "POSITIVE_PRELIMIT", Interlock, Warning, "positive prelimit switch"),
    (3, "NEGATIVE_PRELIMIT", Interlock, Warning, "negative prelimit switch"),
];

const STOW_PIN_BITS: &[BitSpec] = &[
    (0, "AZ_STOW_PIN_ENGAGED", Interlock, Warning, "azimuth stow pin engaged"),
    (1, "EL_STOW_PIN_ENGAGED", Interlock, Warning, "elevation stow pin engaged"),
    (2, "AZ_STOW_PIN_FAULT", Servo, Critical, "azimuth stow pin actuator fault"),
    (3, "EL_STOW_PIN_FAULT", Servo, Critical, "elevation stow pin actuator fault"),
];

const PROTOCOL_BITS: &[BitSpec] = &[
    (0, "ACU_LINK_LOST", Protocol, Critical, "controller lost the command link"),
    (1, "CHECKSUM_ERROR", Protocol, Warning, "controller rejected a frame checksum"),
    (2, "COMMAND_REJECTED", Protocol, Warning, "controller rejected a command"),
    (3, "TRACK_TABLE_OVERFLOW", Protocol, Warning, "program track table overflow"),
];

const FEED_BITS: &[BitSpec] = &[
    (0, "LNA_A_FAULT", System, Warning, "feed LNA A fault"),
    (1, "LNA_B_FAULT", System, Warning, "feed LNA B fault"),
    (2, "RF_SWITCH_FAULT", System, Warning, "feed RF switch fault"),
    (3, "FEED_HEATER_FAULT", System, Info, "feed heater fault"),
];

const POWER_BITS: &[BitSpec] = &[
    (0, "MAINS_POWER_FAILURE", System, Critical, "mains power failure"),
    (1, "UPS_ON_BATTERY", System, Warning, "UPS running on battery"),
    (2, "LOCAL_EMERGENCY_STOP", Emergency, Critical, "local emergency stop pressed"),
    (3, "REMOTE_EMERGENCY_STOP", Emergency, Critical, "remote emergency stop active"),
    (4, "SERVO_POWER_OFF", System, Warning, "servo power contactor open"),
];

const INTERLOCK_BITS: &[BitSpec] = &[
    (0, "LOCAL_CONTROL_ACTIVE", Interlock, Info, "controller in local mode"),
    (1, "DOOR_OPEN", Interlock, Warning, "equipment door open"),
    (2, "HAND_CRANK_INSERTED", Interlock, Critical, "hand crank inserted"),
    (3, "PLATFORM_ACCESS", Interlock, Warning, "maintenance platform occupied"),
];

/// Every monitored status bit.
pub fn monitored_conditions() -> Vec<FaultCondition> {
    let mut conditions = Vec::new();

    let per_axis = [
        (Axis::Azimuth, "AZ", TelemetryField::AzimuthServoStatus, TelemetryField::AzimuthLimitStatus),
        (Axis::Elevation, "EL", TelemetryField::ElevationServoStatus, TelemetryField::ElevationLimitStatus),
        (Axis::Train, "TRAIN", TelemetryField::TrainServoStatus, TelemetryField::TrainLimitStatus),
    ];
    for (axis, prefix, servo_word, limit_word) in per_axis {
        push_word(&mut conditions, servo_word, SERVO_BITS, Some((axis, prefix)));
        push_word(&mut conditions, limit_word, LIMIT_BITS, Some((axis, prefix)));
        conditions.push(FaultCondition {
            code: format!("{}_BRAKE_FAULT", prefix),
            word: TelemetryField::BrakeStatus,
            bit: axis.index() as u8,
            category: Servo,
            severity: Critical,
            axis: Some(axis),
            description: format!("{} brake fault", axis),
        });
    }

    push_word(&mut conditions, TelemetryField::StowPinStatus, STOW_PIN_BITS, None);
    push_word(&mut conditions, TelemetryField::ProtocolStatus, PROTOCOL_BITS, None);
    push_word(&mut conditions, TelemetryField::FeedStatus, FEED_BITS, None);
    push_word(&mut conditions, TelemetryField::PowerStatus, POWER_BITS, None);
    push_word(&mut conditions, TelemetryField::InterlockStatus, INTERLOCK_BITS, None);

    conditions
}

fn push_word(
    out: &mut Vec<FaultCondition>,
    word: TelemetryField,
    bits: &[BitSpec],
    axis: Option<(Axis, &str)>,
) {
    for &(bit, code, category, severity, description) in bits {
        let (code, description) = match axis {
            Some((axis, prefix)) => (
                format!("{}_{}", prefix, code),
                format!("{}: {}", axis, description),
            ),
            None => (code.to_string(), description.to_string()),
        };
        out.push(FaultCondition {
            code,
            word,
            bit,
            category,
            severity,
            axis: axis.map(|(a, _)| a),
            description,
        });
    }
}
