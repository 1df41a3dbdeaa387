use serde::{Deserialize, Serialize};

/// How a field travels on the wire and is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Analog,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Analog(f64),
    Status(u32),
}

macro_rules! telemetry_fields {
    (
        analog { $($a_id:literal => $a_name:ident : $a_variant:ident,)* }
        status { $($s_id:literal => $s_name:ident : $s_variant:ident,)* }
    ) => {
        /// Every hardware-reported value, each optional.
        ///
        /// Used both for a decoded (partial) frame and for the merged state held by the store.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct TelemetryFields {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $a_name: Option<f64>,
            )*
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $s_name: Option<u32>,
            )*
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
        #[strum(serialize_all = "snake_case")]
        pub enum TelemetryField {
            $($a_variant,)*
            $($s_variant,)*
        }

        impl TelemetryField {
            pub const ALL: &'static [TelemetryField] = &[
                $(TelemetryField::$a_variant,)*
                $(TelemetryField::$s_variant,)*
            ];

            pub fn id(self) -> u8 {
                match self {
                    $(TelemetryField::$a_variant => $a_id,)*
                    $(TelemetryField::$s_variant => $s_id,)*
                }
            }

            pub fn from_id(id: u8) -> Option<Self> {
                match id {
                    $($a_id => Some(TelemetryField::$a_variant),)*
                    $($s_id => Some(TelemetryField::$s_variant),)*
                    _ => None,
                }
            }

            pub fn kind(self) -> FieldKind {
                match self {
                    $(TelemetryField::$a_variant => FieldKind::Analog,)*
                    $(TelemetryField::$s_variant => FieldKind::Status,)*
                }
            }
        }

        impl TelemetryFields {
            /// Overlays every field present in `partial`; absent fields keep their value.
            pub fn merge(&mut self, partial: &TelemetryFields) {
                $(self.$a_name = partial.$a_name.or(self.$a_name);)*
                $(self.$s_name = partial.$s_name.or(self.$s_name);)*
            }

            pub fn get(&self, field: TelemetryField) -> Option<FieldValue> {
                match field {
                    $(TelemetryField::$a_variant => self.$a_name.map(FieldValue::Analog),)*
                    $(TelemetryField::$s_variant => self.$s_name.map(FieldValue::Status),)*
                }
            }

            /// Returns false when the value kind does not match the field.
            pub fn set(&mut self, field: TelemetryField, value: FieldValue) -> bool {
                match (field, value) {
                    $((TelemetryField::$a_variant, FieldValue::Analog(v)) => self.$a_name = Some(v),)*
                    $((TelemetryField::$s_variant, FieldValue::Status(v)) => self.$s_name = Some(v),)*
                    _ => return false,
                }
                true
            }
        }
    };
}

telemetry_fields! {
    analog {
        1 => azimuth_angle: AzimuthAngle,
        2 => elevation_angle: ElevationAngle,
        3 => train_angle: TrainAngle,
        4 => azimuth_command_angle: AzimuthCommandAngle,
        5 => elevation_command_angle: ElevationCommandAngle,
        6 => train_command_angle: TrainCommandAngle,
        7 => azimuth_speed: AzimuthSpeed,
        8 => elevation_speed: ElevationSpeed,
        9 => train_speed: TrainSpeed,
        10 => azimuth_torque: AzimuthTorque,
        11 => elevation_torque: ElevationTorque,
        12 => train_torque: TrainTorque,
        13 => azimuth_secondary_torque: AzimuthSecondaryTorque,
        14 => elevation_secondary_torque: ElevationSecondaryTorque,
        15 => azimuth_acceleration: AzimuthAcceleration,
        16 => elevation_acceleration: ElevationAcceleration,
        17 => train_acceleration: TrainAcceleration,
        18 => azimuth_position_offset: AzimuthPositionOffset,
        19 => elevation_position_offset: ElevationPositionOffset,
        20 => train_position_offset: TrainPositionOffset,
        21 => time_offset: TimeOffset,
        22 => azimuth_motor_temperature: AzimuthMotorTemperature,
        23 => elevation_motor_temperature: ElevationMotorTemperature,
        24 => train_motor_temperature: TrainMotorTemperature,
        25 => polarization_angle: PolarizationAngle,
        26 => polarization_speed: PolarizationSpeed,
        27 => wind_speed: WindSpeed,
        28 => wind_direction: WindDirection,
        29 => air_temperature: AirTemperature,
        30 => relative_humidity: RelativeHumidity,
        31 => air_pressure: AirPressure,
        32 => rain_rate: RainRate,
        33 => cabinet_temperature: CabinetTemperature,
        34 => feed_temperature: FeedTemperature,
        35 => waveguide_pressure: WaveguidePressure,
        36 => mains_voltage: MainsVoltage,
        37 => ups_battery_level: UpsBatteryLevel,
        38 => tracking_azimuth: TrackingAzimuth,
        39 => tracking_elevation: TrackingElevation,
        40 => tracking_train: TrackingTrain,
        41 => tracking_azimuth_error: TrackingAzimuthError,
        42 => tracking_elevation_error: TrackingElevationError,
        43 => tracking_elapsed: TrackingElapsed,
        44 => tracking_remaining: TrackingRemaining,
    }
    status {
        64 => acu_mode_status: AcuModeStatus,
        65 => azimuth_servo_status: AzimuthServoStatus,
        66 => elevation_servo_status: ElevationServoStatus,
        67 => train_servo_status: TrainServoStatus,
        68 => azimuth_limit_status: AzimuthLimitStatus,
        69 => elevation_limit_status: ElevationLimitStatus,
        70 => train_limit_status: TrainLimitStatus,
        71 => stow_pin_status: StowPinStatus,
        72 => protocol_status: ProtocolStatus,
        73 => feed_status: FeedStatus,
        74 => power_status: PowerStatus,
        75 => interlock_status: InterlockStatus,
        76 => brake_status: BrakeStatus,
        77 => program_track_status: ProgramTrackStatus,
    }
}

impl TelemetryFields {
    /// Present fields in wire-id order.
    pub fn present(&self) -> Vec<(TelemetryField, FieldValue)> {
        TelemetryField::ALL
            .iter()
            .filter_map(|field| self.get(*field).map(|value| (*field, value)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        TelemetryField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    pub fn status_word(&self, field: TelemetryField) -> Option<u32> {
        match self.get(field)? {
            FieldValue::Status(word) => Some(word),
            FieldValue::Analog(_) => None,
        }
    }
}
