use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::axis::Axis;
use crate::geometry::MountGeometry;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub icd: IcdConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub mount: MountGeometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IcdConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_controller")]
    pub controller: String,
    #[serde(default = "default_link_timeout", deserialize_with = "duration")]
    pub link_timeout: Duration,
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    #[serde(default = "default_retry_initial", deserialize_with = "duration")]
    pub retry_initial: Duration,
    #[serde(default = "default_retry_max", deserialize_with = "duration")]
    pub retry_max: Duration,
}

fn default_bind() -> String {
    "0.0.0.0:10001".to_string()
}

fn default_controller() -> String {
    "192.168.1.100:10000".to_string()
}

fn default_link_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_send_queue() -> usize {
    64
}

fn default_send_retries() -> u32 {
    3
}

fn default_retry_initial() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_max() -> Duration {
    Duration::from_secs(2)
}

impl Default for IcdConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            controller: default_controller(),
            link_timeout: default_link_timeout(),
            send_queue: default_send_queue(),
            send_retries: default_send_retries(),
            retry_initial: default_retry_initial(),
            retry_max: default_retry_max(),
        }
    }
}

impl IcdConfig {
    pub fn controller_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.controller
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("icd.controller: {}", self.controller)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisRange {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl AxisRange {
    pub const fn new(min_deg: f64, max_deg: f64) -> Self {
        Self { min_deg, max_deg }
    }

    pub fn contains(&self, angle_deg: f64) -> bool {
        angle_deg >= self.min_deg && angle_deg <= self.max_deg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisLimits {
    #[serde(default = "default_azimuth_range")]
    pub azimuth: AxisRange,
    #[serde(default = "default_elevation_range")]
    pub elevation: AxisRange,
    #[serde(default = "default_train_range")]
    pub train: AxisRange,
    #[serde(default = "default_max_speed")]
    pub max_speed_deg_s: f64,
}

fn default_azimuth_range() -> AxisRange {
    AxisRange::new(0.0, 360.0)
}

fn default_elevation_range() -> AxisRange {
    AxisRange::new(0.0, 90.0)
}

fn default_train_range() -> AxisRange {
    AxisRange::new(-90.0, 90.0)
}

fn default_max_speed() -> f64 {
    10.0
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            azimuth: default_azimuth_range(),
            elevation: default_elevation_range(),
            train: default_train_range(),
            max_speed_deg_s: default_max_speed(),
        }
    }
}

impl AxisLimits {
    pub fn range(&self, axis: Axis) -> AxisRange {
        match axis {
            Axis::Azimuth => self.azimuth,
            Axis::Elevation => self.elevation,
            Axis::Train => self.train,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_stabilization_timeout", deserialize_with = "duration")]
    pub stabilization_timeout: Duration,
    #[serde(default = "default_settle_tolerance")]
    pub settle_tolerance_deg: f64,
    #[serde(default = "default_settle_poll", deserialize_with = "duration")]
    pub settle_poll: Duration,
    #[serde(default = "default_stale_telemetry", deserialize_with = "duration")]
    pub stale_telemetry: Duration,
    #[serde(default = "default_cadence", deserialize_with = "duration")]
    pub default_cadence: Duration,
    /// Slew speeds used while preparing, azimuth, elevation, train.
    #[serde(default = "default_slew_speeds")]
    pub slew_speeds_deg_s: [f64; 3],
    #[serde(default)]
    pub limits: AxisLimits,
}

fn default_stabilization_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_settle_tolerance() -> f64 {
    0.1
}

fn default_settle_poll() -> Duration {
    Duration::from_millis(200)
}

fn default_stale_telemetry() -> Duration {
    Duration::from_secs(3)
}

fn default_cadence() -> Duration {
    Duration::from_secs(1)
}

fn default_slew_speeds() -> [f64; 3] {
    [3.0, 3.0, 1.0]
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            stabilization_timeout: default_stabilization_timeout(),
            settle_tolerance_deg: default_settle_tolerance(),
            settle_poll: default_settle_poll(),
            stale_telemetry: default_stale_telemetry(),
            default_cadence: default_cadence(),
            slew_speeds_deg_s: default_slew_speeds(),
            limits: AxisLimits::default(),
        }
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // an empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.icd.controller_addr()?;
        if self.icd.link_timeout.is_zero() {
            return Err(ConfigError::Invalid("icd.link_timeout must be positive".into()));
        }
        if self.icd.send_queue == 0 {
            return Err(ConfigError::Invalid("icd.send_queue must be positive".into()));
        }

        let tracking = &self.tracking;
        for axis in Axis::ALL {
            let range = tracking.limits.range(axis);
            if !(range.min_deg < range.max_deg) {
                return Err(ConfigError::Invalid(format!(
                    "tracking.limits.{}: min must be below max",
                    axis
                )));
            }
        }
        if !(tracking.limits.max_speed_deg_s > 0.0) {
            return Err(ConfigError::Invalid(
                "tracking.limits.max_speed_deg_s must be positive".into(),
            ));
        }
        if tracking
            .slew_speeds_deg_s
            .iter()
            .any(|s| !(*s > 0.0) || *s > tracking.limits.max_speed_deg_s)
        {
            return Err(ConfigError::Invalid(
                "tracking.slew_speeds_deg_s must be within (0, max_speed_deg_s]".into(),
            ));
        }
        if !(tracking.settle_tolerance_deg > 0.0) {
            return Err(ConfigError::Invalid(
                "tracking.settle_tolerance_deg must be positive".into(),
            ));
        }
        if tracking.default_cadence.is_zero() || tracking.settle_poll.is_zero() {
            return Err(ConfigError::Invalid(
                "tracking cadence and settle poll must be positive".into(),
            ));
        }
        Ok(())
    }
}
