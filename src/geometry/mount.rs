use serde::{Deserialize, Serialize};

use super::transform::{inverse_transform, transform};

/// Static mount parameters for one antenna, read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MountGeometry {
    #[serde(default)]
    pub tilt_angle_deg: f64,
    #[serde(default)]
    pub true_north_offset_deg: f64,
    #[serde(default)]
    pub rotator_angle_deg: f64,
}

impl MountGeometry {
    pub fn is_level(&self) -> bool {
        self.tilt_angle_deg == 0.0 && self.rotator_angle_deg == 0.0
    }

    /// Topocentric pointing to mount-frame pointing, correcting for true north first.
    pub fn to_mount(&self, az_deg: f64, el_deg: f64) -> (f64, f64) {
        let az = (az_deg - self.true_north_offset_deg).rem_euclid(360.0);
        transform(az, el_deg, self.tilt_angle_deg, self.rotator_angle_deg)
    }

    pub fn from_mount(&self, az_deg: f64, el_deg: f64) -> (f64, f64) {
        let (az, el) = inverse_transform(az_deg, el_deg, self.tilt_angle_deg, self.rotator_angle_deg);
        ((az + self.true_north_offset_deg).rem_euclid(360.0), el)
    }
}
