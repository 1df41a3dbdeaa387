use serde::Serialize;

/// One row of a rotator sweep: the mount-frame pointing for a given rotator setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotatorAngleEntry {
    pub rotator_deg: f64,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

/// Maps a topocentric (az, el) pair into the frame of a tilted, rotator-mounted antenna.
///
/// The rotation about the vertical axis by `rotator_deg` is applied first, then the
/// rotation about the resulting horizontal (north) axis by `tilt_deg`.
pub fn transform(az_deg: f64, el_deg: f64, tilt_deg: f64, rotator_deg: f64) -> (f64, f64) {
    let v = to_enu(az_deg, el_deg);
    let v = rotate_z(v, rotator_deg);
    let v = rotate_y(v, tilt_deg);
    from_enu(v)
}

/// Inverse of [`transform`]: undoes the tilt first, then the rotator.
pub fn inverse_transform(az_deg: f64, el_deg: f64, tilt_deg: f64, rotator_deg: f64) -> (f64, f64) {
    let v = to_enu(az_deg, el_deg);
    let v = rotate_y(v, -tilt_deg);
    let v = rotate_z(v, -rotator_deg);
    from_enu(v)
}

/// Sweeps the rotator over [0, 360) in `step_deg` increments.
///
/// Returns an empty table when `step_deg` is not a positive finite number.
pub fn generate_rotator_angle_table(
    az_deg: f64,
    el_deg: f64,
    tilt_deg: f64,
    step_deg: f64,
) -> Vec<RotatorAngleEntry> {
    if !step_deg.is_finite() || step_deg <= 0.0 {
        return Vec::new();
    }

    // Integer stepping keeps the sweep free of accumulated rounding.
    let count = (360.0 / step_deg).ceil() as usize;
    (0..count)
        .map(|i| i as f64 * step_deg)
        .filter(|rotator| *rotator < 360.0)
        .map(|rotator| {
            let (azimuth_deg, elevation_deg) = transform(az_deg, el_deg, tilt_deg, rotator);
            RotatorAngleEntry {
                rotator_deg: rotator,
                azimuth_deg,
                elevation_deg,
            }
        })
        .collect()
}

fn to_enu(az_deg: f64, el_deg: f64) -> [f64; 3] {
    let az = az_deg.to_radians();
    let el = el_deg.to_radians();
    [el.cos() * az.sin(), el.cos() * az.cos(), el.sin()]
}

fn from_enu(v: [f64; 3]) -> (f64, f64) {
    let azimuth = v[0].atan2(v[1]).to_degrees().rem_euclid(360.0);
    let elevation = v[2].clamp(-1.0, 1.0).asin().to_degrees();
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    let azimuth = if azimuth >= 360.0 { 0.0 } else { azimuth };
    (azimuth, elevation)
}

fn rotate_z(v: [f64; 3], angle_deg: f64) -> [f64; 3] {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    [v[0] * cos - v[1] * sin, v[0] * sin + v[1] * cos, v[2]]
}

fn rotate_y(v: [f64; 3], angle_deg: f64) -> [f64; 3] {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    [v[0] * cos + v[2] * sin, v[1], -v[0] * sin + v[2] * cos]
}
