mod mount;
mod transform;

pub use mount::MountGeometry;
pub use transform::{
    generate_rotator_angle_table, inverse_transform, transform, RotatorAngleEntry,
};
