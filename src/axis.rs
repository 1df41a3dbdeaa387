use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Axis {
    Azimuth,
    Elevation,
    Train,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Azimuth, Axis::Elevation, Axis::Train];

    pub fn index(self) -> usize {
        match self {
            Axis::Azimuth => 0,
            Axis::Elevation => 1,
            Axis::Train => 2,
        }
    }

    pub fn bit(self) -> u8 {
        1 << self.index()
    }
}

bitflags! {
    /// Set of axes as carried in ICD command bitmasks.
    ///
    /// Decoded masks keep unknown bits (`from_bits_retain`) so validation can reject them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AxisMask: u8 {
        const AZIMUTH = 1 << 0;
        const ELEVATION = 1 << 1;
        const TRAIN = 1 << 2;
        const AZ_EL = Self::AZIMUTH.bits() | Self::ELEVATION.bits();
        const ALL = Self::AZ_EL.bits() | Self::TRAIN.bits();
    }
}

impl AxisMask {
    pub fn has_unknown_bits(self) -> bool {
        self.bits() & !Self::all().bits() != 0
    }

    /// True when no known axis is selected, whatever unknown bits are set.
    pub fn selects_nothing(self) -> bool {
        self.bits() & Self::all().bits() == 0
    }

    pub fn includes(self, axis: Axis) -> bool {
        self.contains(AxisMask::from(axis))
    }

    pub fn axes(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.includes(*a))
    }
}

impl From<Axis> for AxisMask {
    fn from(axis: Axis) -> Self {
        AxisMask::from_bits_retain(axis.bit())
    }
}

impl FromIterator<Axis> for AxisMask {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        iter.into_iter().map(AxisMask::from).collect()
    }
}
