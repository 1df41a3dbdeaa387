use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::geometry::MountGeometry;

use super::error::ProviderError;
use super::types::AxisCommand;

/// Sample cadence assumed for a single-sample track.
const DEFAULT_CADENCE: Duration = Duration::from_secs(1);
/// How far behind `now` a sample may be and still be sent.
const DEFAULT_TOLERANCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSample {
    Position(AxisCommand),
    EndOfPass,
}

/// Timing of one pass as announced before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PassPlan {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub cadence: Duration,
    /// Where the antenna has to be when the pass starts.
    pub first: AxisCommand,
}

/// Source of pointing targets for one pass: ephemeris, sun position, a fixed table.
pub trait PositionProvider: Send {
    fn plan(&self) -> Result<PassPlan, ProviderError>;

    /// The target for `now`, or the end of the pass.
    fn next(&mut self, now: DateTime<Utc>) -> Result<ProviderSample, ProviderError>;
}

/// Precomputed, timestamped targets replayed in order.
///
/// `next` returns the nearest sample not older than the tolerance, so a late
/// start picks up mid-pass instead of replaying the past.
#[derive(Debug, Clone)]
pub struct SampleTrack {
    samples: Vec<(DateTime<Utc>, AxisCommand)>,
    cursor: usize,
    cadence: Duration,
    tolerance: Duration,
    mount: Option<MountGeometry>,
}

impl SampleTrack {
    pub fn new(samples: Vec<AxisCommand>) -> Result<Self, ProviderError> {
        if samples.is_empty() {
            return Err(ProviderError::Empty);
        }
        let mut timed = samples
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.timestamp.map(|t| (t, s)).ok_or(ProviderError::MissingTimestamp(i)))
            .collect::<Result<Vec<_>, _>>()?;
        timed.sort_by_key(|(t, _)| *t);

        let cadence = match timed.as_slice() {
            [(a, _), (b, _), ..] => (*b - *a)
                .to_std()
                .ok()
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_CADENCE),
            _ => DEFAULT_CADENCE,
        };

        Ok(Self {
            samples: timed,
            cursor: 0,
            cadence,
            tolerance: DEFAULT_TOLERANCE,
            mount: None,
        })
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Maps azimuth and elevation into the frame of a tilted mount before they are sent.
    pub fn with_mount(mut self, mount: MountGeometry) -> Self {
        self.mount = Some(mount);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.cursor
    }

    fn to_mount(&self, command: AxisCommand) -> AxisCommand {
        match self.mount {
            Some(mount) if !mount.is_level() || mount.true_north_offset_deg != 0.0 => {
                let (az, el) = mount.to_mount(command.azimuth_deg, command.elevation_deg);
                AxisCommand {
                    azimuth_deg: az,
                    elevation_deg: el,
                    ..command
                }
            }
            _ => command,
        }
    }
}

impl PositionProvider for SampleTrack {
    fn plan(&self) -> Result<PassPlan, ProviderError> {
        let (start, first) = self.samples.first().ok_or(ProviderError::Empty)?;
        Ok(PassPlan {
            start: *start,
            end: self.samples.last().map(|(t, _)| *t),
            cadence: self.cadence,
            first: self.to_mount(*first),
        })
    }

    fn next(&mut self, now: DateTime<Utc>) -> Result<ProviderSample, ProviderError> {
        let tolerance = chrono::Duration::from_std(self.tolerance)
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        while let Some((at, _)) = self.samples.get(self.cursor) {
            if *at + tolerance >= now {
                break;
            }
            self.cursor += 1;
        }
        match self.samples.get(self.cursor) {
            Some((_, command)) => {
                self.cursor += 1;
                Ok(ProviderSample::Position(self.to_mount(*command)))
            }
            None => Ok(ProviderSample::EndOfPass),
        }
    }
}
