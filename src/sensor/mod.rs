mod activity;
mod coalesce;
mod freefall;
mod interface;
mod mock;
mod sysfs;

#[cfg(all(feature = "input", target_os = "linux"))]
mod input;

pub use activity::{ActivityProbe, HdapsActivityProbe, NoActivity};
pub use coalesce::{AxisEvent, EventCoalescer};
pub use freefall::FreefallIndicator;
pub use interface::{
    detect_sampling_rate, load_modules, parse_position, select_interface, select_interface_with,
    AccelerometerInterface, InputDeviceMatch, PositionFormat, DEFAULT_SAMPLING_RATE,
};
pub use mock::{MockFallIndicator, MockSampleSource};
pub use sysfs::SysfsPositionSource;

#[cfg(all(feature = "input", target_os = "linux"))]
pub use input::InputDeviceSource;

use crate::error::SensorError;
use async_trait::async_trait;
use std::time::Duration;

/// A timestamped accelerometer position readout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: i32,
    pub y: i32,
    /// Absent on two-axis sensors; never used by the analyzer
    pub z: Option<i32>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl Sample {
    pub fn new(x: i32, y: i32, timestamp: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            timestamp,
        }
    }

    pub fn with_z(mut self, z: i32) -> Self {
        self.z = Some(z);
        self
    }
}

/// How a source obtains its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceVariant {
    /// Polled two-axis position file
    Positional2D,
    /// Polled three-axis position file
    Positional3D,
    /// Input device that reports only changes
    EventStream,
    /// Kernel-side fall counter, bypasses motion analysis
    HardwareFallIndicator,
}

/// Lazy, infinite stream of position samples
#[async_trait]
pub trait SampleSource: Send {
    /// Wait for and return the next sample
    async fn next_sample(&mut self) -> Result<Sample, SensorError>;

    fn variant(&self) -> SourceVariant;

    fn name(&self) -> &str;

    /// Sources that stay silent while the position is unchanged need
    /// retroactive samples to keep time deltas near the sampling cadence
    fn emits_on_change(&self) -> bool {
        self.variant() == SourceVariant::EventStream
    }
}

/// Hardware fall detector yielding the number of fall events seen
#[async_trait]
pub trait FallIndicator: Send {
    /// Blocks until a fall while unparked; polls once per interval while parked
    async fn read_fall_count(&mut self, parked: bool) -> Result<u8, SensorError>;

    fn name(&self) -> &str;
}

/// Gap between change-only samples, in sampling intervals, beyond which a
/// retroactive sample is synthesized
pub const GAP_FILL_THRESHOLD_INTERVALS: f64 = 1.5;

/// How far before the new sample the retroactive one is placed
pub const GAP_FILL_OFFSET_INTERVALS: f64 = 1.0;

/// Synthesize a sample repeating `previous` shortly before `next`, when the
/// gap between them is too long for the analyzer's derivatives.
pub fn retroactive_sample(previous: &Sample, next: &Sample, interval: Duration) -> Option<Sample> {
    let interval = interval.as_secs_f64();
    if next.timestamp - previous.timestamp > GAP_FILL_THRESHOLD_INTERVALS * interval {
        Some(Sample {
            timestamp: next.timestamp - GAP_FILL_OFFSET_INTERVALS * interval,
            ..*previous
        })
    } else {
        None
    }
}

/// Sampling interval for a rate in Hz
pub fn sampling_interval(rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(rate.max(1)))
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}
