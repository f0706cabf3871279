pub mod analyzer;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod protection;
pub mod recovery;
pub mod sensor;
pub mod sysfs;

pub use analyzer::{Level, MotionAnalyzer, MotionReport, ThresholdConfig};
pub use app::{build_guard, install_signal_handlers, ControlFlags, Guard, GuardBuilder};
pub use config::DiskguardConfig;
pub use error::{DiskguardError, ProtectionError, Result, SensorError};
pub use events::{EventBus, EventFilter, EventReceiver, GuardEvent};
pub use protection::{
    DeviceSet, Disk, IndicatorHandle, ProtectionController, ProtectionIo, ProtectionState,
    SysfsProtection,
};
pub use recovery::RetryPolicy;
pub use sensor::{
    AccelerometerInterface, ActivityProbe, FallIndicator, Sample, SampleSource, SourceVariant,
};
