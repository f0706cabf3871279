mod controller;
mod device;
mod indicator;
mod io;

pub use controller::{
    ProtectionController, ProtectionState, StepOutcome, Transition, DEFAULT_PAUSE_SECONDS,
    FREEZE_EXTRA_SECONDS, FREEZE_SECONDS, REFREEZE_SECONDS,
};
pub use device::{DeviceSet, Disk};
pub use indicator::{Indicator, IndicatorHandle, LedIndicator, RecordingIndicator};
pub use io::{ProtectionIo, ProtectionWrite, RecordingProtection, SysfsProtection};
