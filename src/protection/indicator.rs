use crate::error::ProtectionError;
use crate::sysfs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Visible signal that the disks are parked
pub trait Indicator: Send {
    fn set_indicator(&mut self, on: bool) -> Result<(), ProtectionError>;
}

/// LED driven through a sysfs brightness attribute
#[derive(Debug, Clone)]
pub struct LedIndicator {
    path: PathBuf,
}

impl LedIndicator {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Indicator for LedIndicator {
    fn set_indicator(&mut self, on: bool) -> Result<(), ProtectionError> {
        let value = if on { "1" } else { "0" };
        sysfs::write_value(&self.path, value).map_err(|e| ProtectionError::Write {
            path: self.path.clone(),
            details: e.to_string(),
        })
    }
}

/// Best-effort wrapper: the first failure disables the indicator for the
/// rest of the run.
#[derive(Default)]
pub struct IndicatorHandle {
    inner: Option<Box<dyn Indicator>>,
}

impl IndicatorHandle {
    pub fn new(indicator: Box<dyn Indicator>) -> Self {
        Self {
            inner: Some(indicator),
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn set(&mut self, on: bool) {
        let result = match self.inner.as_mut() {
            Some(indicator) => indicator.set_indicator(on),
            None => return,
        };

        match result {
            Ok(()) => debug!("Indicator {}", if on { "on" } else { "off" }),
            Err(e) => {
                warn!("Disabling indicator: {}", e);
                self.inner = None;
            }
        }
    }
}

/// Indicator that records every state change, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    states: Arc<Mutex<Vec<bool>>>,
    failing: bool,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            states: Arc::default(),
            failing: true,
        }
    }

    pub fn states(&self) -> Vec<bool> {
        self.states
            .lock()
            .map(|states| states.clone())
            .unwrap_or_default()
    }
}

impl Indicator for RecordingIndicator {
    fn set_indicator(&mut self, on: bool) -> Result<(), ProtectionError> {
        if self.failing {
            return Err(ProtectionError::Write {
                path: PathBuf::from("/sys/devices/virtual/leds/hp::hddprotect/brightness"),
                details: "No such device".to_string(),
            });
        }
        if let Ok(mut states) = self.states.lock() {
            states.push(on);
        }
        Ok(())
    }
}
