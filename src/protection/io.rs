use super::Disk;
use crate::error::ProtectionError;
use crate::sysfs;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Issues park and unpark commands to a disk's protect attribute
pub trait ProtectionIo: Send {
    /// Park for `duration` in the attribute's unit; 0 unparks
    fn set_protection(&mut self, disk: &Disk, duration: u64) -> Result<(), ProtectionError>;

    /// Whether the disk currently reports itself parked; `None` when the
    /// state is not observable (dry run)
    fn read_parked(&mut self, disk: &Disk) -> Result<Option<bool>, ProtectionError>;
}

/// Writes durations to the kernel's protect attributes
#[derive(Debug, Clone, Default)]
pub struct SysfsProtection {
    dry_run: bool,
}

impl SysfsProtection {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl ProtectionIo for SysfsProtection {
    fn set_protection(&mut self, disk: &Disk, duration: u64) -> Result<(), ProtectionError> {
        if self.dry_run {
            debug!("Dry run: would write {} to {}", duration, disk.protect_path().display());
            return Ok(());
        }

        sysfs::write_value(disk.protect_path(), &duration.to_string()).map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ProtectionError::Open {
                        path: disk.protect_path().to_path_buf(),
                        details: e.to_string(),
                    }
                }
                _ => ProtectionError::Write {
                    path: disk.protect_path().to_path_buf(),
                    details: e.to_string(),
                },
            }
        })
    }

    fn read_parked(&mut self, disk: &Disk) -> Result<Option<bool>, ProtectionError> {
        if self.dry_run {
            return Ok(None);
        }

        let value = sysfs::read_int(disk.protect_path()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ProtectionError::Parse {
                    path: disk.protect_path().to_path_buf(),
                    content: e.to_string(),
                }
            } else {
                ProtectionError::Read {
                    path: disk.protect_path().to_path_buf(),
                    details: e.to_string(),
                }
            }
        })?;
        Ok(Some(value != 0))
    }
}

/// One command issued through [`RecordingProtection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionWrite {
    pub disk: String,
    pub duration: u64,
}

#[derive(Debug, Default)]
struct Recording {
    writes: Vec<ProtectionWrite>,
    failing: bool,
    report_unparked: bool,
}

/// In-memory protection backend that records every command.
///
/// Clones share the same log so a test can keep one handle while the
/// controller owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingProtection {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingProtection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    /// Make readback claim the disks are unparked regardless of writes
    pub fn set_report_unparked(&self, report_unparked: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.report_unparked = report_unparked;
        }
    }

    pub fn writes(&self) -> Vec<ProtectionWrite> {
        self.inner
            .lock()
            .map(|inner| inner.writes.clone())
            .unwrap_or_default()
    }

    /// Durations written, in order, across all disks
    pub fn durations(&self) -> Vec<u64> {
        self.writes().iter().map(|w| w.duration).collect()
    }
}

impl ProtectionIo for RecordingProtection {
    fn set_protection(&mut self, disk: &Disk, duration: u64) -> Result<(), ProtectionError> {
        let mut inner = self.inner.lock().map_err(|e| ProtectionError::Write {
            path: disk.protect_path().to_path_buf(),
            details: e.to_string(),
        })?;
        if inner.failing {
            return Err(ProtectionError::Write {
                path: disk.protect_path().to_path_buf(),
                details: "simulated failure".to_string(),
            });
        }
        inner.writes.push(ProtectionWrite {
            disk: disk.name().to_string(),
            duration,
        });
        Ok(())
    }

    fn read_parked(&mut self, disk: &Disk) -> Result<Option<bool>, ProtectionError> {
        let inner = self.inner.lock().map_err(|e| ProtectionError::Read {
            path: disk.protect_path().to_path_buf(),
            details: e.to_string(),
        })?;
        if inner.report_unparked {
            return Ok(Some(false));
        }
        let last = inner
            .writes
            .iter()
            .rev()
            .find(|w| w.disk == disk.name())
            .map(|w| w.duration);
        Ok(Some(matches!(last, Some(duration) if duration > 0)))
    }
}
