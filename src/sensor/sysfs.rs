use super::{
    parse_position, unix_now, AccelerometerInterface, PositionFormat, Sample, SampleSource,
    SourceVariant,
};
use crate::error::SensorError;
use crate::sysfs;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;

/// Polls a sysfs position attribute once per sampling interval.
///
/// This costs more power than the input device and adds a phase difference
/// between the driver's own polling and ours, so it is the fallback mode.
pub struct SysfsPositionSource {
    name: String,
    path: PathBuf,
    format: PositionFormat,
    interval: Duration,
}

impl SysfsPositionSource {
    pub fn new(interface: AccelerometerInterface, interval: Duration) -> Result<Self, SensorError> {
        match (interface.position_path(), interface.position_format()) {
            (Some(path), Some(format)) => Ok(Self::with_path(
                interface.name(),
                path,
                format,
                interval,
            )),
            _ => Err(SensorError::NotAvailable),
        }
    }

    pub fn with_path<P: Into<PathBuf>>(
        name: &str,
        path: P,
        format: PositionFormat,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            format,
            interval,
        }
    }

    /// Read the current position without waiting
    pub fn read_now(&self) -> Result<Sample, SensorError> {
        read_position(&self.path, self.format)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read and parse one position, stamping it with the time of the read
pub fn read_position(path: &Path, format: PositionFormat) -> Result<Sample, SensorError> {
    let content = sysfs::read_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => SensorError::Open {
            path: path.to_path_buf(),
            details: e.to_string(),
        },
        _ => SensorError::Read {
            path: path.to_path_buf(),
            details: e.to_string(),
        },
    })?;
    let timestamp = unix_now();

    let (x, y, z) = parse_position(format, &content).ok_or_else(|| SensorError::Parse {
        path: path.to_path_buf(),
        content: content.trim().to_string(),
    })?;

    Ok(Sample { x, y, z, timestamp })
}

#[async_trait]
impl SampleSource for SysfsPositionSource {
    async fn next_sample(&mut self) -> Result<Sample, SensorError> {
        sleep(self.interval).await;
        self.read_now()
    }

    fn variant(&self) -> SourceVariant {
        match self.format {
            PositionFormat::Pair => SourceVariant::Positional2D,
            PositionFormat::SpacedTriple | PositionFormat::Triple => SourceVariant::Positional3D,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_polls_position_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position");
        fs::write(&path, "(18,-36,1008)\n").unwrap();

        let mut source = SysfsPositionSource::with_path(
            "HP3D",
            &path,
            PositionFormat::Triple,
            Duration::from_millis(1),
        );
        assert_eq!(source.variant(), SourceVariant::Positional3D);
        assert!(!source.emits_on_change());

        let first = source.next_sample().await.unwrap();
        assert_eq!((first.x, first.y, first.z), (18, -36, Some(1008)));

        fs::write(&path, "(20,-30,1000)\n").unwrap();
        let second = source.next_sample().await.unwrap();
        assert_eq!((second.x, second.y), (20, -30));
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn test_missing_or_garbled_file_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position");

        let source = SysfsPositionSource::with_path(
            "HDAPS",
            &path,
            PositionFormat::Pair,
            Duration::from_millis(1),
        );
        let err = source.read_now().unwrap_err();
        assert!(matches!(err, SensorError::Open { .. }));
        assert!(!err.is_fatal());

        fs::write(&path, "not ready").unwrap();
        let err = source.read_now().unwrap_err();
        assert!(matches!(err, SensorError::Parse { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_freefall_has_no_position_source() {
        let result =
            SysfsPositionSource::new(AccelerometerInterface::Freefall, Duration::from_millis(20));
        assert!(matches!(result, Err(SensorError::NotAvailable)));
    }
}
