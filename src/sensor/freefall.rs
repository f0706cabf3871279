use super::FallIndicator;
use crate::error::SensorError;
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Kernel free-fall detector exposed as a one-byte counter device.
///
/// While unparked a read blocks until the hardware reports a fall. While
/// parked the counter is polled without blocking: an empty read means the
/// fall is over.
pub struct FreefallIndicator {
    path: PathBuf,
    file: Arc<File>,
    interval: Duration,
}

impl FreefallIndicator {
    pub fn open<P: AsRef<Path>>(path: P, interval: Duration) -> Result<Self, SensorError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SensorError::Open {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        info!("Using hardware fall detection logic from {}", path.display());
        Ok(Self::from_file(path, file, interval))
    }

    pub fn from_file<P: Into<PathBuf>>(path: P, file: File, interval: Duration) -> Self {
        Self {
            path: path.into(),
            file: Arc::new(file),
            interval,
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        let fd = self.file.as_raw_fd();
        // SAFETY: fd stays open for as long as self.file is alive
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        // SAFETY: as above
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn device_error(&self, details: String) -> SensorError {
        SensorError::DeviceRead {
            device: self.path.display().to_string(),
            details,
        }
    }

    /// End of file or any error other than "nothing pending" means the
    /// device is gone; only an interrupted read is worth another try.
    fn interpret(&self, result: io::Result<usize>, count: u8) -> Result<u8, SensorError> {
        match result {
            Ok(1) => Ok(count),
            Ok(bytes) => Err(SensorError::ShortRead {
                device: self.path.display().to_string(),
                bytes,
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("No pending fall events");
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(SensorError::Read {
                path: self.path.clone(),
                details: e.to_string(),
            }),
            Err(e) => Err(self.device_error(e.to_string())),
        }
    }
}

#[async_trait]
impl FallIndicator for FreefallIndicator {
    async fn read_fall_count(&mut self, parked: bool) -> Result<u8, SensorError> {
        if !parked {
            let file = Arc::clone(&self.file);
            let (result, count) = tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; 1];
                let result = (&*file).read(&mut buf);
                (result, buf[0])
            })
            .await
            .map_err(|e| self.device_error(e.to_string()))?;
            return self.interpret(result, count);
        }

        sleep(self.interval).await;
        self.set_nonblocking(true)
            .map_err(|e| self.device_error(e.to_string()))?;
        let mut buf = [0u8; 1];
        let result = (&*self.file).read(&mut buf);
        self.set_nonblocking(false)
            .map_err(|e| self.device_error(e.to_string()))?;
        self.interpret(result, buf[0])
    }

    fn name(&self) -> &str {
        "FREEFALL"
    }
}
