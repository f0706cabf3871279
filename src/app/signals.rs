use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, info};

/// Flags shared between signal handlers and the guard loop
#[derive(Debug, Clone)]
pub struct ControlFlags {
    running: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlags {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            pause: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn keep_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Ask for a pause; requests made before the loop consumes one coalesce
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Consume a pending pause request
    pub fn take_pause(&self) -> bool {
        self.pause.swap(false, Ordering::SeqCst)
    }
}

/// Route SIGTERM and SIGINT to shutdown and SIGUSR1 to pause.
///
/// Must be called from within a tokio runtime.
pub fn install_signal_handlers(flags: &ControlFlags) -> Result<()> {
    let register = |kind: SignalKind, name: &str| -> Result<Signal> {
        debug!("Registering {} handler", name);
        Ok(signal(kind)?)
    };

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = register(SignalKind::interrupt(), "SIGINT")?;
    let mut sigusr1 = register(SignalKind::user_defined1(), "SIGUSR1")?;

    let shutdown = flags.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received {}, terminating", name);
        shutdown.request_shutdown();
    });

    let pause = flags.clone();
    tokio::spawn(async move {
        while sigusr1.recv().await.is_some() {
            info!("Received SIGUSR1, pausing protection");
            pause.request_pause();
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_requests_coalesce() {
        let flags = ControlFlags::new();
        assert!(!flags.take_pause());

        flags.request_pause();
        flags.request_pause();
        assert!(flags.take_pause());
        assert!(!flags.take_pause());
    }

    #[test]
    fn test_shutdown_is_shared_across_clones() {
        let flags = ControlFlags::new();
        let handler = flags.clone();
        assert!(flags.keep_running());

        handler.request_shutdown();
        assert!(!flags.keep_running());
    }

    #[tokio::test]
    async fn test_sigusr1_sets_pause() {
        let flags = ControlFlags::new();
        install_signal_handlers(&flags).unwrap();

        unsafe {
            libc::raise(libc::SIGUSR1);
        }
        for _ in 0..100 {
            if flags.take_pause() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("SIGUSR1 was not observed");
    }
}
