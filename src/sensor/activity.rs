use crate::sysfs;
use std::path::PathBuf;
use tracing::trace;

/// Reports recent use of the built-in keyboard or pointing device
pub trait ActivityProbe: Send {
    fn keyboard_or_mouse_active(&self) -> bool;
}

/// Probe for backends without activity reporting
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActivity;

impl ActivityProbe for NoActivity {
    fn keyboard_or_mouse_active(&self) -> bool {
        false
    }
}

/// HDAPS exposes keyboard and mouse activity flags next to the position
#[derive(Debug, Clone)]
pub struct HdapsActivityProbe {
    keyboard: PathBuf,
    mouse: PathBuf,
}

impl HdapsActivityProbe {
    pub fn new() -> Self {
        Self::with_paths(
            "/sys/devices/platform/hdaps/keyboard_activity",
            "/sys/devices/platform/hdaps/mouse_activity",
        )
    }

    pub fn with_paths<P: Into<PathBuf>>(keyboard: P, mouse: P) -> Self {
        Self {
            keyboard: keyboard.into(),
            mouse: mouse.into(),
        }
    }
}

impl Default for HdapsActivityProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityProbe for HdapsActivityProbe {
    fn keyboard_or_mouse_active(&self) -> bool {
        let active = [&self.mouse, &self.keyboard]
            .iter()
            .any(|path| matches!(sysfs::read_int(path), Ok(1)));
        trace!("Keyboard/mouse activity: {}", active);
        active
    }
}
