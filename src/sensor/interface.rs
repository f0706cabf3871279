use crate::sysfs;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Sampling rate used when the driver does not report one
pub const DEFAULT_SAMPLING_RATE: u32 = 50;

const KERNEL_MODULES: [&str; 6] = ["hdaps_ec", "hdaps", "ams", "hp_accel", "applesmc", "smo8800"];

/// Supported accelerometer drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccelerometerInterface {
    /// ThinkPad Hard Drive Active Protection System
    Hdaps,
    /// Apple Motion Sensor
    Ams,
    /// HP 3D driveguard (lis3lv02d)
    Hp3d,
    /// Apple System Management Controller
    AppleSmc,
    /// Kernel-side free-fall detection
    Freefall,
}

/// On-disk layout of a position attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionFormat {
    /// `(x,y)`
    Pair,
    /// `x y z`
    SpacedTriple,
    /// `(x,y,z)`
    Triple,
}

/// How to find the input device mirroring an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDeviceMatch {
    Phys(&'static str),
    Name(&'static str),
}

impl AccelerometerInterface {
    /// Probe order used for autodetection
    pub const PROBE_ORDER: [AccelerometerInterface; 5] = [
        AccelerometerInterface::Hdaps,
        AccelerometerInterface::Ams,
        AccelerometerInterface::Freefall,
        AccelerometerInterface::Hp3d,
        AccelerometerInterface::AppleSmc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AccelerometerInterface::Hdaps => "HDAPS",
            AccelerometerInterface::Ams => "AMS",
            AccelerometerInterface::Hp3d => "HP3D",
            AccelerometerInterface::AppleSmc => "APPLESMC",
            AccelerometerInterface::Freefall => "FREEFALL",
        }
    }

    /// File whose presence identifies the interface
    pub fn probe_path(&self) -> &'static str {
        match self {
            AccelerometerInterface::Freefall => "/dev/freefall",
            other => other.position_path().unwrap_or_default(),
        }
    }

    pub fn position_path(&self) -> Option<&'static str> {
        match self {
            AccelerometerInterface::Hdaps => Some("/sys/devices/platform/hdaps/position"),
            AccelerometerInterface::Ams => Some("/sys/devices/ams/current"),
            AccelerometerInterface::Hp3d => Some("/sys/devices/platform/lis3lv02d/position"),
            AccelerometerInterface::AppleSmc => {
                Some("/sys/devices/platform/applesmc.768/position")
            }
            AccelerometerInterface::Freefall => None,
        }
    }

    pub fn position_format(&self) -> Option<PositionFormat> {
        match self {
            AccelerometerInterface::Hdaps => Some(PositionFormat::Pair),
            AccelerometerInterface::Ams => Some(PositionFormat::SpacedTriple),
            AccelerometerInterface::Hp3d | AccelerometerInterface::AppleSmc => {
                Some(PositionFormat::Triple)
            }
            AccelerometerInterface::Freefall => None,
        }
    }

    pub fn input_device(&self) -> Option<InputDeviceMatch> {
        match self {
            AccelerometerInterface::Hdaps => Some(InputDeviceMatch::Phys("hdaps/input1")),
            AccelerometerInterface::Ams => Some(InputDeviceMatch::Name("Apple Motion Sensor")),
            AccelerometerInterface::Hp3d => {
                Some(InputDeviceMatch::Name("ST LIS3LV02DL Accelerometer"))
            }
            AccelerometerInterface::AppleSmc => Some(InputDeviceMatch::Name("applesmc")),
            AccelerometerInterface::Freefall => None,
        }
    }

    pub fn sampling_rate_path(&self) -> Option<&'static str> {
        match self {
            AccelerometerInterface::Hdaps => Some("/sys/devices/platform/hdaps/sampling_rate"),
            AccelerometerInterface::Hp3d => Some("/sys/devices/platform/lis3lv02d/rate"),
            _ => None,
        }
    }

    /// Only HP hardware exposes the hddprotect LED
    pub fn supports_leds(&self) -> bool {
        matches!(
            self,
            AccelerometerInterface::Hp3d | AccelerometerInterface::Freefall
        )
    }

    /// Only HDAPS reports built-in keyboard and mouse activity
    pub fn supports_activity(&self) -> bool {
        *self == AccelerometerInterface::Hdaps
    }

    pub fn is_hardware_logic(&self) -> bool {
        *self == AccelerometerInterface::Freefall
    }
}

/// Parse a position attribute's content
pub fn parse_position(format: PositionFormat, content: &str) -> Option<(i32, i32, Option<i32>)> {
    let content = content.trim();
    let values: Vec<i32> = match format {
        PositionFormat::SpacedTriple => content
            .split_whitespace()
            .map(|v| v.parse().ok())
            .collect::<Option<_>>()?,
        PositionFormat::Pair | PositionFormat::Triple => content
            .strip_prefix('(')?
            .strip_suffix(')')?
            .split(',')
            .map(|v| v.trim().parse().ok())
            .collect::<Option<_>>()?,
    };

    match (format, values.as_slice()) {
        (PositionFormat::Pair, [x, y]) => Some((*x, *y, None)),
        (PositionFormat::SpacedTriple | PositionFormat::Triple, [x, y, z]) => {
            Some((*x, *y, Some(*z)))
        }
        _ => None,
    }
}

/// Probe for an interface using `exists` to test each candidate path
pub fn select_interface_with<F>(allow_hardware: bool, exists: F) -> Option<AccelerometerInterface>
where
    F: Fn(&Path) -> bool,
{
    AccelerometerInterface::PROBE_ORDER
        .iter()
        .copied()
        .filter(|interface| allow_hardware || !interface.is_hardware_logic())
        .find(|interface| {
            let found = exists(Path::new(interface.probe_path()));
            debug!("Probing {} at {}: {}", interface.name(), interface.probe_path(), found);
            found
        })
}

/// Probe the running system for an accelerometer, loading modules if needed
pub fn select_interface(allow_hardware: bool, modprobe: bool) -> Option<AccelerometerInterface> {
    let openable = |path: &Path| File::open(path).is_ok();

    select_interface_with(allow_hardware, openable).or_else(|| {
        if modprobe {
            load_modules();
            select_interface_with(allow_hardware, openable)
        } else {
            None
        }
    })
}

/// Best-effort load of every known accelerometer driver
pub fn load_modules() {
    for module in KERNEL_MODULES {
        let status = Command::new("modprobe")
            .arg(module)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        debug!("modprobe {}: {:?}", module, status);
    }
}

/// Read the driver's sampling rate, falling back to the default
pub fn detect_sampling_rate(interface: AccelerometerInterface) -> u32 {
    let rate = interface
        .sampling_rate_path()
        .and_then(|path| sysfs::read_int(Path::new(path)).ok())
        .filter(|rate| *rate > 0)
        .and_then(|rate| u32::try_from(rate).ok());

    match rate {
        Some(rate) => {
            info!("{} sampling rate: {} Hz", interface.name(), rate);
            rate
        }
        None => {
            debug!(
                "No sampling rate reported by {}, using {} Hz",
                interface.name(),
                DEFAULT_SAMPLING_RATE
            );
            DEFAULT_SAMPLING_RATE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hdaps_pair() {
        assert_eq!(
            parse_position(PositionFormat::Pair, "(-12,503)\n"),
            Some((-12, 503, None))
        );
        assert_eq!(parse_position(PositionFormat::Pair, "(1,2,3)"), None);
        assert_eq!(parse_position(PositionFormat::Pair, "1,2"), None);
    }

    #[test]
    fn test_parse_triples() {
        assert_eq!(
            parse_position(PositionFormat::SpacedTriple, "4 -7 1020\n"),
            Some((4, -7, Some(1020)))
        );
        assert_eq!(
            parse_position(PositionFormat::Triple, "(18,-36,1008)\n"),
            Some((18, -36, Some(1008)))
        );
        assert_eq!(parse_position(PositionFormat::Triple, "(18,x,1008)"), None);
    }

    #[test]
    fn test_select_interface_probe_order() {
        let found = select_interface_with(true, |path| {
            path == Path::new("/dev/freefall")
                || path == Path::new("/sys/devices/platform/lis3lv02d/position")
        });
        assert_eq!(found, Some(AccelerometerInterface::Freefall));

        // forcing software logic skips the fall counter
        let found = select_interface_with(false, |path| {
            path == Path::new("/dev/freefall")
                || path == Path::new("/sys/devices/platform/lis3lv02d/position")
        });
        assert_eq!(found, Some(AccelerometerInterface::Hp3d));

        assert_eq!(select_interface_with(true, |_| false), None);
    }

    #[test]
    fn test_interface_capabilities() {
        assert!(AccelerometerInterface::Hdaps.supports_activity());
        assert!(!AccelerometerInterface::Hp3d.supports_activity());
        assert!(AccelerometerInterface::Hp3d.supports_leds());
        assert!(AccelerometerInterface::Freefall.is_hardware_logic());
        assert_eq!(AccelerometerInterface::Freefall.position_format(), None);
        assert_eq!(
            AccelerometerInterface::Hdaps.input_device(),
            Some(InputDeviceMatch::Phys("hdaps/input1"))
        );
    }
}
