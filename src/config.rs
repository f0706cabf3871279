use crate::sensor::AccelerometerInterface;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiskguardConfig {
    pub protection: ProtectionConfig,
    pub sensor: SensorConfig,
    pub indicator: IndicatorConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtectionConfig {
    /// Block devices to protect (e.g. "sda"); empty means autodetect
    #[serde(default)]
    pub devices: Vec<String>,

    /// Base motion threshold; higher is less sensitive
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Raise the threshold while the built-in keyboard/mouse is in use
    #[serde(default)]
    pub adaptive: bool,

    /// Never write to the protect attributes
    #[serde(default)]
    pub dry_run: bool,

    /// Force-enable head unloading on configured devices (pre ATA7 drives)
    #[serde(default)]
    pub force_unload: bool,

    /// Treat autodetected drives as rotational regardless of the kernel's view
    #[serde(default)]
    pub force_rotational: bool,

    /// Which sysfs attribute parks the heads
    #[serde(default = "default_kernel_interface")]
    pub kernel_interface: KernelInterface,

    /// Cooldown after a pause request, in seconds
    #[serde(default = "default_pause_seconds")]
    pub pause_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// Accelerometer interface, or "auto" to probe
    #[serde(default = "default_interface")]
    pub interface: InterfaceSetting,

    /// Software, hardware, or automatic fall decision
    #[serde(default = "default_logic")]
    pub logic: LogicMode,

    /// Poll the sysfs position file instead of reading the input device
    #[serde(default)]
    pub poll_sysfs: bool,

    /// Sampling rate in Hz; 0 reads it from the driver
    #[serde(default)]
    pub sampling_rate: u32,

    /// Load accelerometer kernel modules when probing finds nothing
    #[serde(default = "default_modprobe")]
    pub modprobe: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndicatorConfig {
    /// Light the disk protection LED while parked
    #[serde(default = "default_leds")]
    pub leds: bool,

    /// LED brightness attribute
    #[serde(default = "default_led_path")]
    pub led_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Detach from the terminal
    #[serde(default)]
    pub background: bool,

    /// Pid file written when running in the background
    #[serde(default)]
    pub pidfile: Option<String>,

    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<String>,

    /// Root of the block device tree
    #[serde(default = "default_sysfs_block")]
    pub sysfs_block: String,

    /// Attempts while waiting for sysfs attributes at startup
    #[serde(default = "default_startup_retries")]
    pub startup_retries: u32,

    /// Delay between startup attempts in milliseconds
    #[serde(default = "default_startup_retry_interval_ms")]
    pub startup_retry_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KernelInterface {
    /// `/sys/block/<dev>/device/unload_heads`, milliseconds
    UnloadHeads,
    /// `/sys/block/<dev>/queue/protect`, seconds
    QueueProtect,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceSetting {
    Auto,
    Hdaps,
    Ams,
    Hp3d,
    Applesmc,
    Freefall,
}

impl InterfaceSetting {
    /// The explicitly requested interface, if any
    pub fn fixed(self) -> Option<AccelerometerInterface> {
        match self {
            InterfaceSetting::Auto => None,
            InterfaceSetting::Hdaps => Some(AccelerometerInterface::Hdaps),
            InterfaceSetting::Ams => Some(AccelerometerInterface::Ams),
            InterfaceSetting::Hp3d => Some(AccelerometerInterface::Hp3d),
            InterfaceSetting::Applesmc => Some(AccelerometerInterface::AppleSmc),
            InterfaceSetting::Freefall => Some(AccelerometerInterface::Freefall),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogicMode {
    Auto,
    Software,
    Hardware,
}

impl DiskguardConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("/etc/diskguard.toml", false)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P, required: bool) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        if required && !path.as_ref().exists() {
            return Err(ConfigError::Message(format!(
                "Could not open configuration file {}",
                path_str
            )));
        }

        let settings = Config::builder()
            .set_default("protection.devices", Vec::<String>::new())?
            .set_default("protection.sensitivity", default_sensitivity())?
            .set_default("protection.adaptive", false)?
            .set_default("protection.dry_run", false)?
            .set_default("protection.force_unload", false)?
            .set_default("protection.force_rotational", false)?
            .set_default("protection.kernel_interface", "unload_heads")?
            .set_default("protection.pause_seconds", default_pause_seconds())?
            .set_default("sensor.interface", "auto")?
            .set_default("sensor.logic", "auto")?
            .set_default("sensor.poll_sysfs", false)?
            .set_default("sensor.sampling_rate", 0)?
            .set_default("sensor.modprobe", default_modprobe())?
            .set_default("indicator.leds", default_leds())?
            .set_default("indicator.led_path", default_led_path())?
            .set_default("system.background", false)?
            .set_default("system.sysfs_block", default_sysfs_block())?
            .set_default("system.startup_retries", default_startup_retries())?
            .set_default(
                "system.startup_retry_interval_ms",
                default_startup_retry_interval_ms(),
            )?
            .add_source(File::with_name(&path_str).required(false))
            // DISKGUARD_PROTECTION__SENSITIVITY=20
            .add_source(
                Environment::with_prefix("DISKGUARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: DiskguardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.protection.sensitivity > 0.0) {
            return Err(ConfigError::Message(
                "Sensitivity must be greater than 0".to_string(),
            ));
        }

        if self.sensor.sampling_rate > 1000 {
            return Err(ConfigError::Message(
                "Sampling rate must not exceed 1000 Hz".to_string(),
            ));
        }

        if self.system.startup_retry_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Startup retry interval must be greater than 0".to_string(),
            ));
        }

        if self.protection.devices.iter().any(|d| d.is_empty() || d.contains('/')) {
            return Err(ConfigError::Message(
                "Device names must be bare block device names such as \"sda\"".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DiskguardConfig {
    fn default() -> Self {
        Self {
            protection: ProtectionConfig {
                devices: Vec::new(),
                sensitivity: default_sensitivity(),
                adaptive: false,
                dry_run: false,
                force_unload: false,
                force_rotational: false,
                kernel_interface: default_kernel_interface(),
                pause_seconds: default_pause_seconds(),
            },
            sensor: SensorConfig {
                interface: default_interface(),
                logic: default_logic(),
                poll_sysfs: false,
                sampling_rate: 0,
                modprobe: default_modprobe(),
            },
            indicator: IndicatorConfig {
                leds: default_leds(),
                led_path: default_led_path(),
            },
            system: SystemConfig {
                background: false,
                pidfile: None,
                log_file: None,
                sysfs_block: default_sysfs_block(),
                startup_retries: default_startup_retries(),
                startup_retry_interval_ms: default_startup_retry_interval_ms(),
            },
        }
    }
}

// Default value functions
fn default_sensitivity() -> f64 {
    15.0
}
fn default_kernel_interface() -> KernelInterface {
    KernelInterface::UnloadHeads
}
fn default_pause_seconds() -> u64 {
    8
}

fn default_interface() -> InterfaceSetting {
    InterfaceSetting::Auto
}
fn default_logic() -> LogicMode {
    LogicMode::Auto
}
fn default_modprobe() -> bool {
    true
}

fn default_leds() -> bool {
    true
}
fn default_led_path() -> String {
    "/sys/devices/virtual/leds/hp::hddprotect/brightness".to_string()
}

fn default_sysfs_block() -> String {
    "/sys/block".to_string()
}
fn default_startup_retries() -> u32 {
    100
}
fn default_startup_retry_interval_ms() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DiskguardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protection.sensitivity, 15.0);
        assert_eq!(config.protection.pause_seconds, 8);
        assert_eq!(config.protection.kernel_interface, KernelInterface::UnloadHeads);
        assert_eq!(config.sensor.interface, InterfaceSetting::Auto);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[protection]
devices = ["sda", "sdb"]
sensitivity = 20
adaptive = true

[sensor]
interface = "hp3d"
poll_sysfs = true
"#
        )
        .unwrap();

        let config = DiskguardConfig::load_from_file(file.path(), true).unwrap();
        assert_eq!(config.protection.devices, vec!["sda", "sdb"]);
        assert_eq!(config.protection.sensitivity, 20.0);
        assert!(config.protection.adaptive);
        assert_eq!(
            config.sensor.interface.fixed(),
            Some(AccelerometerInterface::Hp3d)
        );
        assert!(config.sensor.poll_sysfs);
        // untouched sections keep their defaults
        assert_eq!(config.system.startup_retries, 100);
        assert!(config.indicator.leds);
    }

    #[test]
    fn test_missing_required_file() {
        let result = DiskguardConfig::load_from_file("/nonexistent/diskguard.toml", true);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DiskguardConfig::default();
        config.protection.sensitivity = 0.0;
        assert!(config.validate().is_err());

        config.protection.sensitivity = 15.0;
        config.protection.devices = vec!["/dev/sda".to_string()];
        assert!(config.validate().is_err());

        config.protection.devices = vec!["sda".to_string()];
        assert!(config.validate().is_ok());

        config.sensor.sampling_rate = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_serializes() {
        let rendered = toml::to_string_pretty(&DiskguardConfig::default()).unwrap();
        assert!(rendered.contains("[protection]"));
        assert!(rendered.contains("kernel_interface = \"unload_heads\""));
    }
}
