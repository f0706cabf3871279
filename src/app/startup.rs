use super::guard::Guard;
use super::signals::ControlFlags;
use crate::analyzer::{MotionAnalyzer, ThresholdConfig};
use crate::config::{DiskguardConfig, LogicMode};
use crate::error::{DiskguardError, ProtectionError, Result, SensorError};
use crate::events::EventBus;
use crate::protection::{
    DeviceSet, IndicatorHandle, LedIndicator, ProtectionController, SysfsProtection,
};
use crate::recovery::RetryPolicy;
use crate::sensor::{
    detect_sampling_rate, sampling_interval, select_interface, AccelerometerInterface,
    ActivityProbe, FreefallIndicator, HdapsActivityProbe, NoActivity, SampleSource,
    SysfsPositionSource,
};
use crate::sysfs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry policy for startup checks: patient in the background, where the
/// daemon may start before the drivers finish loading
pub fn startup_policy(config: &DiskguardConfig) -> RetryPolicy {
    if config.system.background {
        RetryPolicy::fixed(
            config.system.startup_retries,
            Duration::from_millis(config.system.startup_retry_interval_ms),
        )
    } else {
        RetryPolicy::once()
    }
}

/// Resolve the disks to protect: configured names, or autodetection
pub fn resolve_devices(config: &DiskguardConfig) -> Result<DeviceSet> {
    let protection = &config.protection;
    let mut devices = DeviceSet::from_names(
        &config.system.sysfs_block,
        protection.kernel_interface,
        &protection.devices,
    );

    if protection.force_unload {
        let failures = devices.force_unload();
        if !failures.is_empty() {
            warn!(
                "Forced unloading failed on {} of {} disks",
                failures.len(),
                devices.len()
            );
        }
    }

    if devices.is_empty() {
        warn!("You did not supply any devices to protect, trying autodetection");
        if devices.autodetect(protection.force_rotational) == 0 {
            return Err(DiskguardError::system("Could not detect any devices"));
        }
    }

    for disk in devices.iter() {
        debug!("disk: {} ({})", disk.name(), disk.protect_path().display());
    }
    Ok(devices)
}

/// Wait until every protect attribute accepts writes
pub async fn wait_for_protect_attributes(devices: &DeviceSet, policy: &RetryPolicy) -> Result<()> {
    for disk in devices.iter() {
        let path = disk.protect_path();
        policy
            .run("protect attribute check", || async move {
                if sysfs::is_writable(path) {
                    Ok(())
                } else {
                    Err(ProtectionError::Open {
                        path: path.to_path_buf(),
                        details: "not writable".to_string(),
                    })
                }
            })
            .await?;
    }
    Ok(())
}

/// Pick the accelerometer interface and whether the hardware decides
pub fn resolve_interface(config: &DiskguardConfig) -> Result<(AccelerometerInterface, bool)> {
    let logic = config.sensor.logic;
    let interface = match config.sensor.interface.fixed() {
        Some(interface) => interface,
        None => select_interface(logic != LogicMode::Software, config.sensor.modprobe)
            .ok_or(SensorError::NotAvailable)?,
    };

    let hardware = match logic {
        LogicMode::Hardware => true,
        LogicMode::Software if interface.is_hardware_logic() => {
            return Err(DiskguardError::system(format!(
                "{} only supports hardware logic",
                interface.name()
            )));
        }
        LogicMode::Software => false,
        LogicMode::Auto => interface.is_hardware_logic(),
    };

    info!("Selected interface: {}", interface.name());
    Ok((interface, hardware))
}

fn build_indicator(config: &DiskguardConfig, interface: AccelerometerInterface) -> IndicatorHandle {
    if !config.indicator.leds || !interface.supports_leds() {
        return IndicatorHandle::disabled();
    }

    let path = Path::new(&config.indicator.led_path);
    if !sysfs::is_writable(path) {
        debug!("LED {} not available", path.display());
        return IndicatorHandle::disabled();
    }
    IndicatorHandle::new(Box::new(LedIndicator::new(path)))
}

fn build_activity_probe(
    config: &DiskguardConfig,
    interface: AccelerometerInterface,
) -> Box<dyn ActivityProbe> {
    if config.protection.adaptive && interface.supports_activity() {
        Box::new(HdapsActivityProbe::new())
    } else {
        Box::new(NoActivity)
    }
}

/// Open the change-driven input device, falling back to sysfs polling
fn build_sample_source(
    config: &DiskguardConfig,
    interface: AccelerometerInterface,
    polled: SysfsPositionSource,
) -> Box<dyn SampleSource> {
    if config.sensor.poll_sysfs {
        return Box::new(polled);
    }
    let Some(matcher) = interface.input_device() else {
        return Box::new(polled);
    };

    #[cfg(all(feature = "input", target_os = "linux"))]
    {
        let seed = polled.read_now().ok();
        match crate::sensor::InputDeviceSource::open(matcher, seed) {
            Ok(source) => return Box::new(source),
            Err(e) => warn!(
                "Could not find {} input device ({}). Falling back to reading the position \
                 from sysfs (uses more power). Set poll_sysfs to silence this warning.",
                interface.name(),
                e
            ),
        }
    }
    #[cfg(not(all(feature = "input", target_os = "linux")))]
    {
        warn!(
            "Input device support for {:?} not built in, polling sysfs",
            matcher
        );
    }

    Box::new(polled)
}

/// Build a ready-to-run guard from configuration.
///
/// Performs every startup check: disks resolved and writable, interface
/// selected, sensor readable.
pub async fn build_guard(
    config: &DiskguardConfig,
    bus: EventBus,
    flags: ControlFlags,
) -> Result<Guard> {
    config.validate()?;
    let policy = startup_policy(config);
    let devices = resolve_devices(config)?;

    if config.protection.dry_run {
        info!("Dry run: protect attributes will not be written");
    } else {
        wait_for_protect_attributes(&devices, &policy).await?;
    }

    let (interface, hardware) = resolve_interface(config)?;

    let rate = match config.sensor.sampling_rate {
        0 => detect_sampling_rate(interface),
        rate => rate,
    };
    let interval = sampling_interval(rate);
    info!("Sampling rate: {} Hz", rate);

    let indicator = build_indicator(config, interface);
    let controller = ProtectionController::new(
        devices,
        Box::new(SysfsProtection::new(config.protection.dry_run)),
        indicator,
    )
    .with_pause_duration(Duration::from_secs(config.protection.pause_seconds));

    let builder = Guard::builder()
        .controller(controller)
        .event_bus(bus)
        .flags(flags);

    let builder = if hardware {
        let fall = FreefallIndicator::open(AccelerometerInterface::Freefall.probe_path(), interval)?;
        builder.hardware(Box::new(fall))
    } else {
        let polled = SysfsPositionSource::new(interface, interval)?;
        let probe = &polled;
        policy
            .run("position readout", || async move { probe.read_now() })
            .await
            .map_err(|e| {
                DiskguardError::system(format!("Could not read position from sysfs: {}", e))
            })?;

        let analyzer = MotionAnalyzer::new(ThresholdConfig::new(
            config.protection.sensitivity,
            config.protection.adaptive,
        ));
        let activity = build_activity_probe(config, interface);
        let source = build_sample_source(config, interface, polled);
        builder.software(source, analyzer, activity, interval)
    };

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InterfaceSetting, KernelInterface};
    use std::fs;

    fn config_with_block(root: &Path) -> DiskguardConfig {
        let mut config = DiskguardConfig::default();
        config.system.sysfs_block = root.to_string_lossy().into_owned();
        config
    }

    fn fake_disk(root: &Path, name: &str) {
        let device = root.join(name);
        fs::create_dir_all(device.join("device")).unwrap();
        fs::create_dir_all(device.join("queue")).unwrap();
        fs::write(device.join("removable"), "0\n").unwrap();
        fs::write(device.join("queue/rotational"), "1\n").unwrap();
        fs::write(device.join("device/unload_heads"), "0\n").unwrap();
    }

    #[test]
    fn test_startup_policy_depends_on_background() {
        let mut config = DiskguardConfig::default();
        assert_eq!(startup_policy(&config).max_attempts, 1);

        config.system.background = true;
        let policy = startup_policy(&config);
        assert_eq!(policy.max_attempts, 100);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_resolve_configured_devices() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_block(dir.path());
        config.protection.devices = vec!["sda".to_string()];
        config.protection.kernel_interface = KernelInterface::QueueProtect;

        let devices = resolve_devices(&config).unwrap();
        assert_eq!(devices.names(), vec!["sda"]);
        assert_eq!(
            devices.disks()[0].protect_path(),
            dir.path().join("sda/queue/protect")
        );
    }

    #[test]
    fn test_resolve_falls_back_to_autodetect() {
        let dir = tempfile::tempdir().unwrap();
        fake_disk(dir.path(), "sda");
        let config = config_with_block(dir.path());

        assert_eq!(resolve_devices(&config).unwrap().names(), vec!["sda"]);

        let empty = tempfile::tempdir().unwrap();
        assert!(resolve_devices(&config_with_block(empty.path())).is_err());
    }

    #[test]
    fn test_force_unload_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_block(dir.path());
        config.protection.devices = vec!["sdz".to_string()];
        config.protection.force_unload = true;

        assert_eq!(resolve_devices(&config).unwrap().names(), vec!["sdz"]);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_touching_disks() {
        let dir = tempfile::tempdir().unwrap();
        fake_disk(dir.path(), "sda");
        let mut config = config_with_block(dir.path());
        config.protection.sensitivity = 0.0;

        let result = build_guard(&config, EventBus::new(4), ControlFlags::new()).await;
        assert!(matches!(result, Err(DiskguardError::Config(_))));
    }

    #[tokio::test]
    async fn test_protect_attribute_check() {
        let dir = tempfile::tempdir().unwrap();
        fake_disk(dir.path(), "sda");
        let mut config = config_with_block(dir.path());
        config.protection.devices = vec!["sda".to_string()];
        let devices = resolve_devices(&config).unwrap();
        assert!(wait_for_protect_attributes(&devices, &RetryPolicy::once())
            .await
            .is_ok());

        config.protection.devices = vec!["sdz".to_string()];
        let devices = resolve_devices(&config).unwrap();
        let result = wait_for_protect_attributes(
            &devices,
            &RetryPolicy::fixed(3, Duration::from_millis(1)),
        )
        .await;
        assert!(matches!(
            result,
            Err(DiskguardError::Protection(ProtectionError::Open { .. }))
        ));
    }

    #[test]
    fn test_resolve_interface_logic() {
        let mut config = DiskguardConfig::default();
        config.sensor.interface = InterfaceSetting::Hp3d;
        assert_eq!(
            resolve_interface(&config).unwrap(),
            (AccelerometerInterface::Hp3d, false)
        );

        config.sensor.logic = LogicMode::Hardware;
        assert!(resolve_interface(&config).unwrap().1);

        config.sensor.interface = InterfaceSetting::Freefall;
        config.sensor.logic = LogicMode::Auto;
        assert!(resolve_interface(&config).unwrap().1);

        config.sensor.logic = LogicMode::Software;
        assert!(resolve_interface(&config).is_err());
    }

    #[test]
    fn test_indicator_only_on_supported_interfaces() {
        let dir = tempfile::tempdir().unwrap();
        let led = dir.path().join("brightness");
        fs::write(&led, "0").unwrap();
        let mut config = DiskguardConfig::default();
        config.indicator.led_path = led.to_string_lossy().into_owned();

        assert!(build_indicator(&config, AccelerometerInterface::Hp3d).is_enabled());
        assert!(!build_indicator(&config, AccelerometerInterface::Hdaps).is_enabled());

        config.indicator.leds = false;
        assert!(!build_indicator(&config, AccelerometerInterface::Hp3d).is_enabled());
    }
}
