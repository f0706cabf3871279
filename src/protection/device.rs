use crate::config::KernelInterface;
use crate::error::ProtectionError;
use crate::sysfs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Written to `unload_heads` to enable unloading on pre-ATA7 drives
const FORCE_UNLOAD_HEADS: &str = "-1";
/// Written to `queue/protect_method` for the same purpose
const FORCE_PROTECT_METHOD: &str = "unload";

/// A block device under protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    name: String,
    protect_path: PathBuf,
}

impl Disk {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, protect_path: P) -> Self {
        Self {
            name: name.into(),
            protect_path: protect_path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute accepting a park duration, 0 to unpark
    pub fn protect_path(&self) -> &Path {
        &self.protect_path
    }
}

impl KernelInterface {
    /// Multiplier turning seconds into the attribute's unit
    pub fn duration_factor(self) -> u64 {
        match self {
            KernelInterface::UnloadHeads => 1000,
            KernelInterface::QueueProtect => 1,
        }
    }

    pub fn protect_path(self, sysfs_block: &Path, name: &str) -> PathBuf {
        match self {
            KernelInterface::UnloadHeads => sysfs_block.join(name).join("device/unload_heads"),
            KernelInterface::QueueProtect => sysfs_block.join(name).join("queue/protect"),
        }
    }
}

/// Ordered set of disks sharing one kernel interface
#[derive(Debug, Clone)]
pub struct DeviceSet {
    sysfs_block: PathBuf,
    interface: KernelInterface,
    disks: Vec<Disk>,
}

impl DeviceSet {
    pub fn new<P: Into<PathBuf>>(sysfs_block: P, interface: KernelInterface) -> Self {
        Self {
            sysfs_block: sysfs_block.into(),
            interface,
            disks: Vec::new(),
        }
    }

    /// Build a set from explicitly named block devices
    pub fn from_names<P: Into<PathBuf>>(
        sysfs_block: P,
        interface: KernelInterface,
        names: &[String],
    ) -> Self {
        let mut set = Self::new(sysfs_block, interface);
        for name in names {
            set.add(name);
        }
        set
    }

    pub fn add(&mut self, name: &str) {
        let path = self.interface.protect_path(&self.sysfs_block, name);
        self.disks.push(Disk::new(name, path));
    }

    /// Add every non-removable drive that exposes a protect attribute.
    ///
    /// Non-rotational drives are skipped unless `force_rotational` is set.
    /// Returns how many devices were added.
    pub fn autodetect(&mut self, force_rotational: bool) -> usize {
        let entries = match fs::read_dir(&self.sysfs_block) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Could not list {}: {}",
                    self.sysfs_block.display(),
                    e
                );
                return 0;
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        let mut added = 0;
        for name in names {
            let device_dir = self.sysfs_block.join(&name);
            let protect = self.interface.protect_path(&self.sysfs_block, &name);

            let protectable = matches!(sysfs::read_int(&protect), Ok(value) if value >= 0);
            let fixed = matches!(sysfs::read_int(&device_dir.join("removable")), Ok(0));
            if !protectable || !fixed {
                continue;
            }

            let rotational = matches!(
                sysfs::read_int(&device_dir.join("queue/rotational")),
                Ok(1)
            );
            if rotational || force_rotational {
                info!("Adding autodetected device: {}", name);
                self.add(&name);
                added += 1;
            } else {
                info!(
                    "Not adding autodetected device \"{}\", it seems not to be a rotational drive",
                    name
                );
            }
        }
        added
    }

    /// Enable head unloading on drives that do not advertise it.
    ///
    /// Failures are logged and returned; the remaining disks are still tried.
    pub fn force_unload(&self) -> Vec<ProtectionError> {
        let mut failures = Vec::new();
        for disk in &self.disks {
            let (path, value) = match self.interface {
                KernelInterface::UnloadHeads => (disk.protect_path.clone(), FORCE_UNLOAD_HEADS),
                KernelInterface::QueueProtect => (
                    self.sysfs_block.join(&disk.name).join("queue/protect_method"),
                    FORCE_PROTECT_METHOD,
                ),
            };

            match sysfs::write_value(&path, value) {
                Ok(()) => info!("Forcibly enabled UNLOAD for {}", disk.name),
                Err(e) => {
                    warn!(
                        "Could not open {} for forcibly enabling UNLOAD feature: {}",
                        path.display(),
                        e
                    );
                    failures.push(ProtectionError::Write {
                        path,
                        details: e.to_string(),
                    });
                }
            }
        }
        failures
    }

    pub fn interface(&self) -> KernelInterface {
        self.interface
    }

    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Disk> {
        self.disks.iter()
    }

    pub fn len(&self) -> usize {
        self.disks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.disks.iter().map(Disk::name).collect()
    }
}

impl<'a> IntoIterator for &'a DeviceSet {
    type Item = &'a Disk;
    type IntoIter = std::slice::Iter<'a, Disk>;

    fn into_iter(self) -> Self::IntoIter {
        self.disks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_disk(root: &Path, name: &str, removable: &str, rotational: &str, protect: &str) {
        let device = root.join(name);
        fs::create_dir_all(device.join("device")).unwrap();
        fs::create_dir_all(device.join("queue")).unwrap();
        fs::write(device.join("removable"), removable).unwrap();
        fs::write(device.join("queue/rotational"), rotational).unwrap();
        fs::write(device.join("device/unload_heads"), protect).unwrap();
    }

    #[test]
    fn test_protect_paths_per_interface() {
        let set = DeviceSet::from_names(
            "/sys/block",
            KernelInterface::UnloadHeads,
            &["sda".to_string()],
        );
        assert_eq!(
            set.disks()[0].protect_path(),
            Path::new("/sys/block/sda/device/unload_heads")
        );

        let set = DeviceSet::from_names(
            "/sys/block",
            KernelInterface::QueueProtect,
            &["sdb".to_string()],
        );
        assert_eq!(
            set.disks()[0].protect_path(),
            Path::new("/sys/block/sdb/queue/protect")
        );
        assert_eq!(KernelInterface::UnloadHeads.duration_factor(), 1000);
        assert_eq!(KernelInterface::QueueProtect.duration_factor(), 1);
    }

    #[test]
    fn test_autodetect_filters_devices() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fake_disk(root, "sda", "0\n", "1\n", "0\n");
        fake_disk(root, "sdb", "1\n", "1\n", "0\n");
        fake_disk(root, "nvme0n1", "0\n", "0\n", "0\n");
        fs::create_dir_all(root.join("loop0")).unwrap();

        let mut set = DeviceSet::new(root, KernelInterface::UnloadHeads);
        assert_eq!(set.autodetect(false), 1);
        assert_eq!(set.names(), vec!["sda"]);

        let mut forced = DeviceSet::new(root, KernelInterface::UnloadHeads);
        assert_eq!(forced.autodetect(true), 2);
        assert_eq!(forced.names(), vec!["nvme0n1", "sda"]);
    }

    #[test]
    fn test_autodetect_missing_root() {
        let mut set = DeviceSet::new("/nonexistent/block", KernelInterface::UnloadHeads);
        assert_eq!(set.autodetect(false), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_force_unload() {
        let dir = tempfile::tempdir().unwrap();
        fake_disk(dir.path(), "sda", "0", "1", "0");

        let set = DeviceSet::from_names(
            dir.path(),
            KernelInterface::UnloadHeads,
            &["sda".to_string(), "sdz".to_string()],
        );
        let failures = set.force_unload();

        assert_eq!(failures.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("sda/device/unload_heads")).unwrap(),
            "-1"
        );
    }
}
