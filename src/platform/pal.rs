//! PAL trait and platform implementations (Linux via `/proc` + `statvfs`, mock for tests).

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{FatalError, Result};

/// Block counts for one volume, as reported by `statvfs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeStats {
    pub total_blocks: u64,
    /// Free blocks including those reserved for root.
    pub free_blocks: u64,
    pub block_size: u64,
}

/// OS abstraction used by the mount resolver, usage probe, and daemon.
pub trait Platform: Send + Sync {
    /// Raw text of the live mount table.
    fn mount_table(&self) -> Result<String>;
    /// Block statistics for the filesystem mounted at `volume`.
    fn volume_stats(&self, volume: &Path) -> Result<VolumeStats>;
}

/// Linux platform implementation using `/proc/self/mounts` + `statvfs`.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    mounts_path: PathBuf,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mounts_path: PathBuf::from("/proc/self/mounts"),
        }
    }
}

impl Platform for LinuxPlatform {
    fn mount_table(&self) -> Result<String> {
        std::fs::read_to_string(&self.mounts_path).map_err(|source| FatalError::MountTable {
            path: self.mounts_path.clone(),
            source,
        })
    }

    #[cfg(unix)]
    fn volume_stats(&self, volume: &Path) -> Result<VolumeStats> {
        let stat = nix::sys::statvfs::statvfs(volume)
            .map_err(|error| FatalError::volume_stats(volume, error.to_string()))?;
        #[allow(clippy::useless_conversion)]
        Ok(VolumeStats {
            total_blocks: u64::from(stat.blocks()),
            free_blocks: u64::from(stat.blocks_free()),
            block_size: u64::from(stat.fragment_size()),
        })
    }

    #[cfg(not(unix))]
    fn volume_stats(&self, volume: &Path) -> Result<VolumeStats> {
        Err(FatalError::volume_stats(volume, "statvfs is unavailable"))
    }
}

/// In-memory platform for deterministic tests.
///
/// Free percentages are scripted per volume: each `volume_stats` call pops the
/// next reading, and the last reading repeats once the script runs out.
#[derive(Debug, Default)]
pub struct MockPlatform {
    mount_table: Mutex<Option<String>>,
    free_pct: Mutex<HashMap<PathBuf, VecDeque<u8>>>,
    mount_table_calls: AtomicUsize,
    stats_calls: AtomicUsize,
}

impl MockPlatform {
    /// A platform whose mount table is `mount_table` and which knows no volumes yet.
    #[must_use]
    pub fn new(mount_table: impl Into<String>) -> Self {
        Self {
            mount_table: Mutex::new(Some(mount_table.into())),
            ..Self::default()
        }
    }

    /// Convenience: wrap in an `Arc<dyn Platform>`-compatible `Arc`.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Script the sequence of free percentages `volume` will report.
    pub fn script_free_pct(&self, volume: impl Into<PathBuf>, readings: &[u8]) {
        self.free_pct
            .lock()
            .insert(volume.into(), readings.iter().copied().collect());
    }

    /// Make `volume` report a constant free percentage.
    pub fn set_free_pct(&self, volume: impl Into<PathBuf>, pct: u8) {
        self.script_free_pct(volume, &[pct]);
    }

    /// Make the mount table unreadable from now on.
    pub fn fail_mount_table(&self) {
        *self.mount_table.lock() = None;
    }

    pub fn set_mount_table(&self, raw: impl Into<String>) {
        *self.mount_table.lock() = Some(raw.into());
    }

    pub fn mount_table_calls(&self) -> usize {
        self.mount_table_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    fn mount_table(&self) -> Result<String> {
        self.mount_table_calls.fetch_add(1, Ordering::SeqCst);
        self.mount_table
            .lock()
            .clone()
            .ok_or_else(|| FatalError::MountTable {
                path: PathBuf::from("/proc/self/mounts"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock mount table"),
            })
    }

    fn volume_stats(&self, volume: &Path) -> Result<VolumeStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.free_pct.lock();
        let script = scripts
            .get_mut(volume)
            .ok_or_else(|| FatalError::volume_stats(volume, "mock volume not found"))?;
        let pct = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        }
        .ok_or_else(|| FatalError::volume_stats(volume, "mock script is empty"))?;
        Ok(VolumeStats {
            total_blocks: 100,
            free_blocks: u64::from(pct),
            block_size: 4096,
        })
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(FatalError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_script_pops_then_repeats_last_reading() {
        let platform = MockPlatform::new("");
        platform.script_free_pct("/data", &[5, 12, 25]);

        let readings: Vec<u64> = (0..5)
            .map(|_| platform.volume_stats(Path::new("/data")).unwrap().free_blocks)
            .collect();
        assert_eq!(readings, vec![5, 12, 25, 25, 25]);
        assert_eq!(platform.stats_calls(), 5);
    }

    #[test]
    fn mock_unknown_volume_is_stats_failure() {
        let platform = MockPlatform::new("");
        let err = platform
            .volume_stats(Path::new("/nowhere"))
            .expect_err("unknown volume must fail");
        assert_eq!(err.code(), "LWD-1003");
    }

    #[test]
    fn mock_mount_table_can_fail() {
        let platform = MockPlatform::new("/dev/sda1 / ext4 rw 0 0\n");
        assert!(platform.mount_table().is_ok());
        platform.fail_mount_table();
        let err = platform.mount_table().expect_err("must fail");
        assert_eq!(err.code(), "LWD-1002");
        assert_eq!(platform.mount_table_calls(), 2);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn linux_platform_reads_root_stats() {
        let platform = LinuxPlatform::new();
        let stats = platform
            .volume_stats(Path::new("/"))
            .expect("statvfs on / should work");
        assert!(stats.total_blocks > 0);
        assert!(stats.free_blocks <= stats.total_blocks);
        assert!(platform.mount_table().is_ok());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn linux_platform_missing_volume_is_fatal() {
        let err = LinuxPlatform::new()
            .volume_stats(Path::new("/definitely/not/a/mount/point"))
            .expect_err("statvfs on a missing path must fail");
        assert!(matches!(err, FatalError::VolumeStats { .. }));
    }
}
