//! Free-space probe: integer free percentage of a volume.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{FatalError, Result};
use crate::platform::pal::{Platform, VolumeStats};

/// Reports how full a volume is, as `free_blocks * 100 / total_blocks`.
#[derive(Clone)]
pub struct DiskUsageProbe {
    platform: Arc<dyn Platform>,
}

impl DiskUsageProbe {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Free percentage of `volume`, truncated to an integer.
    ///
    /// A statistics failure, or a volume reporting zero total blocks, is fatal.
    pub fn free_percent(&self, volume: &Path) -> Result<u8> {
        let stats = self.platform.volume_stats(volume)?;
        free_percent_of(volume, &stats)
    }
}

impl std::fmt::Debug for DiskUsageProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskUsageProbe").finish_non_exhaustive()
    }
}

/// Integer free percentage from raw block counts.
pub fn free_percent_of(volume: &Path, stats: &VolumeStats) -> Result<u8> {
    if stats.total_blocks == 0 {
        return Err(FatalError::volume_stats(
            volume,
            "volume reports zero total blocks",
        ));
    }
    let free = u128::from(stats.free_blocks.min(stats.total_blocks));
    let pct = free * 100 / u128::from(stats.total_blocks);
    u8::try_from(pct).map_err(|_| {
        FatalError::volume_stats(volume, format!("free percentage {pct} out of range"))
    })
}
