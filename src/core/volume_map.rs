//! Volume mapping: which log directories count against which mount point.
//!
//! A mapping is built wholesale from the raw config text and the list of
//! known mount points, then treated as immutable. Each accepted directory is
//! assigned to the mount point that is its longest matching path prefix, so
//! `/data/app/logs` lands on `/data` rather than `/` when both are mounted.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::ItemError;
use crate::core::paths::normalize_config_line;

/// Mount point → ordered, de-duplicated log directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeMapping {
    volumes: BTreeMap<PathBuf, Vec<PathBuf>>,
}

/// Result of building a mapping: the mapping plus every rejected line.
#[derive(Debug, Default)]
pub struct MappingBuild {
    pub mapping: VolumeMapping,
    pub rejected: Vec<ItemError>,
}

impl VolumeMapping {
    /// Build a mapping from config text and known mount points.
    ///
    /// Blank lines and `#` comments are ignored. A line is rejected when it is
    /// not absolute, is not an existing directory, or sits under no known
    /// mount point; rejections never abort the build.
    pub fn build(raw_config: &str, mount_points: &[PathBuf]) -> MappingBuild {
        let mut out = MappingBuild::default();

        for line in raw_config.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let dir = normalize_config_line(trimmed);
            if !dir.is_absolute() {
                out.rejected
                    .push(ItemError::rejected(trimmed, "path must be absolute"));
                continue;
            }

            match fs::metadata(&dir) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    out.rejected
                        .push(ItemError::rejected(trimmed, "path is not a directory"));
                    continue;
                }
                Err(err) => {
                    out.rejected.push(ItemError::rejected(trimmed, err.to_string()));
                    continue;
                }
            }

            let Some(mount) = longest_prefix_mount(&dir, mount_points) else {
                out.rejected
                    .push(ItemError::rejected(trimmed, "no mount point"));
                continue;
            };

            let dirs = out.mapping.volumes.entry(mount.to_path_buf()).or_default();
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }

        out
    }

    /// Number of monitored volumes.
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Total directories across all volumes.
    pub fn directory_count(&self) -> usize {
        self.volumes.values().map(Vec::len).sum()
    }

    /// Iterate `(mount point, directories)` in mount-point order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[PathBuf])> {
        self.volumes
            .iter()
            .map(|(mount, dirs)| (mount.as_path(), dirs.as_slice()))
    }

    pub fn directories(&self, volume: &Path) -> Option<&[PathBuf]> {
        self.volumes.get(volume).map(Vec::as_slice)
    }

    /// Every configured directory, across all volumes.
    pub fn all_directories(&self) -> Vec<PathBuf> {
        self.volumes.values().flatten().cloned().collect()
    }
}

/// Longest mount point that is a component-wise prefix of `dir`.
pub fn longest_prefix_mount<'a>(dir: &Path, mount_points: &'a [PathBuf]) -> Option<&'a Path> {
    mount_points
        .iter()
        .filter(|mount| dir.starts_with(mount))
        .max_by_key(|mount| mount.as_os_str().len())
        .map(PathBuf::as_path)
}
