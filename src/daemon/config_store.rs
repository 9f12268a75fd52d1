//! Shared, atomically replaceable volume mapping.
//!
//! Readers get an immutable `Arc<VolumeMapping>` snapshot; a reload builds a
//! new mapping outside the lock and swaps it in under the write guard, so a
//! reader never observes a half-built mapping.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::core::errors::{FatalError, ItemError, Result};
use crate::core::volume_map::{MappingBuild, VolumeMapping};
use crate::monitor::mounts::MountResolver;

/// What a file refresh did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The config file's mtime matched the last load; nothing was read.
    Unchanged,
    Reloaded {
        volumes: usize,
        directories: usize,
        rejected: Vec<ItemError>,
    },
}

/// Holder of the current mapping plus the config mtime it was built from.
#[derive(Debug, Default)]
pub struct ConfigStore {
    mapping: RwLock<Arc<VolumeMapping>>,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl ConfigStore {
    /// An empty store; nothing is monitored until the first reload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current mapping.
    pub fn current_mapping(&self) -> Arc<VolumeMapping> {
        Arc::clone(&self.mapping.read())
    }

    /// Run `f` while holding the read lock, blocking reloads until it returns.
    pub fn with_mapping<R>(&self, f: impl FnOnce(&VolumeMapping) -> R) -> R {
        let guard = self.mapping.read();
        f(&guard)
    }

    /// Rebuild from raw config text and swap the result in.
    ///
    /// Rejected lines are printed and dropped.
    pub fn reload(&self, raw_config: &str, mount_points: &[PathBuf]) -> Arc<VolumeMapping> {
        let (mapping, rejected) = self.rebuild(raw_config, mount_points);
        for error in &rejected {
            eprintln!("[LWD-CONFIG] warning: {error}");
        }
        mapping
    }

    /// Reload from `path` if its modification time changed since the last load.
    ///
    /// An unchanged mtime returns [`ReloadOutcome::Unchanged`] without reading
    /// the file or the mount table. Failing to stat or read the file, or to
    /// read the mount table, is fatal.
    pub fn refresh_from_file(&self, path: &Path, resolver: &MountResolver) -> Result<ReloadOutcome> {
        let config_read = |source| FatalError::ConfigRead {
            path: path.to_path_buf(),
            source,
        };
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(config_read)?;
        if *self.last_mtime.lock() == Some(modified) {
            return Ok(ReloadOutcome::Unchanged);
        }

        let raw = fs::read_to_string(path).map_err(config_read)?;
        let mount_points = resolver.list_volumes()?;
        let (mapping, rejected) = self.rebuild(&raw, &mount_points);
        *self.last_mtime.lock() = Some(modified);

        Ok(ReloadOutcome::Reloaded {
            volumes: mapping.len(),
            directories: mapping.directory_count(),
            rejected,
        })
    }

    /// Build outside the lock, then swap in under the write guard.
    fn rebuild(&self, raw_config: &str, mount_points: &[PathBuf]) -> (Arc<VolumeMapping>, Vec<ItemError>) {
        let MappingBuild { mapping, rejected } = VolumeMapping::build(raw_config, mount_points);
        let mapping = Arc::new(mapping);
        *self.mapping.write() = Arc::clone(&mapping);
        (mapping, rejected)
    }
}
