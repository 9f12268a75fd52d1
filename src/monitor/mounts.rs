//! Mount point discovery from the kernel mount table.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::errors::Result;
use crate::platform::pal::Platform;

/// Lists the device-backed mount points known to the platform.
#[derive(Clone)]
pub struct MountResolver {
    platform: Arc<dyn Platform>,
}

impl MountResolver {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Current mount points, longest path first.
    ///
    /// Only entries whose source field names a `/dev` device are kept, so
    /// pseudo filesystems (`proc`, `sysfs`, `tmpfs`, ...) never become volumes.
    pub fn list_volumes(&self) -> Result<Vec<PathBuf>> {
        let raw = self.platform.mount_table()?;
        Ok(parse_mount_table(&raw))
    }
}

impl std::fmt::Debug for MountResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountResolver").finish_non_exhaustive()
    }
}

/// Parse `/proc/self/mounts`-style text into device-backed mount points.
///
/// Malformed lines are skipped with a warning. Duplicate mount points
/// collapse to one entry. The result is sorted by path length, descending.
pub fn parse_mount_table(raw: &str) -> Vec<PathBuf> {
    let mut mounts: Vec<PathBuf> = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            eprintln!("[LWD-MOUNTS] warning: skipping malformed mount table line: {line}");
            continue;
        }
        if !fields[0].contains("/dev") {
            continue;
        }
        let path = unescape_mount_path(fields[1]);
        if !mounts.contains(&path) {
            mounts.push(path);
        }
    }
    mounts.sort_by(|left, right| right.as_os_str().len().cmp(&left.as_os_str().len()));
    mounts
}

/// Decode the kernel's `\NNN` octal escapes, keeping raw bytes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let raw_bytes = raw.as_bytes();
    let mut bytes = Vec::with_capacity(raw_bytes.len());
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let digits = &raw_bytes[i + 1..=i + 3];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    bytes.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
