//! Path helpers shared by the config mapping and the open-file index.

use std::path::{Path, PathBuf};

/// Suffix the kernel appends to `/proc/<pid>/fd` targets whose file was unlinked.
const DELETED_SUFFIX: &str = " (deleted)";

/// Normalize one config line into a directory path.
///
/// Trims surrounding whitespace (including a CR left by CRLF files) and
/// trailing slashes, keeping `/` itself intact.
pub fn normalize_config_line(line: &str) -> PathBuf {
    let trimmed = line.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        PathBuf::from("/")
    } else {
        PathBuf::from(stripped)
    }
}

/// Turn a raw descriptor link target into a comparable absolute path.
///
/// Returns `None` for pseudo targets such as `socket:[1234]` or `pipe:[99]`.
pub fn normalize_fd_target(target: &Path) -> Option<PathBuf> {
    let raw = target.to_string_lossy();
    let trimmed = raw.strip_suffix(DELETED_SUFFIX).unwrap_or(&raw);
    if !trimmed.starts_with('/') {
        return None;
    }
    if trimmed.len() == raw.len() {
        // Keep non-UTF-8 bytes when nothing was stripped.
        return Some(target.to_path_buf());
    }
    Some(PathBuf::from(trimmed))
}

/// Whether `path` lies inside `dir`, compared component-wise.
///
/// `/data/logs2/a.log` is not inside `/data/logs`.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path != dir && path.starts_with(dir)
}
