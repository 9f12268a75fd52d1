//! Candidate collection: old, closed regular files under the log directories.

#![allow(missing_docs)]

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::errors::ItemError;
use crate::core::paths::is_within;
use crate::scanner::open_files::OpenFileIndex;

/// A file eligible for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Apparent size at walk time.
    pub size_bytes: u64,
}

/// Age rule a file must satisfy on both mtime and atime.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityPolicy {
    pub min_age: Duration,
    pub now: SystemTime,
}

impl EligibilityPolicy {
    pub fn new(min_age: Duration, now: SystemTime) -> Self {
        Self { min_age, now }
    }

    /// Latest timestamp that still counts as old enough.
    pub fn cutoff(&self) -> SystemTime {
        self.now.checked_sub(self.min_age).unwrap_or(UNIX_EPOCH)
    }

    pub fn is_old_enough(&self, timestamp: SystemTime) -> bool {
        timestamp <= self.cutoff()
    }
}

/// Candidates from every directory of one volume, plus per-item warnings.
#[derive(Debug, Default)]
pub struct Collection {
    pub candidates: Vec<CandidateFile>,
    pub warnings: Vec<ItemError>,
    /// Regular files examined, eligible or not.
    pub files_seen: usize,
}

/// Walk `dirs` recursively and collect eligible files.
///
/// Directories are descended but never returned. A directory nested inside
/// another entry of `dirs` is covered by the outer walk and not walked again.
/// The walk stays on the filesystem of each root. Symlinks and other
/// non-regular entries are ignored. A failure on one entry skips that entry;
/// a failure opening a directory skips that directory's subtree.
pub fn collect_for_volume(
    dirs: &[PathBuf],
    open_files: &OpenFileIndex,
    policy: &EligibilityPolicy,
) -> Collection {
    let mut out = Collection::default();
    for root in walk_roots(dirs) {
        let root_dev = match fs::metadata(root) {
            Ok(meta) => meta.dev(),
            Err(source) => {
                out.warnings.push(ItemError::Walk {
                    path: root.to_path_buf(),
                    source,
                });
                continue;
            }
        };
        collect_dir(root, root_dev, open_files, policy, &mut out);
    }
    out
}

/// `dirs` minus duplicates and entries inside another entry, in input order.
fn walk_roots(dirs: &[PathBuf]) -> Vec<&Path> {
    let mut roots: Vec<&Path> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let nested = dirs.iter().any(|outer| is_within(dir, outer));
        if !nested && !roots.contains(&dir.as_path()) {
            roots.push(dir);
        }
    }
    roots
}

fn collect_dir(
    root: &Path,
    root_dev: u64,
    open_files: &OpenFileIndex,
    policy: &EligibilityPolicy,
    out: &mut Collection,
) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) => {
                out.warnings.push(ItemError::Walk { path: dir, source });
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    out.warnings.push(ItemError::Walk {
                        path: dir.clone(),
                        source,
                    });
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(source) => {
                    out.warnings.push(ItemError::Walk { path, source });
                    continue;
                }
            };

            if file_type.is_dir() {
                match entry.metadata() {
                    Ok(meta) if meta.dev() == root_dev => stack.push(path),
                    // Another filesystem mounted inside the log directory.
                    Ok(_) => {}
                    Err(source) => out.warnings.push(ItemError::Walk { path, source }),
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            out.files_seen += 1;
            if let Some(candidate) = evaluate(root, path, open_files, policy, &mut out.warnings) {
                out.candidates.push(candidate);
            }
        }
    }
}

fn evaluate(
    root: &Path,
    path: PathBuf,
    open_files: &OpenFileIndex,
    policy: &EligibilityPolicy,
    warnings: &mut Vec<ItemError>,
) -> Option<CandidateFile> {
    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(source) => {
            warnings.push(ItemError::Walk { path, source });
            return None;
        }
    };
    let modified = match meta.modified() {
        Ok(modified) => modified,
        Err(source) => {
            warnings.push(ItemError::Walk { path, source });
            return None;
        }
    };
    if !policy.is_old_enough(modified) {
        return None;
    }

    match meta.accessed() {
        Ok(accessed) if !policy.is_old_enough(accessed) => return None,
        Ok(_) => {}
        // Unknown atime does not block eviction.
        Err(source) => warnings.push(ItemError::AccessTime {
            path: path.clone(),
            source,
        }),
    }

    if open_files.is_open(root, &path) {
        return None;
    }

    Some(CandidateFile {
        path,
        modified,
        size_bytes: meta.len(),
    })
}

/// Sort candidates oldest first. Ties break on path for a stable order.
pub fn sort_oldest_first(candidates: &mut [CandidateFile]) {
    candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::open_files::ProcessObservation;
    use filetime::{FileTime, set_file_times};

    const HOUR: Duration = Duration::from_secs(3600);

    fn write_aged(path: &Path, now: SystemTime, mtime_age: Duration, atime_age: Duration) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"log line\n").unwrap();
        set_file_times(
            path,
            FileTime::from_system_time(now - atime_age),
            FileTime::from_system_time(now - mtime_age),
        )
        .unwrap();
    }

    fn policy(now: SystemTime) -> EligibilityPolicy {
        EligibilityPolicy::new(12 * HOUR, now)
    }

    #[test]
    fn cutoff_saturates_at_epoch() {
        let policy = EligibilityPolicy::new(Duration::from_secs(u64::MAX), SystemTime::now());
        assert_eq!(policy.cutoff(), UNIX_EPOCH);
        assert!(policy.is_old_enough(UNIX_EPOCH));
    }

    #[test]
    fn young_mtime_or_atime_excludes_file() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(&root.path().join("old.log"), now, 48 * HOUR, 48 * HOUR);
        write_aged(&root.path().join("young-mtime.log"), now, HOUR, 48 * HOUR);
        write_aged(&root.path().join("young-atime.log"), now, 48 * HOUR, HOUR);

        let dirs = vec![root.path().to_path_buf()];
        let out = collect_for_volume(&dirs, &OpenFileIndex::default(), &policy(now));

        assert_eq!(out.files_seen, 3);
        let names: Vec<_> = out
            .candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("old.log")]);
    }

    #[test]
    fn walk_recurses_but_skips_symlinks() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let nested = root.path().join("app").join("2024");
        write_aged(&nested.join("deep.log"), now, 72 * HOUR, 72 * HOUR);

        let outside = tempfile::tempdir().unwrap();
        write_aged(&outside.path().join("target.log"), now, 72 * HOUR, 72 * HOUR);
        std::os::unix::fs::symlink(
            outside.path().join("target.log"),
            root.path().join("link.log"),
        )
        .unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("linkdir")).unwrap();

        let dirs = vec![root.path().to_path_buf()];
        let out = collect_for_volume(&dirs, &OpenFileIndex::default(), &policy(now));

        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].path, nested.join("deep.log"));
        assert!(outside.path().join("target.log").exists());
    }

    #[test]
    fn nested_log_directories_yield_each_file_once() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let app = root.path().join("app");
        write_aged(&app.join("x.log"), now, 48 * HOUR, 48 * HOUR);
        write_aged(&root.path().join("top.log"), now, 48 * HOUR, 48 * HOUR);

        let dirs = vec![app.clone(), root.path().to_path_buf(), app.clone()];
        let out = collect_for_volume(&dirs, &OpenFileIndex::default(), &policy(now));

        assert_eq!(out.files_seen, 2);
        let mut paths: Vec<_> = out.candidates.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec![app.join("x.log"), root.path().join("top.log")]);
    }

    #[test]
    fn nested_directory_open_files_still_count() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let app = root.path().join("app");
        let held = app.join("held.log");
        write_aged(&held, now, 48 * HOUR, 48 * HOUR);

        let dirs = vec![root.path().to_path_buf(), app];
        let index = OpenFileIndex::from_observations(
            &[ProcessObservation {
                pid: 9,
                targets: vec![held],
            }],
            &dirs,
        );
        let out = collect_for_volume(&dirs, &index, &policy(now));
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn subdirectories_on_another_device_are_not_descended() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(&root.path().join("top.log"), now, 48 * HOUR, 48 * HOUR);
        write_aged(&root.path().join("mnt").join("other.log"), now, 48 * HOUR, 48 * HOUR);

        let real_dev = fs::metadata(root.path()).unwrap().dev();
        let mut out = Collection::default();
        collect_dir(
            root.path(),
            real_dev.wrapping_add(1),
            &OpenFileIndex::default(),
            &policy(now),
            &mut out,
        );

        assert_eq!(out.files_seen, 1);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].path, root.path().join("top.log"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn open_files_are_excluded() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let held = root.path().join("held.log");
        let free = root.path().join("free.log");
        write_aged(&held, now, 48 * HOUR, 48 * HOUR);
        write_aged(&free, now, 48 * HOUR, 48 * HOUR);

        let dirs = vec![root.path().to_path_buf()];
        let index = OpenFileIndex::from_observations(
            &[ProcessObservation {
                pid: 77,
                targets: vec![held],
            }],
            &dirs,
        );
        let out = collect_for_volume(&dirs, &index, &policy(now));
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].path, free);
    }

    #[test]
    fn missing_directory_is_a_warning() {
        let root = tempfile::tempdir().unwrap();
        let dirs = vec![root.path().join("gone")];
        let out = collect_for_volume(&dirs, &OpenFileIndex::default(), &policy(SystemTime::now()));
        assert!(out.candidates.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code(), "LWD-3101");
    }

    #[test]
    fn sort_orders_by_mtime_then_path() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_000);
        let t1 = UNIX_EPOCH + Duration::from_secs(2_000);
        let mut files = vec![
            CandidateFile {
                path: "/l/c".into(),
                modified: t1,
                size_bytes: 1,
            },
            CandidateFile {
                path: "/l/b".into(),
                modified: t0,
                size_bytes: 1,
            },
            CandidateFile {
                path: "/l/a".into(),
                modified: t0,
                size_bytes: 1,
            },
        ];
        sort_oldest_first(&mut files);
        let order: Vec<&Path> = files.iter().map(|f| f.path.as_path()).collect();
        assert_eq!(order, vec![Path::new("/l/a"), Path::new("/l/b"), Path::new("/l/c")]);
    }
}
