//! Open-file index: which files under each log directory some process holds open.
//!
//! The `/proc` walk sits behind [`ProcessTable`] so the index itself is a pure
//! function of `(pid, descriptor targets)` observations and the directory list.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::errors::ItemError;
use crate::core::paths::{is_within, normalize_fd_target};

/// Descriptor targets of one process, as read from its fd directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessObservation {
    pub pid: u32,
    pub targets: Vec<PathBuf>,
}

/// Everything one scan of the process table produced.
#[derive(Debug, Default)]
pub struct OpenFileSnapshot {
    pub observations: Vec<ProcessObservation>,
    pub warnings: Vec<ItemError>,
}

/// Source of per-process descriptor targets.
pub trait ProcessTable: Send + Sync {
    /// Observe every process except the caller's own.
    fn observe(&self) -> OpenFileSnapshot;
}

/// `/proc`-backed process table.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    self_pid: u32,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFs {
    /// The live `/proc`, skipping this process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc", std::process::id())
    }

    /// A process table rooted elsewhere; `self_pid` is skipped.
    pub fn with_root(root: impl Into<PathBuf>, self_pid: u32) -> Self {
        Self {
            root: root.into(),
            self_pid,
        }
    }
}

impl ProcessTable for ProcFs {
    fn observe(&self) -> OpenFileSnapshot {
        let mut snapshot = OpenFileSnapshot::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) => {
                snapshot.warnings.push(ItemError::ProcessScan {
                    path: self.root.clone(),
                    source,
                });
                return snapshot;
            }
        };

        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == self.self_pid {
                continue;
            }

            let fd_dir = entry.path().join("fd");
            let fds = match fs::read_dir(&fd_dir) {
                Ok(fds) => fds,
                Err(source) => {
                    snapshot.warnings.push(ItemError::ProcessScan {
                        path: fd_dir,
                        source,
                    });
                    continue;
                }
            };

            let mut targets = Vec::new();
            for fd in fds {
                let fd_path = match fd {
                    Ok(fd) => fd.path(),
                    Err(source) => {
                        snapshot.warnings.push(ItemError::ProcessScan {
                            path: fd_dir.clone(),
                            source,
                        });
                        continue;
                    }
                };
                match fs::read_link(&fd_path) {
                    Ok(target) => targets.push(target),
                    // Descriptor closed between readdir and readlink.
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(source) => snapshot.warnings.push(ItemError::Descriptor {
                        path: fd_path,
                        source,
                    }),
                }
            }
            snapshot.observations.push(ProcessObservation { pid, targets });
        }

        snapshot
    }
}

/// Log directory → absolute paths currently open beneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenFileIndex {
    open: HashMap<PathBuf, HashSet<PathBuf>>,
}

impl OpenFileIndex {
    /// Index `observations` against `dirs`, matching on path components.
    pub fn from_observations(observations: &[ProcessObservation], dirs: &[PathBuf]) -> Self {
        let roots: Vec<(PathBuf, Option<PathBuf>)> =
            dirs.iter().map(|dir| (dir.clone(), None)).collect();
        Self::index(observations, &roots)
    }

    /// Scan `table` and index the result against `dirs`.
    ///
    /// Descriptor targets are kernel-resolved, so each directory is also
    /// matched through its canonical form when that differs.
    pub fn build(table: &dyn ProcessTable, dirs: &[PathBuf]) -> (Self, Vec<ItemError>) {
        let snapshot = table.observe();
        let roots: Vec<(PathBuf, Option<PathBuf>)> = dirs
            .iter()
            .map(|dir| {
                let alias = fs::canonicalize(dir).ok().filter(|canon| canon != dir);
                (dir.clone(), alias)
            })
            .collect();
        (Self::index(&snapshot.observations, &roots), snapshot.warnings)
    }

    fn index(observations: &[ProcessObservation], roots: &[(PathBuf, Option<PathBuf>)]) -> Self {
        let mut open: HashMap<PathBuf, HashSet<PathBuf>> = HashMap::new();
        for target in observations
            .iter()
            .flat_map(|obs| obs.targets.iter())
            .filter_map(|raw| normalize_fd_target(raw))
        {
            for (dir, alias) in roots {
                let under = is_within(&target, dir)
                    || alias.as_deref().is_some_and(|alias| is_within(&target, alias));
                if under {
                    open.entry(dir.clone()).or_default().insert(target.clone());
                }
            }
        }
        Self { open }
    }

    /// Whether `path`, found under `dir`, is held open by another process.
    pub fn is_open(&self, dir: &Path, path: &Path) -> bool {
        let Some(open) = self.open.get(dir) else {
            return false;
        };
        if open.contains(path) {
            return true;
        }
        fs::canonicalize(path).is_ok_and(|canon| open.contains(&canon))
    }

    /// Open paths recorded under `dir`.
    pub fn open_under(&self, dir: &Path) -> Option<&HashSet<PathBuf>> {
        self.open.get(dir)
    }

    /// Total open paths across all directories.
    pub fn len(&self) -> usize {
        self.open.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.open.values().all(HashSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn obs(pid: u32, targets: &[&str]) -> ProcessObservation {
        ProcessObservation {
            pid,
            targets: targets.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn index_matches_on_component_boundary() {
        let dirs = vec![PathBuf::from("/data/logs")];
        let index = OpenFileIndex::from_observations(
            &[obs(
                10,
                &["/data/logs/app/a.log", "/data/logs2/b.log", "/data/logs"],
            )],
            &dirs,
        );
        assert_eq!(index.len(), 1);
        assert!(index.is_open(Path::new("/data/logs"), Path::new("/data/logs/app/a.log")));
        assert!(!index.is_open(Path::new("/data/logs"), Path::new("/data/logs2/b.log")));
    }

    #[test]
    fn deleted_suffix_and_pseudo_targets() {
        let dirs = vec![PathBuf::from("/data/logs")];
        let index = OpenFileIndex::from_observations(
            &[obs(
                11,
                &["/data/logs/c.log (deleted)", "socket:[4242]", "pipe:[7]"],
            )],
            &dirs,
        );
        assert_eq!(index.len(), 1);
        assert!(index.is_open(Path::new("/data/logs"), Path::new("/data/logs/c.log")));
    }

    #[test]
    fn nested_directories_each_record_the_target() {
        let dirs = vec![PathBuf::from("/data/logs"), PathBuf::from("/data/logs/app")];
        let index =
            OpenFileIndex::from_observations(&[obs(1, &["/data/logs/app/x.log"])], &dirs);
        assert!(index.open_under(Path::new("/data/logs")).is_some());
        assert!(index.open_under(Path::new("/data/logs/app")).is_some());
    }

    #[test]
    fn unknown_directory_is_never_open() {
        let index = OpenFileIndex::default();
        assert!(index.is_empty());
        assert!(!index.is_open(Path::new("/data/logs"), Path::new("/data/logs/a.log")));
    }

    #[test]
    fn procfs_reads_fake_tree_and_skips_self() {
        let proc_root = tempfile::tempdir().unwrap();
        let mk_fd = |pid: &str, fd: &str, target: &str| {
            let dir = proc_root.path().join(pid).join("fd");
            fs::create_dir_all(&dir).unwrap();
            symlink(target, dir.join(fd)).unwrap();
        };
        mk_fd("100", "3", "/data/logs/a.log");
        mk_fd("100", "4", "socket:[99]");
        mk_fd("200", "1", "/data/logs/b.log");
        mk_fd("300", "7", "/data/logs/self.log");
        fs::create_dir_all(proc_root.path().join("self")).unwrap();
        fs::write(proc_root.path().join("uptime"), "1.0 1.0").unwrap();

        let table = ProcFs::with_root(proc_root.path(), 300);
        let snapshot = table.observe();
        assert!(snapshot.warnings.is_empty(), "{:?}", snapshot.warnings);

        let mut pids: Vec<u32> = snapshot.observations.iter().map(|o| o.pid).collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![100, 200]);

        let dirs = vec![PathBuf::from("/data/logs")];
        let (index, warnings) = OpenFileIndex::build(&table, &dirs);
        assert!(warnings.is_empty());
        assert_eq!(index.len(), 2);
        assert!(!index.is_open(Path::new("/data/logs"), Path::new("/data/logs/self.log")));
    }

    #[test]
    fn procfs_records_warning_for_missing_fd_dir() {
        let proc_root = tempfile::tempdir().unwrap();
        fs::create_dir_all(proc_root.path().join("42")).unwrap();
        let snapshot = ProcFs::with_root(proc_root.path(), 1).observe();
        assert!(snapshot.observations.is_empty());
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].code(), "LWD-3201");
    }

    #[test]
    fn procfs_missing_root_is_a_warning_not_a_panic() {
        let snapshot = ProcFs::with_root("/definitely/not/proc", 1).observe();
        assert!(snapshot.observations.is_empty());
        assert_eq!(snapshot.warnings.len(), 1);
    }

    #[test]
    fn build_matches_through_symlinked_directory() {
        let root = tempfile::tempdir().unwrap();
        let real = root.path().join("real");
        fs::create_dir_all(&real).unwrap();
        let link = root.path().join("link");
        symlink(&real, &link).unwrap();
        let file = real.join("held.log");
        fs::write(&file, "x").unwrap();

        struct Fixed(Vec<ProcessObservation>);
        impl ProcessTable for Fixed {
            fn observe(&self) -> OpenFileSnapshot {
                OpenFileSnapshot {
                    observations: self.0.clone(),
                    warnings: Vec::new(),
                }
            }
        }

        let canonical = fs::canonicalize(&file).unwrap();
        let table = Fixed(vec![ProcessObservation {
            pid: 5,
            targets: vec![canonical],
        }]);
        let (index, _) = OpenFileIndex::build(&table, &[link.clone()]);
        assert!(index.is_open(&link, &link.join("held.log")));
    }
}
