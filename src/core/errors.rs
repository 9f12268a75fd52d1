//! LWD-prefixed error types, split into a fatal tier and a recoverable tier.
//!
//! [`FatalError`] means the daemon can no longer trust its view of the world
//! (config file, mount table, or volume statistics are unreadable) and must
//! terminate. [`ItemError`] covers a single config line, file, or process; it
//! is logged, collected into the relevant report, and the cycle continues.

#![allow(missing_docs)]

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias; the error side is always the fatal tier.
pub type Result<T> = std::result::Result<T, FatalError>;

/// Infrastructure failures that terminate the process.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("[LWD-1001] cannot read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-1002] cannot read mount table {path}: {source}")]
    MountTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-1003] filesystem stats failure for {path}: {details}")]
    VolumeStats { path: PathBuf, details: String },

    #[error("[LWD-1004] invalid thresholds: {details}")]
    InvalidThresholds { details: String },

    #[error("[LWD-1005] cannot parse environment override {name}: {details}")]
    EnvOverride { name: String, details: String },

    #[error("[LWD-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[LWD-1900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FatalError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigRead { .. } => "LWD-1001",
            Self::MountTable { .. } => "LWD-1002",
            Self::VolumeStats { .. } => "LWD-1003",
            Self::InvalidThresholds { .. } => "LWD-1004",
            Self::EnvOverride { .. } => "LWD-1005",
            Self::UnsupportedPlatform { .. } => "LWD-1101",
            Self::Runtime { .. } => "LWD-1900",
        }
    }

    #[must_use]
    pub fn volume_stats(path: impl AsRef<Path>, details: impl Into<String>) -> Self {
        Self::VolumeStats {
            path: path.as_ref().to_path_buf(),
            details: details.into(),
        }
    }
}

/// Per-line, per-file, and per-process failures. Never fatal.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("[LWD-3001] config line {line:?} rejected: {reason}")]
    RejectedLine { line: String, reason: String },

    #[error("[LWD-3101] walk failure at {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-3102] access time unavailable for {path}: {source}")]
    AccessTime {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-3103] delete failure at {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-3201] process scan failure at {path}: {source}")]
    ProcessScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("[LWD-3202] cannot resolve descriptor {path}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ItemError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RejectedLine { .. } => "LWD-3001",
            Self::Walk { .. } => "LWD-3101",
            Self::AccessTime { .. } => "LWD-3102",
            Self::Delete { .. } => "LWD-3103",
            Self::ProcessScan { .. } => "LWD-3201",
            Self::Descriptor { .. } => "LWD-3202",
        }
    }

    /// Filesystem path the failure concerns, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::RejectedLine { .. } => None,
            Self::Walk { path, .. }
            | Self::AccessTime { path, .. }
            | Self::Delete { path, .. }
            | Self::ProcessScan { path, .. }
            | Self::Descriptor { path, .. } => Some(path),
        }
    }

    #[must_use]
    pub fn rejected(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RejectedLine {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "test")
    }

    #[test]
    fn fatal_codes_are_unique_and_in_fatal_range() {
        let errors = vec![
            FatalError::ConfigRead {
                path: PathBuf::new(),
                source: io_err(),
            },
            FatalError::MountTable {
                path: PathBuf::new(),
                source: io_err(),
            },
            FatalError::volume_stats("/", ""),
            FatalError::InvalidThresholds {
                details: String::new(),
            },
            FatalError::EnvOverride {
                name: String::new(),
                details: String::new(),
            },
            FatalError::UnsupportedPlatform {
                details: String::new(),
            },
            FatalError::Runtime {
                details: String::new(),
            },
        ];

        let codes: Vec<&str> = errors.iter().map(FatalError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "fatal codes must be unique: {codes:?}");
        for code in codes {
            assert!(code.starts_with("LWD-1"), "fatal code {code} outside LWD-1xxx");
        }
    }

    #[test]
    fn item_codes_are_unique_and_in_recoverable_range() {
        let errors = vec![
            ItemError::rejected("", ""),
            ItemError::Walk {
                path: PathBuf::new(),
                source: io_err(),
            },
            ItemError::AccessTime {
                path: PathBuf::new(),
                source: io_err(),
            },
            ItemError::Delete {
                path: PathBuf::new(),
                source: io_err(),
            },
            ItemError::ProcessScan {
                path: PathBuf::new(),
                source: io_err(),
            },
            ItemError::Descriptor {
                path: PathBuf::new(),
                source: io_err(),
            },
        ];

        let codes: Vec<&str> = errors.iter().map(ItemError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(codes.len(), unique.len(), "item codes must be unique: {codes:?}");
        for code in codes {
            assert!(code.starts_with("LWD-3"), "item code {code} outside LWD-3xxx");
        }
    }

    #[test]
    fn display_includes_code_and_path() {
        let err = FatalError::volume_stats("/data", "statvfs failed");
        let msg = err.to_string();
        assert!(msg.contains("LWD-1003"), "missing code: {msg}");
        assert!(msg.contains("/data"), "missing path: {msg}");

        let err = ItemError::Delete {
            path: PathBuf::from("/data/logs/a.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.path(), Some(Path::new("/data/logs/a.log")));
        assert!(err.to_string().contains("LWD-3103"));
    }

    #[test]
    fn rejected_line_has_no_path() {
        let err = ItemError::rejected("logs/app", "path must be absolute");
        assert!(err.path().is_none());
        assert!(err.to_string().contains("logs/app"));
    }
}
