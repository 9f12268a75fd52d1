//! Daemon settings: compiled-in thresholds, env var overrides, CLI flags.

#![allow(missing_docs)]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FatalError, Result};

/// Default location of the activity log.
pub const DEFAULT_ACTIVITY_LOG: &str = "/var/log/logwarden/activity.jsonl";

/// Eviction thresholds and poll intervals.
///
/// Process-wide and fixed after startup. Percentages are of free blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thresholds {
    /// Start evicting when free space drops below this percentage.
    pub low_water_pct: u8,
    /// Stop evicting once free space rises above this percentage.
    pub high_water_pct: u8,
    /// Files modified or accessed more recently than this are kept.
    pub min_file_age_secs: u64,
    pub reload_interval_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_water_pct: 10,
            high_water_pct: 20,
            min_file_age_secs: 12 * 60 * 60,
            reload_interval_secs: 10,
            check_interval_secs: 30,
        }
    }
}

impl Thresholds {
    #[must_use]
    pub const fn min_file_age(&self) -> Duration {
        Duration::from_secs(self.min_file_age_secs)
    }

    #[must_use]
    pub const fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Apply `LOGWARDEN_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(env_var)
    }

    fn apply_env_overrides_from<F>(&mut self, mut raw_lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut lookup = |name: &str| raw_lookup(name).filter(|raw| !raw.trim().is_empty());
        if let Some(raw) = lookup("LOGWARDEN_LOW_WATER_PCT") {
            self.low_water_pct = parse_env_pct("LOGWARDEN_LOW_WATER_PCT", &raw)?;
        }
        if let Some(raw) = lookup("LOGWARDEN_HIGH_WATER_PCT") {
            self.high_water_pct = parse_env_pct("LOGWARDEN_HIGH_WATER_PCT", &raw)?;
        }
        if let Some(raw) = lookup("LOGWARDEN_MIN_FILE_AGE_SECS") {
            self.min_file_age_secs = parse_env_u64("LOGWARDEN_MIN_FILE_AGE_SECS", &raw)?;
        }
        if let Some(raw) = lookup("LOGWARDEN_RELOAD_INTERVAL_SECS") {
            self.reload_interval_secs = parse_env_u64("LOGWARDEN_RELOAD_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("LOGWARDEN_CHECK_INTERVAL_SECS") {
            self.check_interval_secs = parse_env_u64("LOGWARDEN_CHECK_INTERVAL_SECS", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("low_water_pct", self.low_water_pct),
            ("high_water_pct", self.high_water_pct),
        ] {
            if val > 100 {
                return Err(FatalError::InvalidThresholds {
                    details: format!("{name} must be in [0, 100], got {val}"),
                });
            }
        }

        if self.low_water_pct > self.high_water_pct {
            return Err(FatalError::InvalidThresholds {
                details: format!(
                    "low_water_pct ({}) must be <= high_water_pct ({})",
                    self.low_water_pct, self.high_water_pct
                ),
            });
        }

        if self.reload_interval_secs == 0 || self.check_interval_secs == 0 {
            return Err(FatalError::InvalidThresholds {
                details: "reload and check intervals must be > 0".to_string(),
            });
        }

        Ok(())
    }

    /// Deterministic FNV-1a hash of the effective thresholds, for the activity log.
    pub fn stable_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        format!("{hash:016x}")
    }
}

/// Everything the daemon needs to start: CLI flags plus effective thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// Plain-text file listing one log directory per line.
    pub config_file: PathBuf,
    /// Log intended deletions without removing anything.
    pub dry_run: bool,
    pub thresholds: Thresholds,
    /// JSONL activity log; `None` disables it.
    pub activity_log: Option<PathBuf>,
}

impl DaemonSettings {
    /// Build settings from CLI flags, then apply env overrides and validate.
    pub fn load(config_file: PathBuf, dry_run: bool) -> Result<Self> {
        Self::load_from(config_file, dry_run, env_var)
    }

    fn load_from<F>(config_file: PathBuf, dry_run: bool, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut thresholds = Thresholds::default();
        thresholds.apply_env_overrides_from(&mut lookup)?;
        thresholds.validate()?;

        // Set but blank disables the activity log.
        let activity_log = match lookup("LOGWARDEN_ACTIVITY_LOG") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(PathBuf::from(raw)),
            None => Some(PathBuf::from(DEFAULT_ACTIVITY_LOG)),
        };

        Ok(Self {
            config_file,
            dry_run,
            thresholds,
            activity_log,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| FatalError::EnvOverride {
            name: name.to_string(),
            details: format!("{raw:?}: {error}"),
        })
}

fn parse_env_pct(name: &str, raw: &str) -> Result<u8> {
    raw.trim()
        .parse::<u8>()
        .map_err(|error| FatalError::EnvOverride {
            name: name.to_string(),
            details: format!("{raw:?}: {error}"),
        })
}
