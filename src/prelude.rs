//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use logwarden::prelude::*;
//! ```

// Core
pub use crate::core::config::{DaemonSettings, Thresholds};
pub use crate::core::errors::{FatalError, ItemError, Result};
pub use crate::core::volume_map::VolumeMapping;

// Platform
pub use crate::platform::pal::{Platform, VolumeStats, detect_platform};

// Monitor
pub use crate::monitor::mounts::MountResolver;
pub use crate::monitor::usage::DiskUsageProbe;

// Scanner
pub use crate::scanner::eviction::{EvictionConfig, EvictionEngine, EvictionReport, PassOutcome};
pub use crate::scanner::open_files::{OpenFileIndex, ProcFs, ProcessTable};

// Daemon
pub use crate::daemon::config_store::{ConfigStore, ReloadOutcome};
pub use crate::daemon::loop_main::Daemon;
pub use crate::daemon::scheduler::{Scheduler, SchedulerHandle};
