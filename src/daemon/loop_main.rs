//! Daemon lifecycle: logger startup, initial config load, scheduler, fatal exit.
//!
//! Threads:
//! - **lwd-reload**: refreshes the volume mapping when the config file changes
//! - **lwd-check**: probes volumes and runs eviction passes
//! - **lwd-logger**: writes the JSONL activity log
//!
//! The calling thread supervises. There is no graceful shutdown path: the
//! daemon runs until a fatal error, which [`Daemon::run`] returns after
//! flushing the activity log.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use crate::core::config::DaemonSettings;
use crate::core::errors::Result;
use crate::daemon::config_store::ConfigStore;
use crate::daemon::scheduler::Scheduler;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::platform::pal::{Platform, detect_platform};
use crate::scanner::open_files::{ProcFs, ProcessTable};

/// The log-eviction daemon.
pub struct Daemon {
    settings: DaemonSettings,
    scheduler: Scheduler,
    logger: Option<ActivityLoggerHandle>,
    logger_join: Option<thread::JoinHandle<()>>,
}

impl Daemon {
    /// Wire up the daemon against the live platform and `/proc`.
    pub fn new(settings: DaemonSettings) -> Result<Self> {
        let platform = detect_platform()?;
        Self::with_components(settings, platform, Arc::new(ProcFs::new()))
    }

    /// Wire up the daemon against explicit platform and process-table sources.
    pub fn with_components(
        settings: DaemonSettings,
        platform: Arc<dyn Platform>,
        processes: Arc<dyn ProcessTable>,
    ) -> Result<Self> {
        let (logger, logger_join) = match &settings.activity_log {
            Some(path) => {
                let (handle, join) = spawn_logger(JsonlConfig::at(path))?;
                (Some(handle), Some(join))
            }
            None => (None, None),
        };

        let scheduler = Scheduler::new(
            Arc::new(ConfigStore::new()),
            platform,
            processes,
            &settings,
            logger.clone(),
        );

        Ok(Self {
            settings,
            scheduler,
            logger,
            logger_join,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Load the config synchronously before any task starts.
    pub fn initial_load(&self) -> Result<()> {
        let settings = &self.settings;
        eprintln!(
            "[LWD-DAEMON] using config file {}",
            settings.config_file.display()
        );
        if settings.dry_run {
            eprintln!("[LWD-DAEMON] dry run enabled, no files will be deleted");
        }

        self.scheduler.reload_once()?;
        let mapping = self.scheduler.store().current_mapping();
        if mapping.is_empty() {
            eprintln!("[LWD-DAEMON] warning: no usable log directories configured");
        }

        self.emit(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_file: settings.config_file.clone(),
            thresholds_hash: settings.thresholds.stable_hash(),
            volumes: mapping.len(),
            directories: mapping.directory_count(),
            dry_run: settings.dry_run,
        });
        Ok(())
    }

    /// Load the config, start both tasks, and block until one fails.
    ///
    /// Only ever returns an error; the caller exits with status 1.
    pub fn run(mut self) -> Result<()> {
        let result = self
            .initial_load()
            .and_then(|()| self.scheduler.run());

        if let Err(error) = &result {
            eprintln!("[LWD-DAEMON] fatal: {error}");
            self.emit(ActivityEvent::Fatal {
                code: error.code().to_string(),
                message: error.to_string(),
            });
            self.emit(ActivityEvent::DaemonStopped {
                reason: error.code().to_string(),
            });
        }
        self.shutdown_logger();
        result
    }

    fn shutdown_logger(&mut self) {
        if let Some(logger) = self.logger.take() {
            logger.shutdown();
        }
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("settings", &self.settings)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
