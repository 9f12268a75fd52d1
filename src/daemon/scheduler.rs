//! Reload and check tasks.
//!
//! Two named threads run forever. The reload task sleeps for the reload
//! interval and then refreshes the mapping from the config file. The check
//! task sleeps for the check interval and then, holding the mapping's read
//! lock for the whole iteration, probes every volume and runs an eviction
//! pass on each one below the low-water mark. The first fatal error from
//! either task is delivered to whoever waits on the [`SchedulerHandle`].

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::config::{DaemonSettings, Thresholds};
use crate::core::errors::{FatalError, ItemError, Result};
use crate::daemon::config_store::{ConfigStore, ReloadOutcome};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, report_item_error};
use crate::monitor::mounts::MountResolver;
use crate::monitor::usage::DiskUsageProbe;
use crate::platform::pal::Platform;
use crate::scanner::eviction::{EvictionConfig, EvictionEngine, EvictionReport};
use crate::scanner::open_files::{OpenFileIndex, ProcessTable};

/// Result of checking one volume in one iteration.
#[derive(Debug)]
pub struct VolumeCheck {
    pub volume: PathBuf,
    pub free_pct: u8,
    /// Present when the volume was below the low-water mark.
    pub report: Option<EvictionReport>,
}

struct Shared {
    store: Arc<ConfigStore>,
    config_file: PathBuf,
    thresholds: Thresholds,
    resolver: MountResolver,
    probe: DiskUsageProbe,
    engine: EvictionEngine,
    processes: Arc<dyn ProcessTable>,
    logger: Option<ActivityLoggerHandle>,
}

/// Owns the reload and check logic; `start` puts it on threads.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config_file", &self.shared.config_file)
            .field("thresholds", &self.shared.thresholds)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        store: Arc<ConfigStore>,
        platform: Arc<dyn Platform>,
        processes: Arc<dyn ProcessTable>,
        settings: &DaemonSettings,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        let thresholds = settings.thresholds.clone();
        let probe = DiskUsageProbe::new(Arc::clone(&platform));
        let engine = EvictionEngine::new(
            probe.clone(),
            EvictionConfig {
                high_water_pct: thresholds.high_water_pct,
                min_file_age: thresholds.min_file_age(),
                dry_run: settings.dry_run,
            },
            logger.clone(),
        );
        Self {
            shared: Arc::new(Shared {
                store,
                config_file: settings.config_file.clone(),
                thresholds,
                resolver: MountResolver::new(platform),
                probe,
                engine,
                processes,
                logger,
            }),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.shared.store
    }

    /// Refresh the mapping from the config file once.
    pub fn reload_once(&self) -> Result<ReloadOutcome> {
        let shared = &self.shared;
        let outcome = shared
            .store
            .refresh_from_file(&shared.config_file, &shared.resolver)?;
        if let ReloadOutcome::Reloaded {
            volumes,
            directories,
            rejected,
        } = &outcome
        {
            for error in rejected {
                report_item_error(shared.logger.as_ref(), "LWD-CONFIG", error);
            }
            eprintln!(
                "[LWD-CONFIG] loaded {}: {directories} director{} on {volumes} volume(s), {} rejected",
                shared.config_file.display(),
                if *directories == 1 { "y" } else { "ies" },
                rejected.len()
            );
            shared.emit(ActivityEvent::ConfigReloaded {
                volumes: *volumes,
                directories: *directories,
                rejected: rejected.len(),
            });
        }
        Ok(outcome)
    }

    /// Probe every volume once, evicting where free space is below the low-water mark.
    ///
    /// Holds the mapping's read lock for the whole iteration.
    pub fn check_once(&self) -> Result<Vec<VolumeCheck>> {
        let shared = &self.shared;
        shared.store.with_mapping(|mapping| {
            let mut checks = Vec::with_capacity(mapping.len());
            for (volume, dirs) in mapping.iter() {
                checks.push(shared.check_volume(volume, dirs)?);
            }
            Ok(checks)
        })
    }

    /// Spawn the reload and check threads.
    pub fn start(&self) -> Result<SchedulerHandle> {
        let (fatal_tx, fatal_rx) = bounded::<FatalError>(2);
        let stop = Arc::new(AtomicBool::new(false));

        let reload = self.spawn_task(
            "lwd-reload",
            self.shared.thresholds.reload_interval(),
            &fatal_tx,
            &stop,
            |scheduler| scheduler.reload_once().map(|_| ()),
        )?;
        let check = self.spawn_task(
            "lwd-check",
            self.shared.thresholds.check_interval(),
            &fatal_tx,
            &stop,
            |scheduler| scheduler.check_once().map(|_| ()),
        )?;

        Ok(SchedulerHandle {
            fatal_rx,
            stop,
            threads: vec![reload, check],
        })
    }

    /// Start both tasks and block until one of them fails.
    pub fn run(&self) -> Result<()> {
        Err(self.start()?.wait())
    }

    fn spawn_task(
        &self,
        name: &str,
        interval: Duration,
        fatal_tx: &Sender<FatalError>,
        stop: &Arc<AtomicBool>,
        step: fn(&Self) -> Result<()>,
    ) -> Result<thread::JoinHandle<()>> {
        let scheduler = self.clone();
        let fatal_tx = fatal_tx.clone();
        let stop = Arc::clone(stop);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    thread::sleep(interval);
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Err(error) = step(&scheduler) {
                        stop.store(true, Ordering::SeqCst);
                        let _ = fatal_tx.send(error);
                        return;
                    }
                }
            })
            .map_err(|source| FatalError::Runtime {
                details: format!("failed to spawn {name} thread: {source}"),
            })
    }
}

impl Shared {
    fn check_volume(&self, volume: &Path, dirs: &[PathBuf]) -> Result<VolumeCheck> {
        let low = self.thresholds.low_water_pct;
        let free_pct = self.probe.free_percent(volume)?;
        let triggered = free_pct < low;
        self.emit(ActivityEvent::VolumeChecked {
            volume: volume.to_path_buf(),
            free_pct,
            low_water_pct: low,
            triggered,
        });

        if !triggered {
            eprintln!(
                "[LWD-DAEMON] {}: {free_pct}% free, no action needed",
                volume.display()
            );
            return Ok(VolumeCheck {
                volume: volume.to_path_buf(),
                free_pct,
                report: None,
            });
        }

        eprintln!(
            "[LWD-DAEMON] {}: {free_pct}% free (below {low}%), starting eviction",
            volume.display()
        );
        let (open_files, warnings) = OpenFileIndex::build(self.processes.as_ref(), dirs);
        self.report_scan_warnings(&warnings);
        let report = self.engine.run_pass(volume, dirs, &open_files, free_pct)?;
        Ok(VolumeCheck {
            volume: volume.to_path_buf(),
            free_pct,
            report: Some(report),
        })
    }

    /// Process-table warnings can number in the hundreds when not running as
    /// root, so stderr gets one summary line and the activity log gets each.
    fn report_scan_warnings(&self, warnings: &[ItemError]) {
        let Some(first) = warnings.first() else {
            return;
        };
        if warnings.len() == 1 {
            report_item_error(self.logger.as_ref(), "LWD-OPENFILES", first);
            return;
        }
        eprintln!(
            "[LWD-OPENFILES] warning: {} process entries could not be inspected (first: {first})",
            warnings.len()
        );
        for warning in warnings {
            self.emit(ActivityEvent::Warning {
                code: warning.code().to_string(),
                path: warning.path().map(Path::to_path_buf),
                message: warning.to_string(),
            });
        }
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

/// Running reload and check threads.
#[derive(Debug)]
pub struct SchedulerHandle {
    fatal_rx: Receiver<FatalError>,
    stop: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Block until a task reports a fatal error.
    pub fn wait(self) -> FatalError {
        self.fatal_rx.recv().unwrap_or_else(|_| FatalError::Runtime {
            details: "scheduler threads exited without reporting an error".to_string(),
        })
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FatalError> {
        match self.fatal_rx.recv_timeout(timeout) {
            Ok(error) => Some(error),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(FatalError::Runtime {
                details: "scheduler threads exited without reporting an error".to_string(),
            }),
        }
    }

    /// Ask both tasks to exit at their next wake-up.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop and join both tasks.
    pub fn join(self) {
        self.stop();
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}
