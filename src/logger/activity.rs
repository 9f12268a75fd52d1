//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Every other thread sends
//! [`ActivityEvent`]s through a bounded crossbeam channel with `try_send`, so
//! the check and reload loops are never blocked by logging back-pressure.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{FatalError, ItemError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

/// Events recorded in the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_file: PathBuf,
        thresholds_hash: String,
        volumes: usize,
        directories: usize,
        dry_run: bool,
    },
    DaemonStopped {
        reason: String,
    },
    ConfigReloaded {
        volumes: usize,
        directories: usize,
        rejected: usize,
    },
    VolumeChecked {
        volume: PathBuf,
        free_pct: u8,
        low_water_pct: u8,
        triggered: bool,
    },
    PassStarted {
        volume: PathBuf,
        free_pct: u8,
        candidates: usize,
        open_files: usize,
    },
    FileEvicted {
        volume: PathBuf,
        path: PathBuf,
        size_bytes: u64,
        free_pct_after: u8,
        dry_run: bool,
    },
    PassCompleted {
        volume: PathBuf,
        outcome: String,
        candidates: usize,
        evicted: usize,
        failures: usize,
        bytes_reclaimed: u64,
        final_free_pct: u8,
        duration_ms: u64,
        dry_run: bool,
    },
    Warning {
        code: String,
        path: Option<PathBuf>,
        message: String,
    },
    Fatal {
        code: String,
        message: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

/// Cheaply cloneable handle for sending events to the logger thread.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

impl ActivityLoggerHandle {
    /// Send an event. Non-blocking; a full channel drops the event and bumps
    /// the dropped-events counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped so far because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until the
    /// sentinel is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Spawn the logger thread writing to `config.path`.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("lwd-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped))
        .map_err(|e| FatalError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

/// Print an item-level failure to stderr and record it in the activity log.
pub fn report_item_error(logger: Option<&ActivityLoggerHandle>, prefix: &str, error: &ItemError) {
    eprintln!("[{prefix}] warning: {error}");
    if let Some(logger) = logger {
        logger.send(ActivityEvent::Warning {
            code: error.code().to_string(),
            path: error.path().map(std::path::Path::to_path_buf),
            message: error.to_string(),
        });
    }
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);
    let mut reported_drops = 0u64;

    while let Ok(event) = rx.recv() {
        let total_drops = dropped.load(Ordering::Relaxed);
        if total_drops > reported_drops {
            let mut warn = LogEntry::new(EventType::Warning, Severity::Warning);
            warn.details = Some(format!(
                "{} log events dropped due to back-pressure",
                total_drops - reported_drops
            ));
            jsonl.write_entry(&warn);
            reported_drops = total_drops;
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

fn path_string(path: &std::path::Path) -> String {
    path.display().to_string()
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_file,
            thresholds_hash,
            volumes,
            directories,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.path = Some(path_string(config_file));
            e.dry_run = Some(*dry_run);
            e.details = Some(format!(
                "version={version} thresholds_hash={thresholds_hash} volumes={volumes} directories={directories}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::DaemonStopped { reason } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason}"));
            e
        }
        ActivityEvent::ConfigReloaded {
            volumes,
            directories,
            rejected,
        } => {
            let severity = if *rejected > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::ConfigReload, severity);
            e.details = Some(format!(
                "volumes={volumes} directories={directories} rejected={rejected}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::VolumeChecked {
            volume,
            free_pct,
            low_water_pct,
            triggered,
        } => {
            let mut e = LogEntry::new(EventType::VolumeCheck, Severity::Info);
            e.volume = Some(path_string(volume));
            e.free_pct = Some(*free_pct);
            e.details = Some(format!("low_water_pct={low_water_pct} triggered={triggered}"));
            e
        }
        ActivityEvent::PassStarted {
            volume,
            free_pct,
            candidates,
            open_files,
        } => {
            let mut e = LogEntry::new(EventType::PassStart, Severity::Info);
            e.volume = Some(path_string(volume));
            e.free_pct = Some(*free_pct);
            e.details = Some(format!("candidates={candidates} open_files={open_files}"));
            e
        }
        ActivityEvent::FileEvicted {
            volume,
            path,
            size_bytes,
            free_pct_after,
            dry_run,
        } => {
            let mut e = LogEntry::new(EventType::FileEvict, Severity::Info);
            e.volume = Some(path_string(volume));
            e.path = Some(path_string(path));
            e.size = Some(*size_bytes);
            e.free_pct = Some(*free_pct_after);
            e.dry_run = Some(*dry_run);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PassCompleted {
            volume,
            outcome,
            candidates,
            evicted,
            failures,
            bytes_reclaimed,
            final_free_pct,
            duration_ms,
            dry_run,
        } => {
            let severity = if outcome == "recovered" {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::PassComplete, severity);
            e.volume = Some(path_string(volume));
            e.size = Some(*bytes_reclaimed);
            e.free_pct = Some(*final_free_pct);
            e.duration_ms = Some(*duration_ms);
            e.dry_run = Some(*dry_run);
            e.details = Some(format!(
                "outcome={outcome} candidates={candidates} evicted={evicted} failures={failures}"
            ));
            e
        }
        ActivityEvent::Warning {
            code,
            path,
            message,
        } => {
            let mut e = LogEntry::new(EventType::Warning, Severity::Warning);
            e.path = path.as_deref().map(path_string);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Fatal { code, message } => {
            let mut e = LogEntry::new(EventType::Fatal, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::DaemonStop, Severity::Info),
    }
}
