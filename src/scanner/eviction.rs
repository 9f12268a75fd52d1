//! Eviction pass: delete the oldest eligible files until the volume recovers.
//!
//! One pass pools candidates from every directory of a volume, sorts them
//! oldest first, and deletes them one at a time. The volume is re-probed
//! after every attempt, successful or not, and the pass stops as soon as the
//! free percentage rises strictly above the high-water mark. Running out of
//! candidates first is a normal outcome, reported as [`PassOutcome::Exhausted`].

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::core::errors::{ItemError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, report_item_error};
use crate::monitor::usage::DiskUsageProbe;
use crate::scanner::candidates::{
    CandidateFile, Collection, EligibilityPolicy, collect_for_volume, sort_oldest_first,
};
use crate::scanner::open_files::OpenFileIndex;

/// Knobs for one pass.
#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    /// Stop once free% is strictly above this.
    pub high_water_pct: u8,
    pub min_file_age: Duration,
    /// Log what would be deleted without touching anything.
    pub dry_run: bool,
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Free space rose above the high-water mark.
    Recovered,
    /// Every candidate was processed and the volume is still below target.
    Exhausted,
    /// Nothing was eligible.
    NoCandidates,
}

impl PassOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recovered => "recovered",
            Self::Exhausted => "exhausted",
            Self::NoCandidates => "no_candidates",
        }
    }
}

/// A file the pass deleted (or, in dry run, would have deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
    pub free_pct_after: u8,
}

/// Summary of one pass over one volume.
#[derive(Debug)]
pub struct EvictionReport {
    pub volume: PathBuf,
    pub outcome: PassOutcome,
    pub candidates_found: usize,
    /// Processed files in deletion order.
    pub evicted: Vec<EvictedFile>,
    /// Deletions that failed; the pass moved on.
    pub failures: Vec<ItemError>,
    /// Walk and atime warnings from candidate collection.
    pub warnings: Vec<ItemError>,
    /// Apparent bytes of evicted files.
    pub bytes_reclaimed: u64,
    pub final_free_pct: u8,
    pub dry_run: bool,
    pub duration: Duration,
}

impl EvictionReport {
    /// Evicted paths in order.
    pub fn evicted_paths(&self) -> Vec<&Path> {
        self.evicted.iter().map(|file| file.path.as_path()).collect()
    }
}

/// Runs eviction passes against one probe.
#[derive(Debug, Clone)]
pub struct EvictionEngine {
    probe: DiskUsageProbe,
    config: EvictionConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl EvictionEngine {
    pub fn new(
        probe: DiskUsageProbe,
        config: EvictionConfig,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self {
            probe,
            config,
            logger,
        }
    }

    /// Collect and sort the candidates a pass at `now` would process.
    pub fn plan(&self, dirs: &[PathBuf], open_files: &OpenFileIndex, now: SystemTime) -> Collection {
        let policy = EligibilityPolicy::new(self.config.min_file_age, now);
        let mut collection = collect_for_volume(dirs, open_files, &policy);
        sort_oldest_first(&mut collection.candidates);
        collection
    }

    /// Run one pass over `volume` using the current wall clock.
    ///
    /// `free_pct_before` is the reading that triggered the pass. A probe
    /// failure mid-pass is fatal and aborts the pass.
    pub fn run_pass(
        &self,
        volume: &Path,
        dirs: &[PathBuf],
        open_files: &OpenFileIndex,
        free_pct_before: u8,
    ) -> Result<EvictionReport> {
        self.run_pass_at(volume, dirs, open_files, free_pct_before, SystemTime::now())
    }

    pub fn run_pass_at(
        &self,
        volume: &Path,
        dirs: &[PathBuf],
        open_files: &OpenFileIndex,
        free_pct_before: u8,
        now: SystemTime,
    ) -> Result<EvictionReport> {
        let started = Instant::now();
        let Collection {
            candidates,
            warnings,
            ..
        } = self.plan(dirs, open_files, now);
        for warning in &warnings {
            report_item_error(self.logger.as_ref(), "LWD-EVICT", warning);
        }

        let mut report = EvictionReport {
            volume: volume.to_path_buf(),
            outcome: PassOutcome::NoCandidates,
            candidates_found: candidates.len(),
            evicted: Vec::new(),
            failures: Vec::new(),
            warnings,
            bytes_reclaimed: 0,
            final_free_pct: free_pct_before,
            dry_run: self.config.dry_run,
            duration: Duration::ZERO,
        };

        self.emit(ActivityEvent::PassStarted {
            volume: volume.to_path_buf(),
            free_pct: free_pct_before,
            candidates: candidates.len(),
            open_files: open_files.len(),
        });

        if candidates.is_empty() {
            eprintln!(
                "[LWD-EVICT] {}: nothing to delete ({free_pct_before}% free)",
                volume.display()
            );
        } else {
            report.outcome = PassOutcome::Exhausted;
            for candidate in candidates {
                let deleted = self.evict_one(volume, &candidate, &mut report);
                let free_pct = self.probe.free_percent(volume)?;
                report.final_free_pct = free_pct;
                if deleted {
                    self.record_eviction(volume, candidate, free_pct, &mut report);
                }
                if free_pct > self.config.high_water_pct {
                    report.outcome = PassOutcome::Recovered;
                    break;
                }
            }
            match report.outcome {
                PassOutcome::Recovered => eprintln!(
                    "[LWD-EVICT] {}: recovered, {}% free after {} file(s)",
                    volume.display(),
                    report.final_free_pct,
                    report.evicted.len()
                ),
                _ => eprintln!(
                    "[LWD-EVICT] {}: nothing more to delete ({}% free)",
                    volume.display(),
                    report.final_free_pct
                ),
            }
        }

        report.duration = started.elapsed();
        self.emit(ActivityEvent::PassCompleted {
            volume: volume.to_path_buf(),
            outcome: report.outcome.as_str().to_string(),
            candidates: report.candidates_found,
            evicted: report.evicted.len(),
            failures: report.failures.len(),
            bytes_reclaimed: report.bytes_reclaimed,
            final_free_pct: report.final_free_pct,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            dry_run: report.dry_run,
        });
        Ok(report)
    }

    /// Delete (or pretend to). Returns whether the file counts as evicted.
    fn evict_one(&self, volume: &Path, candidate: &CandidateFile, report: &mut EvictionReport) -> bool {
        if self.config.dry_run {
            eprintln!(
                "[LWD-EVICT] {}: dry run, would delete {}",
                volume.display(),
                candidate.path.display()
            );
            return true;
        }
        match fs::remove_file(&candidate.path) {
            Ok(()) => {
                eprintln!(
                    "[LWD-EVICT] {}: deleted {}",
                    volume.display(),
                    candidate.path.display()
                );
                true
            }
            Err(source) => {
                let error = ItemError::Delete {
                    path: candidate.path.clone(),
                    source,
                };
                report_item_error(self.logger.as_ref(), "LWD-EVICT", &error);
                report.failures.push(error);
                false
            }
        }
    }

    fn record_eviction(
        &self,
        volume: &Path,
        candidate: CandidateFile,
        free_pct: u8,
        report: &mut EvictionReport,
    ) {
        self.emit(ActivityEvent::FileEvicted {
            volume: volume.to_path_buf(),
            path: candidate.path.clone(),
            size_bytes: candidate.size_bytes,
            free_pct_after: free_pct,
            dry_run: self.config.dry_run,
        });
        report.bytes_reclaimed = report.bytes_reclaimed.saturating_add(candidate.size_bytes);
        report.evicted.push(EvictedFile {
            path: candidate.path,
            modified: candidate.modified,
            size_bytes: candidate.size_bytes,
            free_pct_after: free_pct,
        });
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
