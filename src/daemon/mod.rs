//! Daemon subsystem: shared config store, reload/check scheduler, lifecycle.

pub mod config_store;
pub mod loop_main;
pub mod scheduler;
