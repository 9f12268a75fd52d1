#![forbid(unsafe_code)]

//! logwarden: keeps log volumes from filling up.
//!
//! The daemon watches the free-space percentage of every volume that holds a
//! configured log directory. When a volume drops below the low-water mark it
//! deletes the oldest log files that are old enough (by both modification and
//! access time) and not held open by any process, re-probing after each
//! deletion until free space is back above the high-water mark.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use logwarden::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use logwarden::core::volume_map::VolumeMapping;
//! use logwarden::scanner::eviction::{EvictionConfig, EvictionEngine};
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod platform;
pub mod scanner;
