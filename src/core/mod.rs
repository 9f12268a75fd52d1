//! Core types: errors, settings, volume mapping, path helpers.

pub mod config;
pub mod errors;
pub mod paths;
pub mod volume_map;
