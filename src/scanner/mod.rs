//! Eviction: open-file detection, candidate collection, and bounded deletion.

pub mod candidates;
pub mod eviction;
pub mod open_files;
