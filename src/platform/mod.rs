//! Platform abstraction layer: mount table and volume statistics.

pub mod pal;
