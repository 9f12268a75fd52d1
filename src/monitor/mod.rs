//! Volume monitoring: mount point discovery and free-space probing.

pub mod mounts;
pub mod usage;
